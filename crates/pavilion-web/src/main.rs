mod api;
mod auth;
mod config;
mod dto;
mod error;
mod middleware;
mod state;
mod store;

use std::sync::Arc;

use axum::http::{header, Method};
use axum::middleware::from_fn;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pavilion_core::{Clock, CredentialSet, RateLimitOptions, RateLimiter, SystemClock};

use crate::config::ServerConfig;
use crate::state::AppState;
use crate::store::{MemoryUserStore, User, UserStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pavilion_web=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::load()?;
    let bind_addr = config.bind_addr;
    let tls_config = config.tls.clone();
    let tls_enabled = tls_config.cert_path.is_some() && tls_config.key_path.is_some();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let users: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new(clock.clone()));
    for seed in &config.users {
        let now = clock.now();
        let user = User {
            id: uuid::Uuid::new_v4(),
            email: seed.email.trim().to_lowercase(),
            first_name: seed.first_name.clone(),
            last_name: seed.last_name.clone(),
            role: seed.role,
            is_verified: true,
            credentials: CredentialSet::from_hash(seed.password_hash.clone()),
            created_at: now,
            updated_at: now,
        };
        match users.insert(user).await {
            Ok(()) => tracing::info!("Seeded user: {}", seed.email),
            Err(e) => anyhow::bail!("Failed to seed user {}: {e}", seed.email),
        }
    }

    let rl = &config.rate_limit;
    let signin_limiter = Arc::new(RateLimiter::new(
        RateLimitOptions {
            window: rl.window(),
            max: rl.signin_requests_per_window,
            unique_token_per_interval: rl.unique_token_per_interval,
        },
        clock.clone(),
    ));
    let reset_limiter = Arc::new(RateLimiter::new(
        RateLimitOptions {
            window: rl.window(),
            max: rl.reset_requests_per_window,
            unique_token_per_interval: rl.unique_token_per_interval,
        },
        clock.clone(),
    ));

    let state = AppState {
        config: Arc::new(config),
        users,
        clock,
        signin_limiter: signin_limiter.clone(),
        reset_limiter: reset_limiter.clone(),
    };

    // Counter sweep: entries self-expire on read; this keeps idle identities
    // from sitting in the caches between requests.
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            signin_limiter.evict_expired();
            reset_limiter.evict_expired();
        }
    });

    // CORS: same-origin only by default (no cross-origin requests allowed)
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let base_router = axum::Router::new().nest("/api", api::auth_router(&state));

    let app = if tls_enabled {
        base_router
            .layer(from_fn(middleware::security_headers::security_headers_with_hsts))
            .layer(RequestBodyLimitLayer::new(64 * 1024))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    } else {
        base_router
            .layer(from_fn(middleware::security_headers::security_headers))
            .layer(RequestBodyLimitLayer::new(64 * 1024))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    };

    if let (Some(cert), Some(key)) = (&tls_config.cert_path, &tls_config.key_path) {
        use axum_server::tls_rustls::RustlsConfig;
        let rustls_config = RustlsConfig::from_pem_file(cert, key).await?;
        tracing::info!("pavilion-web listening on https://{}", bind_addr);
        axum_server::bind_rustls(bind_addr, rustls_config)
            .serve(app.into_make_service_with_connect_info::<std::net::SocketAddr>())
            .await?;
    } else {
        let listener = tokio::net::TcpListener::bind(bind_addr).await?;
        tracing::info!("pavilion-web listening on http://{}", bind_addr);
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .await?;
    }

    Ok(())
}
