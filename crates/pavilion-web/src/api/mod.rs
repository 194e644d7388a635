mod auth_handlers;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;

use crate::middleware::rate_limit::rate_limit;
use crate::state::AppState;

/// Auth routes. Sign-in and reset carry their own limiter layers; the rest
/// go unthrottled, matching the endpoints the membership site throttled.
pub fn auth_router(state: &AppState) -> Router<AppState> {
    let signin = Router::new()
        .route("/auth/signin", post(auth_handlers::signin))
        .layer(from_fn_with_state(state.signin_limiter.clone(), rate_limit));

    let reset = Router::new()
        .route("/auth/reset-password", post(auth_handlers::reset_password))
        .layer(from_fn_with_state(state.reset_limiter.clone(), rate_limit));

    Router::new()
        .route("/auth/register", post(auth_handlers::register))
        .route("/auth/verify-email", post(auth_handlers::verify_email))
        .route("/auth/forgot-password", post(auth_handlers::forgot_password))
        .route("/auth/me", get(auth_handlers::me))
        .merge(signin)
        .merge(reset)
}
