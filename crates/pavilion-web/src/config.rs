use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::store::Role;

/// An account created at startup from the config file. Hashes come from the
/// `hash_password` helper binary.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub users: Vec<SeedUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_jwt_ttl_hours")]
    pub jwt_ttl_hours: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_ttl_hours: default_jwt_ttl_hours(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Window length shared by both limited endpoints.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_signin_max")]
    pub signin_requests_per_window: u32,
    #[serde(default = "default_reset_max")]
    pub reset_requests_per_window: u32,
    /// Cap on distinct client identities tracked per limiter.
    #[serde(default = "default_unique_token_per_interval")]
    pub unique_token_per_interval: usize,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            signin_requests_per_window: default_signin_max(),
            reset_requests_per_window: default_reset_max(),
            unique_token_per_interval: default_unique_token_per_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:9090".parse().unwrap()
}

fn default_jwt_ttl_hours() -> u64 {
    1
}

fn default_window_secs() -> u64 {
    60
}

fn default_signin_max() -> u32 {
    5
}

fn default_reset_max() -> u32 {
    10
}

fn default_unique_token_per_interval() -> usize {
    500
}

impl ServerConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = std::env::var("PAVILION_WEB_CONFIG").map(PathBuf::from).ok();

        let mut config = if let Some(path) = config_path {
            let contents = std::fs::read_to_string(&path)?;
            toml::from_str(&contents)?
        } else {
            ServerConfig {
                bind_addr: default_bind_addr(),
                auth: AuthConfig::default(),
                rate_limit: RateLimitConfig::default(),
                tls: TlsConfig::default(),
                users: Vec::new(),
            }
        };

        if let Ok(secret) = std::env::var("PAVILION_JWT_SECRET") {
            config.auth.jwt_secret = secret;
        }
        if config.auth.jwt_secret.is_empty() {
            config.auth.jwt_secret = uuid::Uuid::new_v4().to_string();
            tracing::warn!(
                "No JWT secret configured. Generated random secret (sessions will not survive a restart)."
            );
        }

        if let Ok(addr) = std::env::var("PAVILION_BIND_ADDR") {
            config.bind_addr = addr.parse()?;
        }

        if let Ok(cert) = std::env::var("PAVILION_TLS_CERT") {
            config.tls.cert_path = Some(cert);
        }
        if let Ok(key) = std::env::var("PAVILION_TLS_KEY") {
            config.tls.key_path = Some(key);
        }

        // Security: reject placeholder JWT secrets outright.
        const WEAK_SECRETS: &[&str] = &[
            "change-me-to-a-random-secret",
            "secret",
            "password",
            "jwt-secret",
        ];
        if WEAK_SECRETS.iter().any(|&w| config.auth.jwt_secret == w) {
            anyhow::bail!(
                "JWT secret matches a known weak/placeholder value. \
                 Set a strong random secret via PAVILION_JWT_SECRET environment variable."
            );
        }
        if config.auth.jwt_secret.len() < 32 {
            tracing::warn!(
                "JWT secret is shorter than 32 characters. \
                 Consider using a stronger secret via PAVILION_JWT_SECRET."
            );
        }

        Ok(config)
    }
}
