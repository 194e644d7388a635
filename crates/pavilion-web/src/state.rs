use std::sync::Arc;

use pavilion_core::{Clock, RateLimiter};

use crate::config::ServerConfig;
use crate::store::UserStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub users: Arc<dyn UserStore>,
    pub clock: Arc<dyn Clock>,
    /// Sign-in attempts: 5 per window per client identity.
    pub signin_limiter: Arc<RateLimiter>,
    /// Password resets: 10 per window per client identity.
    pub reset_limiter: Arc<RateLimiter>,
}
