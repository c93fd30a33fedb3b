use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::assistant::Assistant;
use crate::config::AppConfig;
use crate::judge::Judge;
use crate::utils::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub judge: Arc<dyn Judge>,
    pub assistant: Arc<dyn Assistant>,
    /// Runs are not persisted, so they are limited in memory.
    pub run_limiter: Arc<RateLimiter>,
}
