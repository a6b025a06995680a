use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::engine::TrainingEngine;
use crate::retry::RetryPolicy;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub env: &'static Config,
    pub engine: Arc<TrainingEngine>,
    pub retry: RetryPolicy,
}

impl AppState {
    pub fn new(db: PgPool, env: &'static Config, engine: Arc<TrainingEngine>) -> Self {
        let retry = env.retry_policy();
        Self {
            db,
            env,
            engine,
            retry,
        }
    }
}
