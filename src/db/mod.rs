mod error;
pub mod models;
mod repositories;
mod store;

use secrecy::ExposeSecret;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::config::Config;

pub use error::DatabaseError;
pub use models::*;
pub use repositories::UserRepository;
pub use store::PgEntityStore;

/// Initialize the database connection pool and apply pending migrations.
pub async fn init_pool(config: &Config) -> Result<PgPool, DatabaseError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(config.database.acquire_timeout)
        .connect(config.database.url.expose_secret())
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied");

    Ok(pool)
}
