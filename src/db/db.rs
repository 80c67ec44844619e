use std::sync::Arc;

use redis::aio::ConnectionManager;
use sqlx::{Pool, Postgres};

use super::StoreError;

#[derive(Debug, Clone)]
pub struct DBClient {
    pub pool: Pool<Postgres>,
}

impl DBClient {
    pub fn new(pool: Pool<Postgres>) -> Self {
        DBClient { pool }
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }
}

/// Open a Redis connection manager, or `None` when Redis is unreachable.
pub async fn connect_redis(redis_url: &str) -> Option<Arc<ConnectionManager>> {
    match redis::Client::open(redis_url) {
        Ok(client) => match ConnectionManager::new(client).await {
            Ok(conn) => {
                tracing::info!("Redis connection established");
                Some(Arc::new(conn))
            }
            Err(e) => {
                tracing::warn!("Failed to connect to Redis: {}. Continuing without it.", e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to create Redis client: {}. Continuing without it.", e);
            None
        }
    }
}
