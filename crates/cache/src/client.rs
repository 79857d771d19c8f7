//! Redis-backed wizard storage, for deployments where the wizard runs
//! server-side and progress must outlive the process.

use async_trait::async_trait;
use redis::AsyncCommands;
use tenant_core::config::RedisConfig;
use tenant_core::{TenantError, TenantResult};
use tracing::{debug, info};

use crate::storage::SelectionStorage;

pub struct RedisStorage {
    client: redis::Client,
    ttl_secs: u64,
}

impl RedisStorage {
    /// Connect to Redis and verify connectivity.
    pub async fn new(config: &RedisConfig) -> TenantResult<Self> {
        let url = config
            .urls
            .first()
            .cloned()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        info!(url = %url, "Connecting to Redis");

        let client = redis::Client::open(url.as_str()).map_err(storage_error)?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(storage_error)?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(storage_error)?;
        info!(response = %pong, "Redis connection established");

        Ok(Self {
            client,
            ttl_secs: config.ttl_secs,
        })
    }
}

#[async_trait]
impl SelectionStorage for RedisStorage {
    async fn get(&self, key: &str) -> TenantResult<Option<String>> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(storage_error)?;
        let data: Option<String> = conn.get(key).await.map_err(storage_error)?;
        if data.is_none() {
            debug!(key, "No wizard state in Redis");
        }
        Ok(data)
    }

    async fn set(&self, key: &str, value: String) -> TenantResult<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(storage_error)?;
        conn.set_ex::<_, _, ()>(key, value, self.ttl_secs)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> TenantResult<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(storage_error)?;
        conn.del::<_, ()>(key).await.map_err(storage_error)?;
        Ok(())
    }
}

fn storage_error(e: redis::RedisError) -> TenantError {
    TenantError::Storage(e.to_string())
}
