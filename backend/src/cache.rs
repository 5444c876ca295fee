use crate::{config::RedisConfig, error::{AppError, Result}};
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Thin Redis wrapper. Backs the shared chat context store and the guest
/// question counter when `REDIS_URL` is configured.
pub struct Cache {
    client: Client,
}

impl Cache {
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.clone()).map_err(AppError::Redis)?;

        // Test connection
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(AppError::Redis)?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        Ok(Self { client })
    }

    pub async fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()>
    where
        T: Serialize,
    {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(value)
            .map_err(|e| AppError::Internal(format!("Serialization error: {}", e)))?;

        if let Some(ttl) = ttl {
            conn.set_ex::<_, _, ()>(key, serialized, ttl.as_secs()).await?;
        } else {
            conn.set::<_, _, ()>(key, serialized).await?;
        }

        Ok(())
    }

    pub async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(key).await?;

        match value {
            Some(serialized) => {
                let deserialized = serde_json::from_str(&serialized)
                    .map_err(|e| AppError::Internal(format!("Deserialization error: {}", e)))?;
                Ok(Some(deserialized))
            }
            None => Ok(None),
        }
    }

    /// Increments a counter and (re)arms its expiry. Returns the new value.
    pub async fn increment(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: i64 = conn.incr(key, 1).await?;
        conn.expire::<_, ()>(key, ttl.as_secs() as i64).await?;
        Ok(value)
    }

    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(true)
    }
}
