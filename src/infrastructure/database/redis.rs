use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use tracing::info;

use crate::config::RedisConfig;
use crate::domain::services::SessionStore;
use crate::shared::{Result, TimeChatError};

fn redis_error(operation: &str, e: redis::RedisError) -> TimeChatError {
    TimeChatError::ExternalService {
        service: "Redis".to_string(),
        message: format!("Redis {} failed: {}", operation, e),
    }
}

/// Multiplexed Redis connection; cloning shares the underlying socket
#[derive(Clone)]
pub struct RedisConnection {
    connection: MultiplexedConnection,
}

impl RedisConnection {
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        info!("Connecting to Redis");

        let client = Client::open(config.url.as_str()).map_err(|e| TimeChatError::ExternalService {
            service: "Redis".to_string(),
            message: format!("Failed to create Redis client: {}", e),
        })?;

        let mut connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| TimeChatError::ExternalService {
                service: "Redis".to_string(),
                message: format!("Failed to connect to Redis: {}", e),
            })?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut connection)
            .await
            .map_err(|e| redis_error("PING", e))?;

        info!("Successfully connected to Redis");
        Ok(Self { connection })
    }

    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| redis_error("health check", e))?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for RedisConnection {
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds.max(1))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| redis_error("SET", e))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("GET", e))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("DEL", e))?;
        Ok(removed > 0)
    }

    async fn increment(&self, key: &str, ttl_seconds: u64) -> Result<i64> {
        let mut conn = self.connection.clone();
        // INCR and EXPIRE NX in one round trip; the window starts at the first increment.
        let (count, _): (i64, i64) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl_seconds.max(1))
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("INCR", e))?;
        Ok(count)
    }
}
