use async_trait::async_trait;
use redis::AsyncCommands;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheBackendError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// 缓存后端的统一接口
///
/// 上层把后端故障一律当作未命中处理，这里只负责如实返回结果。
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheBackendError>;
    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheBackendError>;
}

/// Redis 后端，连接按需建立
pub struct RedisBackend {
    client: redis::Client,
}

impl RedisBackend {
    pub fn connect(url: &str) -> Result<Self, CacheBackendError> {
        Ok(Self {
            client: redis::Client::open(url)?,
        })
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheBackendError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheBackendError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }
}
