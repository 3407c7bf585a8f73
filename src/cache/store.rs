use super::backend::{CacheBackend, RedisBackend};
use super::fingerprint::Fingerprint;
use crate::config::ApiConfig;
use log::{info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct LocalEntry {
    body: String,
    expires_at: Instant,
}

/// 两级响应缓存
///
/// 进程内 TTL map 在前，可选的外部后端在后。缓存只是优化，
/// 不承担正确性：后端故障、超时、内容损坏一律降级为未命中，
/// 写入失败仅记录日志。条目要么完整写入要么不存在。
pub struct ResponseCache {
    backend: Option<Arc<dyn CacheBackend>>,
    local: Mutex<HashMap<String, LocalEntry>>,
    ttl: Duration,
    backend_timeout: Duration,
}

impl ResponseCache {
    pub fn new(backend: Option<Arc<dyn CacheBackend>>, ttl: Duration) -> Self {
        Self {
            backend,
            local: Mutex::new(HashMap::new()),
            ttl,
            backend_timeout: Duration::from_secs(2),
        }
    }

    /// 按配置组装缓存。REDIS_URL 缺失或无效时只保留进程内一级。
    pub fn from_config(config: &ApiConfig) -> Self {
        let backend: Option<Arc<dyn CacheBackend>> = match &config.redis_url {
            Some(url) => match RedisBackend::connect(url) {
                Ok(backend) => {
                    info!("✓ 缓存后端已配置: {}", url);
                    Some(Arc::new(backend))
                }
                Err(e) => {
                    warn!("缓存后端不可用，禁用外部缓存: {}", e);
                    None
                }
            },
            None => {
                info!("未配置 REDIS_URL，仅使用进程内缓存");
                None
            }
        };
        Self::new(backend, Duration::from_secs(config.cache_ttl_secs))
    }

    /// 查缓存。绝不向调用方抛错，所有故障路径都表现为未命中。
    pub async fn get(&self, fp: &Fingerprint) -> Option<Value> {
        if let Some(body) = self.local_get(fp) {
            match serde_json::from_str(&body) {
                Ok(v) => return Some(v),
                Err(_) => {
                    warn!("进程内缓存内容损坏，按未命中处理: {}", fp);
                }
            }
        }

        let backend = self.backend.as_ref()?;
        match tokio::time::timeout(self.backend_timeout, backend.get(fp.as_str())).await {
            Ok(Ok(Some(body))) => match serde_json::from_str(&body) {
                Ok(v) => {
                    self.local_put(fp, body);
                    Some(v)
                }
                Err(_) => {
                    warn!("缓存后端内容损坏，按未命中处理: {}", fp);
                    None
                }
            },
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                warn!("缓存后端读取失败，降级为未命中: {}", e);
                None
            }
            Err(_) => {
                warn!("缓存后端读取超时，降级为未命中: {}", fp);
                None
            }
        }
    }

    /// 写缓存。尽力而为，两级各自独立失败。
    pub async fn put(&self, fp: &Fingerprint, body: &Value) {
        let text = body.to_string();
        self.local_put(fp, text.clone());

        if let Some(backend) = &self.backend {
            match tokio::time::timeout(
                self.backend_timeout,
                backend.put(fp.as_str(), &text, self.ttl.as_secs()),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("缓存后端写入失败: {}", e),
                Err(_) => warn!("缓存后端写入超时: {}", fp),
            }
        }
    }

    fn local_get(&self, fp: &Fingerprint) -> Option<String> {
        let mut map = self.local.lock().ok()?;
        match map.get(fp.as_str()) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.body.clone()),
            Some(_) => {
                // 过期条目顺手移除
                map.remove(fp.as_str());
                None
            }
            None => None,
        }
    }

    fn local_put(&self, fp: &Fingerprint, body: String) {
        if let Ok(mut map) = self.local.lock() {
            map.insert(
                fp.as_str().to_string(),
                LocalEntry {
                    body,
                    expires_at: Instant::now() + self.ttl,
                },
            );
        }
    }
}
