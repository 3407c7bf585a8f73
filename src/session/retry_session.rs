use crate::fetch::model::FetchError;
use log::warn;
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// 带重试的 HTTP 会话
///
/// 所有出站请求共用一个带超时的 Client。请求失败时按错误分型决定去向：
/// 超时与 5xx 走指数退避重试，429 优先尊重服务端给出的 Retry-After，
/// 其余 4xx 立即判定为永久失败。取消在下一次调度或重试边界生效，
/// 不会打断已经在途的单次请求。
pub struct RetrySession {
    client: Client,
    max_retries: u32,
    backoff_base: Duration,
    backoff_cap: Duration,
}

impl RetrySession {
    /// 默认参数：最多重试 3 次，退避基值 200ms，上限 5s
    pub fn new() -> Self {
        Self::with_retry(3, 200, 5_000)
    }

    /// 创建一个自定义重试参数的会话
    ///
    /// # 参数
    ///
    /// * `max_retries` - 首次请求之外的最大重试次数
    /// * `backoff_base_ms` - 指数退避的基值（毫秒）
    /// * `backoff_cap_ms` - 单次退避的上限（毫秒）
    pub fn with_retry(max_retries: u32, backoff_base_ms: u64, backoff_cap_ms: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .user_agent("crewsync/0.1")
                .build()
                .expect("Failed to create HTTP client"),
            max_retries,
            backoff_base: Duration::from_millis(backoff_base_ms),
            backoff_cap: Duration::from_millis(backoff_cap_ms),
        }
    }

    /// 第 attempt 次失败后的退避时长（指数增长，带 0~20% 抖动）
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.backoff_base.as_millis() as u64;
        let cap = self.backoff_cap.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << attempt.min(10));
        let mut delay = exp.min(cap);
        delay += (delay / 5) * (rand::random::<u8>() as u64 % 5) / 5;
        Duration::from_millis(delay)
    }

    /// GET 并解析 JSON，带重试与取消检查
    pub async fn get_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        cancel: &AtomicBool,
    ) -> Result<Value, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            if cancel.load(Ordering::Relaxed) {
                return Err(FetchError::cancelled(format!("请求在调度边界被取消: {}", url)));
            }

            let mut request = self.client.get(url);
            for (key, value) in headers {
                request = request.header(key.as_str(), value.as_str());
            }

            // (错误, 服务端建议的等待时长)
            let (err, server_wait) = match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp.json::<Value>().await.map_err(|e| {
                            FetchError::rejected(format!("响应 JSON 解析失败: {}", e))
                        });
                    }
                    match status.as_u16() {
                        429 => {
                            let wait = resp
                                .headers()
                                .get("Retry-After")
                                .and_then(|h| h.to_str().ok())
                                .and_then(|s| s.parse::<u64>().ok())
                                .map(Duration::from_secs);
                            (
                                FetchError::rate_limited(format!(
                                    "触发上游频率限制 (429) [{}]",
                                    url
                                )),
                                wait,
                            )
                        }
                        s if (500..=599).contains(&s) => (
                            FetchError::transient(format!("上游服务器错误 ({}) [{}]", s, url)),
                            None,
                        ),
                        s => {
                            let text = resp.text().await.unwrap_or_default();
                            return Err(FetchError::rejected(format!(
                                "上游拒绝 ({}): {}",
                                s, text
                            )));
                        }
                    }
                }
                Err(e) => (
                    FetchError::transient(format!("网络请求失败: {}", e)),
                    None,
                ),
            };

            if attempt >= self.max_retries {
                warn!("{} get_json(...) [max {} tries ran out] {}", self, self.max_retries + 1, url);
                return Err(err.exhausted());
            }

            let delay = server_wait.unwrap_or_else(|| self.backoff_delay(attempt));
            warn!(
                "{} 请求失败，{}ms 后重试 ({}/{}): {}",
                self,
                delay.as_millis(),
                attempt + 1,
                self.max_retries,
                err.message
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl Default for RetrySession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RetrySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<RetrySession [retries={}]>", self.max_retries)
    }
}

impl std::fmt::Debug for RetrySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<RetrySession [retries={}]>", self.max_retries)
    }
}
