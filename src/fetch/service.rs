use crate::cache::{Fingerprint, ResponseCache};
use crate::fetch::model::{BatchReport, FetchError, FetchOutcome, FetchRequest, Record};
use crate::session::{RosterPage, RosterSession};
use chrono::Utc;
use futures::future::join_all;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// 抓取服务
///
/// 有界并发地执行一批逻辑请求：每个请求先查缓存，未命中再走网络并回填。
/// 并发由信号量限流，尊重上游的频率限制；整组请求可以通过取消句柄
/// 在调度与重试边界尽快停下。
pub struct FetchService {
    session: Arc<RosterSession>,
    cache: Arc<ResponseCache>,
    semaphore: Arc<Semaphore>,
    cancel: Arc<AtomicBool>,
}

impl FetchService {
    pub fn new(
        session: Arc<RosterSession>,
        cache: Arc<ResponseCache>,
        concurrency: usize,
    ) -> Self {
        Self {
            session,
            cache,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 整组取消句柄。置位后未开始的请求直接失败，
    /// 在途请求在下一个重试边界退出并释放并发额度。
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// 执行单个逻辑请求：指纹 -> 查缓存 -> 命中即返回，未命中走网络并回填
    pub async fn execute(&self, request: &FetchRequest) -> FetchOutcome {
        let url = self.session.url_for(request);
        let fp = Fingerprint::from_url("GET", &url);

        if let Some(body) = self.cache.get(&fp).await {
            return FetchOutcome {
                request: request.clone(),
                result: Ok(Record {
                    body,
                    source: self.session.kind(),
                    fetched_at: Utc::now().timestamp(),
                }),
                from_cache: true,
            };
        }

        let result = match self.session.dispatch(request, &url, &self.cancel).await {
            Ok(body) => {
                self.cache.put(&fp, &body).await;
                Ok(Record {
                    body,
                    source: self.session.kind(),
                    fetched_at: Utc::now().timestamp(),
                })
            }
            Err(e) => Err(e),
        };

        FetchOutcome {
            request: request.clone(),
            result,
            from_cache: false,
        }
    }

    /// 批量并发执行。结果与提交顺序无关，单个失败不影响兄弟请求。
    pub async fn fetch_batch(&self, requests: Vec<FetchRequest>) -> BatchReport {
        let futures = requests.into_iter().map(|request| async move {
            let _permit = match self.semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    return FetchOutcome {
                        request,
                        result: Err(FetchError::cancelled("并发额度已关闭")),
                        from_cache: false,
                    };
                }
            };
            if self.cancel.load(Ordering::Relaxed) {
                return FetchOutcome {
                    request,
                    result: Err(FetchError::cancelled("批次已取消")),
                    from_cache: false,
                };
            }
            self.execute(&request).await
        });

        BatchReport {
            outcomes: join_all(futures).await,
        }
    }

    /// 跟随 next 链接抓取全部花名册页面，逐条返回原始记录
    pub async fn fetch_roster_paginated(&self) -> Result<Vec<Record>, FetchError> {
        let mut records = Vec::new();
        let mut next = Some(self.session.roster_url());
        let mut pages = 0usize;

        while let Some(url) = next {
            let outcome = self.execute(&FetchRequest::RosterPage { url }).await;
            let record = outcome.result?;
            let page = RosterPage::from_value(&record.body);
            info!("已抓取第 {} 页: {} 条记录", pages + 1, page.items.len());

            for item in page.items {
                records.push(Record {
                    body: item,
                    source: record.source,
                    fetched_at: record.fetched_at,
                });
            }

            next = page.next;
            pages += 1;
            if pages >= 200 {
                warn!("分页超过 200 页，提前终止以防 next 链接成环");
                break;
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::session::RetrySession;
    use crate::testutil::spawn_routes;
    use std::time::Duration;

    fn make_service(base_url: &str, concurrency: usize) -> (FetchService, Arc<ResponseCache>) {
        let source = ApiConfig {
            dev_base_url: base_url.to_string(),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        let session = RosterSession::with_session(source, RetrySession::with_retry(0, 1, 10));
        let cache = Arc::new(ResponseCache::new(None, Duration::from_secs(60)));
        (
            FetchService::new(Arc::new(session), cache.clone(), concurrency),
            cache,
        )
    }

    #[tokio::test]
    async fn identical_requests_hit_network_once() {
        let stub = spawn_routes(
            vec![("/roster/1/".to_string(), 200, r#"{"id": 1}"#.to_string())],
            Duration::ZERO,
        )
        .await;
        let (service, _) = make_service(&stub.base, 4);
        let request = FetchRequest::MemberDetail { id: 1 };

        let first = service.execute(&request).await;
        assert!(first.result.is_ok());
        assert!(!first.from_cache);

        let second = service.execute(&request).await;
        assert!(second.result.is_ok());
        assert!(second.from_cache);

        assert_eq!(stub.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_hit_needs_no_reachable_upstream() {
        // 端口 9 无监听，任何网络调用都会失败
        let (service, cache) = make_service("http://127.0.0.1:9", 2);
        let request = FetchRequest::MemberDetail { id: 5 };

        let url = "http://127.0.0.1:9/roster/5/";
        cache
            .put(
                &Fingerprint::from_url("GET", url),
                &serde_json::json!({"id": 5, "salary": 100}),
            )
            .await;

        let outcome = service.execute(&request).await;
        assert!(outcome.from_cache);
        assert_eq!(outcome.result.unwrap().body["id"], 5);
    }

    #[tokio::test]
    async fn batch_reports_per_request_outcomes() {
        let stub = spawn_routes(
            vec![
                ("/roster/1/".to_string(), 200, r#"{"id": 1}"#.to_string()),
                (
                    "/roster/2/".to_string(),
                    404,
                    r#"{"detail": "gone"}"#.to_string(),
                ),
            ],
            Duration::ZERO,
        )
        .await;
        let (service, _) = make_service(&stub.base, 4);

        let report = service
            .fetch_batch(vec![
                FetchRequest::MemberDetail { id: 1 },
                FetchRequest::MemberDetail { id: 2 },
            ])
            .await;

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.records().count(), 1);
        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, &FetchRequest::MemberDetail { id: 2 });
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_pool_size() {
        let stub = spawn_routes(
            vec![("/roster/".to_string(), 200, r#"{"id": 0}"#.to_string())],
            Duration::from_millis(50),
        )
        .await;
        let (service, _) = make_service(&stub.base, 2);

        let requests: Vec<FetchRequest> = (1..=6)
            .map(|id| FetchRequest::MemberDetail { id })
            .collect();
        let report = service.fetch_batch(requests).await;

        assert_eq!(report.records().count(), 6);
        assert!(
            stub.max_inflight.load(Ordering::SeqCst) <= 2,
            "同时在途请求数超出并发上限: {}",
            stub.max_inflight.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn cancelled_batch_skips_network() {
        let stub = spawn_routes(
            vec![("/roster/".to_string(), 200, r#"{"id": 0}"#.to_string())],
            Duration::ZERO,
        )
        .await;
        let (service, _) = make_service(&stub.base, 2);
        service.cancel_handle().store(true, Ordering::Relaxed);

        let report = service
            .fetch_batch(vec![
                FetchRequest::MemberDetail { id: 1 },
                FetchRequest::MemberDetail { id: 2 },
            ])
            .await;

        assert_eq!(report.records().count(), 0);
        assert_eq!(stub.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pagination_follows_next_links() {
        let stub = spawn_routes(
            vec![
                (
                    "page=2".to_string(),
                    200,
                    r#"{"results": [{"id": 2}], "next": null}"#.to_string(),
                ),
                (
                    "/roster/".to_string(),
                    200,
                    r#"{"results": [{"id": 1}], "next": "{base}/roster/?page=2"}"#.to_string(),
                ),
            ],
            Duration::ZERO,
        )
        .await;
        let (service, _) = make_service(&stub.base, 2);

        let records = service.fetch_roster_paginated().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].body["id"], 1);
        assert_eq!(records[1].body["id"], 2);
        assert_eq!(stub.hits.load(Ordering::SeqCst), 2);
    }
}
