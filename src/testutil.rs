//! 测试专用的迷你 HTTP 桩服务

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub struct StubServer {
    pub base: String,
    pub hits: Arc<AtomicUsize>,
    pub max_inflight: Arc<AtomicUsize>,
}

/// 按请求行子串路由的 HTTP 桩服务，命中第一条匹配的路由。
/// body 中的 {base} 占位符会替换为服务自身地址，没有路由命中时返回 404。
pub async fn spawn_routes(routes: Vec<(String, u16, String)>, delay: Duration) -> StubServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let hits = Arc::new(AtomicUsize::new(0));
    let max_inflight = Arc::new(AtomicUsize::new(0));

    let routes: Vec<(String, u16, String)> = routes
        .into_iter()
        .map(|(needle, status, body)| (needle, status, body.replace("{base}", &base)))
        .collect();

    let hits_bg = hits.clone();
    let max_bg = max_inflight.clone();
    let inflight = Arc::new(AtomicUsize::new(0));

    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                break;
            };
            hits_bg.fetch_add(1, Ordering::SeqCst);
            let current = inflight.fetch_add(1, Ordering::SeqCst) + 1;
            max_bg.fetch_max(current, Ordering::SeqCst);

            let routes = routes.clone();
            let inflight = inflight.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let mut read = 0usize;
                while read < buf.len() {
                    match sock.read(&mut buf[read..]).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            read += n;
                            if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                    }
                }
                let request_line = String::from_utf8_lossy(&buf[..read])
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .to_string();

                let (status, body) = routes
                    .iter()
                    .find(|(needle, _, _)| request_line.contains(needle.as_str()))
                    .map(|(_, status, body)| (*status, body.clone()))
                    .unwrap_or((404, r#"{"detail": "no route"}"#.to_string()));

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                // 应答写出前先出账，客户端看到响应时计数已经回落
                inflight.fetch_sub(1, Ordering::SeqCst);

                let resp = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            });
        }
    });

    StubServer {
        base,
        hits,
        max_inflight,
    }
}
