//! Integration tests for the retrying dev proxy.
//!
//! Each test starts the proxy on an ephemeral port in front of a real
//! upstream (or a port nobody listens on) and drives it over HTTP.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use reqwest::Client;
use rift_dev_proxy::config::Config;
use rift_dev_proxy::proxy::{DevProxyServer, ProxyTable};
use rift_dev_proxy::retry::RetryPlugin;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

/// Stops the proxy when dropped.
struct RunningProxy {
    addr: SocketAddr,
    _shutdown: oneshot::Sender<()>,
}

impl RunningProxy {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn start_proxy(yaml: &str) -> RunningProxy {
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    config.validate().unwrap();

    let table: ProxyTable = ProxyTable::from_config(&config).unwrap();
    let table = RetryPlugin::new(config.retry.clone()).apply(table);
    let server = DevProxyServer::bind(&config, table).await.unwrap();
    let addr = server.local_addr();

    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(server.run_until(async {
        let _ = rx.await;
    }));

    RunningProxy {
        addr,
        _shutdown: tx,
    }
}

fn proxy_config(routes: &str) -> String {
    format!(
        r#"
listen:
  host: 127.0.0.1
  port: 0
proxy:
{routes}
"#
    )
}

/// A port that was free a moment ago and has no listener now.
fn reserve_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn client() -> Client {
    Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

async fn upstream_handler(
    mut req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.headers().contains_key(hyper::header::UPGRADE) {
        let on_upgrade = hyper::upgrade::on(&mut req);
        tokio::spawn(async move {
            if let Ok(upgraded) = on_upgrade.await {
                let mut io = TokioIo::new(upgraded);
                let mut buf = [0u8; 64];
                while let Ok(n) = io.read(&mut buf).await {
                    if n == 0 || io.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            }
        });
        let response = Response::builder()
            .status(StatusCode::SWITCHING_PROTOCOLS)
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .body(Full::new(Bytes::new()))
            .unwrap();
        return Ok(response);
    }

    let host = req
        .headers()
        .get(hyper::header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("")
        .to_string();
    let body = format!("path={} host={}", req.uri(), host);
    Ok(Response::new(Full::new(Bytes::from(body))))
}

async fn serve_upstream(listener: TcpListener) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            break;
        };
        tokio::spawn(async move {
            let _ = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service_fn(upstream_handler))
                .with_upgrades()
                .await;
        });
    }
}

async fn start_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_upstream(listener));
    addr
}

#[tokio::test]
async fn test_forwards_to_running_upstream() {
    let upstream = start_upstream().await;
    let proxy = start_proxy(&proxy_config(&format!(
        "  /api: http://{upstream}/base\n"
    )))
    .await;

    let response = client()
        .get(proxy.url("/api/users?id=7"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("path=/base/api/users?id=7"), "{body}");
    assert!(body.contains(&format!("host={upstream}")), "{body}");
}

#[tokio::test]
async fn test_unmatched_path_is_404() {
    let proxy = start_proxy(&proxy_config("  /api: http://127.0.0.1:9\n")).await;

    let response = client().get(proxy.url("/other")).send().await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_exhausted_retries_return_500_after_delay() {
    let port = reserve_port();
    let proxy = start_proxy(&proxy_config(&format!(
        r#"  /api:
    target: http://127.0.0.1:{port}
    retry:
      maxTries: 2
      delay: 300
"#
    )))
    .await;

    let start = Instant::now();
    let response = client().get(proxy.url("/api/ping")).send().await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(response.status(), 500);
    assert_eq!(response.headers()["content-type"], "text/plain");
    assert!(response.text().await.unwrap().is_empty());
    assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(3000), "{elapsed:?}");
}

#[tokio::test]
async fn test_request_succeeds_once_upstream_comes_up() {
    let port = reserve_port();
    let proxy = start_proxy(&proxy_config(&format!(
        r#"  /api:
    target: http://127.0.0.1:{port}
    retry:
      maxTries: 10
      delay: 300
"#
    )))
    .await;

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        serve_upstream(listener).await;
    });

    let start = Instant::now();
    let response = client()
        .post(proxy.url("/api/items"))
        .body("payload")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(start.elapsed() >= Duration::from_millis(300));
    assert!(response.text().await.unwrap().contains("path=/api/items"));
}

#[tokio::test]
async fn test_without_retry_fails_immediately() {
    let port = reserve_port();
    let proxy = start_proxy(&proxy_config(&format!(
        "  /api: http://127.0.0.1:{port}\n"
    )))
    .await;

    let start = Instant::now();
    let response = client().get(proxy.url("/api/ping")).send().await.unwrap();

    assert_eq!(response.status(), 500);
    assert!(start.elapsed() < Duration::from_millis(300));
}

#[tokio::test]
async fn test_default_retry_and_backoff() {
    let port = reserve_port();
    let proxy = start_proxy(&format!(
        r#"
listen:
  host: 127.0.0.1
  port: 0
retry:
  maxTries: 3
  delay: 100
  backoff: true
proxy:
  /api: http://127.0.0.1:{port}
  /direct:
    target: http://127.0.0.1:{port}
    retry: false
"#
    ))
    .await;

    let start = Instant::now();
    let response = client().get(proxy.url("/api/ping")).send().await.unwrap();
    assert_eq!(response.status(), 500);
    assert!(start.elapsed() >= Duration::from_millis(300));

    let start = Instant::now();
    let response = client().get(proxy.url("/direct/ping")).send().await.unwrap();
    assert_eq!(response.status(), 500);
    assert!(start.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn test_websocket_upgrade_is_piped() {
    let upstream = start_upstream().await;
    let proxy = start_proxy(&proxy_config(&format!(
        r#"  /socket:
    target: ws://{upstream}
    ws: true
"#
    )))
    .await;

    let mut stream = TcpStream::connect(proxy.addr).await.unwrap();
    let handshake = format!(
        "GET /socket HTTP/1.1\r\n\
         Host: {}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        proxy.addr
    );
    stream.write_all(handshake.as_bytes()).await.unwrap();

    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).await.unwrap();
        head.push(byte[0]);
    }
    let head = String::from_utf8(head).unwrap();
    assert!(head.starts_with("HTTP/1.1 101"), "{head}");

    stream.write_all(b"ping").await.unwrap();
    let mut echo = [0u8; 4];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut echo))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&echo, b"ping");
}

#[tokio::test]
async fn test_websocket_retry_exhaustion_rejects_upgrade() {
    let port = reserve_port();
    let proxy = start_proxy(&proxy_config(&format!(
        r#"  /socket:
    target: ws://127.0.0.1:{port}
    ws: true
    retry:
      maxTries: 2
      delay: 100
"#
    )))
    .await;

    let mut stream = TcpStream::connect(proxy.addr).await.unwrap();
    let handshake = format!(
        "GET /socket HTTP/1.1\r\nHost: {}\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\r\n",
        proxy.addr
    );
    stream.write_all(handshake.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .unwrap()
        .unwrap();
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 502"), "{response}");
}

#[tokio::test]
async fn test_metrics_endpoint_reports_retries() {
    let port = reserve_port();
    let proxy = start_proxy(&proxy_config(&format!(
        r#"  /flaky:
    target: http://127.0.0.1:{port}
    retry:
      maxTries: 2
      delay: 10
"#
    )))
    .await;

    let response = client().get(proxy.url("/flaky")).send().await.unwrap();
    assert_eq!(response.status(), 500);

    let metrics = client()
        .get(proxy.url("/__rift/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("rift_retries_scheduled_total"));
    assert!(metrics.contains("rift_retries_exhausted_total"));
    assert!(metrics.contains("/flaky"));
}
