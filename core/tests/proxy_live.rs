//! Live traffic through the mock proxy.
//!
//! # Design
//! Starts the mock server on a random port in a background thread, then
//! points a `ProxyRequestExecutor` with the default `ureq` engine at it. The
//! base URL names a host that does not resolve, so any successful response
//! proves the request went through the proxy.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use executor_core::{
    ErrorKind, ExecutorConfig, HttpMethod, HttpRequest, ProxyRequestExecutor, RequestExecutor, TimeoutConfig,
    UreqEngine,
};
use mock_server::Echo;

const BASE_URL: &str = "http://api.example.invalid";

fn start_proxy() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    addr
}

fn executor(proxy: SocketAddr) -> Arc<ProxyRequestExecutor> {
    ProxyRequestExecutor::shared(BASE_URL, &format!("http://{proxy}"), false).unwrap()
}

#[test]
fn get_status_through_proxy() {
    let executor = executor(start_proxy());
    let response = executor.execute_once(&HttpRequest::get("/v1/status"), None).unwrap();
    assert_eq!(response.status, 200);
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body, serde_json::json!({ "ok": true }));
}

#[test]
fn post_forwards_headers_and_body() {
    let executor = executor(start_proxy());
    let request = HttpRequest::post("/echo", r#"{"title":"proxied"}"#)
        .header("Content-Type", "application/json")
        .header("X-Trace", "abc");

    let response = executor.execute_once(&request, None).unwrap();
    assert_eq!(response.status, 200);
    let echo: Echo = response.json().unwrap();
    assert_eq!(echo.method, "POST");
    assert!(echo.uri.ends_with("/echo"), "{}", echo.uri);
    assert_eq!(echo.host.as_deref(), Some("api.example.invalid"));
    assert!(echo.headers.contains(&("x-trace".to_string(), "abc".to_string())));
    assert_eq!(echo.body, r#"{"title":"proxied"}"#);
}

#[test]
fn streamed_body_is_sent() {
    let executor = executor(start_proxy());
    let body = executor_core::Body::from_stream(|| {
        Ok(Box::new(std::io::Cursor::new(b"streamed payload".to_vec())) as Box<dyn std::io::Read + Send>)
    });
    let request = HttpRequest::new(HttpMethod::Put, "/echo").body(body);

    for _ in 0..2 {
        let echo: Echo = executor.execute_once(&request, None).unwrap().json().unwrap();
        assert_eq!(echo.method, "PUT");
        assert_eq!(echo.body, "streamed payload");
    }
}

#[test]
fn error_statuses_are_responses() {
    let executor = executor(start_proxy());
    let response = executor.execute_once(&HttpRequest::get("/status/503"), None).unwrap();
    assert_eq!(response.status, 503);
    assert!(!response.is_success());
}

#[test]
fn duplicate_response_headers_survive() {
    let executor = executor(start_proxy());
    let response = executor.execute_once(&HttpRequest::get("/cookies"), None).unwrap();
    let cookies: Vec<&str> = response.headers.get_all("Set-Cookie").collect();
    assert_eq!(cookies, vec!["a=1", "b=2"]);
}

#[test]
fn redirects_are_returned_not_followed() {
    let executor = executor(start_proxy());
    let request = HttpRequest::post("/redirect", "payload");
    let response = executor.execute_once(&request, None).unwrap();
    assert_eq!(response.status, 302);
    assert_eq!(response.header("location"), Some("/v1/status"));
    assert_eq!(response.text(), "moved");
}

#[test]
fn body_arrives_as_sent_by_origin() {
    let executor = executor(start_proxy());
    let echo: Echo = executor.execute_once(&HttpRequest::get("/echo"), None).unwrap().json().unwrap();
    assert!(
        !echo.headers.iter().any(|(name, _)| name == "accept-encoding"),
        "engine added its own encoding: {:?}",
        echo.headers
    );
}

#[test]
fn oversized_body_is_a_protocol_error() {
    let proxy = start_proxy();
    let config = ExecutorConfig::new(BASE_URL, format!("http://{proxy}"));
    let executor = ProxyRequestExecutor::with_engine(config, UreqEngine::new(TimeoutConfig::default(), 2)).unwrap();

    let err = executor.execute_once(&HttpRequest::get("/v1/status"), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol, "unexpected error: {err}");
}

#[tokio::test]
async fn slow_backend_times_out_on_both_paths() {
    let proxy = start_proxy();
    let mut config = ExecutorConfig::new(BASE_URL, format!("http://{proxy}"));
    config.timeouts.request_secs = 1;
    let executor = Arc::new(ProxyRequestExecutor::from_config(config).unwrap());
    let request = HttpRequest::get("/slow/2000");

    let blocking_executor = executor.clone();
    let blocking_request = request.clone();
    let sync = tokio::task::spawn_blocking(move || blocking_executor.execute_once(&blocking_request, None))
        .await
        .unwrap()
        .unwrap_err();
    assert!(sync.is_timeout(), "unexpected error: {sync}");

    let started = Instant::now();
    let async_ = executor.execute_once_async(&request, None).await.unwrap_err();
    assert!(async_.is_timeout(), "unexpected error: {async_}");
    assert!(started.elapsed() < Duration::from_millis(1900));
    assert_eq!(sync.kind(), async_.kind());
}

#[test]
fn refused_proxy_is_a_connection_error() {
    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let executor = executor(closed);

    let err = executor.execute_once(&HttpRequest::get("/v1/status"), None).unwrap_err();
    assert!(err.is_connection(), "unexpected error: {err}");
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(err.proxy(), format!("http://{closed}"));
}

#[tokio::test]
async fn async_and_sync_agree_on_slow_backend() {
    let executor = executor(start_proxy());
    let request = HttpRequest::get("/slow/1000");

    let blocking_executor = executor.clone();
    let blocking_request = request.clone();
    let sync = tokio::task::spawn_blocking(move || blocking_executor.execute_once(&blocking_request, None))
        .await
        .unwrap()
        .unwrap();

    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = ticks.clone();
    let ticker = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(20)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let started = Instant::now();
    let async_ = executor.execute_once_async(&request, None).await.unwrap();
    ticker.abort();

    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert_eq!(sync.status, async_.status);
    assert_eq!(sync.body, async_.body);
    assert_eq!(async_.text(), "slow");
    assert!(ticks.load(Ordering::SeqCst) >= 10, "scheduler was starved");
}

#[test]
fn fifty_concurrent_async_calls_complete() {
    let proxy = start_proxy();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let executor = executor(proxy);

    let completed = runtime.block_on(async move {
        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let executor = executor.clone();
                tokio::spawn(async move { executor.execute_once_async(&HttpRequest::get("/slow/100"), None).await })
            })
            .collect();
        let mut completed = 0;
        for task in tasks {
            let response = task.await.unwrap().unwrap();
            assert_eq!(response.status, 200);
            completed += 1;
        }
        completed
    });
    assert_eq!(completed, 50);
}
