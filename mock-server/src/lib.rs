//! A test origin that also answers as an HTTP forward proxy.
//!
//! Clients may reach it three ways and get the same routes each time:
//! directly (origin-form request line), as a plain proxy (absolute-form
//! request line, routed by path), or through a `CONNECT` tunnel, which is
//! accepted for any authority and then served locally.

use std::time::Duration;

use axum::{
    extract::Path,
    http::{
        header::{LOCATION, SET_COOKIE},
        HeaderMap, Method, StatusCode, Uri,
    },
    response::{AppendHeaders, IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use bytes::Bytes;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const CONNECT_PREFIX: &[u8] = b"CONNECT ";
const MAX_CONNECT_HEAD: usize = 8 * 1024;

/// What `/echo` saw of the request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Echo {
    pub method: String,
    pub uri: String,
    pub host: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

pub fn app() -> Router {
    Router::new()
        .route("/v1/status", get(status))
        .route("/echo", any(echo))
        .route("/slow/{millis}", get(slow))
        .route("/status/{code}", get(status_code))
        .route("/cookies", get(cookies))
        .route("/redirect", any(redirect))
}

/// Accept connections until the listener fails.
pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    let app = app();
    loop {
        let (stream, peer) = listener.accept().await?;
        let app = app.clone();
        tokio::spawn(async move {
            if let Err(err) = serve_connection(stream, app).await {
                tracing::debug!(%peer, error = %err, "connection ended with error");
            }
        });
    }
}

async fn serve_connection(mut stream: TcpStream, app: Router) -> Result<(), BoxError> {
    if starts_with_connect(&stream).await? {
        let authority = read_connect_head(&mut stream).await?;
        tracing::debug!(%authority, "tunnel established");
        stream.write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n").await?;
    }
    http1::Builder::new()
        .serve_connection(TokioIo::new(stream), TowerToHyperService::new(app))
        .await?;
    Ok(())
}

async fn starts_with_connect(stream: &TcpStream) -> std::io::Result<bool> {
    let mut buf = [0u8; CONNECT_PREFIX.len()];
    loop {
        let n = stream.peek(&mut buf).await?;
        if n == 0 || !CONNECT_PREFIX.starts_with(&buf[..n]) {
            return Ok(false);
        }
        if n == CONNECT_PREFIX.len() {
            return Ok(true);
        }
        tokio::task::yield_now().await;
    }
}

/// Consume the `CONNECT` request head and return the requested authority.
async fn read_connect_head(stream: &mut TcpStream) -> Result<String, BoxError> {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_CONNECT_HEAD {
            return Err("CONNECT request head too large".into());
        }
        head.push(stream.read_u8().await?);
    }
    let head = String::from_utf8_lossy(&head);
    let authority = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string();
    Ok(authority)
}

async fn status() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let headers = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    Json(Echo {
        method: method.to_string(),
        uri: uri.to_string(),
        host,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn slow(Path(millis): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(millis)).await;
    "slow"
}

async fn status_code(Path(code): Path<u16>) -> Result<StatusCode, StatusCode> {
    StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)
}

async fn cookies() -> Response {
    (
        AppendHeaders([(SET_COOKIE, "a=1"), (SET_COOKIE, "b=2")]),
        "cookies",
    )
        .into_response()
}

/// Always points elsewhere; clients that follow it land on `/v1/status`.
async fn redirect() -> Response {
    (StatusCode::FOUND, [(LOCATION, "/v1/status")], "moved").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_serializes_to_json() {
        let echo = Echo {
            method: "GET".to_string(),
            uri: "http://api.example.com/echo".to_string(),
            host: Some("api.example.com".to_string()),
            headers: vec![("accept".to_string(), "*/*".to_string())],
            body: String::new(),
        };
        let json = serde_json::to_value(&echo).unwrap();
        assert_eq!(json["method"], "GET");
        assert_eq!(json["host"], "api.example.com");
        assert_eq!(json["headers"][0][0], "accept");
        let back: Echo = serde_json::from_value(json).unwrap();
        assert_eq!(back, echo);
    }
}
