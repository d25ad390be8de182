//! Transfer engines: the component that puts a request on the wire.
//!
//! # Design
//! Executors never open sockets themselves. They describe the exchange as a
//! `TransferRequest` and hand it to a `TransferEngine`, which connects to the
//! proxy, sends the request toward the target and returns the raw result.
//! Engines are blocking; the async path runs them on the blocking pool.
//!
//! `UreqEngine` is the default engine. It builds a fresh agent per exchange,
//! so no connection outlives the call that opened it. Redirects are handed
//! back to the caller as responses, and bodies are returned exactly as the
//! origin encoded them.

use std::fmt;

use bytes::Bytes;
use ureq::http;
use ureq::{Agent, AsSendBody, Proxy, SendBody};

use crate::config::{ExecutorConfig, TimeoutConfig};
use crate::error::TransferError;
use crate::http::{Body, BodyContent, Headers, HttpMethod};

/// Everything an engine needs for one exchange.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub method: HttpMethod,
    /// Absolute URL of the resource, e.g. `https://api.example.com/v1/status`.
    pub target_url: String,
    /// Proxy the engine connects to.
    pub proxy_url: String,
    pub headers: Headers,
    pub body: Option<Body>,
}

/// Undecoded engine output. Header values are raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub reason: Option<String>,
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Bytes,
}

/// Performs a single blocking request/response exchange through a proxy.
pub trait TransferEngine: Send + Sync + 'static {
    fn perform(&self, request: &TransferRequest) -> Result<RawResponse, TransferError>;
}

impl<F> TransferEngine for F
where
    F: Fn(&TransferRequest) -> Result<RawResponse, TransferError> + Send + Sync + 'static,
{
    fn perform(&self, request: &TransferRequest) -> Result<RawResponse, TransferError> {
        self(request)
    }
}

/// Engine backed by `ureq`.
#[derive(Clone)]
pub struct UreqEngine {
    timeouts: TimeoutConfig,
    max_response_bytes: u64,
}

impl UreqEngine {
    pub fn new(timeouts: TimeoutConfig, max_response_bytes: u64) -> Self {
        Self {
            timeouts,
            max_response_bytes,
        }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(config.timeouts.clone(), config.max_response_bytes)
    }

    fn agent(&self, proxy_url: &str) -> Result<Agent, TransferError> {
        let proxy = Proxy::new(proxy_url).map_err(|e| TransferError::InvalidRequest(format!("proxy {proxy_url}: {e}")))?;
        Ok(Agent::config_builder()
            .proxy(Some(proxy))
            .http_status_as_error(false)
            .max_redirects(0)
            .max_redirects_will_error(false)
            .timeout_connect(Some(self.timeouts.connect()))
            .timeout_global(Some(self.timeouts.request()))
            .build()
            .new_agent())
    }

    fn send<B: AsSendBody>(
        &self,
        agent: &Agent,
        builder: http::request::Builder,
        body: B,
    ) -> Result<RawResponse, TransferError> {
        let request = builder.body(body).map_err(|e| TransferError::InvalidRequest(e.to_string()))?;
        let mut response = agent.run(request).map_err(classify)?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
            .collect();
        let body = response
            .body_mut()
            .with_config()
            .limit(self.max_response_bytes)
            .read_to_vec()
            .map_err(classify)?;

        Ok(RawResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().map(str::to_string),
            headers,
            body: Bytes::from(body),
        })
    }
}

impl Default for UreqEngine {
    fn default() -> Self {
        Self::new(TimeoutConfig::default(), 10 * 1024 * 1024)
    }
}

impl fmt::Debug for UreqEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqEngine")
            .field("timeouts", &self.timeouts)
            .field("max_response_bytes", &self.max_response_bytes)
            .finish()
    }
}

impl TransferEngine for UreqEngine {
    fn perform(&self, request: &TransferRequest) -> Result<RawResponse, TransferError> {
        let agent = self.agent(&request.proxy_url)?;

        let mut builder = http::Request::builder()
            .method(request.method.as_str())
            .uri(request.target_url.as_str());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }

        match request.body.as_ref().map(Body::open).transpose()? {
            None => self.send(&agent, builder, ()),
            Some(BodyContent::Bytes(bytes)) => self.send(&agent, builder, &bytes[..]),
            Some(BodyContent::Stream(reader)) => self.send(&agent, builder, SendBody::from_owned_reader(reader)),
        }
    }
}

fn classify(err: ureq::Error) -> TransferError {
    match err {
        ureq::Error::Timeout(t) => TransferError::Timeout(t.to_string()),
        ureq::Error::Io(e) => TransferError::Io(e),
        ureq::Error::HostNotFound => TransferError::Connect("host not found".to_string()),
        ureq::Error::ConnectionFailed => TransferError::Connect("connection failed".to_string()),
        ureq::Error::ConnectProxyFailed(msg) => TransferError::Connect(format!("proxy CONNECT failed: {msg}")),
        ureq::Error::Protocol(e) => TransferError::Protocol(e.to_string()),
        ureq::Error::BadUri(msg) => TransferError::InvalidRequest(msg),
        ureq::Error::Http(e) => TransferError::InvalidRequest(e.to_string()),
        ureq::Error::InvalidProxyUrl => TransferError::InvalidRequest("invalid proxy url".to_string()),
        ureq::Error::BodyExceedsLimit(limit) => {
            TransferError::Protocol(format!("response body exceeds {limit} bytes"))
        }
        other => TransferError::Protocol(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn closures_are_engines() {
        let engine = |req: &TransferRequest| -> Result<RawResponse, TransferError> {
            Ok(RawResponse {
                status: 204,
                reason: None,
                headers: vec![("x-target".to_string(), req.target_url.clone().into_bytes())],
                body: Bytes::new(),
            })
        };
        let request = TransferRequest {
            method: HttpMethod::Delete,
            target_url: "http://api.example.com/items/1".to_string(),
            proxy_url: "http://127.0.0.1:8888".to_string(),
            headers: Headers::new(),
            body: None,
        };
        let raw = engine.perform(&request).unwrap();
        assert_eq!(raw.status, 204);
        assert_eq!(raw.headers[0].1, b"http://api.example.com/items/1");
    }

    #[test]
    fn io_errors_classify_by_kind() {
        let err = TransferError::from(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
        assert_eq!(err.kind(), crate::error::ErrorKind::Timeout);
        let err = classify(ureq::Error::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")));
        assert_eq!(err.kind(), crate::error::ErrorKind::Connection);
    }

    #[test]
    fn oversized_body_is_a_protocol_error() {
        let err = classify(ureq::Error::BodyExceedsLimit(2));
        assert_eq!(err.kind(), crate::error::ErrorKind::Protocol);
        assert!(err.to_string().contains("exceeds 2 bytes"), "{err}");
    }

    #[test]
    fn unrecognised_failures_are_not_connection_errors() {
        let err = classify(ureq::Error::TooManyRedirects);
        assert_eq!(err.kind(), crate::error::ErrorKind::Protocol);
    }
}
