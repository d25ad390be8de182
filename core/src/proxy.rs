//! Executor that sends every request through a fixed proxy.
//!
//! # Design
//! `ProxyRequestExecutor` holds only its validated configuration and a
//! shared `TransferEngine`, so one instance can serve any number of threads
//! and tasks at once. Each call builds a `TransferRequest` whose target is
//! `base_url` joined with the request path and whose connection target is
//! `proxy_url`. The blocking and async paths share the same preparation and
//! decoding code; they differ only in where the engine call runs.
//!
//! Connection reuse is not implemented. `get_connection*` return fresh
//! `StubConnectionHandle`s, `execute_once*` ignore the handle they are given,
//! and `invalidate_connection` does nothing.

use std::fmt;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use crate::adapter::AsyncExecutionAdapter;
use crate::config::ExecutorConfig;
use crate::connection::{ConnectionHandle, StubConnectionHandle};
use crate::engine::{RawResponse, TransferEngine, TransferRequest, UreqEngine};
use crate::error::{ConfigError, ExecuteError, TransferError};
use crate::executor::RequestExecutor;
use crate::http::{Headers, HttpMethod, HttpRequest, HttpResponse};

/// Request executor routing all traffic through `proxy_url`.
pub struct ProxyRequestExecutor {
    base_url: String,
    proxy_url: String,
    verbose: bool,
    engine: Arc<dyn TransferEngine>,
    adapter: AsyncExecutionAdapter,
}

impl ProxyRequestExecutor {
    /// Create an executor using the default `ureq` engine.
    ///
    /// `base_url` is the origin requests are addressed to, e.g.
    /// `https://api.example.org/`; `proxy_url` the proxy they are sent through, e.g.
    /// `http://127.0.0.1:8080`. With `verbose` set every exchange is logged
    /// at `INFO`.
    pub fn new(base_url: &str, proxy_url: &str, verbose: bool) -> Result<Self, ConfigError> {
        Self::from_config(ExecutorConfig::new(base_url, proxy_url).verbose(verbose))
    }

    /// `new`, wrapped in an `Arc` for sharing between callers.
    pub fn shared(base_url: &str, proxy_url: &str, verbose: bool) -> Result<Arc<Self>, ConfigError> {
        Self::new(base_url, proxy_url, verbose).map(Arc::new)
    }

    pub fn from_config(config: ExecutorConfig) -> Result<Self, ConfigError> {
        let engine = UreqEngine::from_config(&config);
        Self::with_engine(config, engine)
    }

    /// Create an executor that performs transfers with `engine`.
    pub fn with_engine(config: ExecutorConfig, engine: impl TransferEngine) -> Result<Self, ConfigError> {
        config.validate()?;
        debug!(
            base_url = %config.base_url,
            proxy_url = %config.proxy_url,
            verbose = config.verbose,
            "proxy request executor configured"
        );
        Ok(Self {
            base_url: config.base_url,
            proxy_url: config.proxy_url,
            verbose: config.verbose,
            engine: Arc::new(engine),
            adapter: AsyncExecutionAdapter::new(),
        })
    }

    /// Run async transfers on `runtime`'s blocking pool regardless of which
    /// executor polls them.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.adapter = AsyncExecutionAdapter::with_runtime(runtime);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn proxy_url(&self) -> &str {
        &self.proxy_url
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Absolute URL for `path` under the base URL.
    pub fn target_url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    fn prepare(&self, request: &HttpRequest) -> (Exchange, TransferRequest) {
        let transfer = TransferRequest {
            method: request.method,
            target_url: self.target_url(&request.path),
            proxy_url: self.proxy_url.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
        };
        let exchange = Exchange {
            method: transfer.method,
            target: transfer.target_url.clone(),
            proxy: transfer.proxy_url.clone(),
            verbose: self.verbose,
        };
        exchange.log_start(&transfer.headers);
        (exchange, transfer)
    }
}

impl fmt::Debug for ProxyRequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyRequestExecutor")
            .field("base_url", &self.base_url)
            .field("proxy_url", &self.proxy_url)
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

impl RequestExecutor for ProxyRequestExecutor {
    fn get_connection(&self) -> Arc<dyn ConnectionHandle> {
        Arc::new(StubConnectionHandle::new())
    }

    fn get_connection_async(&self) -> BoxFuture<'static, Arc<dyn ConnectionHandle>> {
        Box::pin(future::ready(self.get_connection()))
    }

    fn invalidate_connection(&self, connection: &Arc<dyn ConnectionHandle>) {
        trace!(connection = %connection.id(), "invalidate ignored, connection reuse not implemented");
    }

    fn execute_once(
        &self,
        request: &HttpRequest,
        connection: Option<&Arc<dyn ConnectionHandle>>,
    ) -> Result<HttpResponse, ExecuteError> {
        if let Some(connection) = connection {
            trace!(connection = %connection.id(), "connection handle ignored");
        }
        let (exchange, transfer) = self.prepare(request);
        let outcome = self.engine.perform(&transfer);
        exchange.finish(outcome)
    }

    fn execute_once_async(
        &self,
        request: &HttpRequest,
        connection: Option<Arc<dyn ConnectionHandle>>,
    ) -> BoxFuture<'static, Result<HttpResponse, ExecuteError>> {
        if let Some(connection) = &connection {
            trace!(connection = %connection.id(), "connection handle ignored");
        }
        let (exchange, transfer) = self.prepare(request);
        let engine = Arc::clone(&self.engine);
        let transfer = self.adapter.run(move || engine.perform(&transfer));
        Box::pin(async move {
            let outcome = transfer.await;
            exchange.finish(outcome)
        })
    }
}

/// Per-call context shared by the blocking and async paths.
struct Exchange {
    method: HttpMethod,
    target: String,
    proxy: String,
    verbose: bool,
}

impl Exchange {
    fn log_start(&self, headers: &Headers) {
        if self.verbose {
            info!(method = %self.method, url = %self.target, proxy = %self.proxy, "sending request");
            for (name, value) in headers.iter() {
                info!(target: "executor_core::wire", "> {name}: {}", loggable(name, value));
            }
        } else {
            debug!(method = %self.method, url = %self.target, proxy = %self.proxy, "sending request");
        }
    }

    fn finish(self, outcome: Result<RawResponse, TransferError>) -> Result<HttpResponse, ExecuteError> {
        match outcome.and_then(decode_response) {
            Ok(response) => {
                if self.verbose {
                    info!(
                        method = %self.method,
                        url = %self.target,
                        status = response.status,
                        body_len = response.body.len(),
                        "received response"
                    );
                    for (name, value) in response.headers.iter() {
                        info!(target: "executor_core::wire", "< {name}: {}", loggable(name, value));
                    }
                } else {
                    debug!(method = %self.method, url = %self.target, status = response.status, "received response");
                }
                Ok(response)
            }
            Err(source) => {
                if self.verbose {
                    warn!(method = %self.method, url = %self.target, proxy = %self.proxy, error = %source, "request failed");
                } else {
                    debug!(method = %self.method, url = %self.target, proxy = %self.proxy, error = %source, "request failed");
                }
                Err(ExecuteError::new(self.method, self.target, self.proxy, source))
            }
        }
    }
}

const REDACTED_HEADERS: &[&str] = &["authorization", "proxy-authorization", "cookie", "set-cookie"];

/// Header value as it may appear in logs. Credentials are masked.
fn loggable<'a>(name: &str, value: &'a str) -> &'a str {
    if REDACTED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) {
        "<redacted>"
    } else {
        value
    }
}

/// Turn raw engine output into an `HttpResponse`.
fn decode_response(raw: RawResponse) -> Result<HttpResponse, TransferError> {
    if !(100..=999).contains(&raw.status) {
        return Err(TransferError::Protocol(format!("invalid status code {}", raw.status)));
    }
    let mut headers = Headers::new();
    for (name, value) in raw.headers {
        if name.is_empty() {
            return Err(TransferError::Protocol("empty header name".to_string()));
        }
        let value = String::from_utf8(value)
            .map_err(|_| TransferError::Protocol(format!("header {name} is not valid UTF-8")))?;
        if value.chars().any(|c| c.is_control() && c != '\t') {
            return Err(TransferError::Protocol(format!("header {name} contains control characters")));
        }
        headers.append(name, value);
    }
    Ok(HttpResponse {
        status: raw.status,
        reason: raw.reason.unwrap_or_default(),
        headers,
        body: raw.body,
    })
}
