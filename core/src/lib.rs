//! Pluggable request execution through an HTTP proxy.
//!
//! # Overview
//! A `RequestExecutor` performs one HTTP exchange at a time, either blocking
//! the caller (`execute_once`) or through a future (`execute_once_async`).
//! `ProxyRequestExecutor` is the provided strategy: it addresses requests to
//! a base URL and sends them through a fixed proxy, delegating the network
//! work to a `TransferEngine`.
//!
//! # Design
//! - Executors are trait objects; callers depend on `dyn RequestExecutor`.
//! - Engines are blocking. The async path offloads them onto the tokio
//!   blocking pool through `AsyncExecutionAdapter`, so runtime workers never
//!   wait on the network.
//! - Connection handles are part of the contract but `ProxyRequestExecutor`
//!   does not reuse connections: it hands out `StubConnectionHandle`s.
//! - Requests are borrowed and never mutated, so they can be replayed.

pub mod adapter;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod executor;
pub mod http;
pub mod proxy;

pub use adapter::{AsyncExecutionAdapter, BlockingTransfer, TransferState};
pub use config::{ExecutorConfig, TimeoutConfig};
pub use connection::{ConnectionHandle, StubConnectionHandle};
pub use engine::{RawResponse, TransferEngine, TransferRequest, UreqEngine};
pub use error::{ConfigError, ErrorKind, ExecuteError, TransferError};
pub use executor::RequestExecutor;
pub use http::{Body, BodyContent, Headers, HttpMethod, HttpRequest, HttpResponse, ParseMethodError};
pub use proxy::ProxyRequestExecutor;
