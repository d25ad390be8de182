//! The request executor abstraction.
//!
//! # Design
//! Callers talk to `dyn RequestExecutor` and never to a transport directly,
//! so one strategy can be swapped for another without touching call sites.
//! Every operation has a blocking form and a future-returning form; for the
//! same inputs both must produce the same outcome.
//!
//! Connection handles are part of the contract even when an executor does
//! not reuse connections. Such an executor hands out stub handles, ignores
//! them on `execute_once*`, and treats invalidation as a no-op.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::connection::ConnectionHandle;
use crate::error::ExecuteError;
use crate::http::{HttpRequest, HttpResponse};

/// A substitutable strategy for performing HTTP exchanges.
pub trait RequestExecutor: Send + Sync {
    /// Acquire a handle for a later `execute_once*` call.
    fn get_connection(&self) -> Arc<dyn ConnectionHandle>;

    /// Same as `get_connection`, delivered through a future.
    fn get_connection_async(&self) -> BoxFuture<'static, Arc<dyn ConnectionHandle>>;

    /// Mark `connection` as unusable. Never fails; calling it twice is fine.
    fn invalidate_connection(&self, connection: &Arc<dyn ConnectionHandle>);

    /// Perform exactly one exchange, blocking the calling thread.
    fn execute_once(
        &self,
        request: &HttpRequest,
        connection: Option<&Arc<dyn ConnectionHandle>>,
    ) -> Result<HttpResponse, ExecuteError>;

    /// Perform exactly one exchange without blocking the polling thread.
    ///
    /// `request` is cloned into the returned future, which borrows nothing.
    fn execute_once_async(
        &self,
        request: &HttpRequest,
        connection: Option<Arc<dyn ConnectionHandle>>,
    ) -> BoxFuture<'static, Result<HttpResponse, ExecuteError>>;
}
