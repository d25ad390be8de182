//! Running blocking transfers from async code.
//!
//! # Design
//! Transfer engines block the calling thread, so the async path never calls
//! them from a runtime worker. `AsyncExecutionAdapter::run` wraps the call in
//! a `BlockingTransfer` future that, on first poll, moves the work onto the
//! tokio blocking pool and then waits on its `JoinHandle`. Scheduler workers
//! stay free to drive other tasks for the whole network wait.
//!
//! Dropping a `BlockingTransfer` aborts its join handle. Work that has
//! already started on a pool thread runs to completion (bounded by the
//! engine's timeouts) and its result is discarded.

use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::TransferError;

type Work<T> = Box<dyn FnOnce() -> Result<T, TransferError> + Send>;

/// Offloads blocking work onto a tokio blocking pool.
#[derive(Debug, Clone, Default)]
pub struct AsyncExecutionAdapter {
    runtime: Option<Handle>,
}

impl AsyncExecutionAdapter {
    /// Uses whichever runtime polls the returned futures.
    pub fn new() -> Self {
        Self { runtime: None }
    }

    /// Always spawns onto `runtime`, even when polled from elsewhere.
    pub fn with_runtime(runtime: Handle) -> Self {
        Self { runtime: Some(runtime) }
    }

    pub fn run<T, F>(&self, work: F) -> BlockingTransfer<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, TransferError> + Send + 'static,
    {
        BlockingTransfer {
            state: State::Created(Box::new(work)),
            runtime: self.runtime.clone(),
        }
    }
}

/// Lifecycle of a `BlockingTransfer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Not yet polled; nothing has been spawned.
    Created,
    /// Work is on the blocking pool and the future is waiting for it.
    Suspended,
    /// The outcome has been returned.
    Completed,
}

enum State<T> {
    Created(Work<T>),
    Suspended(JoinHandle<Result<T, TransferError>>),
    Completed,
}

/// Future returned by `AsyncExecutionAdapter::run`.
#[must_use = "futures do nothing unless polled"]
pub struct BlockingTransfer<T> {
    state: State<T>,
    runtime: Option<Handle>,
}

impl<T> BlockingTransfer<T> {
    pub fn state(&self) -> TransferState {
        match self.state {
            State::Created(_) => TransferState::Created,
            State::Suspended(_) => TransferState::Suspended,
            State::Completed => TransferState::Completed,
        }
    }
}

impl<T: Send + 'static> Future for BlockingTransfer<T> {
    type Output = Result<T, TransferError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        loop {
            match mem::replace(&mut this.state, State::Completed) {
                State::Created(work) => {
                    let runtime = match this.runtime.clone().or_else(|| Handle::try_current().ok()) {
                        Some(runtime) => runtime,
                        None => {
                            return Poll::Ready(Err(TransferError::Runtime(
                                "no tokio runtime available to run the transfer".to_string(),
                            )))
                        }
                    };
                    tracing::trace!("offloading transfer to blocking pool");
                    this.state = State::Suspended(runtime.spawn_blocking(work));
                }
                State::Suspended(mut join) => match Pin::new(&mut join).poll(cx) {
                    Poll::Pending => {
                        this.state = State::Suspended(join);
                        return Poll::Pending;
                    }
                    Poll::Ready(Ok(outcome)) => return Poll::Ready(outcome),
                    Poll::Ready(Err(join_err)) => {
                        let reason = if join_err.is_cancelled() {
                            "blocking task was cancelled"
                        } else {
                            "blocking task panicked"
                        };
                        return Poll::Ready(Err(TransferError::Runtime(reason.to_string())));
                    }
                },
                State::Completed => panic!("BlockingTransfer polled after completion"),
            }
        }
    }
}

impl<T> Drop for BlockingTransfer<T> {
    fn drop(&mut self) {
        if let State::Suspended(join) = &self.state {
            join.abort();
        }
    }
}

impl<T> fmt::Debug for BlockingTransfer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingTransfer").field("state", &self.state()).finish()
    }
}
