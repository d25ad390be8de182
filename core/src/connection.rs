//! Connection handles passed between `get_connection` and `execute_once*`.
//!
//! # Design
//! A handle is an opaque token. Executors that pool connections hand out
//! their own handle type and recover it through `as_any`; executors that do
//! not pool hand out `StubConnectionHandle`, which carries nothing but an id
//! for log correlation and is always safe to drop or invalidate.

use std::any::Any;
use std::fmt;

use uuid::Uuid;

/// Token for a (possibly pretend) reusable connection.
pub trait ConnectionHandle: fmt::Debug + Send + Sync + 'static {
    /// Identity of this handle, stable for its lifetime.
    fn id(&self) -> Uuid;

    /// Lets an executor recognise handles of its own concrete type.
    fn as_any(&self) -> &dyn Any;
}

/// Handle for executors without connection reuse.
///
/// Holds no socket or pool slot, so any number of them may be in flight at
/// once and invalidating one has no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubConnectionHandle {
    id: Uuid,
}

impl StubConnectionHandle {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }
}

impl Default for StubConnectionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionHandle for StubConnectionHandle {
    fn id(&self) -> Uuid {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
