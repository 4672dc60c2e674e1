//! Query identifiers and the counters that allocate them.
//!
//! The real engine owns a [`QueryIdGenerator`]. A sandbox only ever sees a
//! [`QueryIdView`] of its parent's counter and allocates from
//! [`SandboxQueryIds`], which predicts the ids the parent would hand out
//! without advancing it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifier of a registered query, e.g. `CSAS_FOO_0` or `TRANSIENT_3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(String);

impl QueryId {
    /// Wraps an id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueryId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for QueryId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A source of monotonically increasing sequence numbers.
pub trait QueryIdSource: Send + Sync + fmt::Debug {
    /// The number the next call to [`next_id`](Self::next_id) will return.
    fn peek_next(&self) -> u64;

    /// Allocates the next number.
    fn next_id(&self) -> u64;
}

/// The engine-owned counter.
#[derive(Debug, Default)]
pub struct QueryIdGenerator {
    next: AtomicU64,
}

impl QueryIdGenerator {
    /// Creates a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueryIdSource for QueryIdGenerator {
    fn peek_next(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

/// Read-only view of another counter.
#[derive(Debug, Clone)]
pub struct QueryIdView {
    source: Arc<dyn QueryIdSource>,
}

impl QueryIdView {
    /// Creates a view over `source`.
    #[must_use]
    pub fn new(source: Arc<dyn QueryIdSource>) -> Self {
        Self { source }
    }

    /// The number the viewed counter would allocate next.
    #[must_use]
    pub fn peek_next(&self) -> u64 {
        self.source.peek_next()
    }
}

/// Counter used inside a sandbox: the parent's next value plus the number
/// of ids the sandbox has allocated so far.
#[derive(Debug)]
pub struct SandboxQueryIds {
    base: QueryIdView,
    allocated: AtomicU64,
}

impl SandboxQueryIds {
    /// Creates a sandbox counter over `base`.
    #[must_use]
    pub fn new(base: QueryIdView) -> Self {
        Self {
            base,
            allocated: AtomicU64::new(0),
        }
    }
}

impl QueryIdSource for SandboxQueryIds {
    fn peek_next(&self) -> u64 {
        self.base.peek_next() + self.allocated.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> u64 {
        self.base.peek_next() + self.allocated.fetch_add(1, Ordering::SeqCst)
    }
}
