//! In-flight request tracking for graceful drain.
//!
//! # Responsibilities
//! - Count requests currently being served
//! - Report what a drain is still waiting for
//! - Give each request a short ID for tracing

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of [`InFlightId`]s.
static REQUEST_SEQ: AtomicU64 = AtomicU64::new(1);

/// Identifier of one tracked request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InFlightId(u64);

impl InFlightId {
    fn next() -> Self {
        Self(REQUEST_SEQ.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for InFlightId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Counts in-flight requests; clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    active: Arc<AtomicU64>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new request. The returned guard decrements on drop.
    pub fn track(&self) -> InFlightGuard {
        let count = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::gauge!("dragonfly_in_flight_requests").set(count as f64);
        InFlightGuard {
            active: Arc::clone(&self.active),
            id: InFlightId::next(),
        }
    }

    /// Number of requests currently being served.
    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }
}

/// Held for the lifetime of one request.
#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<AtomicU64>,
    id: InFlightId,
}

impl InFlightGuard {
    pub fn id(&self) -> InFlightId {
        self.id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let remaining = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::gauge!("dragonfly_in_flight_requests").set(remaining as f64);
        tracing::trace!(request = %self.id, "Request finished");
    }
}
