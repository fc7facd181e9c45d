//! Queued request representation.
//!
//! The dispatch core treats a request as opaque except for its servername and
//! its abort flag. The payload is already serialized by the caller.

use bytes::Bytes;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Global atomic counter for request IDs.
/// Relaxed ordering is enough; only uniqueness matters.
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestId(u64);

impl RequestId {
    /// Generate a new unique request ID.
    pub fn new() -> Self {
        Self(REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Shared abort flag.
///
/// The request owner keeps a clone and may abort at any time, from any thread.
/// The flag is only consulted when the dispatch loop is about to write.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the request aborted. Calling this more than once has no further effect.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }
}

/// A request waiting in (or written from) a connection queue.
#[derive(Debug, Clone)]
pub struct Request {
    id: RequestId,
    servername: Option<String>,
    abort: AbortHandle,
    payload: Bytes,
}

impl Request {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            id: RequestId::new(),
            servername: None,
            abort: AbortHandle::new(),
            payload: payload.into(),
        }
    }

    /// Set the TLS servername this request must be sent under.
    pub fn with_servername(mut self, servername: impl Into<String>) -> Self {
        self.servername = Some(servername.into());
        self
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn servername(&self) -> Option<&str> {
        self.servername.as_deref()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// A clone of the abort flag for the request owner.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_unique() {
        let a = Request::new("GET / HTTP/1.1\r\n\r\n");
        let b = Request::new("GET / HTTP/1.1\r\n\r\n");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn abort_is_visible_through_clones() {
        let request = Request::new("").with_servername("example.com");
        let handle = request.abort_handle();
        assert!(!request.is_aborted());

        handle.abort();
        handle.abort();
        assert!(request.is_aborted());
        assert_eq!(request.servername(), Some("example.com"));
    }
}
