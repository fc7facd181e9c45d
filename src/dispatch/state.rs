//! Per-connection mutable state.
//!
//! # Shutdown phases
//! ```text
//! None ──shutdown requested──▶ Finalizing ──invoked from caller──▶ Draining
//!  ▲                               │                                 │
//!  └──────────finalize inline──────┘◀────────deferred task runs──────┘
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection, used as a tracing field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The immutable target of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    url: Url,
}

impl Origin {
    pub fn parse(input: &str) -> Result<Self, url::ParseError> {
        Url::parse(input).map(|url| Self { url })
    }

    /// Scheme with trailing colon, e.g. `https:`.
    pub fn protocol(&self) -> String {
        format!("{}:", self.url.scheme())
    }

    pub fn is_https(&self) -> bool {
        self.url.scheme() == "https"
    }

    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    pub fn port(&self) -> Option<u16> {
        self.url.port_or_known_default()
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl From<Url> for Origin {
    fn from(url: Url) -> Self {
        Self { url }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Progress of the drain notification owed after a shutdown request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ShutdownPhase {
    /// Nothing owed.
    #[default]
    None,
    /// Finalize has been scheduled as a deferred task.
    Draining,
    /// Finalize is owed once the shutdown request clears.
    Finalizing,
}

/// One-shot continuation run when the connection has fully drained.
pub type DrainCallback = Box<dyn FnOnce() + Send + 'static>;

/// State owned by exactly one connection.
///
/// Mutated only by the dispatch loop and the connection's trigger handlers.
pub struct ConnectionState {
    pub(crate) id: ConnectionId,
    pub(crate) target: Origin,
    pub(crate) pipeline_limit: usize,
    pub(crate) destroyed: bool,
    pub(crate) pending_drain_callback: Option<DrainCallback>,
    pub(crate) is_handling_request: bool,
    pub(crate) shutdown_requested: bool,
    pub(crate) shutdown_phase: ShutdownPhase,
    pub(crate) stall_count: usize,
    pub(crate) current_servername: Option<String>,
    pub(crate) paused: bool,
    pub(crate) connecting: bool,
}

impl ConnectionState {
    pub fn new(target: Origin, pipeline_limit: usize) -> Self {
        Self {
            id: ConnectionId::new(),
            target,
            pipeline_limit: pipeline_limit.max(1),
            destroyed: false,
            pending_drain_callback: None,
            is_handling_request: false,
            shutdown_requested: false,
            shutdown_phase: ShutdownPhase::None,
            stall_count: 0,
            current_servername: None,
            paused: false,
            connecting: false,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn target(&self) -> &Origin {
        &self.target
    }

    pub fn pipeline_limit(&self) -> usize {
        self.pipeline_limit
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn is_handling_request(&self) -> bool {
        self.is_handling_request
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    pub fn shutdown_phase(&self) -> ShutdownPhase {
        self.shutdown_phase
    }

    pub fn has_pending_drain_callback(&self) -> bool {
        self.pending_drain_callback.is_some()
    }

    /// Writer-busy cycles since the last successful write.
    pub fn stall_count(&self) -> usize {
        self.stall_count
    }

    pub fn current_servername(&self) -> Option<&str> {
        self.current_servername.as_deref()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_connecting(&self) -> bool {
        self.connecting
    }
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionState")
            .field("id", &self.id)
            .field("target", &self.target.as_str())
            .field("pipeline_limit", &self.pipeline_limit)
            .field("destroyed", &self.destroyed)
            .field("pending_drain_callback", &self.pending_drain_callback.is_some())
            .field("is_handling_request", &self.is_handling_request)
            .field("shutdown_requested", &self.shutdown_requested)
            .field("shutdown_phase", &self.shutdown_phase)
            .field("stall_count", &self.stall_count)
            .field("current_servername", &self.current_servername)
            .field("paused", &self.paused)
            .field("connecting", &self.connecting)
            .finish()
    }
}

/// Point-in-time counters for the pool layer and admin output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    /// Requests not yet written.
    pub pending: usize,
    /// Requests written and awaiting a response.
    pub running: usize,
    /// All requests owned by the connection.
    pub size: usize,
    pub connected: bool,
    /// No further request could be written right now.
    pub busy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn origin_protocol_includes_colon() {
        let origin = Origin::parse("https://example.com").unwrap();
        assert_eq!(origin.protocol(), "https:");
        assert!(origin.is_https());
        assert_eq!(origin.port(), Some(443));

        let plain = Origin::parse("http://127.0.0.1:8080").unwrap();
        assert!(!plain.is_https());
        assert_eq!(plain.host(), Some("127.0.0.1"));
    }

    #[test]
    fn pipeline_limit_never_below_one() {
        let origin = Origin::parse("http://localhost").unwrap();
        assert_eq!(ConnectionState::new(origin, 0).pipeline_limit(), 1);
    }
}
