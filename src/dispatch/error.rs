//! Dispatch error taxonomy.

use crate::dispatch::request::RequestId;

/// Errors raised by the dispatch core and reported to request owners.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The connection has been torn down; no further requests are accepted.
    #[error("connection destroyed")]
    Destroyed,

    /// A graceful shutdown is in progress; new requests are refused.
    #[error("connection is shutting down")]
    ShuttingDown,

    /// `request_shutdown` was called twice.
    #[error("shutdown already requested")]
    ShutdownAlreadyRequested,

    /// Informational: the writer was replaced because the TLS servername changed.
    #[error("servername changed")]
    ServernameChanged,

    /// Informational: a writer arrived while the connection already had a live one.
    #[error("writer superseded")]
    WriterSuperseded,

    /// The connection manager could not establish a writer.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The socket closed while requests were in flight.
    #[error("socket closed")]
    SocketClosed,

    /// A socket-level error reported by the writer.
    #[error("socket error: {0}")]
    Socket(String),

    /// A settlement arrived while nothing was written.
    #[error("no request in flight")]
    NoRequestInFlight,

    /// Responses on HTTP/1.1 settle in request order.
    #[error("request {actual} settled out of order, expected {expected}")]
    OutOfOrderSettlement {
        expected: RequestId,
        actual: RequestId,
    },

    /// The tokio driver owning the connection has exited.
    #[error("connection driver has exited")]
    DriverGone,
}

impl DispatchError {
    /// Informational errors tear down a writer without failing requests.
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            DispatchError::ServernameChanged | DispatchError::WriterSuperseded
        )
    }
}
