//! Notifications emitted by a connection.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::dispatch::error::DispatchError;
use crate::dispatch::request::RequestId;

/// Why a request left the queue without being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    Aborted,
    Rejected,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Aborted => "aborted",
            DropReason::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConnectionEvent {
    Connecting {
        servername: Option<String>,
    },
    Connected {
        servername: Option<String>,
    },
    Disconnected {
        reason: Option<String>,
    },
    ServernameChanged {
        from: Option<String>,
        to: Option<String>,
    },
    Written {
        id: RequestId,
    },
    Dropped {
        id: RequestId,
        reason: DropReason,
    },
    Completed {
        id: RequestId,
    },
    Failed {
        id: RequestId,
        error: String,
    },
    /// Backpressure has cleared after a shutdown request settled.
    Drained,
    Destroyed {
        reason: String,
    },
}

impl ConnectionEvent {
    pub(crate) fn failed(id: RequestId, error: &DispatchError) -> Self {
        ConnectionEvent::Failed {
            id,
            error: error.to_string(),
        }
    }
}

/// Receiver of connection notifications.
pub trait EventSink {
    fn emit(&mut self, event: ConnectionEvent);
}

impl EventSink for Vec<ConnectionEvent> {
    fn emit(&mut self, event: ConnectionEvent) {
        self.push(event);
    }
}

impl EventSink for mpsc::UnboundedSender<ConnectionEvent> {
    fn emit(&mut self, event: ConnectionEvent) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.send(event);
    }
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: ConnectionEvent) {}
}
