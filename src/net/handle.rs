//! Cloneable handle to a connection driven on its own task.
//!
//! Every method turns into a `Trigger` on an unbounded channel; the driver
//! applies triggers one at a time, which serializes enqueues, writer signals
//! and settlements that originate on different tasks.

use tokio::sync::{mpsc, oneshot};

use crate::dispatch::{ConnectionStats, DispatchError, Request, RequestId};

/// One inbound event for the driven connection.
pub enum Trigger<W> {
    Enqueue {
        request: Request,
        reply: oneshot::Sender<Result<RequestId, DispatchError>>,
    },
    WriterDrain,
    WriterClose(Option<DispatchError>),
    Established(W),
    EstablishFailed(DispatchError),
    ResponseStarted,
    Settled(RequestId),
    Failed(RequestId, DispatchError),
    Shutdown {
        done: oneshot::Sender<()>,
        reply: oneshot::Sender<Result<(), DispatchError>>,
    },
    Pause,
    Unpause,
    Destroy(DispatchError),
    Stats(oneshot::Sender<ConnectionStats>),
}

impl<W> std::fmt::Debug for Trigger<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Trigger::Enqueue { .. } => "Enqueue",
            Trigger::WriterDrain => "WriterDrain",
            Trigger::WriterClose(_) => "WriterClose",
            Trigger::Established(_) => "Established",
            Trigger::EstablishFailed(_) => "EstablishFailed",
            Trigger::ResponseStarted => "ResponseStarted",
            Trigger::Settled(_) => "Settled",
            Trigger::Failed(..) => "Failed",
            Trigger::Shutdown { .. } => "Shutdown",
            Trigger::Pause => "Pause",
            Trigger::Unpause => "Unpause",
            Trigger::Destroy(_) => "Destroy",
            Trigger::Stats(_) => "Stats",
        };
        f.write_str(name)
    }
}

pub struct ConnectionHandle<W> {
    tx: mpsc::UnboundedSender<Trigger<W>>,
}

impl<W> Clone for ConnectionHandle<W> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<W> std::fmt::Debug for ConnectionHandle<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<W> ConnectionHandle<W> {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Trigger<W>>) -> Self {
        Self { tx }
    }

    fn send(&self, trigger: Trigger<W>) -> Result<(), DispatchError> {
        self.tx.send(trigger).map_err(|_| DispatchError::DriverGone)
    }

    /// Queue a request; resolves once the connection has accepted or refused it.
    pub async fn enqueue(&self, request: Request) -> Result<RequestId, DispatchError> {
        let (reply, rx) = oneshot::channel();
        self.send(Trigger::Enqueue { request, reply })?;
        rx.await.map_err(|_| DispatchError::DriverGone)?
    }

    pub fn writer_drain(&self) -> Result<(), DispatchError> {
        self.send(Trigger::WriterDrain)
    }

    pub fn writer_closed(&self, reason: Option<DispatchError>) -> Result<(), DispatchError> {
        self.send(Trigger::WriterClose(reason))
    }

    pub fn established(&self, writer: W) -> Result<(), DispatchError> {
        self.send(Trigger::Established(writer))
    }

    pub fn establish_failed(&self, error: DispatchError) -> Result<(), DispatchError> {
        self.send(Trigger::EstablishFailed(error))
    }

    pub fn response_started(&self) -> Result<(), DispatchError> {
        self.send(Trigger::ResponseStarted)
    }

    pub fn settled(&self, id: RequestId) -> Result<(), DispatchError> {
        self.send(Trigger::Settled(id))
    }

    pub fn failed(&self, id: RequestId, error: DispatchError) -> Result<(), DispatchError> {
        self.send(Trigger::Failed(id, error))
    }

    pub fn pause(&self) -> Result<(), DispatchError> {
        self.send(Trigger::Pause)
    }

    pub fn unpause(&self) -> Result<(), DispatchError> {
        self.send(Trigger::Unpause)
    }

    pub fn destroy(&self, reason: DispatchError) -> Result<(), DispatchError> {
        self.send(Trigger::Destroy(reason))
    }

    pub async fn stats(&self) -> Result<ConnectionStats, DispatchError> {
        let (reply, rx) = oneshot::channel();
        self.send(Trigger::Stats(reply))?;
        rx.await.map_err(|_| DispatchError::DriverGone)
    }

    /// Refuse new requests and wait until everything queued has settled.
    pub async fn shutdown(&self) -> Result<(), DispatchError> {
        let (done, done_rx) = oneshot::channel();
        let (reply, rx) = oneshot::channel();
        self.send(Trigger::Shutdown { done, reply })?;
        rx.await.map_err(|_| DispatchError::DriverGone)??;
        done_rx.await.map_err(|_| DispatchError::DriverGone)
    }

    /// Graceful shutdown followed by teardown.
    pub async fn close(&self) -> Result<(), DispatchError> {
        self.shutdown().await?;
        self.destroy(DispatchError::Destroyed)
    }
}
