//! Simulated writer and manager running on tokio.
//!
//! The writer hands requests to a per-socket server task that answers them in
//! order after a configurable latency. Establishment sleeps, then reports back
//! through the connection handle. Nothing touches the network.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::SimulationConfig;
use crate::dispatch::{ConnectionManager, DispatchError, Origin, OutgoingWriter, Request, RequestId};
use crate::net::ConnectionHandle;
use crate::sim::latency::jittered;

pub struct SimWriter {
    handle: ConnectionHandle<SimWriter>,
    requests: Option<mpsc::UnboundedSender<(RequestId, usize)>>,
    unflushed: Arc<AtomicUsize>,
    need_drain: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    high_water_bytes: usize,
    resumes: usize,
}

impl SimWriter {
    /// Create a writer and spawn its server task. Must run inside a tokio runtime.
    pub fn start(handle: ConnectionHandle<SimWriter>, settings: &SimulationConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let unflushed = Arc::new(AtomicUsize::new(0));
        let need_drain = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(serve(
            handle.clone(),
            rx,
            unflushed.clone(),
            need_drain.clone(),
            closed.clone(),
            settings.clone(),
        ));

        Self {
            handle,
            requests: Some(tx),
            unflushed,
            need_drain,
            closed,
            high_water_bytes: settings.high_water_bytes,
            resumes: 0,
        }
    }

    pub fn resumes(&self) -> usize {
        self.resumes
    }
}

impl std::fmt::Debug for SimWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimWriter")
            .field("unflushed", &self.unflushed.load(Ordering::Relaxed))
            .field("destroyed", &self.destroyed())
            .finish()
    }
}

impl OutgoingWriter for SimWriter {
    fn resume(&mut self) {
        self.resumes += 1;
    }

    fn busy(&self, request: &Request) -> bool {
        let unflushed = self.unflushed.load(Ordering::Acquire);
        let busy = unflushed > 0 && unflushed + request.payload().len() > self.high_water_bytes;
        if busy {
            self.need_drain.store(true, Ordering::Release);
        }
        busy
    }

    fn write(&mut self, request: &Request) -> bool {
        let Some(requests) = self.requests.as_ref() else {
            return false;
        };

        let len = request.payload().len();
        self.unflushed.fetch_add(len, Ordering::AcqRel);
        if requests.send((request.id(), len)).is_err() {
            self.unflushed.fetch_sub(len, Ordering::AcqRel);
            return false;
        }
        true
    }

    fn destroy(&mut self, reason: DispatchError) {
        if self.requests.take().is_none() {
            return;
        }
        self.closed.store(true, Ordering::Release);
        // The driver may already be gone when the whole connection is torn down.
        let _ = self.handle.writer_closed(Some(reason));
    }

    fn destroyed(&self) -> bool {
        self.requests.is_none()
    }
}

/// Answer requests in the order they were written.
async fn serve(
    handle: ConnectionHandle<SimWriter>,
    mut rx: mpsc::UnboundedReceiver<(RequestId, usize)>,
    unflushed: Arc<AtomicUsize>,
    need_drain: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    settings: SimulationConfig,
) {
    while let Some((id, len)) = rx.recv().await {
        tokio::time::sleep(jittered(settings.response_latency_ms, settings.jitter_ms)).await;
        if closed.load(Ordering::Acquire) {
            break;
        }

        unflushed.fetch_sub(len, Ordering::AcqRel);
        if need_drain.swap(false, Ordering::AcqRel) && handle.writer_drain().is_err() {
            break;
        }
        if handle.response_started().is_err() || handle.settled(id).is_err() {
            break;
        }
    }
}

/// Establishes `SimWriter`s after a simulated handshake.
pub struct SimManager {
    handle: ConnectionHandle<SimWriter>,
    settings: SimulationConfig,
    attempts: usize,
}

impl SimManager {
    pub fn new(handle: ConnectionHandle<SimWriter>, settings: SimulationConfig) -> Self {
        Self {
            handle,
            settings,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

impl ConnectionManager for SimManager {
    type Writer = SimWriter;

    fn establish(&mut self, target: &Origin, servername: Option<&str>) {
        self.attempts += 1;
        let handle = self.handle.clone();
        let settings = self.settings.clone();
        let servername = servername.map(str::to_owned);
        tracing::debug!(target = %target, servername = ?servername, attempt = self.attempts, "Simulated connect");

        tokio::spawn(async move {
            tokio::time::sleep(jittered(settings.connect_latency_ms, settings.jitter_ms)).await;

            let refused = servername
                .as_ref()
                .filter(|name| settings.failing_servernames.contains(*name));
            let sent = match refused {
                Some(name) => handle.establish_failed(DispatchError::Connect(format!(
                    "handshake with {name} refused"
                ))),
                None => {
                    let writer = SimWriter::start(handle.clone(), &settings);
                    handle.established(writer)
                }
            };
            if sent.is_err() {
                tracing::debug!("Connection gone before establishment finished");
            }
        });
    }
}
