//! A single client connection.
//!
//! `Connection` owns the state, the queue, the writer, the manager, the task
//! queue and the event sink. Every inbound trigger mutates state, runs the
//! dispatch loop to its fixed point, then drains deferred tasks before
//! returning. Methods take `&mut self`, so the loop can never re-enter itself.

use crate::dispatch::dispatch_loop::{self, Idle, Invocation, LoopContext};
use crate::dispatch::error::DispatchError;
use crate::dispatch::events::{ConnectionEvent, EventSink};
use crate::dispatch::manager::ConnectionManager;
use crate::dispatch::queue::RequestQueue;
use crate::dispatch::request::{Request, RequestId};
use crate::dispatch::state::{ConnectionId, ConnectionState, ConnectionStats, Origin, ShutdownPhase};
use crate::dispatch::tasks::{Task, TaskQueue};
use crate::dispatch::writer::OutgoingWriter;
use crate::observability::metrics;

pub struct Connection<M: ConnectionManager, S: EventSink> {
    state: ConnectionState,
    queue: RequestQueue,
    writer: Option<M::Writer>,
    manager: M,
    tasks: TaskQueue,
    events: S,
}

impl<M, S> Connection<M, S>
where
    M: ConnectionManager,
    S: EventSink,
{
    pub fn new(target: Origin, pipeline_limit: usize, manager: M, events: S) -> Self {
        let state = ConnectionState::new(target, pipeline_limit);
        tracing::debug!(
            connection_id = %state.id,
            target = %state.target,
            pipeline_limit = state.pipeline_limit,
            "Connection created"
        );
        Self {
            state,
            queue: RequestQueue::new(),
            writer: None,
            manager,
            tasks: TaskQueue::new(),
            events,
        }
    }

    // --- Inbound triggers ---

    /// Append a request and try to send it.
    pub fn enqueue(&mut self, request: Request) -> Result<RequestId, DispatchError> {
        if self.state.destroyed {
            return Err(DispatchError::Destroyed);
        }
        if self.state.shutdown_requested || self.state.pending_drain_callback.is_some() {
            return Err(DispatchError::ShuttingDown);
        }

        let id = request.id();
        tracing::trace!(
            connection_id = %self.state.id,
            request_id = %id,
            servername = ?request.servername(),
            "Request enqueued"
        );
        self.queue.push(request);
        self.dispatch(Invocation::Caller);
        Ok(id)
    }

    /// The writer can take more data.
    pub fn on_writer_drain(&mut self) {
        self.dispatch(Invocation::Event);
    }

    /// The connection manager produced a writer.
    pub fn on_writer_established(&mut self, mut writer: M::Writer) {
        self.state.connecting = false;

        if self.state.destroyed {
            writer.destroy(DispatchError::Destroyed);
            return;
        }

        if self.writer.as_ref().is_some_and(|current| !current.destroyed()) {
            tracing::warn!(connection_id = %self.state.id, "Writer established twice, refusing the new one");
            writer.destroy(DispatchError::WriterSuperseded);
            return;
        }

        tracing::info!(
            connection_id = %self.state.id,
            servername = ?self.state.current_servername,
            "Writer established"
        );
        self.writer = Some(writer);
        self.events.emit(ConnectionEvent::Connected {
            servername: self.state.current_servername.clone(),
        });
        self.dispatch(Invocation::Event);
    }

    /// The connection manager gave up establishing a writer.
    ///
    /// Leading unsent requests bound to the servername that failed can never be
    /// written and are failed with `error`. Requests for other servernames stay
    /// queued and trigger a fresh attempt.
    pub fn on_establish_failed(&mut self, error: DispatchError) {
        self.state.connecting = false;
        if self.state.destroyed {
            return;
        }

        debug_assert_eq!(self.queue.running(), 0, "requests running without a writer");
        tracing::warn!(
            connection_id = %self.state.id,
            servername = ?self.state.current_servername,
            error = %error,
            "Failed to establish writer"
        );

        let https = self.state.target.is_https();
        let failed_servername = self.state.current_servername.clone();
        while let Some(next) = self.queue.next_unsent() {
            if https && next.servername() != failed_servername.as_deref() {
                break;
            }
            if let Some(request) = self.queue.remove_unsent() {
                self.fail(request.id(), &error);
            }
        }

        dispatch_loop::release_shutdown_if_drained(&mut self.state, &self.queue);
        self.dispatch(Invocation::Event);
    }

    /// The writer finished tearing down, either on request or because the socket died.
    ///
    /// Written requests without a response are lost with the socket and are
    /// failed, unless the close was the informational servername rotation.
    /// Unsent requests stay queued for the next writer. An informational close
    /// while the current writer is still live came from a refused writer and
    /// is ignored.
    pub fn on_writer_close(&mut self, reason: Option<DispatchError>) {
        if self.state.destroyed {
            self.writer = None;
            return;
        }

        let informational = reason.as_ref().is_some_and(DispatchError::is_informational);
        if informational && self.writer.as_ref().is_some_and(|current| !current.destroyed()) {
            tracing::debug!(connection_id = %self.state.id, "Ignoring close of a writer that is not current");
            return;
        }

        let had_writer = self.writer.take().is_some();
        self.state.is_handling_request = false;

        if informational {
            tracing::debug!(connection_id = %self.state.id, "Writer closed for rotation");
        } else {
            tracing::info!(
                connection_id = %self.state.id,
                reason = ?reason,
                running = self.queue.running(),
                "Writer closed"
            );
        }

        if had_writer {
            self.events.emit(ConnectionEvent::Disconnected {
                reason: reason.as_ref().map(ToString::to_string),
            });
        }

        if !informational {
            let error = reason.unwrap_or(DispatchError::SocketClosed);
            for request in self.queue.take_running() {
                self.fail(request.id(), &error);
            }
        }

        dispatch_loop::release_shutdown_if_drained(&mut self.state, &self.queue);
        self.dispatch(Invocation::Event);
    }

    /// A response has started arriving for the oldest written request.
    pub fn on_response_started(&mut self) -> Result<(), DispatchError> {
        if self.queue.running() == 0 {
            return Err(DispatchError::NoRequestInFlight);
        }
        self.state.is_handling_request = true;
        Ok(())
    }

    /// The oldest written request completed.
    pub fn on_request_settled(&mut self, id: RequestId) -> Result<(), DispatchError> {
        self.settle(id)?;
        tracing::trace!(connection_id = %self.state.id, request_id = %id, "Request settled");
        self.events.emit(ConnectionEvent::Completed { id });
        self.after_settlement();
        Ok(())
    }

    /// The oldest written request finished with an error reported by its owner.
    pub fn on_request_failed(&mut self, id: RequestId, error: DispatchError) -> Result<(), DispatchError> {
        self.settle(id)?;
        self.fail(id, &error);
        self.after_settlement();
        Ok(())
    }

    /// Stop taking new requests and run `callback` once everything queued has settled.
    pub fn request_shutdown<F>(&mut self, callback: F) -> Result<(), DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.state.destroyed {
            return Err(DispatchError::Destroyed);
        }
        if self.state.shutdown_requested || self.state.pending_drain_callback.is_some() {
            return Err(DispatchError::ShutdownAlreadyRequested);
        }

        tracing::info!(
            connection_id = %self.state.id,
            size = self.queue.len(),
            "Shutdown requested"
        );
        self.state.pending_drain_callback = Some(Box::new(callback));
        if !self.queue.is_empty() || self.state.is_handling_request {
            self.state.shutdown_requested = true;
        } else {
            // Nothing in flight; the drain notification is owed right away.
            self.state.shutdown_phase = ShutdownPhase::Finalizing;
        }
        self.dispatch(Invocation::Caller);
        Ok(())
    }

    /// Hold dispatch; queued requests wait until `unpause`.
    pub fn pause(&mut self) {
        self.state.paused = true;
    }

    pub fn unpause(&mut self) {
        if !self.state.paused {
            return;
        }
        self.state.paused = false;
        self.dispatch(Invocation::Event);
    }

    /// Tear the connection down, failing every queued request with `reason`.
    pub fn destroy(&mut self, reason: DispatchError) {
        if self.state.destroyed {
            return;
        }

        tracing::info!(
            connection_id = %self.state.id,
            reason = %reason,
            size = self.queue.len(),
            "Destroying connection"
        );
        self.state.destroyed = true;
        self.state.shutdown_requested = false;
        self.state.shutdown_phase = ShutdownPhase::None;
        self.state.is_handling_request = false;

        for request in self.queue.take_all() {
            self.fail(request.id(), &reason);
        }

        if let Some(mut writer) = self.writer.take() {
            if !writer.destroyed() {
                writer.destroy(reason.clone());
            }
        }

        self.events.emit(ConnectionEvent::Destroyed {
            reason: reason.to_string(),
        });

        if let Some(callback) = self.state.pending_drain_callback.take() {
            callback();
        }

        self.dispatch(Invocation::Event);
    }

    // --- Inspection ---

    pub fn id(&self) -> ConnectionId {
        self.state.id
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub fn active_request_count(&self) -> usize {
        self.queue.len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.destroyed
    }

    pub fn writer(&self) -> Option<&M::Writer> {
        self.writer.as_ref()
    }

    pub fn writer_mut(&mut self) -> Option<&mut M::Writer> {
        self.writer.as_mut()
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut M {
        &mut self.manager
    }

    pub fn events(&self) -> &S {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut S {
        &mut self.events
    }

    pub fn stats(&self) -> ConnectionStats {
        let pending = self.queue.pending();
        let running = self.queue.running();
        let size = self.queue.len();
        let connected = self.writer.as_ref().is_some_and(|w| !w.destroyed());
        let busy = self.state.destroyed
            || self.state.shutdown_requested
            || size >= self.state.pipeline_limit
            || pending > 0;

        ConnectionStats {
            pending,
            running,
            size,
            connected,
            busy,
        }
    }

    // --- Internals ---

    fn settle(&mut self, id: RequestId) -> Result<(), DispatchError> {
        let expected = self
            .queue
            .oldest_running()
            .map(Request::id)
            .ok_or(DispatchError::NoRequestInFlight)?;
        if expected != id {
            return Err(DispatchError::OutOfOrderSettlement { expected, actual: id });
        }
        self.queue.settle_oldest();
        self.state.is_handling_request = false;
        Ok(())
    }

    fn after_settlement(&mut self) {
        dispatch_loop::release_shutdown_if_drained(&mut self.state, &self.queue);
        self.dispatch(Invocation::Event);
    }

    fn fail(&mut self, id: RequestId, error: &DispatchError) {
        tracing::debug!(connection_id = %self.state.id, request_id = %id, error = %error, "Request failed");
        metrics::record_failed();
        self.events.emit(ConnectionEvent::failed(id, error));
    }

    fn context(&mut self) -> LoopContext<'_, M, S> {
        LoopContext {
            state: &mut self.state,
            queue: &mut self.queue,
            writer: &mut self.writer,
            manager: &mut self.manager,
            tasks: &mut self.tasks,
            events: &mut self.events,
        }
    }

    fn dispatch(&mut self, invocation: Invocation) -> Idle {
        let idle = dispatch_loop::run(self.context(), invocation);
        self.run_tasks();
        idle
    }

    /// Drain deferred continuations before control returns to the caller.
    fn run_tasks(&mut self) {
        while let Some(task) = self.tasks.next() {
            let invocation = match task {
                Task::Resume(invocation) => invocation,
                Task::FinalizeDrain => {
                    if self.state.shutdown_phase == ShutdownPhase::Draining {
                        dispatch_loop::finalize_drain(&mut self.state, &mut self.events);
                    }
                    Invocation::Event
                }
            };
            dispatch_loop::run(self.context(), invocation);
        }
    }
}

impl<M, S> std::fmt::Debug for Connection<M, S>
where
    M: ConnectionManager,
    S: EventSink,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("size", &self.queue.len())
            .field("cursor", &self.queue.cursor())
            .field("has_writer", &self.writer.is_some())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::recording::{RecordingManager, RecordingWriter};

    type TestConnection = Connection<RecordingManager, Vec<ConnectionEvent>>;

    fn connection(origin: &str, pipeline_limit: usize) -> (TestConnection, RecordingWriter) {
        let mut conn = Connection::new(
            Origin::parse(origin).unwrap(),
            pipeline_limit,
            RecordingManager::default(),
            Vec::new(),
        );
        let writer = RecordingWriter::default();
        conn.on_writer_established(writer.clone());
        (conn, writer)
    }

    #[test]
    fn enqueue_writes_immediately_when_connected() {
        let (mut conn, writer) = connection("http://localhost", 1);
        let id = conn.enqueue(Request::new("x")).unwrap();

        assert_eq!(writer.written(), vec![id]);
        assert_eq!(conn.stats().running, 1);
    }

    #[test]
    fn settlement_must_match_oldest_request() {
        let (mut conn, _writer) = connection("http://localhost", 2);
        let a = conn.enqueue(Request::new("a")).unwrap();
        let b = conn.enqueue(Request::new("b")).unwrap();

        assert_eq!(
            conn.on_request_settled(b),
            Err(DispatchError::OutOfOrderSettlement { expected: a, actual: b })
        );
        assert_eq!(conn.on_request_settled(a), Ok(()));
        assert_eq!(conn.on_request_settled(b), Ok(()));
        assert_eq!(conn.on_request_settled(b), Err(DispatchError::NoRequestInFlight));
    }

    #[test]
    fn enqueue_rejected_after_destroy() {
        let (mut conn, writer) = connection("http://localhost", 1);
        conn.destroy(DispatchError::Socket("reset".into()));

        assert!(writer.is_destroyed());
        assert_eq!(conn.enqueue(Request::new("x")), Err(DispatchError::Destroyed));
    }

    #[test]
    fn destroy_fails_queued_requests() {
        let (mut conn, _writer) = connection("http://localhost", 1);
        let a = conn.enqueue(Request::new("a")).unwrap();
        let b = conn.enqueue(Request::new("b")).unwrap();

        conn.destroy(DispatchError::Socket("reset".into()));

        assert_eq!(conn.active_request_count(), 0);
        let failed: Vec<_> = conn
            .events()
            .iter()
            .filter_map(|e| match e {
                ConnectionEvent::Failed { id, .. } => Some(*id),
                _ => None,
            })
            .collect();
        assert_eq!(failed, vec![a, b]);
    }

    #[test]
    fn writer_close_fails_running_and_keeps_pending() {
        let (mut conn, _writer) = connection("http://localhost", 1);
        let a = conn.enqueue(Request::new("a")).unwrap();
        let b = conn.enqueue(Request::new("b")).unwrap();

        conn.on_writer_close(Some(DispatchError::Socket("reset".into())));

        assert!(conn.events().contains(&ConnectionEvent::Failed {
            id: a,
            error: "socket error: reset".into(),
        }));
        assert_eq!(conn.queue().next_unsent().map(Request::id), Some(b));
        assert!(conn.state().is_connecting());
        assert_eq!(conn.manager().establish_calls().len(), 1);
    }

    #[test]
    fn second_shutdown_request_is_rejected() {
        let (mut conn, _writer) = connection("http://localhost", 1);
        conn.enqueue(Request::new("a")).unwrap();

        conn.request_shutdown(|| {}).unwrap();
        assert_eq!(conn.request_shutdown(|| {}), Err(DispatchError::ShutdownAlreadyRequested));
        assert_eq!(conn.enqueue(Request::new("b")), Err(DispatchError::ShuttingDown));
    }

    #[test]
    fn idle_shutdown_drains_after_callback() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let (mut conn, _writer) = connection("http://localhost", 1);
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let before = conn.events().len();

        conn.request_shutdown(move || flag.store(true, Ordering::SeqCst))
            .unwrap();

        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(conn.events()[before..], [ConnectionEvent::Drained]);
        assert_eq!(conn.state().shutdown_phase(), ShutdownPhase::None);
        assert!(conn.tasks.is_empty());
    }

    #[test]
    fn stale_informational_close_keeps_live_writer() {
        let (mut conn, writer) = connection("http://localhost", 1);
        let id = conn.enqueue(Request::new("a")).unwrap();

        conn.on_writer_close(Some(DispatchError::ServernameChanged));

        assert!(conn.writer().is_some());
        assert_eq!(conn.queue().running(), 1);
        assert!(!conn.events().contains(&ConnectionEvent::Disconnected {
            reason: Some("servername changed".into()),
        }));
        assert_eq!(writer.written(), vec![id]);
    }

    #[test]
    fn unpause_resumes_dispatch() {
        let (mut conn, writer) = connection("http://localhost", 1);
        conn.pause();
        let id = conn.enqueue(Request::new("a")).unwrap();
        assert!(writer.written().is_empty());

        conn.unpause();
        assert_eq!(writer.written(), vec![id]);
    }

    #[test]
    fn stats_report_busy_when_pipeline_full() {
        let (mut conn, _writer) = connection("http://localhost", 1);
        assert!(!conn.stats().busy);
        assert!(conn.stats().connected);

        conn.enqueue(Request::new("a")).unwrap();
        let stats = conn.stats();
        assert_eq!((stats.pending, stats.running, stats.size), (0, 1, 1));
        assert!(stats.busy);
    }
}
