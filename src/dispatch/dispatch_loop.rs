//! The dispatch loop.
//!
//! Given one connection's state and queue, perform the highest-priority legal
//! action and repeat until nothing more can happen without an external event.
//! The loop never blocks: every wait is an early return, and the event that
//! ends the wait re-enters the loop.
//!
//! # Priority order (per iteration)
//! ```text
//!  1. destroyed                → return
//!  2. drain callback ready     → invoke, return
//!  3. writer present           → writer.resume()
//!  4. shutdown phase           → mark / finalize, continue
//!  5. nothing unsent           → return
//!  6. pipeline full            → return
//!  7. fetch items[cursor]
//!  8. servername differs       → rotate writer (only with nothing running)
//!  9. paused                   → return
//! 10. no writer                → establish, return
//! 11. writer tearing down      → return
//! 12. writer busy              → return
//! 13. write or drop, continue
//! ```
//!
//! # Drain notification
//! A shutdown request owes one `Drained` event. After the drain callback runs,
//! the `Resume` continuation re-enters with the same invocation: a shutdown
//! requested on an idle connection (a caller entry) finalizes through the
//! deferred `FinalizeDrain` task, while one completed by a settlement (an
//! event entry) finalizes inline.

use crate::dispatch::error::DispatchError;
use crate::dispatch::events::{ConnectionEvent, DropReason, EventSink};
use crate::dispatch::manager::ConnectionManager;
use crate::dispatch::queue::RequestQueue;
use crate::dispatch::state::{ConnectionState, ShutdownPhase};
use crate::dispatch::tasks::{Task, TaskQueue};
use crate::dispatch::writer::OutgoingWriter;
use crate::observability::metrics;

/// Where the current loop entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    /// Synchronously from a caller's stack (enqueue, shutdown request).
    /// Notifications are deferred so the caller never observes them mid-call.
    Caller,
    /// From a collaborator event or a deferred task.
    Event,
}

/// The reason the loop stopped making progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idle {
    Destroyed,
    DrainCallbackFired,
    QueueEmpty,
    PipelineFull,
    /// A servername change waits for running requests to settle.
    AwaitingSettlement,
    Paused,
    Connecting,
    WriterTearingDown,
    WriterBusy,
}

/// Mutable borrows of everything one loop entry may touch.
pub struct LoopContext<'a, M: ConnectionManager, S: EventSink> {
    pub state: &'a mut ConnectionState,
    pub queue: &'a mut RequestQueue,
    pub writer: &'a mut Option<M::Writer>,
    pub manager: &'a mut M,
    pub tasks: &'a mut TaskQueue,
    pub events: &'a mut S,
}

/// Run the loop to its fixed point.
pub fn run<M, S>(ctx: LoopContext<'_, M, S>, invocation: Invocation) -> Idle
where
    M: ConnectionManager,
    S: EventSink,
{
    let connection_id = ctx.state.id;
    let idle = step_until_idle(ctx, invocation);
    tracing::trace!(connection_id = %connection_id, ?invocation, ?idle, "Dispatch loop idle");
    idle
}

fn step_until_idle<M, S>(ctx: LoopContext<'_, M, S>, invocation: Invocation) -> Idle
where
    M: ConnectionManager,
    S: EventSink,
{
    let LoopContext {
        state,
        queue,
        writer,
        manager,
        tasks,
        events,
    } = ctx;

    loop {
        if state.destroyed {
            debug_assert_eq!(queue.len(), 0, "destroyed connection still owns requests");
            return Idle::Destroyed;
        }

        if state.pending_drain_callback.is_some() && !state.is_handling_request && queue.is_empty() {
            if let Some(callback) = state.pending_drain_callback.take() {
                tracing::debug!(connection_id = %state.id, "Connection drained, running drain callback");
                callback();
            }
            // One callback per entry; the continuation keeps this entry's invocation.
            tasks.schedule(Task::Resume(invocation));
            return Idle::DrainCallbackFired;
        }

        if let Some(writer) = writer.as_mut() {
            writer.resume();
        }

        if state.shutdown_requested {
            state.shutdown_phase = ShutdownPhase::Finalizing;
        } else if state.shutdown_phase == ShutdownPhase::Finalizing {
            match invocation {
                Invocation::Caller => {
                    state.shutdown_phase = ShutdownPhase::Draining;
                    tasks.schedule(Task::FinalizeDrain);
                }
                Invocation::Event => finalize_drain(state, events),
            }
            continue;
        }

        if queue.pending() == 0 {
            return Idle::QueueEmpty;
        }

        if queue.running() >= state.pipeline_limit.max(1) {
            return Idle::PipelineFull;
        }

        let Some(request) = queue.next_unsent() else {
            return Idle::QueueEmpty;
        };

        if state.target.is_https() && state.current_servername.as_deref() != request.servername() {
            if queue.running() > 0 {
                return Idle::AwaitingSettlement;
            }

            let to = request.servername().map(str::to_owned);
            let from = std::mem::replace(&mut state.current_servername, to.clone());
            tracing::debug!(
                connection_id = %state.id,
                from = ?from,
                to = ?to,
                "Servername changed, rotating writer"
            );
            metrics::record_servername_rotation();
            events.emit(ConnectionEvent::ServernameChanged { from, to });

            if let Some(writer) = writer.as_mut() {
                if !writer.destroyed() {
                    writer.destroy(DispatchError::ServernameChanged);
                }
            }
        }

        if state.paused {
            return Idle::Paused;
        }

        let Some(writer) = writer.as_mut() else {
            if !state.connecting {
                state.connecting = true;
                tracing::debug!(
                    connection_id = %state.id,
                    target = %state.target,
                    servername = ?state.current_servername,
                    "Establishing writer"
                );
                events.emit(ConnectionEvent::Connecting {
                    servername: state.current_servername.clone(),
                });
                manager.establish(&state.target, state.current_servername.as_deref());
            }
            return Idle::Connecting;
        };

        if writer.destroyed() {
            return Idle::WriterTearingDown;
        }

        if writer.busy(request) {
            state.stall_count += 1;
            return Idle::WriterBusy;
        }

        let id = request.id();
        let aborted = request.is_aborted();
        if !aborted && writer.write(request) {
            queue.advance();
            state.stall_count = 0;
            tracing::trace!(connection_id = %state.id, request_id = %id, running = queue.running(), "Request written");
            metrics::record_written();
            events.emit(ConnectionEvent::Written { id });
        } else {
            queue.remove_unsent();
            let reason = if aborted {
                DropReason::Aborted
            } else {
                DropReason::Rejected
            };
            tracing::debug!(connection_id = %state.id, request_id = %id, reason = reason.as_str(), "Request dropped");
            metrics::record_dropped(reason);
            events.emit(ConnectionEvent::Dropped { id, reason });
            release_shutdown_if_drained(state, queue);
        }
    }
}

/// Reset flow-control counters and emit the drain notification.
pub fn finalize_drain<S: EventSink>(state: &mut ConnectionState, events: &mut S) {
    state.shutdown_phase = ShutdownPhase::None;
    state.stall_count = 0;
    tracing::debug!(connection_id = %state.id, "Drain notification");
    metrics::record_drain();
    events.emit(ConnectionEvent::Drained);
}

/// A requested shutdown stops holding the connection once the queue is empty.
pub(crate) fn release_shutdown_if_drained(state: &mut ConnectionState, queue: &RequestQueue) {
    if state.shutdown_requested && queue.is_empty() {
        state.shutdown_requested = false;
    }
}
