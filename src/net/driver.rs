//! Tokio task that owns one connection.
//!
//! # Responsibilities
//! - Own the `Connection` exclusively for its whole life
//! - Apply triggers in arrival order, one at a time
//! - Forward connection events to an unbounded channel
//! - Exit once the connection is destroyed

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ConnectionConfig;
use crate::dispatch::{Connection, ConnectionEvent, ConnectionManager, Origin};
use crate::net::handle::{ConnectionHandle, Trigger};

type Events = mpsc::UnboundedSender<ConnectionEvent>;

/// Everything returned when a driver is spawned.
pub struct Spawned<W> {
    pub handle: ConnectionHandle<W>,
    pub events: mpsc::UnboundedReceiver<ConnectionEvent>,
    pub task: JoinHandle<()>,
}

/// Spawn a driver for a new connection to `target`.
///
/// `make_manager` receives a handle so the manager can report establishment
/// back to the connection it serves.
pub fn spawn<M, F>(target: Origin, pipeline_limit: usize, make_manager: F) -> Spawned<M::Writer>
where
    M: ConnectionManager + Send + 'static,
    M::Writer: Send + 'static,
    F: FnOnce(ConnectionHandle<M::Writer>) -> M,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let handle = ConnectionHandle::new(tx);

    let manager = make_manager(handle.clone());
    let connection = Connection::new(target, pipeline_limit, manager, events_tx);
    let task = tokio::spawn(drive(connection, rx));

    Spawned {
        handle,
        events: events_rx,
        task,
    }
}

/// Spawn a driver using a validated connection config.
pub fn spawn_from_config<M, F>(
    config: &ConnectionConfig,
    make_manager: F,
) -> Result<Spawned<M::Writer>, url::ParseError>
where
    M: ConnectionManager + Send + 'static,
    M::Writer: Send + 'static,
    F: FnOnce(ConnectionHandle<M::Writer>) -> M,
{
    let target = config.origin()?;
    Ok(spawn(target, config.pipelining, make_manager))
}

async fn drive<M>(mut connection: Connection<M, Events>, mut rx: mpsc::UnboundedReceiver<Trigger<M::Writer>>)
where
    M: ConnectionManager,
{
    let connection_id = connection.id();
    tracing::debug!(connection_id = %connection_id, "Connection driver started");

    while let Some(trigger) = rx.recv().await {
        tracing::trace!(connection_id = %connection_id, ?trigger, "Applying trigger");
        apply(&mut connection, trigger);

        if connection.is_destroyed() {
            break;
        }
    }

    tracing::debug!(connection_id = %connection_id, "Connection driver stopped");
}

fn apply<M>(connection: &mut Connection<M, Events>, trigger: Trigger<M::Writer>)
where
    M: ConnectionManager,
{
    let connection_id = connection.id();
    let outcome = match trigger {
        Trigger::Enqueue { request, reply } => {
            let _ = reply.send(connection.enqueue(request));
            Ok(())
        }
        Trigger::WriterDrain => {
            connection.on_writer_drain();
            Ok(())
        }
        Trigger::WriterClose(reason) => {
            connection.on_writer_close(reason);
            Ok(())
        }
        Trigger::Established(writer) => {
            connection.on_writer_established(writer);
            Ok(())
        }
        Trigger::EstablishFailed(error) => {
            connection.on_establish_failed(error);
            Ok(())
        }
        Trigger::ResponseStarted => connection.on_response_started(),
        Trigger::Settled(id) => connection.on_request_settled(id),
        Trigger::Failed(id, error) => connection.on_request_failed(id, error),
        Trigger::Shutdown { done, reply } => {
            let result = connection.request_shutdown(move || {
                let _ = done.send(());
            });
            let _ = reply.send(result);
            Ok(())
        }
        Trigger::Pause => {
            connection.pause();
            Ok(())
        }
        Trigger::Unpause => {
            connection.unpause();
            Ok(())
        }
        Trigger::Destroy(reason) => {
            connection.destroy(reason);
            Ok(())
        }
        Trigger::Stats(reply) => {
            let _ = reply.send(connection.stats());
            Ok(())
        }
    };

    if let Err(error) = outcome {
        tracing::warn!(connection_id = %connection_id, error = %error, "Trigger rejected");
    }
}
