//! Connection manager boundary.

use crate::dispatch::state::Origin;
use crate::dispatch::writer::OutgoingWriter;

/// Lazily establishes the writer for a connection.
///
/// `establish` only starts the work. The owner of the connection reports the
/// outcome with `Connection::on_writer_established` or
/// `Connection::on_establish_failed`, which re-enter the dispatch loop.
pub trait ConnectionManager {
    type Writer: OutgoingWriter;

    fn establish(&mut self, target: &Origin, servername: Option<&str>);
}
