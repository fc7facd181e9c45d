//! Outgoing writer boundary.
//!
//! The writer wraps the raw socket stream. It is owned by exactly one
//! connection at a time and only the dispatch loop replaces it.

use crate::dispatch::error::DispatchError;
use crate::dispatch::request::Request;

/// Stream abstraction the dispatch loop writes requests into.
///
/// Teardown is asynchronous: after `destroy` the writer reports `destroyed()`
/// immediately, and its owner calls `Connection::on_writer_close` once the
/// socket is actually gone.
pub trait OutgoingWriter {
    /// Re-enable reading after a pause. Must be idempotent.
    fn resume(&mut self);

    /// True when the writer cannot take `request` right now.
    /// A `drain` signal follows once it can.
    fn busy(&self, request: &Request) -> bool;

    /// Hand `request` to the socket. `false` means the request was rejected
    /// and must be dropped from the queue.
    fn write(&mut self, request: &Request) -> bool;

    /// Begin tearing the socket down with `reason`.
    fn destroy(&mut self, reason: DispatchError);

    fn destroyed(&self) -> bool;
}

impl<W: OutgoingWriter + ?Sized> OutgoingWriter for Box<W> {
    fn resume(&mut self) {
        (**self).resume()
    }

    fn busy(&self, request: &Request) -> bool {
        (**self).busy(request)
    }

    fn write(&mut self, request: &Request) -> bool {
        (**self).write(request)
    }

    fn destroy(&mut self, reason: DispatchError) {
        (**self).destroy(reason)
    }

    fn destroyed(&self) -> bool {
        (**self).destroyed()
    }
}
