//! Synchronous collaborators that record every call.
//!
//! Clones of a `RecordingWriter` share one log, so a test can keep a clone
//! after handing the writer to a connection.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::dispatch::error::DispatchError;
use crate::dispatch::manager::ConnectionManager;
use crate::dispatch::request::{Request, RequestId};
use crate::dispatch::state::Origin;
use crate::dispatch::writer::OutgoingWriter;

#[derive(Debug, Default)]
struct WriterLog {
    written: Vec<RequestId>,
    resumes: usize,
    busy: bool,
    rejected: HashSet<RequestId>,
    destroyed: bool,
    destroy_reasons: Vec<DispatchError>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingWriter {
    log: Arc<Mutex<WriterLog>>,
}

impl RecordingWriter {
    fn log(&self) -> MutexGuard<'_, WriterLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Request IDs in the order they were written.
    pub fn written(&self) -> Vec<RequestId> {
        self.log().written.clone()
    }

    pub fn resumes(&self) -> usize {
        self.log().resumes
    }

    pub fn set_busy(&self, busy: bool) {
        self.log().busy = busy;
    }

    /// Make `write` refuse this request.
    pub fn reject(&self, id: RequestId) {
        self.log().rejected.insert(id);
    }

    pub fn is_destroyed(&self) -> bool {
        self.log().destroyed
    }

    pub fn destroy_reasons(&self) -> Vec<DispatchError> {
        self.log().destroy_reasons.clone()
    }
}

impl OutgoingWriter for RecordingWriter {
    fn resume(&mut self) {
        self.log().resumes += 1;
    }

    fn busy(&self, _request: &Request) -> bool {
        self.log().busy
    }

    fn write(&mut self, request: &Request) -> bool {
        let mut log = self.log();
        if log.rejected.contains(&request.id()) {
            return false;
        }
        log.written.push(request.id());
        true
    }

    fn destroy(&mut self, reason: DispatchError) {
        let mut log = self.log();
        log.destroyed = true;
        log.destroy_reasons.push(reason);
    }

    fn destroyed(&self) -> bool {
        self.log().destroyed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstablishCall {
    pub target: Origin,
    pub servername: Option<String>,
}

/// Manager that only records establish requests; the test completes them.
#[derive(Debug, Default)]
pub struct RecordingManager {
    calls: Vec<EstablishCall>,
}

impl RecordingManager {
    pub fn establish_calls(&self) -> &[EstablishCall] {
        &self.calls
    }
}

impl ConnectionManager for RecordingManager {
    type Writer = RecordingWriter;

    fn establish(&mut self, target: &Origin, servername: Option<&str>) {
        self.calls.push(EstablishCall {
            target: target.clone(),
            servername: servername.map(str::to_owned),
        });
    }
}
