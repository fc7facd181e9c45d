//! Shared utilities for dispatch integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pipeline_dispatch::config::SimulationConfig;
use pipeline_dispatch::dispatch::{Connection, ConnectionEvent, DropReason, Origin, RequestId};
use pipeline_dispatch::sim::{RecordingManager, RecordingWriter};

pub type TestConnection = Connection<RecordingManager, Vec<ConnectionEvent>>;

/// A connection with a recording manager and no writer yet.
pub fn connection(origin: &str, pipeline_limit: usize) -> TestConnection {
    Connection::new(
        Origin::parse(origin).unwrap(),
        pipeline_limit,
        RecordingManager::default(),
        Vec::new(),
    )
}

/// A connection that already holds a writer; returns a clone sharing its log.
pub fn connected(origin: &str, pipeline_limit: usize) -> (TestConnection, RecordingWriter) {
    let mut conn = connection(origin, pipeline_limit);
    let writer = RecordingWriter::default();
    conn.on_writer_established(writer.clone());
    (conn, writer)
}

/// Complete the latest establish request with a fresh writer.
pub fn establish(conn: &mut TestConnection) -> RecordingWriter {
    let writer = RecordingWriter::default();
    conn.on_writer_established(writer.clone());
    writer
}

/// Respond to and settle the oldest running request.
pub fn settle(conn: &mut TestConnection, id: RequestId) {
    conn.on_response_started().unwrap();
    conn.on_request_settled(id).unwrap();
}

/// A drain callback that flips a flag.
pub fn drain_flag() -> (Arc<AtomicBool>, impl FnOnce() + Send + 'static) {
    let flag = Arc::new(AtomicBool::new(false));
    let set = flag.clone();
    (flag, move || set.store(true, Ordering::SeqCst))
}

pub fn completed(events: &[ConnectionEvent]) -> Vec<RequestId> {
    events
        .iter()
        .filter_map(|e| match e {
            ConnectionEvent::Completed { id } => Some(*id),
            _ => None,
        })
        .collect()
}

pub fn failed(events: &[ConnectionEvent]) -> Vec<RequestId> {
    events
        .iter()
        .filter_map(|e| match e {
            ConnectionEvent::Failed { id, .. } => Some(*id),
            _ => None,
        })
        .collect()
}

pub fn dropped(events: &[ConnectionEvent], reason: DropReason) -> Vec<RequestId> {
    events
        .iter()
        .filter_map(|e| match e {
            ConnectionEvent::Dropped { id, reason: r } if *r == reason => Some(*id),
            _ => None,
        })
        .collect()
}

pub fn drained(events: &[ConnectionEvent]) -> usize {
    events.iter().filter(|e| **e == ConnectionEvent::Drained).count()
}

/// Simulation settings with no randomness and short delays.
pub fn fast_simulation() -> SimulationConfig {
    SimulationConfig {
        connect_latency_ms: 5,
        response_latency_ms: 5,
        jitter_ms: 0,
        ..SimulationConfig::default()
    }
}
