//! Randomized interleavings of triggers, checked against the connection invariants.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pipeline_dispatch::dispatch::{AbortHandle, ConnectionEvent, DispatchError, Request, RequestId};
use pipeline_dispatch::sim::RecordingWriter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

mod common;

const SERVERNAMES: [Option<&str>; 3] = [None, Some("a.example.com"), Some("b.example.com")];

struct Run {
    conn: common::TestConnection,
    limit: usize,
    writers: Vec<RecordingWriter>,
    enqueued: Vec<RequestId>,
    aborts: Vec<AbortHandle>,
    drain_calls: Arc<AtomicUsize>,
    shutdowns: usize,
}

impl Run {
    fn new(origin: &str, limit: usize) -> Self {
        Self {
            conn: common::connection(origin, limit),
            limit,
            writers: Vec::new(),
            enqueued: Vec::new(),
            aborts: Vec::new(),
            drain_calls: Arc::new(AtomicUsize::new(0)),
            shutdowns: 0,
        }
    }

    fn step(&mut self, rng: &mut StdRng) {
        match rng.gen_range(0..100) {
            0..=29 => {
                let mut request = Request::new("GET / HTTP/1.1\r\n\r\n");
                if let Some(name) = SERVERNAMES[rng.gen_range(0..SERVERNAMES.len())] {
                    request = request.with_servername(name);
                }
                self.aborts.push(request.abort_handle());
                if let Ok(id) = self.conn.enqueue(request) {
                    self.enqueued.push(id);
                }
            }
            30..=44 => {
                if self.conn.state().is_connecting() {
                    if rng.gen_bool(0.8) {
                        let writer = RecordingWriter::default();
                        self.writers.push(writer.clone());
                        self.conn.on_writer_established(writer);
                    } else {
                        self.conn
                            .on_establish_failed(DispatchError::Connect("refused".into()));
                    }
                }
            }
            45..=69 => {
                if let Some(id) = self.conn.queue().oldest_running().map(Request::id) {
                    self.conn.on_response_started().unwrap();
                    if rng.gen_bool(0.9) {
                        self.conn.on_request_settled(id).unwrap();
                    } else {
                        self.conn
                            .on_request_failed(id, DispatchError::Socket("bad response".into()))
                            .unwrap();
                    }
                }
            }
            70..=77 => {
                if !self.aborts.is_empty() {
                    let index = rng.gen_range(0..self.aborts.len());
                    self.aborts[index].abort();
                }
            }
            78..=84 => {
                let rotating = self.conn.writer().is_some_and(|w| w.is_destroyed());
                if rotating {
                    self.conn
                        .on_writer_close(Some(DispatchError::ServernameChanged));
                } else if self.conn.writer().is_some() && rng.gen_bool(0.3) {
                    self.conn
                        .on_writer_close(Some(DispatchError::Socket("connection reset".into())));
                }
            }
            85..=91 => {
                if let Some(writer) = self.conn.writer() {
                    writer.set_busy(rng.gen_bool(0.3));
                }
                self.conn.on_writer_drain();
            }
            92..=95 => {
                let calls = self.drain_calls.clone();
                let accepted = self.conn.request_shutdown(move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                });
                if accepted.is_ok() {
                    self.shutdowns += 1;
                }
            }
            96..=97 => {
                if self.conn.state().is_paused() {
                    self.conn.unpause();
                } else {
                    self.conn.pause();
                }
            }
            _ => {
                if rng.gen_bool(0.2) {
                    self.conn.destroy(DispatchError::Destroyed);
                }
            }
        }
    }

    fn check(&self) {
        assert!(self.conn.queue().running() <= self.limit);
        if self.conn.is_destroyed() {
            assert_eq!(self.conn.active_request_count(), 0);
        }

        let written: Vec<RequestId> = self.writers.iter().flat_map(|w| w.written()).collect();
        assert!(written.windows(2).all(|pair| pair[0] < pair[1]), "writes out of order");

        let completed = common::completed(self.conn.events());
        assert!(completed.windows(2).all(|pair| pair[0] < pair[1]), "completions out of order");

        let queued: Vec<RequestId> = self.conn.queue().iter().map(Request::id).collect();
        assert!(queued.windows(2).all(|pair| pair[0] < pair[1]), "queue out of order");
    }

    fn finish(mut self) {
        self.conn.destroy(DispatchError::Destroyed);
        self.check();

        let mut terminal: HashMap<RequestId, usize> = HashMap::new();
        for event in self.conn.events() {
            let id = match event {
                ConnectionEvent::Completed { id }
                | ConnectionEvent::Failed { id, .. }
                | ConnectionEvent::Dropped { id, .. } => *id,
                _ => continue,
            };
            *terminal.entry(id).or_default() += 1;
        }
        for id in &self.enqueued {
            assert_eq!(terminal.get(id), Some(&1), "{id} must finish exactly once");
        }
        assert_eq!(terminal.len(), self.enqueued.len());
        // Destroy runs any callback still waiting.
        assert_eq!(self.drain_calls.load(Ordering::SeqCst), self.shutdowns);
    }
}

fn exercise(origin: &str) {
    for seed in 0..200u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let limit = rng.gen_range(1..=4);
        let mut run = Run::new(origin, limit);

        for _ in 0..300 {
            run.step(&mut rng);
            run.check();
            if run.conn.is_destroyed() {
                break;
            }
        }
        run.finish();
    }
}

#[test]
fn test_random_interleavings_https() {
    exercise("https://api.example.com");
}

#[test]
fn test_random_interleavings_http() {
    exercise("http://backend.local");
}

#[test]
fn test_each_shutdown_callback_runs_once() {
    let (mut conn, _writer) = common::connected("http://backend.local", 2);
    let calls = Arc::new(AtomicUsize::new(0));

    for round in 0..3 {
        let a = conn.enqueue(Request::new("a")).unwrap();
        let counter = calls.clone();
        conn.request_shutdown(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        common::settle(&mut conn, a);
        assert_eq!(calls.load(Ordering::SeqCst), round + 1);
    }
    assert_eq!(common::drained(conn.events()), 3);
}
