//! Simulated collaborators.
//!
//! # Data Flow
//! ```text
//! recording.rs: synchronous writer/manager that log calls (unit and scenario tests)
//! loopback.rs:  tokio writer/manager that answer after a delay (CLI, driver tests)
//! latency.rs:   jittered delays for loopback
//! ```

pub mod latency;
pub mod loopback;
pub mod recording;

pub use loopback::{SimManager, SimWriter};
pub use recording::{EstablishCall, RecordingManager, RecordingWriter};
