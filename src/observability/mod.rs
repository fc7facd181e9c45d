//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! dispatch loop, connection triggers, driver
//!     → logging.rs (structured tracing events, connection_id / request_id fields)
//!     → metrics.rs (counters)
//! ```

pub mod logging;
pub mod metrics;
