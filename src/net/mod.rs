//! Async driver layer.
//!
//! # Data Flow
//! ```text
//! Any task (client API, writer, manager, response reader)
//!     → handle.rs (Trigger on an unbounded channel)
//!     → driver.rs (single task owning the Connection)
//!     → Connection trigger handler, dispatch loop to fixed point
//!     → ConnectionEvent on the events channel
//! ```
//!
//! # Design Decisions
//! - Triggers are applied strictly one at a time
//! - The driver exits once the connection is destroyed
//! - Replies use oneshot channels; fire-and-forget triggers log rejections

pub mod driver;
pub mod handle;

pub use driver::{spawn, spawn_from_config, Spawned};
pub use handle::{ConnectionHandle, Trigger};
