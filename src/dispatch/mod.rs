//! Single-connection request dispatch.
//!
//! # Data Flow
//! ```text
//! enqueue / drain / close / settle / shutdown
//!     → connection.rs (mutate state, then run the loop)
//!     → dispatch_loop.rs (decide the next action until idle)
//!         → writer.rs   (resume, busy, write, destroy)
//!         → manager.rs  (establish a writer when none exists)
//!     → tasks.rs (deferred continuations, drained before returning)
//!     → events.rs (notifications to the owner)
//! ```
//!
//! # Design Decisions
//! - One owner per connection; `&mut self` makes the loop non-reentrant
//! - Waiting is an early return, never a block
//! - Requests are written strictly in enqueue order
//! - A servername change only rotates the writer once nothing is running

pub mod connection;
pub mod dispatch_loop;
pub mod error;
pub mod events;
pub mod manager;
pub mod queue;
pub mod request;
pub mod state;
pub mod tasks;
pub mod writer;

pub use connection::Connection;
pub use dispatch_loop::{Idle, Invocation};
pub use error::DispatchError;
pub use events::{ConnectionEvent, DropReason, EventSink, NullSink};
pub use manager::ConnectionManager;
pub use queue::RequestQueue;
pub use request::{AbortHandle, Request, RequestId};
pub use state::{ConnectionId, ConnectionState, ConnectionStats, Origin, ShutdownPhase};
pub use writer::OutgoingWriter;
