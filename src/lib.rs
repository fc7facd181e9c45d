//! Single-connection HTTP/1.1 request dispatch.
//!
//! A `Connection` drives one client socket through its queued requests: it
//! writes them in order up to the pipelining limit, rotates the socket when
//! the TLS servername changes, waits on writer backpressure and drains
//! gracefully on shutdown. `net` runs a connection on a tokio task.

pub mod config;
pub mod dispatch;
pub mod net;
pub mod observability;
pub mod sim;

pub use config::DispatchConfig;
pub use dispatch::{Connection, ConnectionEvent, DispatchError, Request};
pub use net::ConnectionHandle;
