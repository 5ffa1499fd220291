//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Startup
//!     → listener.rs (import LISTENER descriptor, else bind)
//!     → ListenerHandle (read-only for the rest of the incarnation)
//!     → http server serves on a duplicate
//!
//! Restart
//!     → handoff.rs (duplicate fd, describe it as fd 3)
//!     → lifecycle::spawn places it in the child
//! ```
//!
//! # Design Decisions
//! - The listener is never rebound across a restart; the socket itself moves
//! - Each request is tracked so drain can report what it is waiting for

pub mod connection;
pub mod handoff;
pub mod listener;

pub use connection::{InFlightGuard, InFlightTracker};
pub use handoff::{extract_os_handle, HandoffDescriptor, HandoffError, HANDOFF_FD, LISTENER_ENV};
pub use listener::{create_listener, BindAddress, ListenerAcquirer, ListenerError, ListenerHandle};
