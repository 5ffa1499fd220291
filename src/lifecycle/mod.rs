//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Logging → Signal handlers → Acquire listener → Serve
//!
//! Signals (signals.rs):
//!     SIGHUP           → spawn replacement (spawn.rs), then drain
//!     SIGUSR2          → spawn replacement, keep serving
//!     SIGINT/QUIT/TERM → drain
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Stop accepting → Drain in-flight requests → Exit
//! ```
//!
//! # Design Decisions
//! - The listener is never closed by a drain; the replacement holds its own
//!   duplicate before the parent stops accepting
//! - Drain has a deadline read from the live config; after it the remaining
//!   requests are abandoned

pub mod shutdown;
pub mod signals;
pub mod spawn;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::{os_signals, CoordinatorState, CoordinatorStatus, SignalCoordinator, SignalRole};
pub use spawn::{ChildSpawner, SpawnError};
pub use startup::{StartupError, StartupOptions};
