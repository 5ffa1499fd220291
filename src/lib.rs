//! Dragonfly: an HTTP key/value server that restarts without downtime.
//!
//! # Architecture Overview
//!
//! ```text
//!   parent process                              replacement process
//!  ┌──────────────────────────────┐            ┌──────────────────────────────┐
//!  │ net::ListenerAcquirer        │            │ net::ListenerAcquirer        │
//!  │   bind address               │            │   import fd 3 from LISTENER  │
//!  │        │                     │            │        │                     │
//!  │        ▼                     │   SIGHUP   │        ▼                     │
//!  │ http::HttpServer ◀── store   │ ─────────▶ │ http::HttpServer ◀── store   │
//!  │        │                     │  fork/exec │        │                     │
//!  │ lifecycle::SignalCoordinator │  fd → 3    │ lifecycle::SignalCoordinator │
//!  │   Serving → Draining → Stop  │            │   Serving                    │
//!  └──────────────────────────────┘            └──────────────────────────────┘
//! ```
//!
//! Both processes accept on the same listening socket while the parent
//! drains, so no connection attempt is refused during a restart, and every
//! connection the parent accepted is answered before it exits.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod store;

pub use config::AppConfig;
pub use http::{HttpServer, ServerHandle};
pub use lifecycle::{ChildSpawner, Shutdown, SignalCoordinator, SignalRole};
pub use net::{ListenerAcquirer, ListenerHandle};
