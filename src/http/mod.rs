//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! ListenerHandle (duplicate)
//!     → server.rs (accept loop, one hyper connection task per client)
//!     → request.rs (request ID, CORS, in-flight tracking, metrics)
//!     → routes.rs (health, key/value API)
//!     → response.rs (store errors → status codes)
//! ```

pub mod request;
pub mod response;
pub mod routes;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{DrainError, HttpServer, ServerHandle};
