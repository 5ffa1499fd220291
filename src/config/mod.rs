//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! dragonfly.toml (explicit --config, ./, /etc/dragonfly/)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated)
//!     → shared via Arc<ArcSwap<AppConfig>>
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of the live config
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal (or missing) configs
//! - Listener settings are read once per process; restarts pick up changes
//! - Drain timeout is read from the live config when a drain begins

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, locate_config, ConfigError};
pub use schema::{AppConfig, LifecycleConfig, ListenerConfig, LogFormat, ObservabilityConfig};
