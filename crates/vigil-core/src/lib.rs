//! vigil-core: shared types and configuration for the Vigil watchdog.
//!
//! Everything the other crates agree on lives here: the monitored
//! [`Entity`] description, the [`Alert`] emitted when an entity goes down
//! or comes back, and the TOML configuration surface ([`VigilConfig`]).

pub mod config;
pub mod duration;
pub mod error;
pub mod types;

pub use config::VigilConfig;
pub use duration::parse_duration;
pub use error::{ConfigError, ConfigResult};
pub use types::*;
