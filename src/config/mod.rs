//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, overlay environment once)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → shared by reference/Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; no component reads the environment itself
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{AuthConfig, ListenerConfig, LogFormat, ObservabilityConfig, RelayConfig, UpstreamConfig};
