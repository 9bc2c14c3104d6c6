//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! optional config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → UPSTREAM_URL / LISTEN_ADDR override
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared to all subsystems at startup
//! ```
//!
//! # Design Decisions
//! - Config is read once; there is no reload
//! - All fields have defaults so the environment alone is enough
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    FailurePolicy, ListenerConfig, ObservabilityConfig, ProxyConfig, TimeoutConfig,
    TransformConfig, UpstreamConfig,
};
pub use validation::ValidationError;
