//! # olapgate configuration
//!
//! TOML configuration for the gateway: listener, default query settings,
//! engine selection, legacy attribute mappings, users and quotas.
//!
//! ```rust,no_run
//! use olapgate_config::GatewayConfig;
//!
//! # fn run() -> Result<(), olapgate_config::ConfigError> {
//! let config = GatewayConfig::load("olapgate.toml")?;
//! println!("listening on {}", config.server.listen);
//! # Ok(())
//! # }
//! ```

mod config;
mod loader;

pub use config::*;
pub use loader::*;
