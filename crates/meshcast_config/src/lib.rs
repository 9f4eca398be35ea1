//! Parsing and validation of `meshcast.toml` router configuration files.
//!
//! This crate reads the configuration file and produces a strongly-typed
//! [`MeshcastConfig`]: the machine shape with its dead chip and link
//! overrides, the routing algorithm and its search radius, and the weight
//! coefficients of the cost-weighted router.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE_NAME};
pub use types::*;
