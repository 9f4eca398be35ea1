//! Error types for configuration loading and validation.

/// Errors that can occur when loading or validating a `meshcast.toml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the configuration file.
    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A dead chip or link names a position outside the machine.
    #[error("{what} ({x}, {y}) is outside the {width}x{height} machine")]
    OutOfBounds {
        /// What was being placed (e.g. "down chip").
        what: &'static str,
        /// X coordinate given.
        x: u32,
        /// Y coordinate given.
        y: u32,
        /// Machine width.
        width: u32,
        /// Machine height.
        height: u32,
    },

    /// A configuration value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),
}
