//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::MeshcastConfig;
use std::path::Path;

/// The file name looked up inside a project directory.
pub const CONFIG_FILE_NAME: &str = "meshcast.toml";

/// Largest accepted NER radius; the ring table grows as `3r(r+1)`.
const MAX_RADIUS: u32 = 1024;

/// Loads and validates `meshcast.toml` from a project directory.
pub fn load_config(project_dir: &Path) -> Result<MeshcastConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE_NAME);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<MeshcastConfig, ConfigError> {
    let config: MeshcastConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that the machine is non-empty, overrides are on the machine,
/// and weights keep every link cost positive.
fn validate_config(config: &MeshcastConfig) -> Result<(), ConfigError> {
    let machine = &config.machine;
    if machine.width == 0 || machine.height == 0 {
        return Err(ConfigError::ValidationError(format!(
            "machine must have at least one chip, got {}x{}",
            machine.width, machine.height
        )));
    }

    let in_bounds = |x: u32, y: u32| x < machine.width && y < machine.height;
    for chip in &machine.down_chips {
        if !in_bounds(chip.x, chip.y) {
            return Err(ConfigError::OutOfBounds {
                what: "down chip",
                x: chip.x,
                y: chip.y,
                width: machine.width,
                height: machine.height,
            });
        }
    }
    for link in &machine.down_links {
        if !in_bounds(link.chip.x, link.chip.y) {
            return Err(ConfigError::OutOfBounds {
                what: "down link",
                x: link.chip.x,
                y: link.chip.y,
                width: machine.width,
                height: machine.height,
            });
        }
        if link.link > 5 {
            return Err(ConfigError::ValidationError(format!(
                "down link on chip ({}, {}) has link id {}, expected 0-5",
                link.chip.x, link.chip.y, link.link
            )));
        }
    }

    if machine.router_entries == 0 {
        return Err(ConfigError::ValidationError(
            "machine.router_entries must be positive".to_string(),
        ));
    }
    if !(machine.link_bandwidth > 0.0) {
        return Err(ConfigError::ValidationError(
            "machine.link_bandwidth must be positive".to_string(),
        ));
    }

    if config.router.radius > MAX_RADIUS {
        return Err(ConfigError::ValidationError(format!(
            "router.radius {} exceeds the maximum of {MAX_RADIUS}",
            config.router.radius
        )));
    }

    let weights = &config.dijkstra;
    if !(weights.k > 0.0) {
        return Err(ConfigError::ValidationError(
            "dijkstra.k must be positive".to_string(),
        ));
    }
    if weights.l < 0.0 || weights.m < 0.0 || weights.bandwidth_per_route < 0.0 {
        return Err(ConfigError::ValidationError(
            "dijkstra.l, dijkstra.m and dijkstra.bandwidth_per_route must not be negative"
                .to_string(),
        ));
    }
    Ok(())
}
