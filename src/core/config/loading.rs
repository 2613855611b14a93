//! Locates and parses the TOML configuration file.

use super::file::ConfigFile;
use crate::core::error::{AppError, Result};
use std::fs;
use std::path::{Path, PathBuf};

const LOCAL_CONFIG_NAME: &str = "lead-sleuth.toml";

/// Candidate config locations, in lookup order, when no explicit path is given.
fn default_locations() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_NAME)];
    if let Ok(home) = std::env::var("HOME") {
        paths.push(
            PathBuf::from(home)
                .join(".config")
                .join("lead-sleuth")
                .join("config.toml"),
        );
    }
    paths
}

fn read_file(path: &Path) -> Result<ConfigFile> {
    let raw = fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;
    let parsed: ConfigFile = toml::from_str(&raw)?;
    Ok(parsed)
}

/// Loads the configuration file.
///
/// An explicit `path` must exist. Without one, the default locations are
/// tried in order and a missing file simply yields `None`.
pub fn load_config_file(path: Option<&Path>) -> Result<Option<(ConfigFile, PathBuf)>> {
    if let Some(explicit) = path {
        tracing::debug!("Loading config file from explicit path {}", explicit.display());
        let parsed = read_file(explicit)?;
        return Ok(Some((parsed, explicit.to_path_buf())));
    }

    for candidate in default_locations() {
        if candidate.is_file() {
            tracing::debug!("Found config file at {}", candidate.display());
            let parsed = read_file(&candidate)?;
            return Ok(Some((parsed, candidate)));
        }
    }

    tracing::debug!("No config file found; using built-in defaults.");
    Ok(None)
}
