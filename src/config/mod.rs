mod types;

pub use types::*;

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Locations searched when no config path is given, in order.
const DEFAULT_PATHS: [&str; 3] = [
    "./voicetrim.toml",
    "~/.config/voicetrim/config.toml",
    "/etc/voicetrim/config.toml",
];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| Error::config(format!("failed to parse {}: {}", path.display(), e)))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    match find_default_config() {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            load_config(&path)
        }
        None => Ok(Config::default()),
    }
}

/// First default location that exists.
pub fn find_default_config() -> Option<PathBuf> {
    DEFAULT_PATHS.iter().find_map(|path_str| {
        let path = PathBuf::from(shellexpand::tilde(path_str).as_ref());
        path.exists().then_some(path)
    })
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.trim.initial_buffer_bytes == 0 {
        return Err(Error::config("trim.initial_buffer_bytes cannot be 0"));
    }
    if config.trim.max_sample_bytes == 0 {
        return Err(Error::config("trim.max_sample_bytes cannot be 0"));
    }
    if config.trim.initial_buffer_bytes > config.trim.max_sample_bytes {
        return Err(Error::config(format!(
            "trim.initial_buffer_bytes ({}) exceeds trim.max_sample_bytes ({})",
            config.trim.initial_buffer_bytes, config.trim.max_sample_bytes
        )));
    }
    if config.writer.samples_per_chunk == 0 {
        return Err(Error::config("writer.samples_per_chunk cannot be 0"));
    }

    Ok(())
}
