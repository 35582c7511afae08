//! CLI subcommands.

pub mod batch;
pub mod config;
pub mod process;

use std::path::{Path, PathBuf};

use invex_core::InvexConfig;

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("invex")
        .join("config.json")
}

/// Load the configuration from `--config`, the default location, or defaults.
///
/// An explicit path must exist; a missing default file falls back to defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<InvexConfig> {
    match config_path {
        Some(path) => Ok(InvexConfig::from_file(Path::new(path))?),
        None => {
            let path = default_config_path();
            if path.exists() {
                Ok(InvexConfig::from_file(&path)?)
            } else {
                Ok(InvexConfig::default())
            }
        }
    }
}
