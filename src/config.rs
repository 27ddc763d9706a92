//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.trento-results.toml` files.

use crate::cli::{Args, Command};
use crate::store::StoreConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = ".trento-results.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Record store connection.
    #[serde(default)]
    pub record_store: StoreConfig,

    /// Check definitions.
    #[serde(default)]
    pub checks: ChecksConfig,
}

/// Check definition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecksConfig {
    /// Directory holding one subdirectory per check.
    #[serde(default = "default_checks_root")]
    pub root: PathBuf,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            root: default_checks_root(),
        }
    }
}

fn default_checks_root() -> PathBuf {
    PathBuf::from("roles/checks")
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given on the command line (or through their
    /// environment variables) override the file.
    pub fn merge_with_args(&mut self, args: &Args) {
        match &args.command {
            Some(Command::Publish(publish)) => {
                if let Some(ref endpoint) = publish.endpoint {
                    self.record_store.endpoint = endpoint.clone();
                }
                if let Some(ref username) = publish.username {
                    self.record_store.username = Some(username.clone());
                }
                if let Some(ref password) = publish.password {
                    self.record_store.password = Some(password.clone());
                }
                if let Some(timeout) = publish.timeout {
                    self.record_store.timeout_seconds = Some(timeout);
                }
                if publish.verify_tls {
                    self.record_store.verify_tls = true;
                }
            }
            Some(Command::CheckIds(check_ids)) => {
                if let Some(ref root) = check_ids.root {
                    self.checks.root = root.clone();
                }
            }
            None => {}
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
