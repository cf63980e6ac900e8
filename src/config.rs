use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::InstallerError;

/// Name of the unit the installer manages unless told otherwise.
pub const DEFAULT_UNIT_NAME: &str = "rclone-sync.service";

/// Top‑level configuration file (`config.toml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub install: InstallConfig,
    pub sync: SyncConfig,
}

/// `[install]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Unit name, e.g. `rclone-sync.service`
    pub unit_name: String,
    /// Unit file to install, relative to the working directory
    pub source: PathBuf,
    /// Directory systemd loads system units from
    pub unit_dir: PathBuf,
    /// `auto` (wrap with sudo unless root), `none`, or a wrapper program
    pub elevate: String,
    pub systemctl: String,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            unit_name: DEFAULT_UNIT_NAME.to_string(),
            source: PathBuf::from(DEFAULT_UNIT_NAME),
            unit_dir: PathBuf::from("/etc/systemd/system"),
            elevate: "auto".to_string(),
            systemctl: "systemctl".to_string(),
        }
    }
}

impl InstallConfig {
    /// Absolute destination of the installed unit file.
    pub fn destination(&self) -> PathBuf {
        self.unit_dir.join(&self.unit_name)
    }

    /// Reject unit names systemd would not load from a flat unit directory.
    pub fn validate(&self) -> Result<(), InstallerError> {
        let name = self.unit_name.as_str();
        let stem = name.strip_suffix(".service").ok_or_else(|| {
            InstallerError::Config(format!("unit name '{name}' must end in .service"))
        })?;
        if stem.is_empty() || name.contains('/') || name.chars().any(char::is_whitespace) {
            return Err(InstallerError::Config(format!(
                "invalid unit name '{name}'"
            )));
        }
        if self.systemctl.trim().is_empty() {
            return Err(InstallerError::Config("systemctl path is empty".to_string()));
        }
        Ok(())
    }
}

/// `[sync]` section, consumed by `rclone-sync run` and `rclone-sync unit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub local_dir: Option<PathBuf>,
    /// rclone destination, `remote:path`
    pub remote: Option<String>,
    pub dry_run: bool,
    pub rclone: String,
    /// Debounce window for filesystem events
    pub debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            local_dir: None,
            remote: None,
            dry_run: false,
            rclone: "rclone".to_string(),
            debounce_ms: 1000,
        }
    }
}

impl Config {
    /// Per-user config location, `~/.config/rclone-sync/config.toml` on Linux.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rclone-sync").join("config.toml"))
    }

    /// Load an explicit config file, or the default one if it exists, or defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => {
                    log::debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let cfg = Self::from_file(&path)?;
        log::info!("Using config from: {}", path.display());
        Ok(cfg)
    }

    /// Read and parse `path`. Unparsable contents are an
    /// [`InstallerError::Config`]; read failures carry the path as context.
    pub fn from_file(path: &Path) -> Result<Self> {
        let cfg_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = toml::from_str(&cfg_str).map_err(|e| {
            InstallerError::Config(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(cfg)
    }
}
