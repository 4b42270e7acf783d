// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Read from a TOML file. Every key is optional:
//!
//! ```toml
//! loop_device_prefix = "/dev/loop"
//! loop_device_start_number = 0
//! log_level = "info"
//!
//! [tools]
//! losetup = "/usr/sbin/losetup"
//! fdisk = "fdisk"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SysError};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "IMGPART_CONFIG";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LoggingLevel {
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Error,
            1 => Self::Warn,
            2 => Self::Info,
            3 => Self::Debug,
            _ => Self::Trace,
        }
    }

    pub fn to_index(self) -> usize {
        match self {
            Self::Error => 0,
            Self::Warn => 1,
            Self::Info => 2,
            Self::Debug => 3,
            Self::Trace => 4,
        }
    }

    /// Level `steps` notches more verbose, saturating at trace.
    pub fn raised(self, steps: u8) -> Self {
        Self::from_index(self.to_index() + usize::from(steps))
    }

    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Programs invoked for each external step. Names are looked up in `PATH`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolPaths {
    pub losetup: String,
    pub fdisk: String,
    pub mount: String,
    pub umount: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            losetup: "losetup".to_string(),
            fdisk: "fdisk".to_string(),
            mount: "mount".to_string(),
            umount: "umount".to_string(),
        }
    }
}

impl ToolPaths {
    /// Fail early with [`SysError::ToolMissing`] if any tool cannot be resolved.
    pub fn ensure_available(&self) -> Result<()> {
        for tool in [&self.losetup, &self.fdisk, &self.mount, &self.umount] {
            if which::which(tool).is_err() {
                return Err(SysError::ToolMissing(tool.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub loop_device_prefix: String,
    pub loop_device_start_number: u32,
    pub log_level: LoggingLevel,
    pub tools: ToolPaths,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            loop_device_prefix: "/dev/loop".to_string(),
            loop_device_start_number: 0,
            log_level: LoggingLevel::Info,
            tools: ToolPaths::default(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path or `IMGPART_CONFIG` must point at a readable file. The
    /// per-user default location is optional and falls back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|value| !value.is_empty()) {
            return Self::from_file(Path::new(&path));
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|error| SysError::Config {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;

        let config: Config = toml::from_str(&raw).map_err(|error| SysError::Config {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;

        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

fn default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config) = std::env::var_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("imgpart").join("config.toml"));
    }

    std::env::var_os("HOME").map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("imgpart")
            .join("config.toml")
    })
}
