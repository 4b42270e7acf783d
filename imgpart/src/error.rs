// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use thiserror::Error;

use crate::fdisk::ParseError;
use crate::rootfs::CannotDetectOffsetError;

/// Error types for image inspection and loop device operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command failed: {command} ({status}); stderr: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("required tool not found in PATH: {0}")]
    ToolMissing(String),

    #[error("{what} does not exist: {}", .path.display())]
    MissingPath { what: &'static str, path: PathBuf },

    #[error("no free loop device available")]
    NoFreeLoopDevice,

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    RootOffset(#[from] CannotDetectOffsetError),

    #[error("failed to attach partition to {device}: {cause}")]
    AttachFailed { device: String, cause: Box<SysError> },

    #[error("{cause}; rollback left loop devices attached: {}", .leaked.join(", "))]
    RollbackFailed {
        cause: Box<SysError>,
        leaked: Vec<String>,
    },

    #[error("invalid config {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },
}

/// Result type alias for image operations
pub type Result<T> = std::result::Result<T, SysError>;
