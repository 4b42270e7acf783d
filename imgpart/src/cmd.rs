// SPDX-License-Identifier: GPL-3.0-only

//! External command execution
//!
//! Every tool invocation goes through [`CommandRunner`] so workflows can be
//! exercised without root privileges or real loop devices.

use std::process::Command;

use crate::error::{Result, SysError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
}

pub fn render(command: &str, args: &[String]) -> String {
    if args.is_empty() {
        command.to_string()
    } else {
        format!("{} {}", command, args.join(" "))
    }
}

/// Runs a program to completion and reports its captured output.
///
/// A non-zero exit status is an error ([`SysError::CommandFailed`]).
pub trait CommandRunner {
    fn run(&self, command: &str, args: &[String]) -> Result<CommandOutcome>;
}

/// Runs commands on the host with [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &str, args: &[String]) -> Result<CommandOutcome> {
        let rendered = render(command, args);
        tracing::debug!(command = %rendered, "running");

        let output = Command::new(command)
            .args(args)
            .output()
            .map_err(|source| SysError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SysError::CommandFailed {
                command: rendered,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(CommandOutcome {
            command: rendered,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
