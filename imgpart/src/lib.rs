// SPDX-License-Identifier: GPL-3.0-only

//! Disk image partition tooling
//!
//! Reads the partition table of a disk image from `fdisk -lu` output and drives
//! `losetup`/`mount` to expose the partitions on a Linux host:
//! - [`detect_partitions`] parses the table into [`Partition`] records
//! - [`locate_root_offset`] finds the byte offset of the root filesystem
//! - [`LoopDevices`] attaches and detaches partitions, rolling back on failure
//! - [`ImageTools`] ties these together into image-level workflows
//!
//! Mounting and loop device setup require root privileges; parsing does not.

pub mod cmd;
pub mod config;
pub mod error;
pub mod fdisk;
pub mod image;
pub mod loop_device;
pub mod partition;
pub mod rootfs;

pub use cmd::{CommandOutcome, CommandRunner, SystemRunner};
pub use config::{Config, LoggingLevel, ToolPaths};
pub use error::{Result, SysError};
pub use fdisk::{ParseError, detect_partitions};
pub use image::{CleanupReport, ImageTools};
pub use loop_device::{AttachedPartition, DeviceNaming, LoopDevices};
pub use partition::Partition;
pub use rootfs::{CannotDetectOffsetError, find_root_partition, locate_root_offset};
