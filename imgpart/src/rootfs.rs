// SPDX-License-Identifier: GPL-3.0-only

//! Locate the root filesystem partition of an image from `fdisk -lu` output.

use thiserror::Error;

use crate::fdisk::{ParseError, detect_partitions};
use crate::partition::Partition;

/// System label of the partition that holds the root filesystem.
pub const ROOT_FILESYSTEM_SYSTEM: &str = "Linux";

/// The root filesystem offset could not be determined.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CannotDetectOffsetError {
    #[error("cannot detect root filesystem offset: {0}")]
    MalformedTable(#[from] ParseError),

    #[error("cannot detect root filesystem offset: no Linux partition found")]
    NoLinuxPartition,
}

/// First partition labelled [`ROOT_FILESYSTEM_SYSTEM`], in table order.
pub fn find_root_partition(partitions: &[Partition]) -> Option<&Partition> {
    partitions
        .iter()
        .find(|partition| partition.system() == ROOT_FILESYSTEM_SYSTEM)
}

/// Byte offset of the root filesystem partition within the image.
pub fn locate_root_offset(output: &str) -> Result<u64, CannotDetectOffsetError> {
    let partitions = detect_partitions(output)?;
    find_root_partition(&partitions)
        .map(Partition::start_offset_bytes)
        .ok_or(CannotDetectOffsetError::NoLinuxPartition)
}
