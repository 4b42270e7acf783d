// SPDX-License-Identifier: GPL-3.0-only

//! Parser for the partition listing printed by `fdisk -lu`
//!
//! The output layout is the one produced by util-linux 2.20.1:
//!
//! ```text
//! Units = sectors of 1 * 512 = 512 bytes
//! ...
//!       Device Boot      Start         End      Blocks   Id  System
//! /dev/loop0p1   *        8192      122879       57344    c  W95 FAT32 (LBA)
//! /dev/loop0p2          122880     3788799     1832960   83  Linux
//! ```
//!
//! Scanning runs in three forward-only phases: find the unit size, find the
//! column header, then collect every row that looks like a partition.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::partition::Partition;

/// The output did not contain a unit line followed by a partition list header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("fdisk output format not recognized")]
pub struct ParseError;

static UNIT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Units.+?(?P<bytes>\d+)\s+bytes$").expect("unit pattern is valid")
});

static HEADER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s+Device\s+Boot\s+Start\s+.+$").expect("header pattern is valid")
});

// Blocks may carry a trailing '+' when the partition has an odd sector count.
static ROW_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?P<device>\S+)\s+(?:\*\s+)?",
        r"(?P<start>\d+)\s+",
        r"(?P<end>\d+)\s+",
        r"\d+\+?\s+",
        r"\S+\s+",
        r"(?P<system>.+)$",
    ))
    .expect("row pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Units,
    Header { bytes_per_unit: u64 },
    Items { bytes_per_unit: u64 },
}

impl ScanState {
    fn advance(self, line: &str) -> (Self, Option<Partition>) {
        match self {
            Self::Units => match parse_unit_line(line) {
                Some(bytes_per_unit) => (Self::Header { bytes_per_unit }, None),
                None => (self, None),
            },
            Self::Header { bytes_per_unit } => {
                if HEADER_PATTERN.is_match(line) {
                    (Self::Items { bytes_per_unit }, None)
                } else {
                    (self, None)
                }
            }
            Self::Items { bytes_per_unit } => (self, parse_row(line, bytes_per_unit)),
        }
    }
}

fn parse_unit_line(line: &str) -> Option<u64> {
    let captures = UNIT_PATTERN.captures(line)?;
    let bytes: u64 = captures["bytes"].parse().ok()?;
    (bytes > 0).then_some(bytes)
}

fn parse_row(line: &str, bytes_per_unit: u64) -> Option<Partition> {
    let captures = ROW_PATTERN.captures(line)?;
    let start = captures["start"].parse().ok()?;
    let end = captures["end"].parse().ok()?;
    let system = captures["system"].trim();
    if system.is_empty() {
        return None;
    }

    let partition = Partition::new(bytes_per_unit, start, end, system);
    if partition.is_none() {
        tracing::debug!(
            device = &captures["device"],
            start,
            end,
            "skipping partition row with an invalid range"
        );
    }
    partition
}

/// Parse `fdisk -lu` output into partitions, in the order they are listed.
///
/// An output that reaches the partition list but has no rows yields an empty
/// vector. An output without a unit line or list header is a [`ParseError`].
pub fn detect_partitions(output: &str) -> Result<Vec<Partition>, ParseError> {
    let (state, partitions) = output.lines().fold(
        (ScanState::Units, Vec::new()),
        |(state, mut partitions), line| {
            let (next, partition) = state.advance(line);
            partitions.extend(partition);
            (next, partitions)
        },
    );

    match state {
        ScanState::Items { .. } => Ok(partitions),
        ScanState::Units | ScanState::Header { .. } => {
            tracing::debug!(?state, "fdisk output ended before the partition list");
            Err(ParseError)
        }
    }
}
