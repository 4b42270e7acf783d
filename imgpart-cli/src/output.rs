// SPDX-License-Identifier: GPL-3.0-only

//! Rendering of command results for stdout

use std::fmt::Write;

use imgpart::{AttachedPartition, Partition};
use serde::Serialize;

pub(crate) fn json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}

pub(crate) fn partitions(partitions: &[Partition]) -> String {
    let mut out = String::from("number, start offset, end offset, size, system of partition\n");
    for (number, partition) in partitions.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}, {}, {}, {}, {}",
            number,
            partition.start_offset_bytes(),
            partition.end_offset_bytes(),
            partition.size_bytes(),
            partition.system()
        );
    }
    out
}

pub(crate) fn attached(attached: &[AttachedPartition]) -> String {
    let mut out = String::from("number, loop device, system of partition\n");
    for (number, entry) in attached.iter().enumerate() {
        let _ = writeln!(out, "{}, {}, {}", number, entry.device, entry.partition.system());
    }
    out
}

pub(crate) fn detached(devices: &[String]) -> String {
    let mut out = String::from("Detached loop device :\n");
    for device in devices {
        out.push_str(device);
        out.push('\n');
    }
    out
}
