// SPDX-License-Identifier: GPL-3.0-only

//! Partition geometry as reported by a partition-table tool
//!
//! A [`Partition`] is addressed in tool units (sectors for `fdisk -lu`). Byte
//! offsets are derived on demand and never stored.

use serde::Serialize;

/// One row of a partition table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Partition {
    bytes_per_unit: u64,
    start_unit_index: u64,
    end_unit_index: u64,
    system: String,
}

impl Partition {
    /// Build a partition record.
    ///
    /// Returns `None` when `bytes_per_unit` is zero, the range is inverted, or
    /// the byte offsets or size of the range do not fit in a `u64`.
    pub fn new(
        bytes_per_unit: u64,
        start_unit_index: u64,
        end_unit_index: u64,
        system: impl Into<String>,
    ) -> Option<Self> {
        if bytes_per_unit == 0 || end_unit_index < start_unit_index {
            return None;
        }

        // start <= end, so these also bound the start offset.
        end_unit_index.checked_mul(bytes_per_unit)?;
        (end_unit_index - start_unit_index)
            .checked_add(1)?
            .checked_mul(bytes_per_unit)?;

        Some(Self {
            bytes_per_unit,
            start_unit_index,
            end_unit_index,
            system: system.into(),
        })
    }

    /// Size of one addressing unit in bytes (e.g. 512)
    pub fn bytes_per_unit(&self) -> u64 {
        self.bytes_per_unit
    }

    /// First unit of the partition (inclusive)
    pub fn start_unit_index(&self) -> u64 {
        self.start_unit_index
    }

    /// Last unit of the partition (inclusive)
    pub fn end_unit_index(&self) -> u64 {
        self.end_unit_index
    }

    /// Partition type label, e.g. "Linux" or "W95 FAT32 (LBA)"
    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn start_offset_bytes(&self) -> u64 {
        self.start_unit_index * self.bytes_per_unit
    }

    pub fn end_offset_bytes(&self) -> u64 {
        self.end_unit_index * self.bytes_per_unit
    }

    /// Length of the inclusive unit range in bytes
    pub fn size_bytes(&self) -> u64 {
        (self.end_unit_index - self.start_unit_index + 1) * self.bytes_per_unit
    }
}

#[cfg(test)]
mod tests {
    use super::Partition;

    #[test]
    fn offsets_are_unit_index_times_unit_size() {
        let partition = Partition::new(512, 1, 3, "dummy").unwrap();
        assert_eq!(partition.start_offset_bytes(), 512);
        assert_eq!(partition.end_offset_bytes(), 3 * 512);
        assert_eq!(partition.size_bytes(), 3 * 512);
    }

    #[test]
    fn rejects_zero_unit_size() {
        assert!(Partition::new(0, 1, 3, "Linux").is_none());
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(Partition::new(512, 10, 9, "Linux").is_none());
    }

    #[test]
    fn rejects_ranges_past_addressable_bytes() {
        assert!(Partition::new(512, 0, u64::MAX, "Linux").is_none());
        assert!(Partition::new(1, 0, u64::MAX, "Linux").is_none());
        assert!(Partition::new(512, 1 << 55, (1 << 55) + 31, "Linux").is_none());
    }

    #[test]
    fn largest_addressable_range_is_kept() {
        let end = u64::MAX / 512;
        let partition = Partition::new(512, 1, end, "Linux").unwrap();
        assert_eq!(partition.end_offset_bytes(), end * 512);
        assert_eq!(partition.size_bytes(), end * 512);
    }

    #[test]
    fn single_unit_partition_is_allowed() {
        let partition = Partition::new(4096, 7, 7, "Empty").unwrap();
        assert_eq!(partition.size_bytes(), 4096);
        assert_eq!(partition.start_offset_bytes(), partition.end_offset_bytes());
    }

    #[test]
    fn serializes_recorded_fields() {
        let partition = Partition::new(512, 122880, 3788799, "Linux").unwrap();
        let json = serde_json::to_value(&partition).unwrap();
        assert_eq!(json["bytes_per_unit"], 512);
        assert_eq!(json["start_unit_index"], 122880);
        assert_eq!(json["system"], "Linux");
    }
}
