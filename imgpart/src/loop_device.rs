// SPDX-License-Identifier: GPL-3.0-only

//! Loop device management through `losetup`
//!
//! Partitions are attached to consecutively numbered devices (`/dev/loop0`,
//! `/dev/loop1`, ...). A failed attach detaches everything attached by the
//! same call before the error is returned.

use std::path::Path;

use serde::Serialize;

use crate::cmd::CommandRunner;
use crate::error::{Result, SysError};
use crate::partition::Partition;

/// How loop device names are derived: `prefix` followed by `start + n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNaming {
    pub prefix: String,
    pub start: u32,
}

impl DeviceNaming {
    pub fn new(prefix: impl Into<String>, start: u32) -> Self {
        Self {
            prefix: prefix.into(),
            start,
        }
    }

    /// Name of the `offset`-th device after the start number.
    pub fn device(&self, offset: usize) -> String {
        format!("{}{}", self.prefix, u64::from(self.start) + offset as u64)
    }
}

/// A partition and the loop device it was attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachedPartition {
    pub device: String,
    pub partition: Partition,
}

pub struct LoopDevices<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    losetup: &'a str,
}

impl<'a, R: CommandRunner + ?Sized> LoopDevices<'a, R> {
    pub fn new(runner: &'a R, losetup: &'a str) -> Self {
        Self { runner, losetup }
    }

    fn losetup(&self, args: Vec<String>) -> Result<String> {
        self.runner
            .run(self.losetup, &args)
            .map(|outcome| outcome.stdout)
    }

    /// First unused loop device, as reported by `losetup -f`.
    pub fn find_free(&self) -> Result<String> {
        let device = self.losetup(vec!["-f".to_string()])?.trim().to_string();
        if device.is_empty() {
            return Err(SysError::NoFreeLoopDevice);
        }
        Ok(device)
    }

    /// Attach a whole image file to `device`.
    pub fn attach_image(&self, device: &str, image: &Path) -> Result<()> {
        self.losetup(vec![
            device.to_string(),
            image.to_string_lossy().into_owned(),
        ])?;
        tracing::info!(device, image = %image.display(), "attached image");
        Ok(())
    }

    /// Attach the byte range of one partition of `image` to `device`.
    pub fn attach_partition(
        &self,
        device: &str,
        image: &Path,
        partition: &Partition,
    ) -> Result<()> {
        self.losetup(vec![
            "-o".to_string(),
            partition.start_offset_bytes().to_string(),
            "--sizelimit".to_string(),
            partition.size_bytes().to_string(),
            device.to_string(),
            image.to_string_lossy().into_owned(),
        ])?;
        tracing::info!(
            device,
            offset = partition.start_offset_bytes(),
            size = partition.size_bytes(),
            system = partition.system(),
            "attached partition"
        );
        Ok(())
    }

    pub fn detach(&self, device: &str) -> Result<()> {
        self.losetup(vec!["-d".to_string(), device.to_string()])?;
        tracing::info!(device, "detached loop device");
        Ok(())
    }

    /// Detach `device`, logging instead of failing.
    pub fn detach_quietly(&self, device: &str) {
        if let Err(error) = self.detach(device) {
            tracing::warn!(device, %error, "failed to detach loop device");
        }
    }

    /// Attach every partition, in order, to consecutive devices.
    ///
    /// On failure, devices attached by this call are detached in reverse
    /// order. The error is [`SysError::AttachFailed`], or
    /// [`SysError::RollbackFailed`] if some of them could not be detached.
    pub fn attach_partitions(
        &self,
        partitions: &[Partition],
        naming: &DeviceNaming,
        image: &Path,
    ) -> Result<Vec<AttachedPartition>> {
        let mut attached: Vec<AttachedPartition> = Vec::with_capacity(partitions.len());

        for (offset, partition) in partitions.iter().enumerate() {
            let device = naming.device(offset);
            if let Err(error) = self.attach_partition(&device, image, partition) {
                let cause = SysError::AttachFailed {
                    device,
                    cause: Box::new(error),
                };
                return Err(self.roll_back(&attached, cause));
            }

            attached.push(AttachedPartition {
                device,
                partition: partition.clone(),
            });
        }

        Ok(attached)
    }

    fn roll_back(&self, attached: &[AttachedPartition], cause: SysError) -> SysError {
        let mut leaked = Vec::new();
        for entry in attached.iter().rev() {
            if let Err(error) = self.detach(&entry.device) {
                tracing::warn!(device = %entry.device, %error, "rollback detach failed");
                leaked.push(entry.device.clone());
            }
        }

        if leaked.is_empty() {
            cause
        } else {
            SysError::RollbackFailed {
                cause: Box::new(cause),
                leaked,
            }
        }
    }

    /// Detach `count` consecutive devices, stopping at the first failure.
    pub fn detach_partitions(&self, count: usize, naming: &DeviceNaming) -> Result<Vec<String>> {
        let mut detached = Vec::with_capacity(count);
        for offset in 0..count {
            let device = naming.device(offset);
            self.detach(&device)?;
            detached.push(device);
        }
        Ok(detached)
    }
}
