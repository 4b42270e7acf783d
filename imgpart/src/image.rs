// SPDX-License-Identifier: GPL-3.0-only

//! Image-level workflows
//!
//! These combine `losetup`, `fdisk` and `mount` into the operations exposed by
//! the command line: inspecting an image, attaching or detaching all of its
//! partitions, and mounting or unmounting its root filesystem.

use std::path::Path;

use crate::cmd::CommandRunner;
use crate::config::ToolPaths;
use crate::error::{Result, SysError};
use crate::fdisk::detect_partitions;
use crate::loop_device::{AttachedPartition, DeviceNaming, LoopDevices};
use crate::partition::Partition;
use crate::rootfs::locate_root_offset;

/// What the forced root filesystem cleanup managed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub unmounted: bool,
    pub detached: bool,
}

fn require_exists(what: &'static str, path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(SysError::MissingPath {
            what,
            path: path.to_path_buf(),
        })
    }
}

pub struct ImageTools<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    tools: &'a ToolPaths,
}

impl<'a, R: CommandRunner + ?Sized> ImageTools<'a, R> {
    pub fn new(runner: &'a R, tools: &'a ToolPaths) -> Self {
        Self { runner, tools }
    }

    fn loop_devices(&self) -> LoopDevices<'a, R> {
        let tools: &'a ToolPaths = self.tools;
        LoopDevices::new(self.runner, tools.losetup.as_str())
    }

    fn read_partition_table(&self, device: &str) -> Result<String> {
        let args = vec!["-lu".to_string(), device.to_string()];
        Ok(self.runner.run(&self.tools.fdisk, &args)?.stdout)
    }

    /// Read the partition table of `image`.
    ///
    /// The image is attached to a free loop device only for the duration of
    /// the `fdisk` call, so the numbered devices used by [`Self::attach`]
    /// stay untouched.
    pub fn inspect(&self, image: &Path) -> Result<Vec<Partition>> {
        require_exists("image file", image)?;

        let devices = self.loop_devices();
        let device = devices.find_free()?;
        devices.attach_image(&device, image)?;

        let output = match self.read_partition_table(&device) {
            Ok(output) => output,
            Err(error) => {
                devices.detach_quietly(&device);
                return Err(error);
            }
        };
        devices.detach(&device)?;

        let partitions = detect_partitions(&output)?;
        tracing::debug!(image = %image.display(), count = partitions.len(), "detected partitions");
        Ok(partitions)
    }

    /// Attach every partition of `image` to consecutive loop devices.
    pub fn attach(&self, image: &Path, naming: &DeviceNaming) -> Result<Vec<AttachedPartition>> {
        let partitions = self.inspect(image)?;
        self.loop_devices()
            .attach_partitions(&partitions, naming, image)
    }

    /// Detach as many consecutive loop devices as `image` has partitions.
    pub fn detach(&self, image: &Path, naming: &DeviceNaming) -> Result<Vec<String>> {
        let partitions = self.inspect(image)?;
        self.loop_devices()
            .detach_partitions(partitions.len(), naming)
    }

    /// Mount the root filesystem of `image` at `mount_point`.
    ///
    /// `loop_device` carries the whole image while the table is read and the
    /// filesystem is mounted at the detected offset. It is detached again if
    /// any step after attaching fails. Returns the offset used.
    pub fn mount_rootfs(&self, image: &Path, loop_device: &str, mount_point: &Path) -> Result<u64> {
        require_exists("image file", image)?;
        require_exists("loop device", Path::new(loop_device))?;
        require_exists("mount point", mount_point)?;

        let devices = self.loop_devices();
        devices.attach_image(loop_device, image)?;

        let mounted = self.mount_attached(loop_device, mount_point);
        if mounted.is_err() {
            devices.detach_quietly(loop_device);
        }
        mounted
    }

    fn mount_attached(&self, loop_device: &str, mount_point: &Path) -> Result<u64> {
        let output = self.read_partition_table(loop_device)?;
        let offset = locate_root_offset(&output)?;

        let args = vec![
            "-o".to_string(),
            format!("loop,offset={offset}"),
            loop_device.to_string(),
            mount_point.to_string_lossy().into_owned(),
        ];
        self.runner.run(&self.tools.mount, &args)?;

        tracing::info!(
            loop_device,
            offset,
            mount_point = %mount_point.display(),
            "mounted root filesystem"
        );
        Ok(offset)
    }

    /// Unmount `mount_point` and detach `loop_device`.
    ///
    /// Both steps always run; failures are logged and reflected in the report.
    pub fn umount_rootfs(&self, loop_device: &str, mount_point: &Path) -> CleanupReport {
        let args = vec![mount_point.to_string_lossy().into_owned()];
        let unmounted = match self.runner.run(&self.tools.umount, &args) {
            Ok(_) => true,
            Err(error) => {
                tracing::warn!(mount_point = %mount_point.display(), %error, "unmount failed");
                false
            }
        };

        let detached = match self.loop_devices().detach(loop_device) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(loop_device, %error, "detach failed");
                false
            }
        };

        CleanupReport {
            unmounted,
            detached,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::testing::ScriptedRunner;
    use crate::rootfs::CannotDetectOffsetError;

    const RASPBIAN: &str = "\
Disk /dev/loop9: 1939 MB, 1939865600 bytes
Units = sectors of 1 * 512 = 512 bytes
Disk identifier: 0x00014d34

      Device Boot      Start         End      Blocks   Id  System
/dev/loop9p1   *        8192      122879       57344    c  W95 FAT32 (LBA)
/dev/loop9p2          122880     3788799     1832960   83  Linux
";

    const NO_LINUX: &str = "\
Units = sectors of 1 * 512 = 512 bytes
      Device Boot      Start         End      Blocks   Id  System
/dev/loop9p1   *        8192      122879       57344    c  W95 FAT32 (LBA)
";

    fn display(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn inspect_uses_a_temporary_loop_device() {
        let image = tempfile::NamedTempFile::new().unwrap();
        let runner = ScriptedRunner::new()
            .respond("losetup -f", "/dev/loop9\n")
            .respond("fdisk -lu /dev/loop9", RASPBIAN);
        let tools = ToolPaths::default();

        let partitions = ImageTools::new(&runner, &tools)
            .inspect(image.path())
            .unwrap();

        assert_eq!(partitions.len(), 2);
        assert_eq!(
            runner.calls(),
            vec![
                "losetup -f".to_string(),
                format!("losetup /dev/loop9 {}", display(image.path())),
                "fdisk -lu /dev/loop9".to_string(),
                "losetup -d /dev/loop9".to_string(),
            ]
        );
    }

    #[test]
    fn inspect_detaches_when_fdisk_fails() {
        let image = tempfile::NamedTempFile::new().unwrap();
        let runner = ScriptedRunner::new()
            .respond("losetup -f", "/dev/loop9\n")
            .fail("fdisk -lu /dev/loop9", "fdisk: cannot open /dev/loop9");
        let tools = ToolPaths::default();

        let error = ImageTools::new(&runner, &tools)
            .inspect(image.path())
            .unwrap_err();

        assert!(matches!(error, SysError::CommandFailed { .. }));
        assert_eq!(runner.calls().last().unwrap(), "losetup -d /dev/loop9");
    }

    #[test]
    fn inspect_reports_unrecognized_output() {
        let image = tempfile::NamedTempFile::new().unwrap();
        let runner = ScriptedRunner::new()
            .respond("losetup -f", "/dev/loop9\n")
            .respond("fdisk -lu /dev/loop9", "fdisk: unexpected output\n");
        let tools = ToolPaths::default();

        let error = ImageTools::new(&runner, &tools)
            .inspect(image.path())
            .unwrap_err();

        assert!(matches!(error, SysError::Parse(_)));
        assert_eq!(runner.calls().last().unwrap(), "losetup -d /dev/loop9");
    }

    #[test]
    fn missing_image_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let tools = ToolPaths::default();

        let error = ImageTools::new(&runner, &tools)
            .inspect(&dir.path().join("missing.img"))
            .unwrap_err();

        assert!(matches!(error, SysError::MissingPath { what: "image file", .. }));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn attach_names_devices_from_the_start_number() {
        let image = tempfile::NamedTempFile::new().unwrap();
        let runner = ScriptedRunner::new()
            .respond("losetup -f", "/dev/loop9\n")
            .respond("fdisk -lu /dev/loop9", RASPBIAN);
        let tools = ToolPaths::default();

        let attached = ImageTools::new(&runner, &tools)
            .attach(image.path(), &DeviceNaming::new("/dev/loop", 1))
            .unwrap();

        let devices: Vec<&str> = attached.iter().map(|entry| entry.device.as_str()).collect();
        assert_eq!(devices, vec!["/dev/loop1", "/dev/loop2"]);
    }

    #[test]
    fn detach_counts_partitions_of_the_image() {
        let image = tempfile::NamedTempFile::new().unwrap();
        let runner = ScriptedRunner::new()
            .respond("losetup -f", "/dev/loop9\n")
            .respond("fdisk -lu /dev/loop9", RASPBIAN);
        let tools = ToolPaths::default();

        let detached = ImageTools::new(&runner, &tools)
            .detach(image.path(), &DeviceNaming::new("/dev/loop", 0))
            .unwrap();

        assert_eq!(detached, vec!["/dev/loop0", "/dev/loop1"]);
    }

    #[test]
    fn mounts_root_filesystem_at_detected_offset() {
        let image = tempfile::NamedTempFile::new().unwrap();
        let loop_device = tempfile::NamedTempFile::new().unwrap();
        let mount_point = tempfile::tempdir().unwrap();
        let device = display(loop_device.path());
        let runner = ScriptedRunner::new().respond(&format!("fdisk -lu {device}"), RASPBIAN);
        let tools = ToolPaths::default();

        let offset = ImageTools::new(&runner, &tools)
            .mount_rootfs(image.path(), &device, mount_point.path())
            .unwrap();

        assert_eq!(offset, 62914560);
        assert_eq!(
            runner.calls().last().unwrap(),
            &format!(
                "mount -o loop,offset=62914560 {device} {}",
                display(mount_point.path())
            )
        );
    }

    #[test]
    fn failed_root_detection_detaches_the_loop_device() {
        let image = tempfile::NamedTempFile::new().unwrap();
        let loop_device = tempfile::NamedTempFile::new().unwrap();
        let mount_point = tempfile::tempdir().unwrap();
        let device = display(loop_device.path());
        let runner = ScriptedRunner::new().respond(&format!("fdisk -lu {device}"), NO_LINUX);
        let tools = ToolPaths::default();

        let error = ImageTools::new(&runner, &tools)
            .mount_rootfs(image.path(), &device, mount_point.path())
            .unwrap_err();

        assert!(matches!(
            error,
            SysError::RootOffset(CannotDetectOffsetError::NoLinuxPartition)
        ));
        assert_eq!(runner.calls().last().unwrap(), &format!("losetup -d {device}"));
    }

    #[test]
    fn mount_requires_an_existing_mount_point() {
        let image = tempfile::NamedTempFile::new().unwrap();
        let loop_device = tempfile::NamedTempFile::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let tools = ToolPaths::default();

        let error = ImageTools::new(&runner, &tools)
            .mount_rootfs(
                image.path(),
                &display(loop_device.path()),
                &dir.path().join("mnt"),
            )
            .unwrap_err();

        assert!(matches!(error, SysError::MissingPath { what: "mount point", .. }));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn umount_always_attempts_both_steps() {
        let runner = ScriptedRunner::new().fail("umount /mnt/pi", "umount: /mnt/pi: not mounted");
        let tools = ToolPaths::default();

        let report =
            ImageTools::new(&runner, &tools).umount_rootfs("/dev/loop0", Path::new("/mnt/pi"));

        assert_eq!(
            report,
            CleanupReport {
                unmounted: false,
                detached: true,
            }
        );
        assert_eq!(runner.calls(), vec!["umount /mnt/pi", "losetup -d /dev/loop0"]);
    }
}
