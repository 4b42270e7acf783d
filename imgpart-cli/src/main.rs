// SPDX-License-Identifier: GPL-3.0-only

//! Command line front end for inspecting, attaching and mounting disk image partitions

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use imgpart::{Config, DeviceNaming, ImageTools, SystemRunner};

mod logging;
mod output;

#[derive(Debug, Parser)]
#[command(name = "imgpart")]
#[command(version, about = "Inspect, attach and mount partitions in disk images", long_about = None)]
struct Cli {
    /// Configuration file (default: $XDG_CONFIG_HOME/imgpart/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity, may be repeated
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct LoopArgs {
    /// Prefix of loop device files
    #[arg(short = 'l', long = "loopdevice")]
    prefix: Option<String>,

    /// Start number of loop device files
    #[arg(short = 's', long = "start-number")]
    start_number: Option<u32>,
}

impl LoopArgs {
    fn naming(&self, config: &Config) -> DeviceNaming {
        DeviceNaming::new(
            self.prefix
                .clone()
                .unwrap_or_else(|| config.loop_device_prefix.clone()),
            self.start_number
                .unwrap_or(config.loop_device_start_number),
        )
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the partitions in a disk image
    List {
        /// Path of an image file
        image: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Attach the partitions in a disk image to loop devices
    Attach {
        /// Path of an image file
        image: PathBuf,
        #[command(flatten)]
        loop_args: LoopArgs,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Detach the loop devices holding the partitions of a disk image
    Detach {
        /// Path of an image file
        image: PathBuf,
        #[command(flatten)]
        loop_args: LoopArgs,
    },
    /// Mount the root filesystem in a disk image
    MountRootfs {
        /// Path of an image file
        image: PathBuf,
        /// Loop device file to attach the image to
        loop_device: String,
        /// Existing directory to mount on
        mount_point: PathBuf,
    },
    /// Unmount the root filesystem and detach its loop device
    UmountRootfs {
        /// Loop device file the image is attached to
        loop_device: String,
        /// Directory the root filesystem is mounted on
        mount_point: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    logging::init(config.log_level.raised(cli.verbose));
    config.tools.ensure_available()?;

    let runner = SystemRunner;
    let image_tools = ImageTools::new(&runner, &config.tools);

    match cli.command {
        Commands::List { image, json } => {
            let partitions = image_tools
                .inspect(&image)
                .with_context(|| format!("failed to detect partitions in {}", image.display()))?;
            if json {
                println!("{}", output::json(&partitions)?);
            } else {
                print!("{}", output::partitions(&partitions));
            }
        }
        Commands::Attach {
            image,
            loop_args,
            json,
        } => {
            let attached = image_tools
                .attach(&image, &loop_args.naming(&config))
                .with_context(|| format!("failed to attach partitions of {}", image.display()))?;
            if json {
                println!("{}", output::json(&attached)?);
            } else {
                print!("{}", output::attached(&attached));
            }
        }
        Commands::Detach { image, loop_args } => {
            let detached = image_tools
                .detach(&image, &loop_args.naming(&config))
                .with_context(|| format!("failed to detach partitions of {}", image.display()))?;
            print!("{}", output::detached(&detached));
        }
        Commands::MountRootfs {
            image,
            loop_device,
            mount_point,
        } => {
            let offset = image_tools
                .mount_rootfs(&image, &loop_device, &mount_point)
                .context("failed to mount the root filesystem")?;
            println!(
                "Mounted root filesystem of {} (offset {}) at {}",
                image.display(),
                offset,
                mount_point.display()
            );
        }
        Commands::UmountRootfs {
            loop_device,
            mount_point,
        } => {
            let report = image_tools.umount_rootfs(&loop_device, &mount_point);
            tracing::info!(
                unmounted = report.unmounted,
                detached = report.detached,
                "root filesystem cleanup finished"
            );
        }
    }

    Ok(())
}
