//! Side-effect boundary of the provisioning pipeline.
//!
//! Every interaction with the live system (commands, files, process identity)
//! goes through [`Host`]. [`SystemHost`] talks to the real machine via an
//! [`ExecutionContext`]; tests substitute an in-memory implementation.

use std::fs;
use std::path::{Path, PathBuf};

use crate::disk::{self, BlockDevice};
use crate::error::{IoResultExt, Result};
use crate::executor::ExecutionContext;
use crate::guard::{self, Identity};
use crate::{mount, prereq, service, systemd};

/// Operations the pipeline performs against the host system.
pub trait Host {
    /// Effective uid of the running process.
    fn effective_uid(&self) -> u32;

    /// Machine architecture as reported by `uname -m`.
    fn machine(&self) -> String;

    /// Network name the server will be reachable under.
    fn hostname(&self) -> String;

    /// The invoking user.
    fn identity(&self) -> Result<Identity>;

    /// Returns true if `name` is an executable on `PATH`.
    fn has_command(&self, name: &str) -> bool;

    /// Installs packages with the host package manager.
    fn install_system_packages(&self, packages: &[&str]) -> Result<()>;

    /// Returns true if the Python interpreter can import `module`.
    fn has_python_module(&self, module: &str) -> bool;

    /// Installs a Python package for the invoking user.
    fn install_python_package(&self, package: &str) -> Result<()>;

    /// Enumerates partitions.
    fn list_block_devices(&self) -> Result<Vec<BlockDevice>>;

    /// Creates a directory (and parents) with root privileges.
    fn create_dir(&self, path: &Path) -> Result<()>;

    /// Mounts `device` on `target`, optionally with `-o options`.
    fn mount(&self, device: &Path, target: &Path, options: Option<&str>) -> Result<()>;

    /// Recursively hands `path` to `uid:gid`.
    fn chown_recursive(&self, path: &Path, uid: u32, gid: u32) -> Result<()>;

    /// Returns true if `path` is an active mount point.
    fn is_mount_point(&self, path: &Path) -> bool;

    /// Filesystem UUID of `device`, if it has one.
    fn volume_uuid(&self, device: &Path) -> Option<String>;

    /// Reads the boot-time mount table.
    fn read_fstab(&self, path: &Path) -> Result<String>;

    /// Appends raw text to the boot-time mount table.
    fn append_fstab(&self, path: &Path, text: &str) -> Result<()>;

    /// Unmounts `target`.
    fn unmount(&self, target: &Path) -> Result<()>;

    /// Mounts `target` using its mount table entry.
    fn mount_from_fstab(&self, target: &Path) -> Result<()>;

    /// Mount unit name for `path` as computed by the service manager.
    fn escape_mount_unit(&self, path: &Path) -> Option<String>;

    /// Locates an executable, trying `~/.local/bin` before `PATH`.
    fn resolve_command(&self, name: &str, home: &Path) -> Option<PathBuf>;

    /// Replaces the file at `path` with `content` (root privileges).
    fn write_unit(&self, path: &Path, content: &str) -> Result<()>;

    /// Runs `systemctl` with root privileges.
    fn systemctl(&self, args: &[&str]) -> Result<()>;

    /// One-line status summary of a unit, if available.
    fn unit_status(&self, unit: &str) -> Option<String>;
}

/// [`Host`] implementation for the running machine.
#[derive(Debug, Clone, Default)]
pub struct SystemHost {
    ctx: ExecutionContext,
}

impl SystemHost {
    pub fn new(ctx: ExecutionContext) -> Self {
        Self { ctx }
    }
}

impl Host for SystemHost {
    fn effective_uid(&self) -> u32 {
        nix::unistd::geteuid().as_raw()
    }

    fn machine(&self) -> String {
        guard::machine()
    }

    fn hostname(&self) -> String {
        guard::hostname()
    }

    fn identity(&self) -> Result<Identity> {
        guard::current_identity()
    }

    fn has_command(&self, name: &str) -> bool {
        which::which(name).is_ok()
    }

    fn install_system_packages(&self, packages: &[&str]) -> Result<()> {
        prereq::apt_install(&self.ctx, packages)
    }

    fn has_python_module(&self, module: &str) -> bool {
        prereq::python_can_import(&self.ctx, module)
    }

    fn install_python_package(&self, package: &str) -> Result<()> {
        prereq::pip_install_user(&self.ctx, package)
    }

    fn list_block_devices(&self) -> Result<Vec<BlockDevice>> {
        disk::list_block_devices()
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        mount::create_mount_point(&self.ctx, path)
    }

    fn mount(&self, device: &Path, target: &Path, options: Option<&str>) -> Result<()> {
        mount::mount_device(&self.ctx, device, target, options)
    }

    fn chown_recursive(&self, path: &Path, uid: u32, gid: u32) -> Result<()> {
        mount::chown_recursive(&self.ctx, path, uid, gid)
    }

    fn is_mount_point(&self, path: &Path) -> bool {
        mount::is_mount_point(&self.ctx, path)
    }

    fn volume_uuid(&self, device: &Path) -> Option<String> {
        mount::blkid_uuid(&self.ctx, device)
    }

    fn read_fstab(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).fstab_read_context(path)
    }

    fn append_fstab(&self, path: &Path, text: &str) -> Result<()> {
        self.ctx.append_file_privileged(&path.to_string_lossy(), text)
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        mount::unmount(&self.ctx, target)
    }

    fn mount_from_fstab(&self, target: &Path) -> Result<()> {
        mount::mount_by_target(&self.ctx, target)
    }

    fn escape_mount_unit(&self, path: &Path) -> Option<String> {
        systemd::systemd_escape_mount(&self.ctx, path)
    }

    fn resolve_command(&self, name: &str, home: &Path) -> Option<PathBuf> {
        service::resolve_launch_command(name, home, |n| which::which(n).ok())
    }

    fn write_unit(&self, path: &Path, content: &str) -> Result<()> {
        self.ctx.write_file_privileged(&path.to_string_lossy(), content)
    }

    fn systemctl(&self, args: &[&str]) -> Result<()> {
        systemd::run_systemctl(&self.ctx, args)
    }

    fn unit_status(&self, unit: &str) -> Option<String> {
        systemd::status_line(&self.ctx, unit)
    }
}
