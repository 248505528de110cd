//! Mount operations module.
//!
//! Mounts the selected partition on the media root with options matching its
//! filesystem, and provides the low-level mount, unmount, ownership and probe
//! commands the rest of the pipeline uses through [`Host`].

use std::path::Path;

use crate::disk::BlockDevice;
use crate::error::{Error, Result};
use crate::executor::ExecutionContext;
use crate::guard::Identity;
use crate::host::Host;
use crate::select::Selection;

/// Permission mask applied to FAT-family mounts (everyone may read/write).
pub const FAT_UMASK: &str = "000";

/// Ownership-mapping options for filesystems without native permissions.
pub fn ownership_options(uid: u32, gid: u32) -> String {
    format!("uid={},gid={},umask={}", uid, gid, FAT_UMASK)
}

/// Mount options for an immediate mount of `device`.
///
/// FAT-family filesystems get ownership mapping; everything else mounts with
/// defaults and is chowned afterwards.
pub fn mount_options_for(device: &BlockDevice, identity: &Identity) -> Option<String> {
    device
        .is_fat_family()
        .then(|| ownership_options(identity.uid, identity.gid))
}

/// Mounts an unmounted selection on `media_root`.
///
/// Creates the directory, mounts, and for filesystems with native ownership
/// hands the tree to the invoking user.
pub fn mount_selection(
    host: &dyn Host,
    device: &BlockDevice,
    media_root: &Path,
    identity: &Identity,
) -> Result<Selection> {
    host.create_dir(media_root)?;

    let options = mount_options_for(device, identity);
    log::info!(
        "mounting {} ({}) on {} with {}",
        device.path.display(),
        device.fstype,
        media_root.display(),
        options.as_deref().unwrap_or("default options")
    );
    host.mount(&device.path, media_root, options.as_deref())?;

    if options.is_none() {
        log::info!(
            "assigning {} to {}:{}",
            media_root.display(),
            identity.uid,
            identity.gid
        );
        host.chown_recursive(media_root, identity.uid, identity.gid)?;
    }

    Ok(Selection {
        device: device.clone(),
        media_root: media_root.to_path_buf(),
    })
}

/// Creates a mount point directory if it doesn't exist.
pub fn create_mount_point(ctx: &ExecutionContext, path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    ctx.mkdir_privileged(&path.to_string_lossy())
}

/// Mounts a device to the specified mount point.
pub fn mount_device(
    ctx: &ExecutionContext,
    device: &Path,
    mount_point: &Path,
    options: Option<&str>,
) -> Result<()> {
    let device_str = device.to_string_lossy();
    let target = mount_point.to_string_lossy();

    let mut args = Vec::new();
    if let Some(options) = options {
        args.extend(["-o", options]);
    }
    args.extend([&*device_str, &*target]);

    let output = ctx.run_privileged("mount", &args)?;
    if !output.status.success() {
        return Err(Error::Mount {
            device: device_str.to_string(),
            path: mount_point.to_path_buf(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}

/// Mounts a target using its fstab entry (`mount <target>`).
pub fn mount_by_target(ctx: &ExecutionContext, mount_point: &Path) -> Result<()> {
    let target = mount_point.to_string_lossy();
    let output = ctx.run_privileged("mount", &[&*target])?;
    if !output.status.success() {
        return Err(Error::Mount {
            device: "fstab".to_string(),
            path: mount_point.to_path_buf(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Unmounts a device from the specified mount point.
pub fn unmount(ctx: &ExecutionContext, mount_point: &Path) -> Result<()> {
    let target = mount_point.to_string_lossy();
    let output = ctx.run_privileged("umount", &[&*target])?;

    if !output.status.success() {
        return Err(Error::Unmount {
            path: mount_point.to_path_buf(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}

/// Recursively changes ownership of `path`.
pub fn chown_recursive(ctx: &ExecutionContext, path: &Path, uid: u32, gid: u32) -> Result<()> {
    let owner = format!("{}:{}", uid, gid);
    ctx.run_privileged_checked("chown", &["-R", &owner, &path.to_string_lossy()])
}

/// Checks whether `path` is an active mount point (`mountpoint -q`).
pub fn is_mount_point(ctx: &ExecutionContext, path: &Path) -> bool {
    ctx.run("mountpoint", &["-q", &path.to_string_lossy()])
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Filesystem UUID of `device` via `blkid`.
///
/// Runs with privileges since unprivileged blkid may only see its cache.
pub fn blkid_uuid(ctx: &ExecutionContext, device: &Path) -> Option<String> {
    let output = ctx
        .run_privileged(
            "blkid",
            &["-s", "UUID", "-o", "value", &device.to_string_lossy()],
        )
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let uuid = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!uuid.is_empty()).then_some(uuid)
}
