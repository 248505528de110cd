//! Systemd control module.
//!
//! This module provides mount unit naming, the `systemctl` wrapper, and the
//! activation step that hands the generated service to systemd.

use std::path::Path;

use crate::error::{Error, Result};
use crate::executor::ExecutionContext;
use crate::host::Host;

/// Helper function to run systemctl commands with privileges.
pub fn run_systemctl(ctx: &ExecutionContext, args: &[&str]) -> Result<()> {
    let output = ctx.run_privileged("systemctl", args)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(Error::Systemd {
            message: format!("systemctl {}: {}", args.join(" "), stderr),
        });
    }

    Ok(())
}

/// First line of `systemctl status` for `unit`, e.g. the `Active:` line.
pub fn status_line(ctx: &ExecutionContext, unit: &str) -> Option<String> {
    let output = ctx.run("systemctl", &["status", "--no-pager", unit]).ok()?;
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("Active:"))
        .map(str::to_string)
}

/// Asks `systemd-escape` for the mount unit name of `path`.
pub fn systemd_escape_mount(ctx: &ExecutionContext, path: &Path) -> Option<String> {
    ctx.run_stdout(
        "systemd-escape",
        &["--path", "--suffix=mount", &path.to_string_lossy()],
    )
    .ok()
    .filter(|name| !name.is_empty())
}

/// Converts a mount point path to a systemd unit name.
///
/// Implements systemd path escaping logic:
/// 1. Removes leading and trailing slashes, collapses repeated ones
/// 2. Replaces slashes with dashes
/// 3. Escapes other special characters (like spaces and dashes) as \xNN,
///    and a leading dot
///
/// Example: "/media/usb" -> "media-usb.mount"
/// Example: "/media/My Drive" -> "media-My\x20Drive.mount"
pub fn mount_point_to_unit_name(mount_point: &Path) -> String {
    let path_str = mount_point.to_string_lossy();
    let segments: Vec<&str> = path_str.split('/').filter(|s| !s.is_empty()).collect();

    if segments.is_empty() {
        return "-.mount".to_string();
    }

    let trimmed = segments.join("/");
    let mut escaped = String::with_capacity(trimmed.len());
    for (i, byte) in trimmed.bytes().enumerate() {
        let c = byte as char;
        if c == '/' {
            escaped.push('-');
        } else if c == '.' && i == 0 {
            escaped.push_str("\\x2e");
        } else if c.is_ascii_alphanumeric() || c == ':' || c == '_' || c == '.' {
            escaped.push(c);
        } else {
            escaped.push_str(&format!("\\x{:02x}", byte));
        }
    }

    format!("{}.mount", escaped)
}

/// Mount unit name for `mount_point`, preferring `systemd-escape`.
pub fn resolve_mount_unit(host: &dyn Host, mount_point: &Path) -> String {
    host.escape_mount_unit(mount_point).unwrap_or_else(|| {
        log::debug!("systemd-escape unavailable; escaping mount unit name locally");
        mount_point_to_unit_name(mount_point)
    })
}

/// Reloads systemd, enables and starts `unit`, in that order.
///
/// No retries; the first failure is returned.
pub fn activate(host: &dyn Host, unit: &str) -> Result<()> {
    log::info!("activating {}", unit);
    host.systemctl(&["daemon-reload"])?;
    host.systemctl(&["enable", unit])?;
    host.systemctl(&["start", unit])?;

    if let Some(status) = host.unit_status(unit) {
        log::info!("{}: {}", unit, status);
    }
    Ok(())
}
