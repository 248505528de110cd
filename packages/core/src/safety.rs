//! Refuses media roots that would put system state at risk.
//!
//! Checked right before the mount table is touched, in every mode.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::host::Host;

/// Paths that may never become the media root.
pub const FORBIDDEN_MEDIA_ROOTS: [&str; 3] = ["/", "/home", "/boot"];

/// Lexically normalises `path`: drops `.`, resolves `..`, collapses slashes.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::ParentDir => {
                normalized.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    normalized
}

/// Fails with [`Error::ForbiddenMountPoint`] for a core system path.
pub fn reject_system_path(path: &Path) -> Result<()> {
    let normalized = normalize(path);
    if !path.is_absolute()
        || FORBIDDEN_MEDIA_ROOTS
            .iter()
            .any(|forbidden| normalized == Path::new(forbidden))
    {
        return Err(Error::ForbiddenMountPoint {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Full check: not a system path, and an active mount point.
pub fn check_media_root(host: &dyn Host, path: &Path) -> Result<()> {
    reject_system_path(path)?;
    if !host.is_mount_point(path) {
        return Err(Error::NotAMountPoint {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}
