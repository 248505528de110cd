//! Privilege and platform checks performed before anything else.

use std::path::PathBuf;

use nix::unistd::{Uid, User};

use crate::error::{Error, Result};

/// The account the media server will run as and own its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

/// Fails with [`Error::RunningAsRoot`] when `euid` is the superuser.
pub fn reject_root(euid: u32) -> Result<()> {
    if euid == 0 {
        return Err(Error::RunningAsRoot);
    }
    Ok(())
}

/// Returns true when `machine` (the `uname -m` value) matches `expected`.
///
/// 32-bit ARM reports several variants (`armv7l`, `armv6l`), so an `arm`
/// expectation accepts any of them.
pub fn arch_matches(machine: &str, expected: &str) -> bool {
    if machine == expected {
        return true;
    }
    match expected {
        "aarch64" | "arm64" => matches!(machine, "aarch64" | "arm64"),
        "arm" => machine.starts_with("arm"),
        _ => false,
    }
}

/// Machine architecture of the running kernel (`uname -m`).
pub fn machine() -> String {
    nix::sys::utsname::uname()
        .map(|u| u.machine().to_string_lossy().into_owned())
        .unwrap_or_else(|_| std::env::consts::ARCH.to_string())
}

/// Network name of this machine (`uname -n`).
pub fn hostname() -> String {
    nix::sys::utsname::uname()
        .map(|u| u.nodename().to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string())
}

/// Warns, without failing, when `machine` is not the expected architecture.
///
/// Returns whether the architecture matched.
pub fn check_architecture(machine: &str, expected: &str) -> bool {
    let matched = arch_matches(machine, expected);
    if !matched {
        log::warn!(
            "unexpected architecture {} (expected {}); continuing anyway",
            machine,
            expected
        );
    }
    matched
}

/// Looks up the invoking user in the passwd database.
///
/// Falls back to `$USER` and `$HOME` when the database has no entry.
pub fn current_identity() -> Result<Identity> {
    let uid = nix::unistd::getuid();
    let gid = nix::unistd::getgid().as_raw();

    match User::from_uid(uid) {
        Ok(Some(user)) => Ok(Identity {
            name: user.name,
            uid: uid.as_raw(),
            gid: user.gid.as_raw(),
            home: user.dir,
        }),
        Ok(None) => identity_from_env(uid, gid),
        Err(e) => Err(Error::UserLookup {
            message: e.to_string(),
        }),
    }
}

fn identity_from_env(uid: Uid, gid: u32) -> Result<Identity> {
    let name = std::env::var("USER").map_err(|_| Error::UserLookup {
        message: format!("uid {} has no passwd entry and $USER is unset", uid),
    })?;
    let home = dirs::home_dir().ok_or(Error::HomeDirNotFound)?;
    Ok(Identity {
        name,
        uid: uid.as_raw(),
        gid,
        home,
    })
}
