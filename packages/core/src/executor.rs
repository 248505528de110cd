//! Command execution abstraction with privilege escalation support.
//!
//! The provisioning tool runs as an ordinary user and only escalates the
//! individual commands that touch system state (mount, fstab, systemd).

use std::io::Write;
use std::process::{Command, Output, Stdio};

use crate::error::{Error, IoResultExt, Result};

/// Privilege escalation method for executing commands that require root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrivilegeEscalation {
    /// Execute directly without privilege escalation.
    None,
    /// Use `sudo` for TTY-based privilege escalation.
    #[default]
    Sudo,
}

/// Execution context for running system commands.
///
/// # Example
///
/// ```
/// use emergency_hub_core::executor::{ExecutionContext, PrivilegeEscalation};
///
/// let ctx = ExecutionContext::default();
/// assert_eq!(ctx.escalation(), PrivilegeEscalation::Sudo);
///
/// // Already privileged (e.g. inside a test container)
/// let direct = ExecutionContext::direct();
/// assert_eq!(direct.escalation(), PrivilegeEscalation::None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    escalation: PrivilegeEscalation,
}

impl ExecutionContext {
    /// Creates a new execution context that escalates with `sudo`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an execution context that never escalates.
    pub fn direct() -> Self {
        Self {
            escalation: PrivilegeEscalation::None,
        }
    }

    /// Returns the current privilege escalation method.
    pub fn escalation(&self) -> PrivilegeEscalation {
        self.escalation
    }

    /// Runs an unprivileged command and returns its output, whatever the status.
    pub fn run(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        run_command(cmd, args)
    }

    /// Runs an unprivileged command and returns trimmed stdout on success.
    pub fn run_stdout(&self, cmd: &str, args: &[&str]) -> Result<String> {
        let output = run_command(cmd, args)?;
        check_status(cmd, &output)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Executes a command that requires root privileges.
    pub fn run_privileged(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        match self.escalation {
            PrivilegeEscalation::None => run_command(cmd, args),
            PrivilegeEscalation::Sudo => run_with_wrapper("sudo", cmd, args),
        }
    }

    /// Executes a command that requires root privileges, checking for success.
    pub fn run_privileged_checked(&self, cmd: &str, args: &[&str]) -> Result<()> {
        let output = self.run_privileged(cmd, args)?;
        check_status(cmd, &output)
    }

    /// Writes content to a file with root privileges, replacing it.
    pub fn write_file_privileged(&self, path: &str, content: &str) -> Result<()> {
        self.tee(path, content, false)
    }

    /// Appends content to a file with root privileges.
    pub fn append_file_privileged(&self, path: &str, content: &str) -> Result<()> {
        self.tee(path, content, true)
    }

    /// Creates a directory with root privileges.
    pub fn mkdir_privileged(&self, path: &str) -> Result<()> {
        self.run_privileged_checked("mkdir", &["-p", path])
    }

    fn tee(&self, path: &str, content: &str, append: bool) -> Result<()> {
        if self.escalation == PrivilegeEscalation::None {
            let result = if append {
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .and_then(|mut file| file.write_all(content.as_bytes()))
            } else {
                std::fs::write(path, content)
            };
            return result.file_write_context(path);
        }

        let mut args = vec!["tee"];
        if append {
            args.push("-a");
        }
        args.push(path);

        let mut child = Command::new("sudo")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .command_context("sudo tee")?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(content.as_bytes()).file_write_context(path)?;
        }

        let status = child.wait().command_context("sudo tee")?;

        if !status.success() {
            return Err(Error::FileWrite {
                path: path.into(),
                source: std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "failed to write file with elevated privileges",
                ),
            });
        }

        Ok(())
    }
}

/// Converts a non-zero exit status into [`Error::CommandExit`].
fn check_status(cmd: &str, output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    Err(Error::CommandExit {
        command: cmd.to_string(),
        code: output.status.code().unwrap_or(-1),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Runs a command directly without any wrapper.
fn run_command(cmd: &str, args: &[&str]) -> Result<Output> {
    log::debug!("running {} {}", cmd, args.join(" "));
    Command::new(cmd)
        .args(args)
        .output()
        .command_context(cmd)
}

/// Runs a command with a privilege escalation wrapper.
fn run_with_wrapper(wrapper: &str, cmd: &str, args: &[&str]) -> Result<Output> {
    let mut wrapper_args = vec![cmd];
    wrapper_args.extend(args);

    log::debug!("running {} {}", wrapper, wrapper_args.join(" "));
    Command::new(wrapper)
        .args(&wrapper_args)
        .output()
        .command_context(format!("{} {}", wrapper, cmd))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_context_uses_sudo() {
        let ctx = ExecutionContext::default();
        assert_eq!(ctx.escalation(), PrivilegeEscalation::Sudo);
    }

    #[test]
    fn test_direct_context() {
        let ctx = ExecutionContext::direct();
        assert_eq!(ctx.escalation(), PrivilegeEscalation::None);
    }

    #[test]
    fn test_direct_append_creates_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fstab");
        let path_str = path.to_str().unwrap();
        let ctx = ExecutionContext::direct();

        ctx.append_file_privileged(path_str, "first\n").unwrap();
        ctx.append_file_privileged(path_str, "second\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_direct_write_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unit.service");
        let path_str = path.to_str().unwrap();
        let ctx = ExecutionContext::direct();

        ctx.write_file_privileged(path_str, "old").unwrap();
        ctx.write_file_privileged(path_str, "new").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }
}
