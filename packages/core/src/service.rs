//! Service descriptor generation.
//!
//! Renders the systemd unit that runs the media server. The unit is ordered
//! after, and requires, the mount unit of the media root; an `ExecStartPre`
//! poll additionally waits for the mount to actually appear.

use std::path::{Path, PathBuf};

use crate::config::ProvisionConfig;
use crate::error::{Error, Result};
use crate::guard::Identity;
use crate::host::Host;
use crate::systemd;

/// Delay before systemd restarts a crashed server (seconds).
pub const RESTART_SEC: u32 = 5;

/// Everything that goes into the generated unit file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub description: String,
    pub run_as_user: String,
    pub working_directory: PathBuf,
    /// Name and value of the storage root variable.
    pub environment: (String, PathBuf),
    pub exec_start: Vec<String>,
    /// Mount unit the service is ordered after and requires.
    pub mount_unit: String,
    pub media_root: PathBuf,
    pub wait_attempts: u32,
    pub wait_interval_secs: u32,
    pub restart_policy: String,
}

impl ServiceDescriptor {
    /// Shell snippet polling for the mount point with a bounded number of tries.
    ///
    /// `$` is doubled because systemd expands variables in `Exec*` lines.
    pub fn wait_script(&self) -> String {
        let root = escape_exec(&shell_quote(&self.media_root.to_string_lossy()));
        format!(
            "/bin/sh -c 'i=0; while [ $$i -lt {attempts} ]; do mountpoint -q {root} && exit 0; i=$$((i+1)); sleep {interval}; done; echo \"media root not mounted\" >&2; exit 1'",
            attempts = self.wait_attempts,
            root = root,
            interval = self.wait_interval_secs,
        )
    }

    /// Renders the unit file.
    pub fn render(&self) -> String {
        let (var, value) = &self.environment;
        format!(
            "[Unit]\n\
Description={description}\n\
After=network-online.target {mount}\n\
Wants=network-online.target\n\
Requires={mount}\n\
\n\
[Service]\n\
Type=simple\n\
User={user}\n\
WorkingDirectory={workdir}\n\
Environment=\"{var}={value}\"\n\
ExecStartPre={wait}\n\
ExecStart={exec}\n\
Restart={restart}\n\
RestartSec={restart_sec}\n\
\n\
[Install]\n\
WantedBy=multi-user.target\n",
            description = self.description,
            mount = self.mount_unit,
            user = self.run_as_user,
            workdir = escape_specifiers(&self.working_directory.to_string_lossy()),
            var = var,
            value = escape_quoted(&value.to_string_lossy()),
            wait = self.wait_script(),
            exec = self
                .exec_start
                .iter()
                .map(|arg| escape_exec(arg))
                .collect::<Vec<_>>()
                .join(" "),
            restart = self.restart_policy,
            restart_sec = RESTART_SEC,
        )
    }
}

/// Double-quotes `value` for `/bin/sh` when it holds anything beyond a plain path.
fn shell_quote(value: &str) -> String {
    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "/._-".contains(c))
    {
        return value.to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Escapes `%` so systemd does not expand it as a specifier.
fn escape_specifiers(value: &str) -> String {
    value.replace('%', "%%")
}

/// Escapes a value for a double-quoted unit setting such as `Environment=`.
///
/// Only specifiers are expanded there, not `$` variables.
fn escape_quoted(value: &str) -> String {
    escape_specifiers(&value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Escapes one word of an `Exec*` line: backslashes, specifiers and variables.
fn escape_exec(value: &str) -> String {
    escape_specifiers(&value.replace('\\', "\\\\")).replace('$', "$$")
}

/// Finds the server launch command.
///
/// `~/.local/bin/<name>` wins (that is where `pip install --user` puts it);
/// otherwise `lookup` searches `PATH`.
pub fn resolve_launch_command(
    name: &str,
    home: &Path,
    lookup: impl Fn(&str) -> Option<PathBuf>,
) -> Option<PathBuf> {
    let local = home.join(".local").join("bin").join(name);
    if local.is_file() {
        return Some(local);
    }
    lookup(name)
}

/// Builds the descriptor for this run.
pub fn describe(
    config: &ProvisionConfig,
    identity: &Identity,
    media_root: &Path,
    launch_command: &Path,
    mount_unit: String,
) -> ServiceDescriptor {
    let mut exec_start = vec![launch_command.to_string_lossy().to_string()];
    exec_start.extend(config.server_args());

    ServiceDescriptor {
        description: "Emergency Hub media server".to_string(),
        run_as_user: identity.name.clone(),
        working_directory: config.working_directory.clone(),
        environment: (config.storage_root_var.clone(), media_root.to_path_buf()),
        exec_start,
        mount_unit,
        media_root: media_root.to_path_buf(),
        wait_attempts: config.mount_wait_attempts,
        wait_interval_secs: config.mount_wait_interval_secs,
        restart_policy: "on-failure".to_string(),
    }
}

/// Generates the descriptor and writes it, replacing any previous one.
pub fn generate(
    host: &dyn Host,
    config: &ProvisionConfig,
    identity: &Identity,
    media_root: &Path,
) -> Result<ServiceDescriptor> {
    let launch_command = host
        .resolve_command(&config.server_command, &identity.home)
        .ok_or_else(|| Error::LaunchCommandNotFound {
            command: config.server_command.clone(),
        })?;
    let mount_unit = systemd::resolve_mount_unit(host, media_root);

    let descriptor = describe(config, identity, media_root, &launch_command, mount_unit);
    let unit_path = config.unit_path();

    log::info!(
        "writing {} (after {})",
        unit_path.display(),
        descriptor.mount_unit
    );
    host.write_unit(&unit_path, &descriptor.render())?;
    Ok(descriptor)
}
