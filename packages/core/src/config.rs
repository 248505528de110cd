//! Provisioning configuration.
//!
//! Every tunable of a run lives in [`ProvisionConfig`]. The CLI fills it from
//! flags and environment; tests build it directly.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default directory an unmounted selection is mounted on.
pub const DEFAULT_MEDIA_ROOT: &str = "/media/usb";

/// Environment variable the media server reads its storage root from.
pub const DEFAULT_STORAGE_ROOT_VAR: &str = "MEDIA_ROOT";

/// Environment variable that switches on unattended mode.
pub const UNATTENDED_ENV: &str = "EMERGENCY_HUB_UNATTENDED";

/// Default service name (without the `.service` suffix).
pub const DEFAULT_SERVICE_NAME: &str = "emergency-hub";

/// Directory holding system service units.
pub const SYSTEMD_UNIT_DIR: &str = "/etc/systemd/system";

/// Default HTTP port of the media server.
pub const DEFAULT_PORT: u16 = 5000;

/// How long systemd waits for the device at boot (seconds).
pub const DEFAULT_DEVICE_TIMEOUT_SECS: u32 = 10;

/// Number of mount checks the service performs before giving up.
pub const DEFAULT_MOUNT_WAIT_ATTEMPTS: u32 = 30;

/// Seconds between two mount checks.
pub const DEFAULT_MOUNT_WAIT_INTERVAL_SECS: u32 = 2;

/// How ambiguity between candidates is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Ask the operator.
    #[default]
    Interactive,
    /// Never ask; abort instead of guessing.
    Unattended,
}

impl ExecutionMode {
    /// Returns true for [`ExecutionMode::Unattended`].
    pub fn is_unattended(self) -> bool {
        self == ExecutionMode::Unattended
    }
}

/// Interprets the value of the unattended environment toggle.
///
/// `1`, `true`, `yes` and `on` (any case) enable it; anything else does not.
pub fn env_flag_enabled(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

/// Complete configuration of one provisioning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionConfig {
    pub mode: ExecutionMode,
    /// Mount directory used when the selected partition is not mounted yet.
    pub media_root: PathBuf,
    pub storage_root_var: String,
    pub fstab_path: PathBuf,
    pub service_name: String,
    /// Server launch command, resolved in `~/.local/bin` first, then `PATH`.
    pub server_command: String,
    pub port: u16,
    /// Directory holding the server sources.
    pub working_directory: PathBuf,
    pub device_timeout_secs: u32,
    pub mount_wait_attempts: u32,
    pub mount_wait_interval_secs: u32,
    /// Architecture the tool is meant for; others only get a warning.
    pub expected_arch: String,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            media_root: PathBuf::from(DEFAULT_MEDIA_ROOT),
            storage_root_var: DEFAULT_STORAGE_ROOT_VAR.to_string(),
            fstab_path: PathBuf::from(crate::fstab::FSTAB_PATH),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            server_command: "flask".to_string(),
            port: DEFAULT_PORT,
            working_directory: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            device_timeout_secs: DEFAULT_DEVICE_TIMEOUT_SECS,
            mount_wait_attempts: DEFAULT_MOUNT_WAIT_ATTEMPTS,
            mount_wait_interval_secs: DEFAULT_MOUNT_WAIT_INTERVAL_SECS,
            expected_arch: "aarch64".to_string(),
        }
    }
}

impl ProvisionConfig {
    /// Unit file name, e.g. `emergency-hub.service`.
    pub fn unit_name(&self) -> String {
        format!("{}.service", self.service_name)
    }

    /// Full path of the generated service descriptor.
    pub fn unit_path(&self) -> PathBuf {
        Path::new(SYSTEMD_UNIT_DIR).join(self.unit_name())
    }

    /// Arguments passed to the server launch command.
    pub fn server_args(&self) -> Vec<String> {
        vec![
            "--app".to_string(),
            "server".to_string(),
            "run".to_string(),
            "--host".to_string(),
            "0.0.0.0".to_string(),
            "--port".to_string(),
            self.port.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_flag_enabled() {
        assert!(env_flag_enabled(Some("1")));
        assert!(env_flag_enabled(Some("TRUE")));
        assert!(env_flag_enabled(Some(" yes ")));
        assert!(!env_flag_enabled(Some("0")));
        assert!(!env_flag_enabled(Some("")));
        assert!(!env_flag_enabled(None));
    }

    #[test]
    fn test_defaults() {
        let config = ProvisionConfig::default();
        assert_eq!(config.mode, ExecutionMode::Interactive);
        assert_eq!(config.media_root, PathBuf::from("/media/usb"));
        assert_eq!(config.storage_root_var, "MEDIA_ROOT");
        assert_eq!(
            config.unit_path(),
            PathBuf::from("/etc/systemd/system/emergency-hub.service")
        );
    }

    #[test]
    fn test_server_args_carry_port() {
        let config = ProvisionConfig {
            port: 8080,
            ..ProvisionConfig::default()
        };
        let args = config.server_args();
        assert_eq!(args.last().map(String::as_str), Some("8080"));
    }

    #[test]
    fn test_mode_serializes_lowercase() {
        let json = serde_json::to_string(&ExecutionMode::Unattended).unwrap();
        assert_eq!(json, "\"unattended\"");
    }
}
