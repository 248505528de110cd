//! Unified error types for the emergency-hub-core library.
//!
//! Uses SNAFU for context-rich error handling, especially useful when the same
//! underlying error type (like `std::io::Error`) appears in different contexts.

use snafu::{ResultExt, Snafu};
use std::path::PathBuf;

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all provisioning operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The tool was started by the superuser.
    #[snafu(display(
        "refusing to run as root; run as the user who will own the media server (sudo is used where needed)"
    ))]
    RunningAsRoot,

    /// Could not determine the invoking user.
    #[snafu(display("could not determine the invoking user: {message}"))]
    UserLookup { message: String },

    /// A required tool is missing and was not installed.
    #[snafu(display("missing prerequisite '{name}'"))]
    MissingPrerequisite { name: String },

    /// Installing a prerequisite failed.
    #[snafu(display("failed to install {packages}: {message}"))]
    PrerequisiteInstall { packages: String, message: String },

    /// Failed to execute a system command.
    #[snafu(display("failed to execute command '{command}'"))]
    CommandExecution {
        command: String,
        source: std::io::Error,
    },

    /// Command executed but returned non-zero exit code.
    #[snafu(display("command '{command}' exited with code {code}: {stderr}"))]
    CommandExit {
        command: String,
        code: i32,
        stderr: String,
    },

    /// Failed to parse lsblk JSON output.
    #[snafu(display("failed to parse lsblk output: {message}"))]
    LsblkParse { message: String },

    /// No partition passed the eligibility filter.
    #[snafu(display(
        "no eligible USB or removable partition with a filesystem was found; plug in the storage device and retry"
    ))]
    NoEligibleDevices,

    /// The operator entered something that is not a valid candidate number.
    #[snafu(display("invalid selection '{input}': expected a number between 1 and {max}"))]
    InvalidSelection { input: String, max: usize },

    /// More than one candidate is eligible and no heuristic applies.
    #[snafu(display(
        "{count} {set} candidates found and none is uniquely exFAT; refusing to guess in unattended mode"
    ))]
    AmbiguousSelection { count: usize, set: String },

    /// The operator declined to continue.
    #[snafu(display("aborted by operator"))]
    OperatorDeclined,

    /// Reading operator input failed.
    #[snafu(display("failed to read operator input: {message}"))]
    Prompt { message: String },

    /// The target path is a core system mount point.
    #[snafu(display("refusing to use system path {} as the media root", path.display()))]
    ForbiddenMountPoint { path: PathBuf },

    /// The target path is not an active mount point.
    #[snafu(display("{} is not an active mount point", path.display()))]
    NotAMountPoint { path: PathBuf },

    /// The target is already registered in fstab for a different volume.
    #[snafu(display(
        "{} is already registered in fstab for {fs_spec}; remove that line or pick another media root",
        path.display()
    ))]
    TargetConflict { path: PathBuf, fs_spec: String },

    /// Mount operation failed.
    #[snafu(display("failed to mount {device} at {}: {message}", path.display()))]
    Mount {
        device: String,
        path: PathBuf,
        message: String,
    },

    /// Unmount operation failed.
    #[snafu(display("failed to unmount {}: {message}", path.display()))]
    Unmount { path: PathBuf, message: String },

    /// Fstab file not found or cannot be read.
    #[snafu(display("failed to read fstab at {}", path.display()))]
    FstabRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write a system file (fstab, service unit).
    #[snafu(display("failed to write {}", path.display()))]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse fstab entry.
    #[snafu(display("failed to parse fstab entry: {message}"))]
    FstabParse { message: String },

    /// The server launch command could not be found.
    #[snafu(display("server command '{command}' not found in ~/.local/bin or PATH"))]
    LaunchCommandNotFound { command: String },

    /// Systemd operation failed.
    #[snafu(display("systemd operation failed: {message}"))]
    Systemd { message: String },

    /// Home directory not found.
    #[snafu(display("could not determine home directory"))]
    HomeDirNotFound,
}

impl Error {
    /// Process exit code for this error class.
    ///
    /// - 2: usage errors (bad selection)
    /// - 3: precondition violations (root, forbidden, unmounted or taken target)
    /// - 4: nothing to select, or an unresolved ambiguity
    /// - 5: environment gaps that were not repaired
    /// - 1: everything else (mutation and external command failures)
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidSelection { .. } | Error::OperatorDeclined | Error::Prompt { .. } => 2,
            Error::RunningAsRoot
            | Error::ForbiddenMountPoint { .. }
            | Error::NotAMountPoint { .. }
            | Error::TargetConflict { .. } => 3,
            Error::NoEligibleDevices | Error::AmbiguousSelection { .. } => 4,
            Error::MissingPrerequisite { .. }
            | Error::PrerequisiteInstall { .. }
            | Error::LaunchCommandNotFound { .. } => 5,
            _ => 1,
        }
    }
}

/// Extension trait for adding context to io::Error results.
pub trait IoResultExt<T> {
    /// Add context for command execution errors.
    fn command_context(self, command: impl Into<String>) -> Result<T>;

    /// Add context for fstab read errors.
    fn fstab_read_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for system file write errors.
    fn file_write_context(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn command_context(self, command: impl Into<String>) -> Result<T> {
        self.context(CommandExecutionSnafu {
            command: command.into(),
        })
    }

    fn fstab_read_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(FstabReadSnafu { path: path.into() })
    }

    fn file_write_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(FileWriteSnafu { path: path.into() })
    }
}
