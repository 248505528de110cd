//! emergency-hub-core: Core library for Emergency Hub storage provisioning.
//!
//! This library turns a USB drive plugged into a single-board computer into
//! the persistent storage root of the Emergency Hub media server: it finds the
//! drive, mounts it, registers it in `/etc/fstab` and installs a systemd
//! service that only starts once the drive is mounted.
//!
//! # Modules
//!
//! - [`disk`]: Partition discovery using `lsblk`
//! - [`classify`]: Eligible-candidate filtering
//! - [`select`]: Selection policy (single candidate, single exFAT, operator)
//! - [`mount`]: Mount operations and ownership handling
//! - [`safety`]: Media root checks
//! - [`fstab`]: Fstab parsing and idempotent registration
//! - [`service`]: Service unit generation
//! - [`systemd`]: Systemd control and mount unit naming
//! - [`prereq`]: Interpreter and server dependency installation
//! - [`guard`]: Privilege, platform and identity checks
//! - [`host`]: Side-effect boundary ([`Host`], [`SystemHost`])
//! - [`prompt`]: Operator interaction ([`Prompter`])
//! - [`provision`]: The end-to-end pipeline
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use emergency_hub_core::{provision, ExecutionMode, ProvisionConfig, ScriptedPrompter, SystemHost};
//!
//! let config = ProvisionConfig {
//!     mode: ExecutionMode::Unattended,
//!     ..ProvisionConfig::default()
//! };
//! let host = SystemHost::default();
//! let mut prompter = ScriptedPrompter::new();
//!
//! let report = provision::run(&host, &config, &mut prompter).unwrap();
//! println!("serving {} at {}", report.selection.media_root.display(), report.url);
//! ```

pub mod classify;
pub mod config;
pub mod disk;
pub mod error;
pub mod executor;
pub mod fstab;
pub mod guard;
pub mod host;
pub mod mount;
pub mod prereq;
pub mod prompt;
pub mod provision;
pub mod safety;
pub mod select;
pub mod service;
pub mod systemd;

// Re-export commonly used types
pub use classify::CandidateSet;
pub use config::{ExecutionMode, ProvisionConfig};
pub use disk::BlockDevice;
pub use error::{Error, Result};
pub use fstab::{FstabEntry, Registration, Verification};
pub use guard::Identity;
pub use host::{Host, SystemHost};
pub use prompt::{Prompter, ScriptedPrompter};
pub use provision::Report;
pub use select::{Choice, Selection};
pub use service::ServiceDescriptor;
