//! The provisioning pipeline.
//!
//! Each stage consumes the previous stage's value and nothing else:
//! devices -> candidates -> choice -> selection -> registration -> descriptor.
//! A failing stage aborts the run; nothing is rolled back.

use std::path::PathBuf;

use crate::config::ProvisionConfig;
use crate::error::{Error, Result};
use crate::fstab::{self, Registration};
use crate::guard::{self, Identity};
use crate::host::Host;
use crate::prompt::Prompter;
use crate::select::{self, Choice, Selection};
use crate::service::{self, ServiceDescriptor};
use crate::{classify, mount, prereq, safety, systemd};

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub identity: Identity,
    pub selection: Selection,
    /// True if this run mounted the device itself.
    pub mounted_now: bool,
    pub registration: Registration,
    pub descriptor: ServiceDescriptor,
    pub unit_name: String,
    pub unit_path: PathBuf,
    /// Where the media server answers, e.g. `http://raspberrypi:5000/`.
    pub url: String,
}

impl Report {
    /// True if the volume was already registered under another mount point.
    ///
    /// The service waits for the media root, which then has no fstab line
    /// of its own and will not be mounted after a reboot.
    pub fn registered_elsewhere(&self) -> bool {
        self.registration.entry().mount_point != self.selection.media_root
    }
}

/// Runs the full pipeline against `host`.
pub fn run(
    host: &dyn Host,
    config: &ProvisionConfig,
    prompter: &mut dyn Prompter,
) -> Result<Report> {
    guard::reject_root(host.effective_uid())?;
    guard::check_architecture(&host.machine(), &config.expected_arch);
    let identity = host.identity()?;
    log::info!(
        "provisioning for user {} (uid {}, {:?} mode)",
        identity.name,
        identity.uid,
        config.mode
    );

    prereq::ensure(host, config.mode, prompter)?;

    let devices = host.list_block_devices()?;
    let candidates = classify::classify(&devices)?;
    let choice = select::choose(&candidates, config.mode, prompter)?;

    let target = match &choice {
        Choice::Mounted { device, .. } => device.mountpoint.clone().unwrap_or_default(),
        Choice::Unmounted { .. } => config.media_root.clone(),
    };
    confirm_choice(config, prompter, &choice, &target)?;

    safety::reject_system_path(&target)?;
    fstab::check_target(host, &config.fstab_path, choice.device(), &target)?;

    let (selection, mounted_now) = match choice {
        Choice::Mounted { device, .. } => (
            Selection {
                device,
                media_root: target,
            },
            false,
        ),
        Choice::Unmounted { device, .. } => (
            mount::mount_selection(host, &device, &target, &identity)?,
            true,
        ),
    };

    safety::check_media_root(host, &selection.media_root)?;

    let registration = fstab::register(
        host,
        &config.fstab_path,
        &selection,
        &identity,
        config.device_timeout_secs,
    )?;

    let descriptor = service::generate(host, config, &identity, &selection.media_root)?;

    let unit_name = config.unit_name();
    systemd::activate(host, &unit_name)?;

    Ok(Report {
        identity,
        selection,
        mounted_now,
        registration,
        descriptor,
        unit_name,
        unit_path: config.unit_path(),
        url: format!("http://{}:{}/", host.hostname(), config.port),
    })
}

/// In interactive mode the operator confirms the choice before anything
/// is mounted or written.
fn confirm_choice(
    config: &ProvisionConfig,
    prompter: &mut dyn Prompter,
    choice: &Choice,
    target: &std::path::Path,
) -> Result<()> {
    if config.mode.is_unattended() {
        return Ok(());
    }

    prompter.show(&format!("Selected: {}", choice.device()));
    let question = format!(
        "Serve media from {} at {}?",
        choice.device().path.display(),
        target.display()
    );
    if !prompter.confirm(&question)? {
        return Err(Error::OperatorDeclined);
    }
    Ok(())
}
