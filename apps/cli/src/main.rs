//! Emergency Hub setup - provisions USB storage and the media server service.
//!
//! Run once as the user who will own the server. In interactive mode the
//! operator is asked before anything is installed, mounted or written; with
//! `--unattended` (or `EMERGENCY_HUB_UNATTENDED=1`) the run never blocks on
//! input and aborts instead of guessing.

mod logging;
mod prompt;

use std::path::PathBuf;

use clap::Parser;
use emergency_hub_core::config::{UNATTENDED_ENV, env_flag_enabled};
use emergency_hub_core::executor::ExecutionContext;
use emergency_hub_core::{
    ExecutionMode, Prompter, ProvisionConfig, Registration, Report, ScriptedPrompter, SystemHost,
    Verification, provision,
};

use crate::prompt::TerminalPrompter;

/// Emergency Hub storage and service setup.
#[derive(Parser)]
#[command(name = "emergency-hub-setup")]
#[command(about = "Set up USB storage and the Emergency Hub media server", long_about = None)]
struct Cli {
    /// Never prompt; abort when the drive choice is ambiguous.
    #[arg(short = 'y', long)]
    unattended: bool,

    /// Mount directory used when the chosen drive is not mounted yet.
    #[arg(long, value_name = "DIR")]
    media_root: Option<PathBuf>,

    /// Directory containing the media server sources.
    #[arg(long, value_name = "DIR")]
    working_dir: Option<PathBuf>,

    /// Port the media server listens on.
    #[arg(long)]
    port: Option<u16>,

    /// Name of the generated systemd service (without `.service`).
    #[arg(long)]
    service_name: Option<String>,

    /// Mount table to register the drive in.
    #[arg(long, value_name = "FILE")]
    fstab: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self, unattended_env: Option<&str>) -> ProvisionConfig {
        let defaults = ProvisionConfig::default();
        let mode = if self.unattended || env_flag_enabled(unattended_env) {
            ExecutionMode::Unattended
        } else {
            ExecutionMode::Interactive
        };

        ProvisionConfig {
            mode,
            media_root: self.media_root.unwrap_or(defaults.media_root),
            working_directory: self.working_dir.unwrap_or(defaults.working_directory),
            port: self.port.unwrap_or(defaults.port),
            service_name: self.service_name.unwrap_or(defaults.service_name),
            fstab_path: self.fstab.unwrap_or(defaults.fstab_path),
            ..defaults
        }
    }
}

fn print_report(report: &Report) {
    let entry = report.registration.entry();
    println!();
    println!("Emergency Hub is set up.");
    println!("  Drive:      {}", report.selection.device);
    println!("  Media root: {}", report.selection.media_root.display());
    match &report.registration {
        Registration::AlreadyPresent { .. } => {
            println!("  fstab:      already registered ({})", entry.fs_spec)
        }
        Registration::Appended { verification, .. } => {
            println!("  fstab:      added {}", entry.fs_spec);
            if let Verification::Failed(reason) = verification {
                println!(
                    "              (remount check failed: {}; the entry applies after a reboot)",
                    reason
                );
            }
        }
    }
    if report.registered_elsewhere() {
        println!(
            "  warning:    the drive is registered at {}; it will not be mounted at {} after a reboot",
            entry.mount_point.display(),
            report.selection.media_root.display()
        );
    }
    println!("  Service:    {} ({})", report.unit_name, report.unit_path.display());
    println!("  URL:        {}", report.url);
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let unattended_env = std::env::var(UNATTENDED_ENV).ok();
    let config = cli.into_config(unattended_env.as_deref());
    log::debug!("configuration: {:?}", config);
    let host = SystemHost::new(ExecutionContext::new());

    let mut prompter: Box<dyn Prompter> = if config.mode.is_unattended() {
        Box::new(ScriptedPrompter::new())
    } else {
        Box::new(TerminalPrompter)
    };

    match provision::run(&host, &config, prompter.as_mut()) {
        Ok(report) => print_report(&report),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}
