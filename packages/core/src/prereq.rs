//! Prerequisite installation.
//!
//! The media server needs a Python interpreter, pip, and Flask. Missing pieces
//! are installed after confirmation (interactive) or straight away
//! (unattended).

use crate::config::ExecutionMode;
use crate::error::{Error, Result};
use crate::executor::ExecutionContext;
use crate::host::Host;
use crate::prompt::Prompter;

/// A command that must be on `PATH` and the package that provides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prerequisite {
    pub command: &'static str,
    pub package: &'static str,
}

/// Interpreter and package tool.
pub const SYSTEM_PREREQUISITES: [Prerequisite; 2] = [
    Prerequisite {
        command: "python3",
        package: "python3",
    },
    Prerequisite {
        command: "pip3",
        package: "python3-pip",
    },
];

/// Python package the server imports.
pub const SERVER_PYTHON_PACKAGE: &str = "flask";

/// Returns the prerequisites `host` lacks.
pub fn missing(host: &dyn Host) -> Vec<Prerequisite> {
    SYSTEM_PREREQUISITES
        .iter()
        .copied()
        .filter(|p| !host.has_command(p.command))
        .collect()
}

/// Asks (or, unattended, assumes) permission to install `what`.
fn approve(mode: ExecutionMode, prompter: &mut dyn Prompter, what: &str) -> Result<bool> {
    if mode.is_unattended() {
        log::info!("unattended mode: installing {}", what);
        return Ok(true);
    }
    prompter.confirm(&format!("{} is missing. Install it now?", what))
}

/// Makes sure the interpreter, pip and the server's Python package exist.
pub fn ensure(host: &dyn Host, mode: ExecutionMode, prompter: &mut dyn Prompter) -> Result<()> {
    let missing = missing(host);
    if !missing.is_empty() {
        let packages: Vec<&str> = missing.iter().map(|p| p.package).collect();
        let listing = packages.join(" ");
        if !approve(mode, prompter, &listing)? {
            return Err(Error::MissingPrerequisite {
                name: missing[0].command.to_string(),
            });
        }
        host.install_system_packages(&packages)?;
    }

    if !host.has_python_module(SERVER_PYTHON_PACKAGE) {
        if !approve(mode, prompter, SERVER_PYTHON_PACKAGE)? {
            return Err(Error::MissingPrerequisite {
                name: SERVER_PYTHON_PACKAGE.to_string(),
            });
        }
        host.install_python_package(SERVER_PYTHON_PACKAGE)?;
    }

    log::debug!("prerequisites satisfied");
    Ok(())
}

/// Installs packages with `apt-get`.
pub fn apt_install(ctx: &ExecutionContext, packages: &[&str]) -> Result<()> {
    let to_error = |e: Error| Error::PrerequisiteInstall {
        packages: packages.join(" "),
        message: e.to_string(),
    };

    ctx.run_privileged_checked("apt-get", &["update"]).map_err(to_error)?;

    let mut args = vec!["install", "-y"];
    args.extend(packages);
    ctx.run_privileged_checked("apt-get", &args).map_err(to_error)
}

/// Returns true if `python3 -c "import <module>"` succeeds.
pub fn python_can_import(ctx: &ExecutionContext, module: &str) -> bool {
    ctx.run("python3", &["-c", &format!("import {}", module)])
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Installs `package` into the user site with pip.
///
/// Distributions that mark the system interpreter as externally managed
/// reject this; the distribution package `python3-<package>` is used then.
pub fn pip_install_user(ctx: &ExecutionContext, package: &str) -> Result<()> {
    match ctx.run_stdout("pip3", &["install", "--user", package]) {
        Ok(_) => Ok(()),
        Err(e) => {
            log::warn!("pip3 install --user {} failed ({}); trying apt", package, e);
            let fallback = format!("python3-{}", package);
            apt_install(ctx, &[fallback.as_str()])
        }
    }
}
