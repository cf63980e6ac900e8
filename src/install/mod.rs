//! Systemd installation of the `rclone-sync` service.
//!
//! The install sequence is fixed: disable, copy the unit file, daemon-reload,
//! enable, start. Each step is checked and the sequence stops at the first
//! failure.
//!
//! # Module Structure
//!
//! - `privileges` - Direct execution vs. a wrapper such as `sudo`
//! - `file_ops` - Atomic file operations
//! - `unit` - Unit file generation for the sync daemon
//! - `service_control` - `systemctl` operations and failure classification

use std::fs;
use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

mod file_ops;
mod privileges;
mod service_control;
mod unit;

pub use privileges::{Elevation, is_root};
pub use service_control::{ServiceControl, ServiceState};
pub use unit::{UnitSpec, generate_unit_content, write_unit_file};

use crate::config::InstallConfig;
use crate::error::{InstallerError, Step};
use crate::process::{CommandRunner, CommandSpec};

/// Order of the install sequence.
pub const INSTALL_STEPS: [Step; 5] = [
    Step::Disable,
    Step::Copy,
    Step::Reload,
    Step::Enable,
    Step::Start,
];

/// Order of the uninstall sequence.
pub const UNINSTALL_STEPS: [Step; 4] = [Step::Stop, Step::Disable, Step::Remove, Step::Reload];

#[derive(Debug, Clone, Copy)]
pub struct InstallOptions {
    /// Start the unit after enabling it
    pub start: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self { start: true }
    }
}

/// A step together with the command it will run, for `--dry-run` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub step: Step,
    pub command: String,
}

#[derive(Debug, Clone)]
pub struct InstallReport {
    pub destination: PathBuf,
    pub steps: Vec<Step>,
    pub state: ServiceState,
}

/// How long `install` waits for an activating unit to come up.
const SETTLE_POLLS: u32 = 5;
const SETTLE_INTERVAL: Duration = Duration::from_secs(1);

pub struct Installer<R> {
    config: InstallConfig,
    control: ServiceControl<R>,
    settle_polls: u32,
    settle_interval: Duration,
}

impl<R: CommandRunner> Installer<R> {
    pub fn new(
        config: InstallConfig,
        elevation: Elevation,
        runner: R,
    ) -> Result<Self, InstallerError> {
        config.validate()?;
        let control = ServiceControl::new(runner, &config.systemctl, elevation, &config.unit_name);
        Ok(Self {
            config,
            control,
            settle_polls: SETTLE_POLLS,
            settle_interval: SETTLE_INTERVAL,
        })
    }

    /// Re-check an activating unit up to `polls` more times, `interval` apart.
    pub fn with_settle(mut self, polls: u32, interval: Duration) -> Self {
        self.settle_polls = polls;
        self.settle_interval = interval;
        self
    }

    pub fn config(&self) -> &InstallConfig {
        &self.config
    }

    /// Commands `install` would run, in order.
    pub fn install_plan(&self, opts: &InstallOptions) -> Vec<PlannedStep> {
        INSTALL_STEPS
            .iter()
            .filter(|step| opts.start || **step != Step::Start)
            .map(|step| self.planned(*step))
            .collect()
    }

    /// Commands `uninstall` would run, in order.
    pub fn uninstall_plan(&self) -> Vec<PlannedStep> {
        UNINSTALL_STEPS.iter().map(|step| self.planned(*step)).collect()
    }

    /// Run the install sequence, stopping at the first failed step.
    pub fn install(&self, opts: &InstallOptions) -> Result<InstallReport, InstallerError> {
        let source = self.preflight()?;
        let destination = self.config.destination();
        let mut steps = Vec::with_capacity(INSTALL_STEPS.len());

        self.control.disable()?;
        steps.push(Step::Disable);

        self.copy_unit_file(&source)?;
        steps.push(Step::Copy);

        self.control.reload_daemon()?;
        steps.push(Step::Reload);

        self.control.enable()?;
        steps.push(Step::Enable);

        if opts.start {
            self.control.start()?;
            steps.push(Step::Start);
        }

        let state = if opts.start {
            self.settled_status()?
        } else {
            self.control.status()?
        };
        if opts.start && state != ServiceState::EnabledActive {
            return Err(InstallerError::StartFailed {
                unit: self.config.unit_name.clone(),
                detail: format!("unit is {state} after start"),
            });
        }

        log::info!(
            "Installed {} to {} ({})",
            self.config.unit_name,
            destination.display(),
            state
        );
        Ok(InstallReport {
            destination,
            steps,
            state,
        })
    }

    /// Stop, disable and remove the unit, then reload systemd.
    pub fn uninstall(&self) -> Result<(), InstallerError> {
        self.control.stop()?;
        self.control.disable()?;
        self.remove_unit_file()?;
        self.control.reload_daemon()?;
        log::info!("Uninstalled {}", self.config.unit_name);
        Ok(())
    }

    pub fn status(&self) -> Result<ServiceState, InstallerError> {
        self.control.status()
    }

    /// Status after `start`, giving a unit that is still activating time to
    /// finish. A unit stuck in a restart loop stays `EnabledActivating`.
    fn settled_status(&self) -> Result<ServiceState, InstallerError> {
        let mut state = self.control.status()?;
        for _ in 0..self.settle_polls {
            if state != ServiceState::EnabledActivating {
                break;
            }
            log::debug!("{} is still activating", self.config.unit_name);
            thread::sleep(self.settle_interval);
            state = self.control.status()?;
        }
        Ok(state)
    }

    /// Resolve the source unit file before anything touches the system.
    fn preflight(&self) -> Result<PathBuf, InstallerError> {
        let source = &self.config.source;
        let meta = fs::metadata(source).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => InstallerError::MissingUnitFile(source.clone()),
            _ => InstallerError::System(format!("Failed to stat {}: {}", source.display(), e)),
        })?;
        if !meta.is_file() {
            return Err(InstallerError::MissingUnitFile(source.clone()));
        }
        // sudo and install(1) must see the same file regardless of cwd
        fs::canonicalize(source).map_err(|e| {
            InstallerError::System(format!("Failed to resolve {}: {}", source.display(), e))
        })
    }

    fn copy_unit_file(&self, source: &std::path::Path) -> Result<(), InstallerError> {
        let destination = self.config.destination();
        if self.control.elevation().is_direct() {
            log::info!(
                "{}: {} -> {}",
                Step::Copy,
                source.display(),
                destination.display()
            );
            return file_ops::copy_file_atomic(source, &destination);
        }
        let cmd = self.copy_command(&source.to_string_lossy());
        self.control.run_step(Step::Copy, &cmd).map(|_| ())
    }

    fn remove_unit_file(&self) -> Result<(), InstallerError> {
        let destination = self.config.destination();
        if self.control.elevation().is_direct() {
            log::info!("{}: {}", Step::Remove, destination.display());
            return file_ops::remove_file_if_exists(&destination);
        }
        self.control
            .run_step(Step::Remove, &self.remove_command())
            .map(|_| ())
    }

    fn copy_command(&self, source: &str) -> CommandSpec {
        let mode = format!("{:o}", file_ops::UNIT_FILE_MODE);
        self.control.elevation().command("install").args([
            "-m".to_string(),
            mode,
            "--".to_string(),
            source.to_string(),
            self.config.destination().to_string_lossy().into_owned(),
        ])
    }

    fn remove_command(&self) -> CommandSpec {
        self.control.elevation().command("rm").args([
            "-f".to_string(),
            "--".to_string(),
            self.config.destination().to_string_lossy().into_owned(),
        ])
    }

    fn planned(&self, step: Step) -> PlannedStep {
        let direct = self.control.elevation().is_direct();
        let command = match step {
            // root copies and removes in-process instead of spawning a command
            Step::Copy if direct => format!(
                "copy {} -> {} (in-process, mode {:o})",
                self.config.source.display(),
                self.config.destination().display(),
                file_ops::UNIT_FILE_MODE
            ),
            Step::Remove if direct => format!(
                "remove {} (in-process)",
                self.config.destination().display()
            ),
            Step::Copy => self
                .copy_command(&self.config.source.to_string_lossy())
                .to_string(),
            Step::Remove => self.remove_command().to_string(),
            _ => self
                .control
                .command_for(step)
                .map(|cmd| cmd.to_string())
                .unwrap_or_default(),
        };
        PlannedStep { step, command }
    }
}
