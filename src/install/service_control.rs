//! Systemd service control operations.
//!
//! This module wraps the `systemctl` subcommands the installer needs and turns
//! their exit status and diagnostics into [`InstallerError`] values.

use std::fmt;

use super::privileges::{Elevation, is_authorization_failure};
use crate::error::{InstallerError, Step};
use crate::process::{CommandOutput, CommandRunner, CommandSpec};

/// systemd's ways of saying the unit is unknown, which `disable` and `stop` tolerate.
const UNKNOWN_UNIT_MARKERS: &[&str] = &[
    "does not exist",
    "not loaded",
    "No such file or directory",
    "not found",
];

/// Persisted state of the unit, as driven by the installer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    NotInstalled,
    Disabled,
    EnabledInactive,
    /// Enabled and still starting up (or reloading); not yet running.
    EnabledActivating,
    EnabledActive,
    Failed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::NotInstalled => "not installed",
            ServiceState::Disabled => "disabled",
            ServiceState::EnabledInactive => "enabled, inactive",
            ServiceState::EnabledActivating => "enabled, activating",
            ServiceState::EnabledActive => "enabled, active",
            ServiceState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Enablement {
    Enabled,
    Disabled,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    Active,
    Activating,
    Inactive,
    Failed,
}

/// `systemctl` bound to one unit.
pub struct ServiceControl<R> {
    runner: R,
    systemctl: String,
    elevation: Elevation,
    unit: String,
}

impl<R: CommandRunner> ServiceControl<R> {
    pub fn new(runner: R, systemctl: &str, elevation: Elevation, unit: &str) -> Self {
        Self {
            runner,
            systemctl: systemctl.to_string(),
            elevation,
            unit: unit.to_string(),
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn elevation(&self) -> &Elevation {
        &self.elevation
    }

    /// The privileged `systemctl` invocation for a step.
    pub(crate) fn command_for(&self, step: Step) -> Option<CommandSpec> {
        let cmd = self.elevation.command(&self.systemctl);
        let cmd = match step {
            Step::Disable => cmd.args(["disable", self.unit.as_str()]),
            Step::Reload => cmd.arg("daemon-reload"),
            Step::Enable => cmd.args(["enable", self.unit.as_str()]),
            Step::Start => cmd.args(["start", self.unit.as_str()]),
            Step::Stop => cmd.args(["stop", self.unit.as_str()]),
            Step::Copy | Step::Remove => return None,
        };
        Some(cmd)
    }

    /// Disable the unit; an unknown or already disabled unit is not an error.
    pub fn disable(&self) -> Result<(), InstallerError> {
        self.tolerant_step(Step::Disable)
    }

    /// Stop the unit; an unknown or inactive unit is not an error.
    pub fn stop(&self) -> Result<(), InstallerError> {
        self.tolerant_step(Step::Stop)
    }

    /// Reload systemd daemon to pick up changes
    pub fn reload_daemon(&self) -> Result<(), InstallerError> {
        self.strict_step(Step::Reload)
    }

    pub fn enable(&self) -> Result<(), InstallerError> {
        self.strict_step(Step::Enable)
    }

    pub fn start(&self) -> Result<(), InstallerError> {
        self.strict_step(Step::Start)
    }

    /// Query enablement and activity without elevation.
    pub fn status(&self) -> Result<ServiceState, InstallerError> {
        let enablement = self.query_enablement()?;
        let activity = self.query_activity()?;
        Ok(match (enablement, activity) {
            (_, Activity::Failed) => ServiceState::Failed,
            (Enablement::NotFound, _) => ServiceState::NotInstalled,
            (Enablement::Disabled, _) => ServiceState::Disabled,
            (Enablement::Enabled, Activity::Active) => ServiceState::EnabledActive,
            (Enablement::Enabled, Activity::Activating) => ServiceState::EnabledActivating,
            (Enablement::Enabled, Activity::Inactive) => ServiceState::EnabledInactive,
        })
    }

    /// Run a command as part of `step` and classify its failure.
    pub(crate) fn run_step(
        &self,
        step: Step,
        cmd: &CommandSpec,
    ) -> Result<CommandOutput, InstallerError> {
        log::info!("{}: {}", step, cmd);
        let output = self.runner.run(cmd).map_err(|e| InstallerError::Spawn {
            program: cmd.program.clone(),
            source: e,
        })?;

        if output.success() {
            return Ok(output);
        }
        Err(self.classify_failure(step, &output))
    }

    fn strict_step(&self, step: Step) -> Result<(), InstallerError> {
        let cmd = self.step_command(step)?;
        self.run_step(step, &cmd).map(|_| ())
    }

    fn tolerant_step(&self, step: Step) -> Result<(), InstallerError> {
        let cmd = self.step_command(step)?;
        match self.run_step(step, &cmd) {
            Ok(_) => Ok(()),
            Err(InstallerError::StepFailed { detail, .. })
                if UNKNOWN_UNIT_MARKERS.iter().any(|m| detail.contains(m)) =>
            {
                log::debug!("{} skipped, unit not known to systemd: {}", step, detail);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn step_command(&self, step: Step) -> Result<CommandSpec, InstallerError> {
        self.command_for(step).ok_or_else(|| {
            InstallerError::System(format!("{step} is not a systemctl operation"))
        })
    }

    fn classify_failure(&self, step: Step, output: &CommandOutput) -> InstallerError {
        let stderr = output.stderr_lossy();
        let detail = match stderr.trim() {
            "" => match output.code {
                Some(code) => format!("exit code {code}"),
                None => "terminated by signal".to_string(),
            },
            msg => msg.to_string(),
        };

        if is_authorization_failure(&stderr) {
            return InstallerError::PermissionDenied(format!("{step}: {detail}"));
        }

        let unit = self.unit.clone();
        match step {
            Step::Reload | Step::Enable => InstallerError::UnitRejected { step, unit, detail },
            Step::Start => InstallerError::StartFailed { unit, detail },
            _ => InstallerError::StepFailed { step, detail },
        }
    }

    fn query(&self, subcommand: &str) -> Result<CommandOutput, InstallerError> {
        let cmd = CommandSpec::new(&self.systemctl).args([subcommand, self.unit.as_str()]);
        log::debug!("{}", cmd);
        self.runner.run(&cmd).map_err(|e| InstallerError::Spawn {
            program: cmd.program.clone(),
            source: e,
        })
    }

    fn query_enablement(&self) -> Result<Enablement, InstallerError> {
        let output = self.query("is-enabled")?;
        let stdout = output.stdout_lossy();
        Ok(match stdout.trim() {
            "enabled" | "enabled-runtime" | "static" | "indirect" | "alias" | "generated"
            | "linked" | "linked-runtime" => Enablement::Enabled,
            "" | "not-found" => Enablement::NotFound,
            _ => Enablement::Disabled,
        })
    }

    fn query_activity(&self) -> Result<Activity, InstallerError> {
        // is-active exits 3 for inactive units, so only stdout matters here
        let output = self.query("is-active")?;
        let stdout = output.stdout_lossy();
        Ok(match stdout.trim() {
            "active" => Activity::Active,
            "activating" | "reloading" => Activity::Activating,
            "failed" => Activity::Failed,
            _ => Activity::Inactive,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io;

    use super::*;

    /// Replies keyed on the systemctl subcommand.
    struct Scripted {
        replies: Vec<(&'static str, CommandOutput)>,
        seen: RefCell<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<(&'static str, CommandOutput)>) -> Self {
            Self {
                replies,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl CommandRunner for Scripted {
        fn run(&self, cmd: &CommandSpec) -> io::Result<CommandOutput> {
            self.seen.borrow_mut().push(cmd.to_string());
            let sub = cmd
                .args
                .iter()
                .find(|a| !a.starts_with('-') && *a != "systemctl")
                .cloned()
                .unwrap_or_default();
            Ok(self
                .replies
                .iter()
                .find(|(k, _)| *k == sub)
                .map(|(_, out)| out.clone())
                .unwrap_or(ok("")))
        }
    }

    fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            code: Some(0),
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        }
    }

    fn fail(code: i32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            code: Some(code),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    fn control(runner: &Scripted) -> ServiceControl<&Scripted> {
        ServiceControl::new(runner, "systemctl", Elevation::Direct, "rclone-sync.service")
    }

    #[test]
    fn disable_tolerates_unknown_unit() {
        let runner = Scripted::new(vec![(
            "disable",
            fail(
                1,
                "",
                "Failed to disable unit: Unit file rclone-sync.service does not exist.\n",
            ),
        )]);
        control(&runner).disable().unwrap();
    }

    #[test]
    fn disable_propagates_authorization_failure() {
        let runner = Scripted::new(vec![(
            "disable",
            fail(1, "", "Failed to disable unit: Access denied\n"),
        )]);
        let err = control(&runner).disable().unwrap_err();
        assert!(matches!(err, InstallerError::PermissionDenied(_)));
    }

    #[test]
    fn enable_failure_is_unit_rejected() {
        let runner = Scripted::new(vec![(
            "enable",
            fail(1, "", "Unit rclone-sync.service has a bad unit file setting.\n"),
        )]);
        match control(&runner).enable().unwrap_err() {
            InstallerError::UnitRejected { step, unit, detail } => {
                assert_eq!(step, Step::Enable);
                assert_eq!(unit, "rclone-sync.service");
                assert!(detail.contains("bad unit file setting"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn start_failure_without_stderr_reports_exit_code() {
        let runner = Scripted::new(vec![("start", fail(5, "", ""))]);
        match control(&runner).start().unwrap_err() {
            InstallerError::StartFailed { detail, .. } => assert_eq!(detail, "exit code 5"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn status_maps_systemctl_answers() {
        let cases = [
            ("enabled\n", "active\n", ServiceState::EnabledActive),
            ("enabled\n", "inactive\n", ServiceState::EnabledInactive),
            ("enabled\n", "activating\n", ServiceState::EnabledActivating),
            ("enabled\n", "reloading\n", ServiceState::EnabledActivating),
            ("disabled\n", "activating\n", ServiceState::Disabled),
            ("disabled\n", "inactive\n", ServiceState::Disabled),
            ("enabled\n", "failed\n", ServiceState::Failed),
            ("", "inactive\n", ServiceState::NotInstalled),
        ];
        for (enabled, active, expected) in cases {
            let runner = Scripted::new(vec![
                ("is-enabled", fail(1, enabled, "")),
                ("is-active", fail(3, active, "")),
            ]);
            assert_eq!(control(&runner).status().unwrap(), expected);
        }
    }

    #[test]
    fn status_queries_are_never_elevated() {
        let runner = Scripted::new(vec![]);
        let control = ServiceControl::new(
            &runner,
            "systemctl",
            Elevation::Wrapper("/usr/bin/sudo".into()),
            "rclone-sync.service",
        );
        control.status().unwrap();
        for cmd in runner.seen.borrow().iter() {
            assert!(cmd.starts_with("systemctl "), "{cmd}");
        }
    }
}
