//! Error types for the installer and the rclone wrapper.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// One step of the install sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Disable,
    Copy,
    Reload,
    Enable,
    Start,
    Stop,
    Remove,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Disable => "disable unit",
            Step::Copy => "copy unit file",
            Step::Reload => "reload unit definitions",
            Step::Enable => "enable unit",
            Step::Start => "start unit",
            Step::Stop => "stop unit",
            Step::Remove => "remove unit file",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("unit file not found: {}", .0.display())]
    MissingUnitFile(PathBuf),

    #[error("service manager rejected unit {unit} ({step}): {detail}")]
    UnitRejected {
        step: Step,
        unit: String,
        detail: String,
    },

    #[error("unit {unit} failed to start: {detail}")]
    StartFailed { unit: String, detail: String },

    #[error("{step} failed: {detail}")]
    StepFailed { step: Step, detail: String },

    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    System(String),
}

impl InstallerError {
    /// The install step this error aborted, when it maps to one.
    pub fn step(&self) -> Option<Step> {
        match self {
            InstallerError::MissingUnitFile(_) => Some(Step::Copy),
            InstallerError::UnitRejected { step, .. } => Some(*step),
            InstallerError::StartFailed { .. } => Some(Step::Start),
            InstallerError::StepFailed { step, .. } => Some(*step),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RcloneError {
    #[error("executable not found: {0}")]
    NotFound(String),

    #[error("error running {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}
