//! Privilege elevation for systemd operations.
//!
//! Commands that mutate the unit registry or `/etc/systemd/system` run either
//! directly (the process is already root) or behind a wrapper such as `sudo`.

use std::path::PathBuf;

use crate::error::InstallerError;
use crate::process::CommandSpec;

/// How privileged commands are launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Elevation {
    /// Run the command as-is.
    Direct,
    /// Prefix the command with this wrapper program.
    Wrapper(PathBuf),
}

impl Elevation {
    /// Resolve the `elevate` config value against the current process.
    pub fn resolve(mode: &str) -> Result<Self, InstallerError> {
        resolve_with(mode, is_root(), |program| which::which(program).ok())
    }

    /// Like [`Elevation::resolve`], but never fails: a wrapper that cannot be
    /// found is shown by name. Used for `--dry-run` plans, which execute nothing.
    pub fn preview(mode: &str) -> Self {
        preview_with(mode, is_root(), |program| which::which(program).ok())
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Elevation::Direct)
    }

    /// Start building a privileged invocation of `program`.
    pub fn command(&self, program: &str) -> CommandSpec {
        match self {
            Elevation::Direct => CommandSpec::new(program),
            Elevation::Wrapper(wrapper) => {
                CommandSpec::new(wrapper.to_string_lossy()).arg(program)
            }
        }
    }
}

/// Wrapper program named by `mode`, or `None` for direct execution.
fn wrapper_name(mode: &str) -> Option<&str> {
    match mode.trim() {
        "none" => None,
        "auto" | "" => Some("sudo"),
        other => Some(other),
    }
}

fn preview_with(mode: &str, root: bool, lookup: impl Fn(&str) -> Option<PathBuf>) -> Elevation {
    if root {
        return Elevation::Direct;
    }
    match wrapper_name(mode) {
        None => Elevation::Direct,
        Some(wrapper) => {
            Elevation::Wrapper(lookup(wrapper).unwrap_or_else(|| PathBuf::from(wrapper)))
        }
    }
}

fn resolve_with(
    mode: &str,
    root: bool,
    lookup: impl Fn(&str) -> Option<PathBuf>,
) -> Result<Elevation, InstallerError> {
    if root {
        return Ok(Elevation::Direct);
    }
    let Some(wrapper) = wrapper_name(mode) else {
        return Ok(Elevation::Direct);
    };

    lookup(wrapper).map(Elevation::Wrapper).ok_or_else(|| {
        InstallerError::PermissionDenied(format!(
            "not running as root and elevation wrapper '{wrapper}' was not found"
        ))
    })
}

/// Check if running as root
#[inline]
pub fn is_root() -> bool {
    nix::unistd::Uid::effective().is_root()
}

/// Diagnostics emitted by sudo, doas, polkit and systemd when authorization fails.
const AUTH_FAILURE_MARKERS: &[&str] = &[
    "a password is required",
    "is not in the sudoers file",
    "is not allowed to execute",
    "incorrect password attempt",
    "Authentication failure",
    "authentication failed",
    "Operation not permitted",
    "Access denied",
    "Interactive authentication required",
    "Permission denied",
];

/// Whether a failed command's stderr indicates missing privileges.
pub(crate) fn is_authorization_failure(stderr: &str) -> bool {
    AUTH_FAILURE_MARKERS
        .iter()
        .any(|marker| stderr.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found(program: &str) -> Option<PathBuf> {
        Some(PathBuf::from("/usr/bin").join(program))
    }

    #[test]
    fn root_never_wraps() {
        assert_eq!(resolve_with("auto", true, found).unwrap(), Elevation::Direct);
        assert_eq!(resolve_with("doas", true, found).unwrap(), Elevation::Direct);
    }

    #[test]
    fn auto_uses_sudo_for_regular_users() {
        assert_eq!(
            resolve_with("auto", false, found).unwrap(),
            Elevation::Wrapper(PathBuf::from("/usr/bin/sudo"))
        );
    }

    #[test]
    fn custom_wrapper_is_looked_up() {
        assert_eq!(
            resolve_with("doas", false, found).unwrap(),
            Elevation::Wrapper(PathBuf::from("/usr/bin/doas"))
        );
    }

    #[test]
    fn missing_wrapper_is_permission_denied() {
        let err = resolve_with("auto", false, |_| None).unwrap_err();
        assert!(matches!(err, InstallerError::PermissionDenied(_)));
    }

    #[test]
    fn preview_never_fails() {
        assert_eq!(
            preview_with("auto", false, |_| None),
            Elevation::Wrapper(PathBuf::from("sudo"))
        );
        assert_eq!(
            preview_with("doas", false, found),
            Elevation::Wrapper(PathBuf::from("/usr/bin/doas"))
        );
        assert_eq!(preview_with("auto", true, |_| None), Elevation::Direct);
        assert_eq!(preview_with("none", false, |_| None), Elevation::Direct);
    }

    #[test]
    fn none_runs_directly() {
        assert_eq!(resolve_with("none", false, |_| None).unwrap(), Elevation::Direct);
    }

    #[test]
    fn wrapper_prefixes_program() {
        let cmd = Elevation::Wrapper(PathBuf::from("/usr/bin/sudo"))
            .command("systemctl")
            .arg("daemon-reload");
        assert_eq!(cmd.to_string(), "/usr/bin/sudo systemctl daemon-reload");
    }

    #[test]
    fn recognises_sudo_and_polkit_refusals() {
        assert!(is_authorization_failure("sudo: a password is required\n"));
        assert!(is_authorization_failure(
            "Failed to enable unit: Access denied\n"
        ));
        assert!(!is_authorization_failure(
            "Failed to enable unit: Unit file rclone-sync.service does not exist.\n"
        ));
    }
}
