//! Thin wrapper around the `rclone` executable.

use std::io;

use crate::error::RcloneError;
use crate::process::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};

/// Result of one rclone invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcloneOutput {
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl RcloneOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<CommandOutput> for RcloneOutput {
    fn from(out: CommandOutput) -> Self {
        Self {
            code: out.code,
            stdout: out.stdout,
            stderr: out.stderr,
        }
    }
}

pub struct Rclone<R = ProcessRunner> {
    program: String,
    runner: R,
}

impl Rclone<ProcessRunner> {
    pub fn new(program: impl Into<String>) -> Self {
        Self::with_runner(program, ProcessRunner)
    }
}

impl<R: CommandRunner> Rclone<R> {
    pub fn with_runner(program: impl Into<String>, runner: R) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    /// Execute `rclone <command> <extra_args…>` and capture its output.
    pub fn run_cmd(&self, command: &str, extra_args: &[String]) -> Result<RcloneOutput, RcloneError> {
        let cmd = CommandSpec::new(&self.program)
            .arg(command)
            .args(extra_args.iter().cloned());
        log::info!("Invoking : {}", cmd);

        let output = self.runner.run(&cmd).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                log::error!("Executable not found. {}", e);
                RcloneError::NotFound(self.program.clone())
            }
            _ => {
                log::error!("Error running command. Reason: {}", e);
                RcloneError::Spawn {
                    program: self.program.clone(),
                    source: e,
                }
            }
        })?;

        if !output.stdout.is_empty() {
            log::debug!("{}", output.stdout_lossy().trim_end());
        }
        if !output.stderr.is_empty() {
            log::warn!("{}", output.stderr_lossy().trim_end());
        }
        if !output.success() {
            log::warn!("{} exited with {:?}", cmd, output.code);
        }

        Ok(output.into())
    }

    /// `rclone copyto source dest [flags]`
    pub fn copyto(&self, source: &str, dest: &str, flags: &[String]) -> Result<RcloneOutput, RcloneError> {
        self.run_cmd("copyto", &with_flags(&[source, dest], flags))
    }

    /// `rclone copy source dest [flags]`
    pub fn copy(&self, source: &str, dest: &str, flags: &[String]) -> Result<RcloneOutput, RcloneError> {
        self.run_cmd("copy", &with_flags(&[source, dest], flags))
    }

    /// `rclone sync source dest [flags]`
    pub fn sync(&self, source: &str, dest: &str, flags: &[String]) -> Result<RcloneOutput, RcloneError> {
        self.run_cmd("sync", &with_flags(&[source, dest], flags))
    }

    pub fn mkdir(&self, dest: &str, flags: &[String]) -> Result<RcloneOutput, RcloneError> {
        self.run_cmd("mkdir", &with_flags(&[dest], flags))
    }

    pub fn rmdir(&self, dest: &str, flags: &[String]) -> Result<RcloneOutput, RcloneError> {
        self.run_cmd("rmdir", &with_flags(&[dest], flags))
    }

    pub fn listremotes(&self, flags: &[String]) -> Result<RcloneOutput, RcloneError> {
        self.run_cmd("listremotes", flags)
    }

    pub fn ls(&self, dest: &str, flags: &[String]) -> Result<RcloneOutput, RcloneError> {
        self.run_cmd("ls", &with_flags(&[dest], flags))
    }

    pub fn lsjson(&self, dest: &str, flags: &[String]) -> Result<RcloneOutput, RcloneError> {
        self.run_cmd("lsjson", &with_flags(&[dest], flags))
    }

    /// Delete the files under a path, keeping the directory structure.
    pub fn delete(&self, dest: &str, flags: &[String]) -> Result<RcloneOutput, RcloneError> {
        self.run_cmd("delete", &with_flags(&[dest], flags))
    }

    pub fn deletefile(&self, dest: &str, flags: &[String]) -> Result<RcloneOutput, RcloneError> {
        self.run_cmd("deletefile", &with_flags(&[dest], flags))
    }

    /// Remove a path and all of its contents.
    pub fn purge(&self, dest: &str, flags: &[String]) -> Result<RcloneOutput, RcloneError> {
        self.run_cmd("purge", &with_flags(&[dest], flags))
    }
}

fn with_flags(positional: &[&str], flags: &[String]) -> Vec<String> {
    positional
        .iter()
        .map(|s| s.to_string())
        .chain(flags.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: RefCell<Vec<CommandSpec>>,
    }

    impl CommandRunner for Recorder {
        fn run(&self, cmd: &CommandSpec) -> io::Result<CommandOutput> {
            self.seen.borrow_mut().push(cmd.clone());
            Ok(CommandOutput {
                code: Some(0),
                stdout: b"gdrive:\n".to_vec(),
                stderr: Vec::new(),
            })
        }
    }

    struct Missing;

    impl CommandRunner for Missing {
        fn run(&self, _cmd: &CommandSpec) -> io::Result<CommandOutput> {
            Err(io::Error::from(io::ErrorKind::NotFound))
        }
    }

    #[test]
    fn copyto_places_flags_after_paths() {
        let runner = Recorder::default();
        let rclone = Rclone::with_runner("rclone", &runner);
        rclone
            .copyto("/data/a.txt", "gdrive:a.txt", &["--dry-run".to_string()])
            .unwrap();
        assert_eq!(
            runner.seen.borrow()[0].to_string(),
            "rclone copyto /data/a.txt gdrive:a.txt --dry-run"
        );
    }

    #[test]
    fn listremotes_returns_stdout() {
        let runner = Recorder::default();
        let out = Rclone::with_runner("rclone", &runner)
            .listremotes(&[])
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, b"gdrive:\n");
    }

    #[test]
    fn missing_executable_is_not_found() {
        let err = Rclone::with_runner("rclone", Missing)
            .purge("gdrive:old", &[])
            .unwrap_err();
        assert!(matches!(err, RcloneError::NotFound(p) if p == "rclone"));
    }
}
