//! One-way folder synchronisation.
//!
//! Local filesystem events are mirrored to an rclone remote: creations and
//! modifications are uploaded, deletions are deleted remotely, and moves are
//! replayed as delete-then-upload.

use std::path::{Component, Path, PathBuf};

use crate::error::RcloneError;
use crate::process::{CommandRunner, ProcessRunner};
use crate::rclone::Rclone;

mod signals;
mod watcher;

pub use signals::install_signal_handlers;
pub use watcher::{DirIndex, SyncWatcher, translate};

/// A change under the watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    Created { path: PathBuf, is_dir: bool },
    Modified { path: PathBuf, is_dir: bool },
    Deleted { path: PathBuf, is_dir: bool },
    Moved { from: PathBuf, to: PathBuf, is_dir: bool },
}

/// Maps local events to rclone operations against `remote`.
pub struct SyncHandler<R = ProcessRunner> {
    local_dir: PathBuf,
    remote: String,
    rclone: Rclone<R>,
    rclone_args: Vec<String>,
}

impl<R: CommandRunner> SyncHandler<R> {
    pub fn new(local_dir: PathBuf, remote: String, dry_run: bool, rclone: Rclone<R>) -> Self {
        let mut rclone_args = Vec::new();
        if dry_run {
            rclone_args.push("--dry-run".to_string());
        }
        Self {
            local_dir,
            remote,
            rclone,
            rclone_args,
        }
    }

    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    /// Remote location mirroring `local_path`.
    ///
    /// Only a leading `local_dir` prefix is replaced. Paths outside the watched
    /// directory, and the watched directory itself, have no remote counterpart
    /// an event may touch and yield `None`.
    pub fn cloud_path(&self, local_path: &Path) -> Option<String> {
        let rel = local_path.strip_prefix(&self.local_dir).ok()?;

        // `..` would climb out of the remote root
        let rel = rel
            .components()
            .map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        if rel.is_empty() {
            return None;
        }

        let mut remote = self.remote.clone();
        if !(remote.ends_with(':') || remote.ends_with('/')) {
            remote.push('/');
        }
        remote.push_str(&rel.join("/"));
        Some(remote)
    }

    pub fn handle(&self, event: &FsEvent) -> Result<(), RcloneError> {
        match event {
            FsEvent::Created { path, is_dir } => match self.cloud_path(path) {
                Some(remote) => self.on_created(path, &remote, *is_dir),
                None => self.skip(path),
            },
            FsEvent::Modified { path, is_dir } => match self.cloud_path(path) {
                Some(remote) => self.on_modified(path, &remote, *is_dir),
                None => self.skip(path),
            },
            FsEvent::Deleted { path, is_dir } => match self.cloud_path(path) {
                Some(remote) => self.on_deleted(path, &remote, *is_dir),
                None => self.skip(path),
            },
            FsEvent::Moved { from, to, is_dir } => {
                match (self.cloud_path(from), self.cloud_path(to)) {
                    (Some(old), Some(new)) => self.on_moved(from, &old, to, &new, *is_dir),
                    // moved in from elsewhere
                    (None, Some(new)) => self.on_created(to, &new, *is_dir),
                    // moved out of the watched tree
                    (Some(old), None) => self.on_deleted(from, &old, *is_dir),
                    (None, None) => self.skip(from),
                }
            }
        }
    }

    fn skip(&self, path: &Path) -> Result<(), RcloneError> {
        log::warn!(
            "Ignoring event for {}: not inside {}",
            path.display(),
            self.local_dir.display()
        );
        Ok(())
    }

    fn on_created(&self, path: &Path, remote: &str, is_dir: bool) -> Result<(), RcloneError> {
        if is_dir {
            // may arrive populated (moved in, extracted)
            log::info!("Created directory: {}", path.display());
            let mut args = self.rclone_args.clone();
            args.push("--create-empty-src-dirs".to_string());
            self.rclone.copy(&path.to_string_lossy(), remote, &args)?;
        } else {
            log::info!("Created file: {}", path.display());
            self.rclone
                .copyto(&path.to_string_lossy(), remote, &self.rclone_args)?;
        }
        Ok(())
    }

    fn on_modified(&self, path: &Path, remote: &str, is_dir: bool) -> Result<(), RcloneError> {
        // directory mtime changes are covered by events on their children
        if is_dir {
            return Ok(());
        }
        log::info!("Modified file: {}", path.display());
        self.rclone
            .copyto(&path.to_string_lossy(), remote, &self.rclone_args)?;
        Ok(())
    }

    fn on_deleted(&self, path: &Path, remote: &str, is_dir: bool) -> Result<(), RcloneError> {
        if is_dir {
            log::info!("Deleted directory: {}", path.display());
            self.rclone.purge(remote, &self.rclone_args)?;
        } else {
            log::info!("Deleted file: {}", path.display());
            self.rclone.deletefile(remote, &self.rclone_args)?;
        }
        Ok(())
    }

    fn on_moved(
        &self,
        from: &Path,
        old_remote: &str,
        to: &Path,
        new_remote: &str,
        is_dir: bool,
    ) -> Result<(), RcloneError> {
        let what = if is_dir { "directory" } else { "file" };
        log::info!("Moved {}: from {} to {}", what, from.display(), to.display());

        let mut once = self.rclone_args.clone();
        once.extend(["--retries".to_string(), "1".to_string()]);

        if is_dir {
            self.rclone.purge(old_remote, &once)?;
            self.rclone
                .copy(&to.to_string_lossy(), new_remote, &self.rclone_args)?;
        } else {
            self.rclone.deletefile(old_remote, &once)?;
            self.rclone
                .copyto(&to.to_string_lossy(), new_remote, &self.rclone_args)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(remote: &str) -> SyncHandler {
        SyncHandler::new(
            PathBuf::from("/home/alex/Documents"),
            remote.to_string(),
            false,
            Rclone::new("rclone"),
        )
    }

    #[test]
    fn cloud_path_replaces_leading_prefix() {
        let h = handler("gdrive:Documents");
        assert_eq!(
            h.cloud_path(Path::new("/home/alex/Documents/notes/todo.md")).as_deref(),
            Some("gdrive:Documents/notes/todo.md")
        );
    }

    #[test]
    fn cloud_path_of_remote_root() {
        let h = handler("gdrive:");
        assert_eq!(
            h.cloud_path(Path::new("/home/alex/Documents/a.txt")).as_deref(),
            Some("gdrive:a.txt")
        );
        assert_eq!(h.cloud_path(Path::new("/home/alex/Documents")), None);
    }

    #[test]
    fn cloud_path_ignores_inner_occurrences() {
        let h = handler("gdrive:backup/");
        assert_eq!(
            h.cloud_path(Path::new("/home/alex/Documents/home/alex/Documents/x")).as_deref(),
            Some("gdrive:backup/home/alex/Documents/x")
        );
    }

    #[test]
    fn cloud_path_rejects_foreign_paths() {
        let h = handler("gdrive:Documents");
        assert_eq!(h.cloud_path(Path::new("/etc/passwd")), None);
        assert_eq!(h.cloud_path(Path::new("/home/alex/Documents-old/a")), None);
        assert_eq!(h.cloud_path(Path::new("/home/alex/Documents/../../etc")), None);
    }
}
