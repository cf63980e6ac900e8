//! Filesystem watcher feeding the sync handler.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{RecvTimeoutError, channel};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{DebouncedEvent, RecursiveMode, Watcher, watcher};
use walkdir::WalkDir;

use super::signals::check_signals;
use super::{FsEvent, SyncHandler};
use crate::process::CommandRunner;

/// How often the loop wakes up to look for SIGINT/SIGTERM.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Directories known under the watched root.
///
/// A removed path can no longer be stat'ed, so deletions are classified as
/// file or directory from this index.
#[derive(Debug, Default)]
pub struct DirIndex {
    root: PathBuf,
    dirs: HashSet<PathBuf>,
}

impl DirIndex {
    pub fn scan(root: &Path) -> Self {
        let dirs = WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir())
            .map(|entry| entry.into_path())
            .collect();
        Self {
            root: root.to_path_buf(),
            dirs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// Record a new directory and everything below it.
    fn insert_tree(&mut self, path: &Path) {
        for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_dir() {
                self.dirs.insert(entry.into_path());
            }
        }
    }

    /// Forget `path` and its descendants; true if `path` was a known directory.
    fn remove_tree(&mut self, path: &Path) -> bool {
        let known = self.dirs.contains(path);
        self.dirs.retain(|dir| !dir.starts_with(path));
        known
    }

    fn rename_tree(&mut self, from: &Path, to: &Path) {
        let moved: Vec<PathBuf> = self
            .dirs
            .iter()
            .filter(|dir| dir.starts_with(from))
            .cloned()
            .collect();
        for dir in moved {
            self.dirs.remove(&dir);
            if let Ok(rel) = dir.strip_prefix(from) {
                self.dirs.insert(to.join(rel));
            }
        }
        self.insert_tree(to);
    }

    fn rescan(&mut self) {
        let root = self.root.clone();
        *self = Self::scan(&root);
    }
}

/// Convert a debounced notify event into an [`FsEvent`], updating `index`.
pub fn translate(event: DebouncedEvent, index: &mut DirIndex) -> Option<FsEvent> {
    match event {
        DebouncedEvent::Create(path) => {
            let is_dir = path.is_dir();
            if is_dir {
                index.insert_tree(&path);
            }
            Some(FsEvent::Created { path, is_dir })
        }
        DebouncedEvent::Write(path) => {
            let is_dir = path.is_dir();
            Some(FsEvent::Modified { path, is_dir })
        }
        DebouncedEvent::Remove(path) => {
            if path == index.root {
                log::warn!("Watched directory {} was removed", path.display());
                return None;
            }
            let is_dir = index.remove_tree(&path);
            Some(FsEvent::Deleted { path, is_dir })
        }
        DebouncedEvent::Rename(from, to) => {
            let is_dir = index.contains(&from) || to.is_dir();
            if is_dir {
                index.rename_tree(&from, &to);
            }
            Some(FsEvent::Moved { from, to, is_dir })
        }
        DebouncedEvent::Rescan => {
            log::warn!("Watcher requested a rescan of {}", index.root.display());
            index.rescan();
            None
        }
        DebouncedEvent::Error(err, path) => {
            match path {
                Some(path) => log::warn!("Watch error on {}: {}", path.display(), err),
                None => log::warn!("Watch error: {}", err),
            }
            None
        }
        DebouncedEvent::NoticeWrite(_) | DebouncedEvent::NoticeRemove(_) | DebouncedEvent::Chmod(_) => {
            None
        }
    }
}

/// Watches the handler's local directory until SIGINT/SIGTERM.
pub struct SyncWatcher<R> {
    handler: SyncHandler<R>,
    debounce: Duration,
}

impl<R: CommandRunner> SyncWatcher<R> {
    pub fn new(handler: SyncHandler<R>, debounce: Duration) -> Self {
        Self { handler, debounce }
    }

    pub fn run(self) -> Result<()> {
        let root = self.handler.local_dir().to_path_buf();
        let mut index = DirIndex::scan(&root);

        let (tx, rx) = channel();
        let mut watcher = watcher(tx, self.debounce).context("Failed to create file watcher")?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;

        log::info!(
            "Watching {} ({} directories)",
            root.display(),
            index.len()
        );

        loop {
            if let Some(sig) = check_signals() {
                log::info!("Received {}, stopping watcher", sig);
                break;
            }

            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(event) => {
                    let Some(event) = translate(event, &mut index) else {
                        continue;
                    };
                    if let Err(e) = self.handler.handle(&event) {
                        log::error!("Failed to sync {:?}: {}", event, e);
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    anyhow::bail!("File watcher channel closed");
                }
            }
        }

        watcher.unwatch(&root).ok();
        Ok(())
    }
}
