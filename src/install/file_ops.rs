//! Atomic file operations for systemd unit files.
//!
//! Unit files are written to a temporary file in the destination directory,
//! synced, and renamed over the target so systemd never sees a partial file.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::InstallerError;

/// Mode of installed unit files.
pub(crate) const UNIT_FILE_MODE: u32 = 0o644;

fn io_failure(what: String, e: io::Error) -> InstallerError {
    match e.kind() {
        io::ErrorKind::PermissionDenied => InstallerError::PermissionDenied(format!("{what}: {e}")),
        _ => InstallerError::System(format!("{what}: {e}")),
    }
}

/// Write file atomically to prevent corruption
pub(crate) fn write_file_atomic(path: &Path, content: &[u8]) -> Result<(), InstallerError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    fs::create_dir_all(dir)
        .map_err(|e| io_failure(format!("Failed to create directory {}", dir.display()), e))?;

    let mut temp = NamedTempFile::new_in(dir)
        .map_err(|e| io_failure(format!("Failed to create temp file in {}", dir.display()), e))?;

    temp.write_all(content)
        .map_err(|e| InstallerError::System(format!("Failed to write temp file: {}", e)))?;

    temp.as_file()
        .sync_all()
        .map_err(|e| InstallerError::System(format!("Failed to sync temp file: {}", e)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(UNIT_FILE_MODE)).map_err(
            |e| InstallerError::System(format!("Failed to set unit file permissions: {}", e)),
        )?;
    }

    temp.persist(path)
        .map_err(|e| io_failure(format!("Failed to rename temp file to {}", path.display()), e.error))?;

    Ok(())
}

/// Copy `src` over `dest`, replacing any existing file atomically.
pub(crate) fn copy_file_atomic(src: &Path, dest: &Path) -> Result<(), InstallerError> {
    let content = fs::read(src).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => InstallerError::MissingUnitFile(src.to_path_buf()),
        _ => io_failure(format!("Failed to read {}", src.display()), e),
    })?;
    write_file_atomic(dest, &content)
}

/// Remove a file, treating an absent file as already removed.
pub(crate) fn remove_file_if_exists(path: &Path) -> Result<(), InstallerError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_failure(format!("Failed to remove {}", path.display()), e)),
    }
}
