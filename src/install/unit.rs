//! Systemd unit file generation for the sync daemon.

use std::path::{Path, PathBuf};

use super::file_ops::write_file_atomic;
use crate::error::InstallerError;

/// Parameters of the generated `rclone-sync.service`.
#[derive(Debug, Clone)]
pub struct UnitSpec {
    pub description: String,
    pub binary_path: PathBuf,
    pub local_dir: PathBuf,
    pub remote: String,
    pub dry_run: bool,
    pub user: Option<String>,
    pub log_level: String,
}

impl UnitSpec {
    pub fn new(binary_path: PathBuf, local_dir: PathBuf, remote: String) -> Self {
        Self {
            description: "Monitor a local folder and sync (one-way) to cloud storage".to_string(),
            binary_path,
            local_dir,
            remote,
            dry_run: false,
            user: None,
            log_level: "info".to_string(),
        }
    }

    fn exec_start(&self) -> String {
        let mut args = vec![
            quote_exec_arg(&self.binary_path.to_string_lossy()),
            "run".to_string(),
            quote_exec_arg(&self.local_dir.to_string_lossy()),
            quote_exec_arg(&self.remote),
        ];
        if self.dry_run {
            args.push("--dry-run".to_string());
        }
        args.join(" ")
    }
}

/// Render the unit file.
pub fn generate_unit_content(spec: &UnitSpec) -> String {
    let mut content = String::with_capacity(512);

    content.push_str("[Unit]\n");
    content.push_str(&format!("Description={}\n", spec.description));
    content.push_str("Wants=network-online.target\n");
    content.push_str("After=network-online.target\n");
    content.push('\n');

    content.push_str("[Service]\n");
    content.push_str("Type=simple\n");
    content.push_str(&format!("ExecStart={}\n", spec.exec_start()));
    content.push_str("Restart=on-failure\n");
    content.push_str("RestartSec=5s\n");
    content.push_str(&format!("Environment=\"RUST_LOG={}\"\n", spec.log_level));
    if let Some(user) = &spec.user {
        content.push_str(&format!("User={}\n", user));
    }
    content.push_str("StandardOutput=journal\n");
    content.push_str("StandardError=journal\n");
    content.push_str("SyslogIdentifier=rclone-sync\n");
    content.push('\n');

    content.push_str("[Install]\n");
    content.push_str("WantedBy=multi-user.target\n");

    content
}

/// Render and write the unit file to `path`.
pub fn write_unit_file(spec: &UnitSpec, path: &Path) -> Result<(), InstallerError> {
    write_file_atomic(path, generate_unit_content(spec).as_bytes())
}

/// Quote an ExecStart argument the way systemd splits command lines.
fn quote_exec_arg(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | ';'));
    // systemd expands $VAR and %-specifiers in ExecStart
    let escaped = arg.replace('%', "%%").replace('$', "$$");
    if !needs_quotes {
        return escaped;
    }
    let escaped = escaped.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
