//! rclone-sync library
//!
//! Mirrors a local folder to an rclone remote as files change, and installs
//! that watcher as a systemd service.

pub mod config;
pub mod error;
pub mod install;
pub mod process;
pub mod rclone;
pub mod sync;

pub use config::Config;
pub use error::{InstallerError, RcloneError, Step};
