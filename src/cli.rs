use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Sync a local folder to cloud storage with rclone, as a systemd service")]
pub struct Args {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Sub‑commands (install, run, etc.)
    #[command(subcommand)]
    pub sub: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Install, enable and start the systemd unit (default if no sub‑command)
    Install {
        /// Unit file to install
        #[arg(long)]
        unit: Option<PathBuf>,

        /// Unit name, e.g. rclone-sync.service
        #[arg(long)]
        name: Option<String>,

        /// Directory to install the unit into
        #[arg(long)]
        unit_dir: Option<PathBuf>,

        /// Don't start service after install
        #[arg(long)]
        no_start: bool,

        /// Show what would be done without doing it
        #[arg(long)]
        dry_run: bool,
    },
    /// Stop, disable and remove the systemd unit
    Uninstall {
        /// Show what would be done without doing it
        #[arg(long)]
        dry_run: bool,
    },
    /// Check unit status (Exit 0 = enabled and active, 1 = otherwise)
    Status,
    /// Write a unit file that runs the sync daemon
    Unit {
        /// Local directory to watch
        #[arg(long)]
        local: Option<PathBuf>,

        /// rclone destination, remote:path
        #[arg(long)]
        remote: Option<String>,

        /// rclone-sync binary the unit executes (defaults to this executable)
        #[arg(long)]
        binary: Option<PathBuf>,

        /// Run the daemon as this user
        #[arg(long)]
        user: Option<String>,

        /// Pass --dry-run to the daemon
        #[arg(long)]
        sync_dry_run: bool,

        /// Where to write the unit file
        #[arg(long, short = 'o', default_value = "rclone-sync.service")]
        output: PathBuf,
    },
    /// Watch LOCAL and mirror every change to REMOTE
    Run {
        /// Local directory to watch
        local: Option<PathBuf>,

        /// rclone destination, remote:path
        remote: Option<String>,

        /// Pass --dry-run to every rclone call
        #[arg(long)]
        dry_run: bool,

        /// rclone executable
        #[arg(long)]
        rclone: Option<String>,
    },
}

impl Cmd {
    /// Running without a sub‑command installs the stock unit.
    pub fn default_install() -> Self {
        Cmd::Install {
            unit: None,
            name: None,
            unit_dir: None,
            no_start: false,
            dry_run: false,
        }
    }
}
