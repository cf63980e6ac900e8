mod cli;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};

use rclone_sync::config::{Config, InstallConfig};
use rclone_sync::install::{
    Elevation, InstallOptions, Installer, PlannedStep, ServiceState, UnitSpec, write_unit_file,
};
use rclone_sync::process::ProcessRunner;
use rclone_sync::rclone::Rclone;
use rclone_sync::sync::{SyncHandler, SyncWatcher, install_signal_handlers};

fn main() {
    env_logger::Builder::new()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(e) = real_main() {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<()> {
    let args = cli::Args::parse();
    let cfg = Config::load(args.config.as_deref())?;

    match args.sub.unwrap_or_else(cli::Cmd::default_install) {
        cli::Cmd::Install {
            unit,
            name,
            unit_dir,
            no_start,
            dry_run,
        } => {
            let mut install = cfg.install;
            if let Some(unit) = unit {
                install.source = unit;
            }
            if let Some(name) = name {
                install.unit_name = name;
            }
            if let Some(unit_dir) = unit_dir {
                install.unit_dir = unit_dir;
            }
            handle_install(install, InstallOptions { start: !no_start }, dry_run)
        }
        cli::Cmd::Uninstall { dry_run } => handle_uninstall(cfg.install, dry_run),
        cli::Cmd::Status => handle_status(cfg.install),
        cli::Cmd::Unit {
            local,
            remote,
            binary,
            user,
            sync_dry_run,
            output,
        } => {
            let local = local.or(cfg.sync.local_dir).context(
                "No local directory given (use --local or set sync.local_dir in the config)",
            )?;
            let remote = remote
                .or(cfg.sync.remote)
                .context("No remote given (use --remote or set sync.remote in the config)")?;
            let binary = match binary {
                Some(binary) => binary,
                None => std::env::current_exe()
                    .context("Failed to determine the path of this executable")?,
            };

            let mut spec = UnitSpec::new(binary, absolute_dir(local)?, remote);
            spec.dry_run = sync_dry_run || cfg.sync.dry_run;
            spec.user = user;
            handle_unit(&spec, output)
        }
        cli::Cmd::Run {
            local,
            remote,
            dry_run,
            rclone,
        } => {
            let local = local
                .or(cfg.sync.local_dir)
                .context("No local directory given (pass LOCAL or set sync.local_dir)")?;
            let remote = remote
                .or(cfg.sync.remote)
                .context("No remote given (pass REMOTE or set sync.remote)")?;
            let rclone = rclone.unwrap_or(cfg.sync.rclone);
            run_sync(
                absolute_dir(local)?,
                remote,
                dry_run || cfg.sync.dry_run,
                rclone,
                Duration::from_millis(cfg.sync.debounce_ms),
            )
        }
    }
}

fn installer(config: InstallConfig, dry_run: bool) -> Result<Installer<ProcessRunner>> {
    // a dry run executes nothing, so a missing wrapper must not stop the plan
    let elevation = if dry_run {
        Elevation::preview(&config.elevate)
    } else {
        Elevation::resolve(&config.elevate)?
    };
    if let Elevation::Wrapper(wrapper) = &elevation {
        info!("Privileged commands will run via {}", wrapper.display());
    }
    Ok(Installer::new(config, elevation, ProcessRunner)?)
}

fn print_plan(plan: &[PlannedStep]) {
    for (i, planned) in plan.iter().enumerate() {
        println!("{}. {}: {}", i + 1, planned.step, planned.command);
    }
}

/// Handle install command - fail-fast disable/copy/reload/enable/start
fn handle_install(config: InstallConfig, opts: InstallOptions, dry_run: bool) -> Result<()> {
    let installer = installer(config, dry_run)?;
    if dry_run {
        print_plan(&installer.install_plan(&opts));
        return Ok(());
    }

    let report = installer
        .install(&opts)
        .with_context(|| format!("Failed to install {}", installer.config().unit_name))?;
    println!(
        "{} installed to {} ({})",
        installer.config().unit_name,
        report.destination.display(),
        report.state
    );
    Ok(())
}

/// Handle uninstall command - stop, disable, remove and reload
fn handle_uninstall(config: InstallConfig, dry_run: bool) -> Result<()> {
    let installer = installer(config, dry_run)?;
    if dry_run {
        print_plan(&installer.uninstall_plan());
        return Ok(());
    }

    installer
        .uninstall()
        .with_context(|| format!("Failed to uninstall {}", installer.config().unit_name))?;
    println!("{} uninstalled", installer.config().unit_name);
    Ok(())
}

/// Handle status command - exit 0 only when the unit is enabled and active
fn handle_status(config: InstallConfig) -> Result<()> {
    // status queries never need privileges
    let installer = Installer::new(config, Elevation::Direct, ProcessRunner)?;
    match installer.status() {
        Ok(state) => {
            println!("{} is {}", installer.config().unit_name, state);
            std::process::exit(if state == ServiceState::EnabledActive { 0 } else { 1 });
        }
        Err(e) => {
            eprintln!("Error checking status: {e:#}");
            std::process::exit(1);
        }
    }
}

fn handle_unit(spec: &UnitSpec, output: PathBuf) -> Result<()> {
    write_unit_file(spec, &output)
        .with_context(|| format!("Failed to write unit file {}", output.display()))?;
    println!("Wrote {}", output.display());
    Ok(())
}

fn run_sync(
    local_dir: PathBuf,
    remote: String,
    dry_run: bool,
    rclone: String,
    debounce: Duration,
) -> Result<()> {
    if which::which(&rclone).is_err() {
        warn!("{} not found in PATH, every sync will fail until it is installed", rclone);
    }

    install_signal_handlers()?;
    info!(
        "Syncing {} -> {}{}",
        local_dir.display(),
        remote,
        if dry_run { " (dry run)" } else { "" }
    );

    let handler = SyncHandler::new(local_dir, remote, dry_run, Rclone::new(rclone));
    SyncWatcher::new(handler, debounce).run()?;
    info!("rclone-sync exiting");
    Ok(())
}

/// Absolute form of a directory that must exist.
fn absolute_dir(path: PathBuf) -> Result<PathBuf> {
    let abs = fs::canonicalize(&path)
        .with_context(|| format!("Local directory {} is not accessible", path.display()))?;
    if !abs.is_dir() {
        anyhow::bail!("{} is not a directory", abs.display());
    }
    Ok(abs)
}
