//! # Warden CLI
//!
//! Command-line definition and dispatch. Every subcommand builds an
//! [`IsolationManager`] from the resolved configuration and performs one
//! operation, except `watch`, which keeps an integrity monitor running until
//! Ctrl-C.

use crate::{
    config::IsolationConfig,
    isolation::{IntegrityReport, IsolationManager},
    supervisor::Supervisor,
    utils::logging::init_logging,
};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::{io::Write, path::PathBuf, sync::Arc, time::Duration};
use tokio::io::AsyncReadExt;

/// Caller name used by `watch` for its integrity monitor.
pub const MONITOR_CALLER: &str = "integrity-monitor";

/// Warden: sandboxed, audited file access for background callers.
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about,
    long_about = "warden mediates file access for background callers.

Originals are read only through verified sandbox copies, writes land only in
the caller's sandbox, and protected paths are refused outright.

Examples:
  warden copy agentA src/lib.rs
  warden read agentA README.md
  echo done | warden write agentA status.txt
  warden report
  warden verify
  warden watch --interval-secs 60"
)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Project root (overrides the configuration file)
    #[arg(long, global = true)]
    pub project_root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log to stderr instead of file
    #[arg(long, global = true)]
    pub log_to_stderr: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Copy a file into the caller's sandbox and print the copy's path
    Copy {
        caller: String,
        source: PathBuf,
        /// Name for the copy inside `copies/`
        #[arg(long = "as")]
        as_name: Option<String>,
    },
    /// Read a file through a verified sandbox copy and print it
    Read { caller: String, path: PathBuf },
    /// Write to the caller's `output/` area; content comes from stdin unless given
    Write {
        caller: String,
        filename: String,
        #[arg(long)]
        content: Option<String>,
    },
    /// Print the safety report as JSON
    Report,
    /// Verify protected files and print the integrity report as JSON
    Verify,
    /// Run an integrity monitor until interrupted
    Watch {
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    init_logging(log_level, !cli.log_to_stderr)?;

    let config = load_config(&cli)?;
    let mut stdout = std::io::stdout().lock();
    run_command(config, cli.command, &mut stdout).await
}

/// Resolve the configuration from `--config` and `--project-root`.
pub fn load_config(cli: &Cli) -> Result<IsolationConfig> {
    let mut config = match &cli.config {
        Some(path) => IsolationConfig::load_from_file(path)?,
        None => IsolationConfig::default(),
    };
    if let Some(root) = &cli.project_root {
        config.project_root = root.clone();
    }
    for warning in config.validate()? {
        tracing::warn!("{warning}");
    }
    Ok(config)
}

/// Execute one command, writing its result to `out`.
pub async fn run_command(
    config: IsolationConfig,
    command: Command,
    out: &mut impl Write,
) -> Result<()> {
    let manager = IsolationManager::new(config).context("Failed to start isolation manager")?;

    match command {
        Command::Copy {
            caller,
            source,
            as_name,
        } => {
            let copy = manager.safe_copy(&caller, &source, as_name.as_deref())?;
            writeln!(out, "{}", copy.display())?;
        }
        Command::Read { caller, path } => {
            let content = manager.safe_read(&caller, &path)?;
            write!(out, "{content}")?;
        }
        Command::Write {
            caller,
            filename,
            content,
        } => {
            let content = match content {
                Some(text) => text.into_bytes(),
                None => {
                    let mut buf = Vec::new();
                    tokio::io::stdin()
                        .read_to_end(&mut buf)
                        .await
                        .context("Failed to read content from stdin")?;
                    buf
                }
            };
            let path = manager.safe_write(&caller, content, &filename)?;
            writeln!(out, "{}", path.display())?;
        }
        Command::Report => {
            let report = manager.safety_report();
            writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        }
        Command::Verify => {
            let report = manager.verify_integrity();
            writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            ensure_valid(&report)?;
        }
        Command::Watch { interval_secs } => {
            watch(manager, Duration::from_secs(interval_secs.max(1))).await?;
        }
    }
    Ok(())
}

fn ensure_valid(report: &IntegrityReport) -> Result<()> {
    if !report.all_valid {
        bail!(
            "Integrity verification found {} issue(s)",
            report.issues.len()
        );
    }
    Ok(())
}

async fn watch(manager: IsolationManager, interval: Duration) -> Result<()> {
    let mut supervisor = Supervisor::new(Arc::new(manager));
    supervisor.spawn(MONITOR_CALLER, interval, |manager, caller| {
        let report = manager.verify_integrity();
        if !report.all_valid {
            tracing::error!(
                severity = "CRITICAL",
                caller,
                issues = report.issues.len(),
                "Integrity monitor detected problems"
            );
        }
        Ok(())
    });

    tracing::info!(interval_secs = interval.as_secs(), "Watching protected files; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Interrupt received, stopping monitor");
    supervisor.shutdown().await;
    Ok(())
}
