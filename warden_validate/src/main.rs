use anyhow::{Result, anyhow};
use clap::Parser;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{error, info, instrument, warn};
use warden::config::IsolationConfig;

/// Warden Configuration Validator
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = "Validates warden isolation configurations: TOML syntax, protected path patterns, duplicate safety rule ids and unsupported rule actions."
)]
struct Cli {
    /// A configuration file, a directory of `.toml` files, or a comma-separated list of either.
    #[arg(default_value = "warden.toml")]
    validation_target: String,

    /// Print the configuration JSON schema and exit.
    #[arg(long)]
    print_schema: bool,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    debug: bool,
}

#[instrument]
fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_schema {
        println!("{}", schema_json()?);
        return Ok(());
    }

    let log_level = if cli.debug { "debug" } else { "info" };
    warden::utils::logging::init_logging(log_level, false)?;

    if run_validation_mode(&cli.validation_target)? {
        info!("All configurations are valid.");
        Ok(())
    } else {
        Err(anyhow!(
            "Some configurations are invalid. Please check the error messages above."
        ))
    }
}

fn schema_json() -> Result<String> {
    let schema = schemars::schema_for!(IsolationConfig);
    Ok(serde_json::to_string_pretty(&schema)?)
}

fn run_validation_mode(target: &str) -> Result<bool> {
    let mut all_valid = true;

    let mut files_to_validate = Vec::new();
    for target in target.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let path = PathBuf::from(target);
        if path.is_dir() {
            files_to_validate.extend(get_toml_files(&path)?);
        } else if path.is_file() {
            files_to_validate.push(path);
        } else {
            error!("Validation target not found: {}", path.display());
            all_valid = false;
        }
    }

    for file_path in files_to_validate {
        match validate_file(&file_path) {
            Ok(warnings) => {
                for warning in &warnings {
                    warn!("{}: {}", file_path.display(), warning);
                }
                info!("{} is valid.", file_path.display());
            }
            Err(e) => {
                error!("Validation failed for {}: {:#}", file_path.display(), e);
                all_valid = false;
            }
        }
    }

    Ok(all_valid)
}

/// Load and check one file, returning its non-fatal warnings.
fn validate_file(path: &Path) -> Result<Vec<String>> {
    IsolationConfig::load_from_file(path)?.validate()
}

fn get_toml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("toml") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
