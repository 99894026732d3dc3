//! Command line interface.

pub mod command;
pub mod config;

use std::{io, path::PathBuf};

use anyhow::{anyhow, Result};
use clap::{command, Args, Parser, Subcommand};
use era5daily::{archive::ArchiveLayout, Period};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Contains the commands
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log filter, e.g. `debug` or `era5daily=trace`. Overrides RUST_LOG
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a range of monthly archives into daily datasets
    Convert(ConvertArgs),
    /// List the members of a surface archive and the role each one fills
    Inspect {
        archive: PathBuf,

        #[command(flatten)]
        layout: LayoutArgs,
    },
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Directory holding the monthly input files [default: ~/ERA5/input]
    #[arg(long, env = "ERA5_INPUT_DIR")]
    pub input_dir: Option<PathBuf>,

    /// Directory receiving the daily datasets [default: ~/ERA5/output]
    #[arg(long, env = "ERA5_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// First period to convert (YYYY-MM)
    #[arg(long, default_value = "2000-01")]
    pub from: Period,

    /// Last period to convert, inclusive (YYYY-MM)
    #[arg(long, default_value = "2010-12")]
    pub to: Period,

    /// Upper-air file name; `{year}` and `{month}` are substituted
    #[arg(long, default_value = "upper_air_{year}_{month}.parquet")]
    pub upper_air_pattern: String,

    /// Surface archive file name; `{year}` and `{month}` are substituted
    #[arg(long, default_value = "surface_{year}_{month}.zip")]
    pub surface_pattern: String,

    #[command(flatten)]
    pub layout: LayoutArgs,

    /// Daily maximum taken from the extreme member
    #[arg(long, default_value = "mx2t")]
    pub max_variable: String,

    /// Daily minimum taken from the extreme member
    #[arg(long, default_value = "mn2t")]
    pub min_variable: String,
}

#[derive(Args, Debug, Default)]
pub struct LayoutArgs {
    /// Stem of the archive member with instantaneous variables
    #[arg(long)]
    pub member_instant: Option<String>,

    /// Stem of the archive member with accumulated variables
    #[arg(long)]
    pub member_accumulated: Option<String>,

    /// Stem of the archive member with extreme variables
    #[arg(long)]
    pub member_extreme: Option<String>,
}

impl LayoutArgs {
    pub fn layout(&self) -> ArchiveLayout {
        let defaults = ArchiveLayout::default();

        ArchiveLayout {
            instant: self.member_instant.clone().unwrap_or(defaults.instant),
            accumulated: self
                .member_accumulated
                .clone()
                .unwrap_or(defaults.accumulated),
            extreme: self.member_extreme.clone().unwrap_or(defaults.extreme),
        }
    }
}

/// Installs the global subscriber. `--log-level` wins over `RUST_LOG`,
/// which wins over `info`.
pub fn init_tracing(log_level: Option<&str>, json: bool) -> Result<()> {
    let filter = match log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| anyhow!("failed to install logger: {}", e))
}

/// Creates a progress bar.
pub fn create_progress_bar(size: u64, message: String) -> Result<ProgressBar> {
    let style = ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
        .progress_chars("##-");

    Ok(ProgressBar::new(size).with_message(message).with_style(style))
}
