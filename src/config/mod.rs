pub mod cli;
pub mod plan;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::utils::logger::LogFormat;
#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "healthcare-etl")]
#[command(about = "Profile, clean and transform synthetic healthcare CSV data")]
pub struct CliConfig {
    /// Path to TOML configuration file; built-in defaults are used when omitted
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override `paths.base_dir` from the config
    #[arg(long)]
    pub base_dir: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log process CPU and memory after each stage")]
    pub monitor: bool,

    #[arg(long, value_enum, default_value = "compact")]
    pub log_format: LogFormat,

    /// Also append logs to this file
    #[arg(long)]
    pub log_file: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Write a data quality report for every raw CSV file
    Profile,
    /// Clean raw tables into the clean directory
    Clean,
    /// Build dimension and fact tables from the clean directory
    Transform,
    /// Clean and transform in one pass
    Run {
        /// Bundle the processed tables into a ZIP archive
        #[arg(long)]
        archive: bool,

        /// Show what would be processed without executing
        #[arg(long)]
        dry_run: bool,
    },
    /// Load and validate the configuration, then exit
    CheckConfig,
}
