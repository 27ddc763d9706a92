//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::report::ReportFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// trento-results - collect Trento check outcomes and publish them to ARA
///
/// Replays an engine event log, builds the per-group outcome tree and
/// stores it as the run's `trento-results` record. Also validates the
/// ids of the check definitions.
///
/// Examples:
///   trento-results publish --events run.jsonl
///   trento-results publish --events run.jsonl --dry-run --output results.md
///   trento-results check-ids --generate
///   trento-results --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .trento-results.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Generate a default .trento-results.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Aggregate an event log and publish the results record
    Publish(PublishArgs),

    /// Validate the ids of every check definition
    CheckIds(CheckIdsArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct PublishArgs {
    /// Engine event log (one JSON event per line)
    #[arg(short, long, value_name = "FILE")]
    pub events: PathBuf,

    /// ARA API server URL
    #[arg(long, value_name = "URL", env = "ARA_API_SERVER")]
    pub endpoint: Option<String>,

    /// ARA API username
    #[arg(long, value_name = "USER", env = "ARA_API_USERNAME")]
    pub username: Option<String>,

    /// ARA API password
    #[arg(long, value_name = "PASSWORD", env = "ARA_API_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Request timeout in seconds (no timeout by default)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Verify the server's TLS certificate
    #[arg(long)]
    pub verify_tls: bool,

    /// Aggregate only; never contact the record store
    #[arg(long)]
    pub dry_run: bool,

    /// Also write the results to this file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Format of --output (guessed from the extension when omitted)
    #[arg(long, value_name = "FORMAT", requires = "output")]
    pub format: Option<ReportFormat>,
}

impl PublishArgs {
    /// Format for --output, explicit or guessed from the file name.
    pub fn output_format(&self) -> Option<ReportFormat> {
        let output = self.output.as_ref()?;
        Some(self.format.unwrap_or_else(|| ReportFormat::from_path(output)))
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct CheckIdsArgs {
    /// Append new ids to checks that have none
    #[arg(short, long)]
    pub generate: bool,

    /// Checks root directory (default from config: roles/checks)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        match &self.command {
            None => Err("A subcommand is required (publish or check-ids)".to_string()),
            Some(Command::Publish(publish)) => publish.validate(),
            Some(Command::CheckIds(check_ids)) => check_ids.validate(),
        }
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

impl PublishArgs {
    fn validate(&self) -> Result<(), String> {
        if !self.events.is_file() {
            return Err(format!(
                "Event log does not exist: {}",
                self.events.display()
            ));
        }

        // The endpoint is irrelevant for a dry run
        if !self.dry_run {
            if let Some(ref endpoint) = self.endpoint {
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                    return Err("ARA endpoint must start with 'http://' or 'https://'".to_string());
                }
            }
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.password.is_some() && self.username.is_none() {
            return Err("--password requires --username".to_string());
        }

        Ok(())
    }
}

impl CheckIdsArgs {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if !root.is_dir() {
                return Err(format!(
                    "Checks root is not a directory: {}",
                    root.display()
                ));
            }
        }
        Ok(())
    }
}
