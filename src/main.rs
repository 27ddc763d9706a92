//! trento-results - Trento check outcome aggregation and publishing
//!
//! Replays an orchestration engine's event log into a per-group outcome
//! tree and publishes it, idempotently, as a record of the run in ARA.
//! Also ships the check id validator.
//!
//! Exit codes:
//!   0 - Success (including runs that are not Trento test executions)
//!   1 - Runtime error, unfinished event log, or failed id validation

mod analysis;
mod checks;
mod cli;
mod config;
mod error;
mod events;
mod models;
mod report;
mod store;

use analysis::{aggregate_log, FinishedRun, RunCompletion};
use anyhow::{bail, Context, Result};
use checks::IdValidator;
use cli::{Args, CheckIdsArgs, Command, PublishArgs};
use config::{Config, CONFIG_FILE};
use events::EventLog;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Instant;
use store::{AraClient, PublishOutcome, RecordSync};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("trento-results v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .trento-results.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to point at your ARA server and checks directory.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    // RUST_LOG, when set, overrides the flags
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level().as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("⚠️  Failed to set tracing subscriber: {}", e);
    }
}

async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    match args.command {
        Some(Command::Publish(ref publish)) => run_publish(publish, &config, args.quiet).await,
        Some(Command::CheckIds(ref check_ids)) => run_check_ids(check_ids, &config),
        None => bail!("No command given"),
    }
}

/// Replay the event log and publish the finished tree.
async fn run_publish(args: &PublishArgs, config: &Config, quiet: bool) -> Result<i32> {
    let start_time = Instant::now();

    println!("📥 Reading event log: {}", args.events.display());
    let log = EventLog::open(&args.events)?;
    if log.is_empty() {
        bail!("Event log {} contains no events", args.events.display());
    }
    info!("Loaded {} events", log.len());

    let progress_bar = if quiet {
        None
    } else {
        let pb = ProgressBar::new(log.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .context("Invalid progress bar template")?
                .progress_chars("#>-"),
        );
        Some(pb)
    };

    println!("🔬 Aggregating results...");
    let completion = aggregate_log(log, |event| {
        if let Some(ref pb) = progress_bar {
            pb.set_message(event.name());
            pb.inc(1);
        }
    });
    if let Some(pb) = progress_bar {
        pb.finish_and_clear();
    }

    let run = match completion.context("Failed to aggregate the event log")? {
        RunCompletion::Publish(run) => run,
        RunCompletion::GateSkipped => {
            println!("\n⏭️  Not a Trento test execution, nothing to publish.");
            return Ok(0);
        }
        RunCompletion::Unfinished(state) => {
            bail!(
                "Event log ended while the run was {}; nothing was published",
                state
            );
        }
    };

    print_summary(&run);

    if let (Some(output), Some(format)) = (&args.output, args.output_format()) {
        report::write_report(&run.tree, Some(&run.run_token), format, output)?;
        println!("💾 Results written to: {}", output.display());
    }

    if args.dry_run {
        println!("\n✅ Dry run complete. The record store was not contacted.");
        return Ok(0);
    }

    println!("\n📤 Publishing to {}...", config.record_store.endpoint);
    let client = AraClient::new(config.record_store.clone())?;
    let sync = RecordSync::new(client);
    let value = run.tree.to_value().context("Failed to serialize results")?;
    let outcome = sync
        .publish(&run.run_token, value)
        .await
        .with_context(|| format!("Failed to publish results of run {}", run.run_token))?;

    let marker = match outcome {
        PublishOutcome::Created(_) => "🆕",
        PublishOutcome::Updated(_) => "🔄",
        PublishOutcome::Unchanged(_) => "✔️",
    };
    println!(
        "   {} Record {} {}",
        marker,
        outcome.record().id,
        outcome.label()
    );
    if let Some(modified) = outcome.record().updated.or(outcome.record().created) {
        println!("   Last modified: {}", modified.to_rfc3339());
    }
    println!(
        "\n✅ Publish complete in {:.1}s",
        start_time.elapsed().as_secs_f64()
    );

    Ok(0)
}

fn print_summary(run: &FinishedRun) {
    println!("\n📊 Results Summary:");
    println!("   Run: {}", run.run_token);
    for (name, group) in run.tree.groups() {
        let counts = report::GroupCounts::of(group);
        println!(
            "   - {}: ✅ {} | ❌ {} | ⏭️ {} | ❔ {}",
            name, counts.pass, counts.fail, counts.skipped, counts.other
        );
    }
    println!("   Total outcomes: {}", run.tree.outcome_count());
}

/// Validate (and optionally generate) check ids.
fn run_check_ids(args: &CheckIdsArgs, config: &Config) -> Result<i32> {
    let root = &config.checks.root;
    if !root.is_dir() {
        bail!("Checks root is not a directory: {}", root.display());
    }

    println!("🔍 Validating check ids in {}", root.display());
    let validator = IdValidator::new(root.clone(), args.generate);

    let report = match validator.run(&mut rand::thread_rng()) {
        Ok(report) => report,
        Err(e) => {
            error!("{}", e);
            eprintln!("\n⛔ Check id validation failed: {}", e);
            return Ok(1);
        }
    };

    for missing in &report.missing_defaults {
        warn!("Skipped {}", missing.display());
    }
    for generated in &report.generated {
        println!("   🆕 {} -> {}", generated.id, generated.path.display());
    }

    println!("\n📊 Checks scanned: {}", report.checks_scanned);
    println!("   Valid ids: {}", report.ids.len());
    if args.generate {
        println!("   Generated ids: {}", report.generated.len());
    }
    println!("\n✅ Check ids are valid.");
    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
