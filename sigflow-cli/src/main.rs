//! Sigflow CLI: session replay and configuration commands.
//!
//! Commands:
//! - `scan`: replay a session CSV bar by bar through the signal manager
//! - `init-config`: print the default detector configuration as TOML
//! - `check-config`: parse, validate, and fingerprint a configuration file

mod loader;
mod output;
mod replay;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use sigflow_core::config::EngineConfig;
use sigflow_core::domain::Category;
use sigflow_core::manager::SignalManager;

use loader::{load_sessions, Levels};
use output::{render, OutputFormat};

#[derive(Parser)]
#[command(
    name = "sigflow",
    about = "Sigflow CLI: intraday detect/confirm signal engine"
)]
struct Cli {
    /// Log filter (e.g. info, debug, sigflow_core=trace). RUST_LOG wins if set.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a session CSV, one scan cycle per bar.
    Scan {
        /// CSV with timestamp, OHLCV, and optional indicator columns.
        #[arg(long)]
        bars: PathBuf,

        /// Detector configuration (TOML). Defaults to the standard set.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Instrument id. Defaults to the CSV file stem.
        #[arg(long)]
        symbol: Option<String>,

        /// Previous session close for the first day in the file.
        #[arg(long)]
        prev_close: Option<f64>,

        /// Support level for the breakdown detector.
        #[arg(long)]
        support: Option<f64>,

        /// Resistance level for the breakthrough detector.
        #[arg(long)]
        resistance: Option<f64>,

        /// Minutes per bar; overrides the configuration.
        #[arg(long)]
        interval: Option<f64>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Print only the events still displayed at the end of each session.
        #[arg(long, default_value_t = false)]
        final_only: bool,
    },
    /// Print the default configuration as TOML.
    InitConfig,
    /// Validate a configuration file and print its fingerprint.
    CheckConfig {
        /// Path to a TOML config file.
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Scan {
            bars,
            config,
            symbol,
            prev_close,
            support,
            resistance,
            interval,
            format,
            final_only,
        } => {
            let levels = Levels {
                prev_close,
                support,
                resistance,
            };
            run_scan(
                &bars,
                config.as_deref(),
                symbol,
                levels,
                interval,
                format,
                final_only,
            )
        }
        Commands::InitConfig => {
            print!("{}", EngineConfig::default_set().to_toml()?);
            Ok(())
        }
        Commands::CheckConfig { path } => run_check_config(&path),
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>, interval: Option<f64>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(p) => EngineConfig::from_file(p)
            .with_context(|| format!("failed to load config {}", p.display()))?,
        None => EngineConfig::default_set(),
    };
    if let Some(minutes) = interval {
        config.bar_interval_minutes = minutes;
    }
    Ok(config)
}

fn symbol_for(bars: &Path, symbol: Option<String>) -> String {
    symbol.unwrap_or_else(|| {
        bars.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string())
    })
}

fn run_scan(
    bars: &Path,
    config_path: Option<&Path>,
    symbol: Option<String>,
    levels: Levels,
    interval: Option<f64>,
    format: OutputFormat,
    final_only: bool,
) -> Result<()> {
    let config = load_config(config_path, interval)?;
    let mut manager = SignalManager::from_config(&config).context("invalid configuration")?;

    let instrument_id = symbol_for(bars, symbol);
    let sessions = load_sessions(bars, &instrument_id, levels)?;
    let summaries = replay::replay_all(&mut manager, &sessions);

    print!("{}", render(&summaries, format, final_only)?);
    Ok(())
}

fn run_check_config(path: &Path) -> Result<()> {
    let config = load_config(Some(path), None)?;
    let manager = SignalManager::from_config(&config)
        .with_context(|| format!("{} is not a valid configuration", path.display()))?;

    println!("Configuration OK: {}", path.display());
    println!("  bar interval: {} min", config.bar_interval_minutes);
    for category in [Category::Buy, Category::Sell] {
        let names: Vec<&str> = manager
            .detectors(category)
            .iter()
            .map(|d| d.name())
            .collect();
        println!("  {category}: {}", names.join(", "));
    }
    if let Some(fp) = manager.fingerprint() {
        println!("  fingerprint: {fp}");
    }
    Ok(())
}
