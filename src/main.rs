//! Herbal Compliance operator CLI
//!
//! Runs compliance queries and maintenance against the local sled ledger.
//!
//! ## Usage
//!
//! ```bash
//! # Alert counts by status, severity and type
//! herbal-compliance alert-stats
//!
//! # Limits at warning or exceeded
//! herbal-compliance quota-alerts
//!
//! # Zero every limit of a season
//! herbal-compliance reset-season 2025-Monsoon
//!
//! # Is a harvest date inside an active window?
//! herbal-compliance check-window Ashwagandha Rajasthan 2025-06-15T10:00:00Z
//!
//! # Would another 40 kg stay within the limit?
//! herbal-compliance check-limit Ashwagandha "Zone A" 2025-Monsoon 40
//!
//! # Version timeline of a batch
//! herbal-compliance batch-history BATCH-001
//! ```
//!
//! All output is pretty-printed JSON on stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use herbal_compliance::{spawn_logging_listener, Config, Services, SledLedger};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "herbal-compliance")]
#[command(about = "Compliance and harvest-quota tracking for herbal supply chains")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "HERBAL_COMPLIANCE_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Reject out-of-order batch status changes
    #[arg(long, env = "HERBAL_COMPLIANCE_STRICT_TRANSITIONS")]
    strict_transitions: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Alert statistics
    AlertStats,

    /// Harvest limits at warning or exceeded
    QuotaAlerts,

    /// Reset all harvest limits of a season
    ResetSeason { season: String },

    /// Check a harvest date against active season windows
    CheckWindow {
        species: String,
        region: String,
        /// RFC 3339 harvest date
        date: String,
    },

    /// Check whether a quantity would stay within the harvest limit
    CheckLimit {
        species: String,
        zone: String,
        season: String,
        quantity: f64,
    },

    /// Version history of a batch
    BatchHistory { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("herbal_compliance=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Load config
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if args.strict_transitions {
        config.strict_batch_transitions = true;
    }

    tokio::fs::create_dir_all(&config.storage_dir).await?;

    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let ledger = Arc::new(
        SledLedger::open(config.ledger_path())
            .with_context(|| format!("failed to open ledger at {}", config.ledger_path().display()))?,
    );
    let services = Services::new(ledger.clone(), &config);
    let listener = spawn_logging_listener(services.events.clone());

    let output = run(&services, args.command)?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    ledger.flush()?;
    drop(services);
    // The listener exits once the bus is dropped and drains what was emitted
    let _ = listener.await;

    Ok(())
}

fn run(services: &Services, command: Command) -> anyhow::Result<serde_json::Value> {
    let value = match command {
        Command::AlertStats => serde_json::to_value(services.alerts.statistics()?)?,
        Command::QuotaAlerts => serde_json::to_value(services.quotas.alerts()?)?,
        Command::ResetSeason { season } => {
            let reset_count = services.quotas.reset_season(&season)?;
            json!({ "season": season, "resetCount": reset_count })
        }
        Command::CheckWindow {
            species,
            region,
            date,
        } => {
            let within = services.seasons.is_within_window(&species, &date, &region)?;
            json!({
                "species": species,
                "region": region,
                "harvestDate": date,
                "withinWindow": within,
            })
        }
        Command::CheckLimit {
            species,
            zone,
            season,
            quantity,
        } => {
            let allowed = services
                .quotas
                .check_limit(&species, &zone, &season, quantity)?;
            json!({
                "limitId": herbal_compliance::limit_key(&species, &zone, &season),
                "quantity": quantity,
                "allowed": allowed,
            })
        }
        Command::BatchHistory { id } => serde_json::to_value(services.batches.history(&id)?)?,
    };
    Ok(value)
}
