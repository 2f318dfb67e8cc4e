//! # xchain-overlap
//!
//! Command-line front end for the overlap pipeline.
//!
//! ## Usage
//!
//! ```bash
//! xchain-overlap derive --input wallets.csv --output output.csv
//! xchain-overlap enrich --input output.csv --output hub.csv
//! xchain-overlap enrich --input output.csv --output hub.csv --resume
//! xchain-overlap report --input hub.csv
//! ```
//!
//! Settings come from `Config.toml` (or `--config`) and `XCHAIN_*` variables.
//! `RUST_LOG` controls log verbosity.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{error, info};
use rust_decimal::Decimal;
use std::path::PathBuf;
use xchain_overlap::{
    address_conversion::derive_pairs,
    address_source::{load_enrichment_records, load_first_column, write_address_pairs},
    batch_orchestrator::enrich_file,
    overlap_stats::OverlapReport,
    settings::Settings,
};

#[derive(Parser)]
#[command(name = "xchain-overlap", version, about = "Cross-chain account overlap analysis")]
struct Cli {
    /// Settings file; defaults to Config.toml in the working directory when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert source-chain addresses into Address Pairs
    Derive {
        #[arg(long, default_value = "wallets.csv")]
        input: PathBuf,
        #[arg(long, default_value = "output.csv")]
        output: PathBuf,
        /// Source bech32 prefix (overrides settings)
        #[arg(long)]
        from: Option<String>,
        /// Target bech32 prefix (overrides settings)
        #[arg(long)]
        to: Option<String>,
    },
    /// Fetch balance and staking status for every Address Pair
    Enrich {
        #[arg(long, default_value = "output.csv")]
        input: PathBuf,
        #[arg(long, default_value = "hub.csv")]
        output: PathBuf,
        /// Continue an interrupted run instead of starting over
        #[arg(long)]
        resume: bool,
    },
    /// Print overlap statistics for an enriched file
    Report {
        #[arg(long, default_value = "hub.csv")]
        input: PathBuf,
        #[arg(long)]
        dust_threshold: Option<Decimal>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    dotenv::dotenv().ok();

    env_logger::init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::new().context("Failed to load settings")?,
    };

    #[cfg(feature = "observability")]
    {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .install()
            .context("Failed to install Prometheus exporter")?;
        xchain_overlap::metrics::describe_metrics();
        info!("📊 Prometheus exporter installed");
    }

    match cli.command {
        Command::Derive { input, output, from, to } => {
            let from = from.unwrap_or(settings.conversion.source_prefix);
            let to = to.unwrap_or(settings.conversion.target_prefix);

            let addresses = load_first_column(&input)?;
            let pairs = derive_pairs(&addresses, &from, &to);
            write_address_pairs(&output, &pairs, &settings.columns)?;
            info!("✅ Wrote {} address pairs to {}", pairs.len(), output.display());
        }
        Command::Enrich { input, output, resume } => {
            match enrich_file(&settings, &input, &output, resume).await {
                Ok(summary) => {
                    info!(
                        "✅ Results saved to {} ({} records, {} batches this run)",
                        output.display(),
                        summary.processed,
                        summary.batches
                    );
                }
                Err(e) => {
                    if let Some(batch) = e.failed_batch() {
                        error!(
                            "❌ Batch {} was not written; rerun with --resume to continue from it",
                            batch
                        );
                    }
                    return Err(e).context("Enrichment failed");
                }
            }
        }
        Command::Report { input, dust_threshold } => {
            let threshold = dust_threshold.unwrap_or(settings.report.dust_threshold);
            let records = load_enrichment_records(&input)?;
            let report = OverlapReport::compute(&records, threshold);
            println!("{}", report);
            if report.total > 0 && report.inactive * 2 > report.total {
                println!("{}", "Most source accounts have no counterpart activity".yellow().bold());
            }
        }
    }

    Ok(())
}
