//! CryptoLens CLI
//!
//! Runs the dashboard pipeline as three independent stages, each reading
//! the previous stage's artifact from the data directory:
//! `cryptolens fetch`, `cryptolens process`, `cryptolens visualize`.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use cryptolens_core::{DataStore, DefiLlamaClient, MetricsPipeline, ProtocolRegistry};

#[derive(Parser, Debug)]
#[command(author, version, about = "CryptoLens DeFi analytics pipeline")]
struct Cli {
    /// Root directory for data and visualization artifacts
    #[arg(long, default_value = ".")]
    data_root: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch raw protocol metrics from DeFiLlama
    Fetch,
    /// Normalize and aggregate raw data into the comparison dataset
    Process,
    /// Shape the processed dataset into chart specs
    Visualize,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let pipeline = MetricsPipeline::new(
        ProtocolRegistry::default(),
        DataStore::new(&cli.data_root),
    );

    let result = match cli.cmd {
        Command::Fetch => fetch(&pipeline).await,
        Command::Process => process(&pipeline),
        Command::Visualize => visualize(&pipeline),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn fetch(pipeline: &MetricsPipeline) -> Result<()> {
    info!(
        "🚀 Fetching metrics for {} protocols",
        pipeline.registry().len()
    );
    let client = DefiLlamaClient::new();
    let warnings = pipeline.fetch(&client).await?;

    for warning in &warnings {
        warn!("{warning}");
    }
    info!(
        "✅ Fetch complete ({} warnings)",
        warnings.len()
    );
    Ok(())
}

fn process(pipeline: &MetricsPipeline) -> Result<()> {
    let report = pipeline.process()?;

    // Partial failure is a warning, not an error: the run already failed
    // hard inside the pipeline if *no* protocol produced data.
    for warning in &report.warnings {
        warn!("{warning}");
    }
    info!(
        "✅ Processed {} protocols ({} warnings)",
        report.dataset.protocols.len(),
        report.warnings.len()
    );
    Ok(())
}

fn visualize(pipeline: &MetricsPipeline) -> Result<()> {
    let charts = pipeline.visualize()?;
    info!("✅ Wrote {} charts", charts.len());
    Ok(())
}
