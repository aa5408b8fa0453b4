use crate::generator::RequestGenerator;
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod generator;

/// Generates a synthetic CSV dataset of client service requests.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Number of service guids to sample from
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..))]
    services: u32,

    /// Number of client records (address + guid) to sample from
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..))]
    clients: u32,

    /// Number of request rows to emit after the header
    #[arg(long, default_value_t = 300)]
    rows: usize,

    /// Seed for reproducible pools and rows
    #[arg(long)]
    seed: Option<u64>,

    /// Write the dataset to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut generator = RequestGenerator::new(rng, args.services as usize, args.clients as usize)?;

    info!(
        services = generator.services().len(),
        clients = generator.clients().len(),
        rows = args.rows,
        seed = ?args.seed,
        "Generating request records"
    );

    let now = Utc::now();
    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?;
            generator
                .write_dataset(BufWriter::new(file), args.rows, now)
                .with_context(|| format!("Failed to write dataset to {}", path.display()))?;
        }
        None => generator
            .write_dataset(std::io::stdout().lock(), args.rows, now)
            .context("Failed to write dataset to stdout")?,
    }

    Ok(())
}
