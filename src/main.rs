use crate::filter::ReportFilter;
use crate::report::load_reports;
use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod filter;
mod report;
mod util;

/// Merges service request reports, drops unserviced requests and writes them
/// ordered by request time, followed by a per-service summary.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Report files to read, `.csv` or `.json`
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Where to write the filtered csv
    #[arg(long, default_value = "output.csv")]
    output: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut filter = ReportFilter::new();

    for path in args.inputs.iter() {
        let reports = load_reports(path)?;
        info!(path = %path.display(), reports = reports.len(), "Loaded reports");
        filter.extend(reports);
    }

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create output file {}", args.output.display()))?;
    filter
        .write_csv(BufWriter::new(file))
        .context("Failed to write output csv")?;

    info!(
        kept = filter.len(),
        pruned = filter.pruned(),
        output = %args.output.display(),
        "Wrote filtered reports"
    );

    filter
        .write_summary(std::io::stdout().lock())
        .context("Failed to print summary")
}
