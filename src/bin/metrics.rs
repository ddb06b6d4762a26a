use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use pedconn::cli::{init_logging, load_config};
use pedconn::metrics;

#[derive(Parser)]
#[command(name = "metrics", about = "Graph metrics and group comparison of connectomes", version)]
struct Args {
    /// Path to YAML study config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Connectome root (band sub-directories inside)
    #[arg(long)]
    connectome_dir: Option<PathBuf>,

    /// Band sub-directory to analyse
    #[arg(short, long)]
    band: Option<String>,

    /// Demographics CSV (repeatable; replaces the configured list)
    #[arg(short, long)]
    demographics: Vec<PathBuf>,

    /// Metrics table output
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut cfg = load_config(args.config.as_deref());
    if let Some(p) = args.connectome_dir {
        cfg.paths.connectome_dir = p;
    }
    if let Some(b) = args.band {
        cfg.metrics.band = b;
    }
    if !args.demographics.is_empty() {
        cfg.paths.demographics = args.demographics;
    }
    if let Some(p) = args.output {
        cfg.paths.metrics_csv = p;
    }

    let (rows, table) = metrics::run(&cfg)?;
    println!("{} subject(s) → {}", rows.len(), cfg.paths.metrics_csv.display());
    println!("{:<12}{:>8}{:>10}{:>12}{:>14}{:>10}{:>10}", "metric", "n_test", "n_control", "mean_test", "mean_control", "t", "p");
    for c in &table {
        println!(
            "{:<12}{:>8}{:>10}{:>12.4}{:>14.4}{:>10.3}{:>10.4}",
            c.metric, c.n_test, c.n_control, c.mean_test, c.mean_control, c.t, c.p
        );
    }
    Ok(())
}
