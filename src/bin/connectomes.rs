use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use pedconn::cli::{finish, init_logging, load_config};
use pedconn::connectivity::{self, ConnectivityMethod};

#[derive(Parser)]
#[command(name = "connectomes", about = "Multitaper connectomes from cleaned EEG recordings", version)]
struct Args {
    /// Path to YAML study config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// BIDS dataset root holding the cleaned files
    #[arg(long)]
    bids_root: Option<PathBuf>,

    /// Connectome output root
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Connectivity estimator (coh, plv, pli, wpli, wpli2_debiased)
    #[arg(short, long)]
    method: Option<String>,

    /// Worker threads (default: one per core)
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut cfg = load_config(args.config.as_deref());
    if let Some(p) = args.bids_root {
        cfg.paths.bids_root = p;
    }
    if let Some(p) = args.output {
        cfg.paths.connectome_dir = p;
    }
    if let Some(m) = args.method {
        cfg.connectivity.method = serde_yaml::from_str::<ConnectivityMethod>(&m)?;
    }
    if args.workers.is_some() {
        cfg.connectivity.workers = args.workers;
    }

    let report = connectivity::run(&cfg)?;
    finish("connectivity", &report)
}
