use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use pedconn::cli::{finish, init_logging, load_config};
use pedconn::clean;

#[derive(Parser)]
#[command(name = "autoclean", about = "Automated artifact cleanup of a BIDS EEG dataset", version)]
struct Args {
    /// Path to YAML study config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// BIDS dataset root
    #[arg(long)]
    bids_root: Option<PathBuf>,

    /// Start at this subject (sorted order)
    #[arg(long)]
    resume_from: Option<String>,

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
    if args.resume_from.is_some() {
        cfg.clean.resume_from = args.resume_from;
    }
    if args.workers.is_some() {
        cfg.clean.workers = args.workers;
    }

    let report = clean::run(&cfg)?;
    finish("cleanup", &report)
}
