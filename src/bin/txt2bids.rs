use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use pedconn::cli::{finish, init_logging, load_config};
use pedconn::convert;

#[derive(Parser)]
#[command(name = "txt2bids", about = "Convert vendor EEG text exports to a BIDS dataset", version)]
struct Args {
    /// Path to YAML study config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Export root with control/ and test/ sub-directories
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// BIDS dataset root
    #[arg(long)]
    bids_root: Option<PathBuf>,

    /// Channel label mapping CSV
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Sampling rate of the export in Hz
    #[arg(long)]
    sfreq: Option<f64>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut cfg = load_config(args.config.as_deref());
    if let Some(p) = args.export_dir {
        cfg.paths.export_dir = p;
    }
    if let Some(p) = args.bids_root {
        cfg.paths.bids_root = p;
    }
    if let Some(p) = args.labels {
        cfg.paths.labels_csv = p;
    }
    if let Some(f) = args.sfreq {
        cfg.convert.sfreq = f;
    }

    let report = convert::run(&cfg)?;
    finish("conversion", &report)
}
