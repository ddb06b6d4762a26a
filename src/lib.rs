//! # pedconn — resting-state EEG connectivity study in pure Rust
//!
//! `pedconn` runs a two-group (test vs control) pediatric resting-state EEG
//! study end to end: vendor export conversion, automated artifact cleanup,
//! multitaper functional connectivity and graph metrics. The numerical
//! steps are native ports of the MNE-Python, autoreject, mne-connectivity,
//! bctpy and SciPy routines the study was designed around.
//!
//! _No Python, no BLAS: `ndarray` + [RustFFT](https://crates.io/crates/rustfft)
//! + `nalgebra` for the small dense eigenproblems._
//!
//! ## Pipeline overview
//!
//! ```text
//! <export_dir>/{control,test}/*.txt        UTF-16 vendor export
//!   │
//!   ├─ convert::run()      labels → Raw → 10-20 montage → BrainVision BIDS
//!   │
//! <bids_root>/sub-<id>/eeg/*_eeg.vhdr
//!   │
//!   ├─ clean::run()        1–40 Hz FIR → average reference
//!   │                      → global rejection thresholds → drop bad epochs
//!   │                      → interpolate bad channels (spherical splines)
//!   │                      → FastICA, EOG/ECG components removed
//!   │                      → 600 s around the midpoint, EEG only
//!   │
//! <bids_root>/sub-<id>/eeg/*_cleaned_eeg.safetensors
//!   │
//!   ├─ connectivity::run() band-pass → 12 s epochs → DPSS multitaper
//!   │                      → wPLI² (debiased) per channel pair
//!   │
//! <connectome_dir>/<band>/<group>/<id>_task-rest_connectome_eeg.csv
//!   │
//!   └─ metrics::run()      IHS, global efficiency, Louvain modularity
//!                          → demographics join → t-test test vs control
//! ```
//!
//! Each stage has a binary (`txt2bids`, `autoclean`, `connectomes`,
//! `metrics`) that takes `--config study.yaml`; see [`StudyConfig`].
//!
//! ## Running individual steps
//!
//! ```no_run
//! use pedconn::{filter_raw, load_cleaned, make_fixed_length_epochs, spectral_connectivity};
//! use pedconn::{ChannelType, SpectralParams};
//! use std::path::Path;
//!
//! let mut raw = load_cleaned(Path::new("sub-T001_task-rest_cleaned_eeg.safetensors")).unwrap();
//! filter_raw(&mut raw, Some(8.0), Some(12.0), &[ChannelType::Eeg]).unwrap();
//!
//! let picks = raw.info.picks(ChannelType::Eeg, false);
//! let epochs = make_fixed_length_epochs(&raw.get_data(&picks), raw.sfreq(), 4.0, 0.0).unwrap();
//! let con = spectral_connectivity(&epochs, raw.sfreq(), 8.0, 12.0, &SpectralParams::default()).unwrap();
//! println!("{:?}", con.dim());
//! ```

pub mod batch;
pub mod bids;
pub mod clean;
pub mod cli;
pub mod config;
pub mod connectivity;
pub mod convert;
pub mod epoch;
pub mod export;
pub mod filter;
pub mod graph;
pub mod ica;
pub mod interpolate;
pub mod io;
pub mod labels;
pub mod metrics;
pub mod montage;
pub mod raw;
pub mod reference;
pub mod reject;
pub mod stats;
pub mod subject;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// data model
pub use raw::{Channel, ChannelType, Info, Raw};
pub use subject::{BidsPath, Group, SubjectId};

// config
pub use config::{Band, CleanConfig, ConnectivityConfig, ConvertConfig, MetricsConfig, StudyConfig};

// file formats
pub use bids::{read_raw_bids, write_raw_bids};
pub use export::{read_export, ExportError};
pub use io::{load_cleaned, save_cleaned};
pub use labels::LabelMap;

// signal processing
pub use epoch::make_fixed_length_epochs;
pub use filter::{apply_fir_zero_phase, design_bandpass, design_filter, filter_raw};
pub use reference::{average_reference_inplace, set_average_reference};

// artifacts
pub use ica::{ArtifactError, Ica, IcaConfig};
pub use interpolate::interpolate_bads;
pub use reject::{drop_bad, rejection_thresholds, DropLog};

// connectivity, graphs, statistics
pub use connectivity::{read_connectome, spectral_connectivity, write_connectome, ConnectivityMethod, SpectralParams};
pub use graph::{community_louvain, global_efficiency, interhemispheric_strength};
pub use stats::{ttest_ind, TTest};

// batch
pub use batch::BatchReport;
