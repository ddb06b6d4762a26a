//! BIDS EEG dataset writer and reader (BrainVision core format).
//!
//! Layout written for one recording:
//!
//! ```text
//! <root>/dataset_description.json
//! <root>/participants.tsv
//! <root>/sub-<id>/eeg/sub-<id>_task-<task>_eeg.vhdr   header
//!                                          _eeg.vmrk   markers
//!                                          _eeg.eeg    IEEE_FLOAT_32, multiplexed, µV
//!                                          _channels.tsv
//!                                          _electrodes.tsv
//!                                          _coordsystem.json
//!                                          _eeg.json
//! ```
//!
//! The reader also accepts `INT_16` binaries, `VECTORIZED` orientation and
//! per-channel resolutions, as produced by recorders.
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use log::{debug, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::montage;
use crate::raw::{Channel, ChannelType, Info, Raw};
use crate::subject::{BidsPath, SubjectId};

const BIDS_VERSION: &str = "1.8.0";

// ── Sidecar records ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DatasetDescription<'a> {
    name: &'a str,
    #[serde(rename = "BIDSVersion")]
    bids_version: &'a str,
    dataset_type: &'a str,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EegSidecar {
    task_name: String,
    sampling_frequency: f64,
    power_line_frequency: f64,
    #[serde(rename = "EEGReference")]
    eeg_reference: String,
    software_filters: String,
    #[serde(rename = "EEGChannelCount")]
    eeg_channel_count: usize,
    #[serde(rename = "EOGChannelCount")]
    eog_channel_count: usize,
    #[serde(rename = "ECGChannelCount")]
    ecg_channel_count: usize,
    #[serde(rename = "EMGChannelCount")]
    emg_channel_count: usize,
    misc_channel_count: usize,
    recording_duration: f64,
    recording_type: String,
}

#[derive(Debug, Serialize)]
struct CoordSystem<'a> {
    #[serde(rename = "EEGCoordinateSystem")]
    system: &'a str,
    #[serde(rename = "EEGCoordinateUnits")]
    units: &'a str,
    #[serde(rename = "EEGCoordinateSystemDescription")]
    description: &'a str,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChannelRow {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    units: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ElectrodeRow {
    name: String,
    x: String,
    y: String,
    z: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ParticipantRow {
    participant_id: String,
    group: String,
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<File>> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))
}

fn tsv_reader(path: &Path) -> Result<csv::Reader<File>> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text + "\n").with_context(|| format!("writing {}", path.display()))
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Write `raw` as a BIDS BrainVision recording. Existing files for the same
/// subject and task are overwritten.
pub fn write_raw_bids(raw: &Raw, bids: &BidsPath, line_freq: f64) -> Result<()> {
    let eeg_dir = bids.eeg_dir();
    std::fs::create_dir_all(&eeg_dir)
        .with_context(|| format!("creating {}", eeg_dir.display()))?;

    write_brainvision(raw, &bids.vhdr())?;
    write_channels_tsv(&raw.info, &bids.with_suffix("channels.tsv"))?;
    write_electrodes_tsv(&raw.info, &bids.with_suffix("electrodes.tsv"))?;
    write_json(
        &bids.with_suffix("coordsystem.json"),
        &CoordSystem {
            system: "CapTrak",
            units: "m",
            description: "Template standard 10-20 positions",
        },
    )?;

    let count = |k| raw.info.channels.iter().filter(|c| c.kind == k).count();
    write_json(
        &bids.with_suffix("eeg.json"),
        &EegSidecar {
            task_name: bids.task.clone(),
            sampling_frequency: raw.sfreq(),
            power_line_frequency: line_freq,
            eeg_reference: "n/a".into(),
            software_filters: "n/a".into(),
            eeg_channel_count: count(ChannelType::Eeg),
            eog_channel_count: count(ChannelType::Eog),
            ecg_channel_count: count(ChannelType::Ecg),
            emg_channel_count: count(ChannelType::Emg),
            misc_channel_count: count(ChannelType::Misc),
            recording_duration: raw.n_times() as f64 / raw.sfreq(),
            recording_type: "continuous".into(),
        },
    )?;

    write_json(
        &bids.root.join("dataset_description.json"),
        &DatasetDescription { name: "Resting-state EEG", bids_version: BIDS_VERSION, dataset_type: "raw" },
    )?;
    upsert_participant(&bids.root, &bids.subject)?;
    debug!("wrote {}", bids.vhdr().display());
    Ok(())
}

fn escape_name(name: &str) -> String {
    name.replace(',', "\\1")
}

fn write_brainvision(raw: &Raw, vhdr: &Path) -> Result<()> {
    let eeg = vhdr.with_extension("eeg");
    let vmrk = vhdr.with_extension("vmrk");
    let file_name = |p: &Path| p.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();

    let mut h = String::new();
    h.push_str("Brain Vision Data Exchange Header File Version 1.0\n");
    h.push_str("; Data created by pedconn\n\n");
    h.push_str("[Common Infos]\nCodepage=UTF-8\n");
    h.push_str(&format!("DataFile={}\n", file_name(&eeg)));
    h.push_str(&format!("MarkerFile={}\n", file_name(&vmrk)));
    h.push_str("DataFormat=BINARY\nDataOrientation=MULTIPLEXED\n");
    h.push_str(&format!("NumberOfChannels={}\n", raw.info.n_chan()));
    h.push_str(&format!("SamplingInterval={}\n\n", 1e6 / raw.sfreq()));
    h.push_str("[Binary Infos]\nBinaryFormat=IEEE_FLOAT_32\n\n");
    h.push_str("[Channel Infos]\n");
    for (i, ch) in raw.info.channels.iter().enumerate() {
        h.push_str(&format!("Ch{}={},,1,µV\n", i + 1, escape_name(&ch.name)));
    }
    std::fs::write(vhdr, h).with_context(|| format!("writing {}", vhdr.display()))?;

    let m = format!(
        "Brain Vision Data Exchange Marker File, Version 1.0\n\n\
         [Common Infos]\nCodepage=UTF-8\nDataFile={}\n\n\
         [Marker Infos]\nMk1=New Segment,,1,1,0\n",
        file_name(&eeg)
    );
    std::fs::write(&vmrk, m).with_context(|| format!("writing {}", vmrk.display()))?;

    let mut w = BufWriter::new(
        File::create(&eeg).with_context(|| format!("creating {}", eeg.display()))?,
    );
    for t in 0..raw.n_times() {
        for c in 0..raw.info.n_chan() {
            w.write_all(&((raw.data[[c, t]] * 1e6) as f32).to_le_bytes())?;
        }
    }
    w.flush()?;
    Ok(())
}

fn write_channels_tsv(info: &Info, path: &Path) -> Result<()> {
    let mut w = tsv_writer(path)?;
    for ch in &info.channels {
        w.serialize(ChannelRow {
            name: ch.name.clone(),
            kind: ch.kind.bids_name().into(),
            units: "µV".into(),
            status: Some(if info.is_bad(&ch.name) { "bad" } else { "good" }.into()),
        })?;
    }
    w.flush()?;
    Ok(())
}

fn write_electrodes_tsv(info: &Info, path: &Path) -> Result<()> {
    let fmt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |x| format!("{x:.6}"));
    let mut w = tsv_writer(path)?;
    for ch in info.channels.iter().filter(|c| c.kind == ChannelType::Eeg) {
        w.serialize(ElectrodeRow {
            name: ch.name.clone(),
            x: fmt(ch.pos.map(|p| p[0])),
            y: fmt(ch.pos.map(|p| p[1])),
            z: fmt(ch.pos.map(|p| p[2])),
        })?;
    }
    w.flush()?;
    Ok(())
}

/// Insert or replace the subject's row in `participants.tsv`, keeping the
/// table sorted by participant.
pub fn upsert_participant(root: &Path, subject: &SubjectId) -> Result<()> {
    let path = root.join("participants.tsv");
    let mut rows: BTreeMap<String, ParticipantRow> = BTreeMap::new();
    if path.exists() {
        for row in tsv_reader(&path)?.deserialize::<ParticipantRow>() {
            let row = row.with_context(|| format!("parsing {}", path.display()))?;
            rows.insert(row.participant_id.clone(), row);
        }
    }
    let id = subject.bids_dir();
    rows.insert(
        id.clone(),
        ParticipantRow { participant_id: id, group: subject.group().as_str().into() },
    );
    let mut w = tsv_writer(&path)?;
    for row in rows.values() {
        w.serialize(row)?;
    }
    w.flush()?;
    Ok(())
}

// ── Reader ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryFormat {
    Float32,
    Int16,
}

impl BinaryFormat {
    fn width(self) -> usize {
        match self {
            BinaryFormat::Float32 => 4,
            BinaryFormat::Int16 => 2,
        }
    }
}

/// Parsed `.vhdr` header.
#[derive(Debug, Clone)]
pub struct VhdrHeader {
    pub data_file: PathBuf,
    pub multiplexed: bool,
    pub sfreq: f64,
    pub ch_names: Vec<String>,
    /// Volts per stored unit, per channel.
    pub scales: Vec<f64>,
    format: BinaryFormat,
}

fn unit_scale(unit: &str) -> Result<f64> {
    Ok(match unit.trim() {
        "V" => 1.0,
        "mV" => 1e-3,
        "nV" => 1e-9,
        // Latin-1 µ decodes lossily to U+FFFD.
        "" | "µV" | "μV" | "uV" | "\u{FFFD}V" => 1e-6,
        other => bail!("unsupported channel unit '{other}'"),
    })
}

/// Parse a BrainVision header. Paths inside it are resolved against the
/// header's directory.
pub fn parse_vhdr(path: &Path) -> Result<VhdrHeader> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);

    let mut sections: HashMap<String, Vec<(String, String)>> = HashMap::new();
    let mut current = String::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = name.to_string();
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            sections
                .entry(current.clone())
                .or_default()
                .push((k.trim().to_string(), v.trim().to_string()));
        }
    }
    let get = |section: &str, key: &str| -> Option<&str> {
        sections
            .get(section)?
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    };

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let data_file = dir.join(get("Common Infos", "DataFile").context("vhdr: missing DataFile")?);
    if let Some(fmt) = get("Common Infos", "DataFormat") {
        ensure!(fmt.eq_ignore_ascii_case("BINARY"), "vhdr: unsupported DataFormat {fmt}");
    }
    let multiplexed = match get("Common Infos", "DataOrientation").unwrap_or("MULTIPLEXED") {
        o if o.eq_ignore_ascii_case("MULTIPLEXED") => true,
        o if o.eq_ignore_ascii_case("VECTORIZED") => false,
        o => bail!("vhdr: unsupported DataOrientation {o}"),
    };
    let n_chan: usize = get("Common Infos", "NumberOfChannels")
        .context("vhdr: missing NumberOfChannels")?
        .parse()
        .context("vhdr: bad NumberOfChannels")?;
    let interval_us: f64 = get("Common Infos", "SamplingInterval")
        .context("vhdr: missing SamplingInterval")?
        .parse()
        .context("vhdr: bad SamplingInterval")?;
    ensure!(interval_us > 0.0, "vhdr: SamplingInterval must be positive");

    let format = match get("Binary Infos", "BinaryFormat").unwrap_or("INT_16") {
        f if f.eq_ignore_ascii_case("IEEE_FLOAT_32") => BinaryFormat::Float32,
        f if f.eq_ignore_ascii_case("INT_16") => BinaryFormat::Int16,
        f => bail!("vhdr: unsupported BinaryFormat {f}"),
    };

    let mut ch_names = Vec::with_capacity(n_chan);
    let mut scales = Vec::with_capacity(n_chan);
    for i in 1..=n_chan {
        let entry = get("Channel Infos", &format!("Ch{i}"))
            .with_context(|| format!("vhdr: missing Ch{i}"))?;
        let fields: Vec<&str> = entry.split(',').collect();
        let name = fields[0].replace("\\1", ",");
        let resolution = match fields.get(2).map(|s| s.trim()) {
            None | Some("") => 1.0,
            Some(r) => r.parse::<f64>().with_context(|| format!("vhdr: bad resolution for Ch{i}"))?,
        };
        let unit = unit_scale(fields.get(3).copied().unwrap_or(""))?;
        ch_names.push(name);
        scales.push(resolution * unit);
    }

    Ok(VhdrHeader { data_file, multiplexed, sfreq: 1e6 / interval_us, ch_names, scales, format })
}

/// Read the binary data described by `header` as `[C, T]` volts.
pub fn read_brainvision_data(header: &VhdrHeader) -> Result<Array2<f64>> {
    let bytes = std::fs::read(&header.data_file)
        .with_context(|| format!("reading {}", header.data_file.display()))?;
    let n_ch = header.ch_names.len();
    let width = header.format.width();
    ensure!(n_ch > 0, "vhdr lists no channels");
    ensure!(
        bytes.len() % (n_ch * width) == 0,
        "{}: size {} is not a multiple of {} channels × {} bytes",
        header.data_file.display(),
        bytes.len(),
        n_ch,
        width
    );
    let n_t = bytes.len() / (n_ch * width);
    let sample = |k: usize| -> f64 {
        let b = &bytes[k * width..(k + 1) * width];
        match header.format {
            BinaryFormat::Float32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            BinaryFormat::Int16 => i16::from_le_bytes([b[0], b[1]]) as f64,
        }
    };
    Ok(Array2::from_shape_fn((n_ch, n_t), |(c, t)| {
        let k = if header.multiplexed { t * n_ch + c } else { c * n_t + t };
        sample(k) * header.scales[c]
    }))
}

fn parse_coord(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Read a BIDS BrainVision recording. Channel types and bad flags come
/// from `_channels.tsv`, positions from `_electrodes.tsv`, falling back to
/// the built-in montage for missing entries.
pub fn read_raw_bids(bids: &BidsPath) -> Result<Raw> {
    let header = parse_vhdr(&bids.vhdr())?;
    let data = read_brainvision_data(&header)?;

    let mut channels: Vec<Channel> = header
        .ch_names
        .iter()
        .map(|n| Channel::new(n.clone(), ChannelType::Eeg))
        .collect();
    let mut bads = Vec::new();

    let channels_tsv = bids.with_suffix("channels.tsv");
    if channels_tsv.exists() {
        for row in tsv_reader(&channels_tsv)?.deserialize::<ChannelRow>() {
            let row = row.with_context(|| format!("parsing {}", channels_tsv.display()))?;
            let Some(ch) = channels.iter_mut().find(|c| c.name == row.name) else {
                warn!("{}: channel {} not in header", channels_tsv.display(), row.name);
                continue;
            };
            ch.kind = row.kind.parse().unwrap_or(ChannelType::Misc);
            if row.status.as_deref().is_some_and(|s| s.eq_ignore_ascii_case("bad")) {
                bads.push(row.name.clone());
            }
        }
    } else {
        warn!("{} missing, treating every channel as EEG", channels_tsv.display());
    }

    let electrodes_tsv = bids.with_suffix("electrodes.tsv");
    if electrodes_tsv.exists() {
        for row in tsv_reader(&electrodes_tsv)?.deserialize::<ElectrodeRow>() {
            let row = row.with_context(|| format!("parsing {}", electrodes_tsv.display()))?;
            if let (Some(ch), Some(x), Some(y), Some(z)) = (
                channels.iter_mut().find(|c| c.name == row.name),
                parse_coord(&row.x),
                parse_coord(&row.y),
                parse_coord(&row.z),
            ) {
                ch.pos = Some([x, y, z]);
            }
        }
    }
    for ch in channels.iter_mut().filter(|c| c.kind == ChannelType::Eeg && c.pos.is_none()) {
        ch.pos = montage::position(&ch.name);
    }

    let mut info = Info::new(header.sfreq, channels);
    info.bads = bads;
    Raw::new(data, info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sample_raw() -> Raw {
        let mut channels = vec![
            Channel::new("Fp1", ChannelType::Eeg),
            Channel::new("Cz", ChannelType::Eeg),
            Channel::new("VEOG", ChannelType::Eog),
            Channel::new("ECG", ChannelType::Ecg),
        ];
        channels[0].pos = montage::position("Fp1");
        channels[1].pos = montage::position("Cz");
        let data = Array2::from_shape_fn((4, 500), |(c, t)| {
            1e-6 * ((c + 1) as f64) * ((t as f64) * 0.05).sin()
        });
        Raw::new(data, Info::new(250.0, channels)).unwrap()
    }

    #[test]
    fn brainvision_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let raw = sample_raw();
        let bids = BidsPath::new(dir.path(), SubjectId::parse("T001").unwrap(), "rest");
        write_raw_bids(&raw, &bids, 50.0).unwrap();

        let back = read_raw_bids(&bids).unwrap();
        assert_eq!(back.info.ch_names(), raw.info.ch_names());
        assert_eq!(back.sfreq(), 250.0);
        assert_eq!(back.info.channels[2].kind, ChannelType::Eog);
        assert_eq!(back.info.channels[3].kind, ChannelType::Ecg);
        for (a, b) in back.data.iter().zip(raw.data.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
        let pos = back.info.channels[1].pos.unwrap();
        assert_abs_diff_eq!(pos[2], montage::HEAD_RADIUS, epsilon = 1e-6);
        assert!(bids.with_suffix("eeg.json").exists());
        assert!(dir.path().join("dataset_description.json").exists());
    }

    #[test]
    fn participants_are_upserted() {
        let dir = tempfile::tempdir().unwrap();
        let raw = sample_raw();
        for id in ["T002", "C001", "T002"] {
            let bids = BidsPath::new(dir.path(), SubjectId::parse(id).unwrap(), "rest");
            write_raw_bids(&raw, &bids, 50.0).unwrap();
        }
        let text = std::fs::read_to_string(dir.path().join("participants.tsv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["participant_id\tgroup", "sub-C001\tcontrol", "sub-T002\ttest"]);
    }

    #[test]
    fn bad_status_is_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut raw = sample_raw();
        raw.info.bads = vec!["Cz".into()];
        let bids = BidsPath::new(dir.path(), SubjectId::parse("C003").unwrap(), "rest");
        write_raw_bids(&raw, &bids, 50.0).unwrap();
        assert_eq!(read_raw_bids(&bids).unwrap().info.bads, vec!["Cz".to_string()]);
    }

    #[test]
    fn int16_vectorized_with_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let vhdr = dir.path().join("rec.vhdr");
        std::fs::write(
            &vhdr,
            "Brain Vision Data Exchange Header File Version 1.0\n\
             [Common Infos]\nDataFile=rec.eeg\nDataFormat=BINARY\n\
             DataOrientation=VECTORIZED\nNumberOfChannels=2\nSamplingInterval=2000\n\
             [Binary Infos]\nBinaryFormat=INT_16\n\
             [Channel Infos]\nCh1=A\\1B,,0.5,µV\nCh2=C,,2,mV\n",
        )
        .unwrap();
        let samples: [i16; 6] = [1, 2, 3, -1, -2, -3];
        let bytes: Vec<u8> = samples.iter().flat_map(|v| v.to_le_bytes()).collect();
        std::fs::write(dir.path().join("rec.eeg"), bytes).unwrap();

        let header = parse_vhdr(&vhdr).unwrap();
        assert_eq!(header.ch_names, vec!["A,B".to_string(), "C".to_string()]);
        assert_abs_diff_eq!(header.sfreq, 500.0);
        let data = read_brainvision_data(&header).unwrap();
        assert_eq!(data.dim(), (2, 3));
        assert_abs_diff_eq!(data[[0, 2]], 1.5e-6, epsilon = 1e-15);
        assert_abs_diff_eq!(data[[1, 0]], -2e-3, epsilon = 1e-15);
    }

    #[test]
    fn truncated_binary_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let vhdr = dir.path().join("r.vhdr");
        std::fs::write(
            &vhdr,
            "[Common Infos]\nDataFile=r.eeg\nNumberOfChannels=2\nSamplingInterval=4000\n\
             [Binary Infos]\nBinaryFormat=IEEE_FLOAT_32\n[Channel Infos]\nCh1=A\nCh2=B\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("r.eeg"), [0u8; 12]).unwrap();
        let header = parse_vhdr(&vhdr).unwrap();
        assert!(read_brainvision_data(&header).is_err());
    }
}
