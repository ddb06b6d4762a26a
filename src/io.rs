//! Safetensors container for cleaned recordings.
//!
//! One file per subject, tensors:
//!
//! | name       | dtype | shape   | content                               |
//! |------------|-------|---------|---------------------------------------|
//! | `data`     | F32   | [C, T]  | signal in volts                       |
//! | `chan_pos` | F32   | [C, 3]  | positions in metres, NaN when unknown |
//! | `sfreq`    | F32   | [1]     | sampling rate (Hz)                    |
//! | `ch_names` | U8    | [n]     | newline-joined channel names          |
//! | `ch_types` | U8    | [n]     | newline-joined channel types          |
use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use ndarray::Array2;
use serde::Deserialize;

use crate::raw::{Channel, ChannelType, Info, Raw};

// ── Low-level safetensors parser ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TensorEntry {
    dtype: String,
    shape: Vec<usize>,
    data_offsets: [usize; 2],
}

fn parse_header(bytes: &[u8]) -> Result<(HashMap<String, TensorEntry>, usize)> {
    ensure!(bytes.len() >= 8, "safetensors file too small");
    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[..8]);
    let n = u64::from_le_bytes(len) as usize;
    ensure!(bytes.len() >= 8 + n, "safetensors header truncated");
    let raw: HashMap<String, serde_json::Value> =
        serde_json::from_slice(&bytes[8..8 + n]).context("failed to parse safetensors header")?;
    let mut header = HashMap::new();
    for (name, value) in raw {
        if name == "__metadata__" {
            continue;
        }
        let entry: TensorEntry = serde_json::from_value(value)
            .with_context(|| format!("bad header entry '{name}'"))?;
        header.insert(name, entry);
    }
    Ok((header, 8 + n))
}

struct StFile {
    bytes: Vec<u8>,
    header: HashMap<String, TensorEntry>,
    data_start: usize,
}

impl StFile {
    fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let (header, data_start) = parse_header(&bytes)?;
        Ok(Self { bytes, header, data_start })
    }

    fn entry(&self, name: &str) -> Result<&TensorEntry> {
        self.header.get(name).with_context(|| format!("missing '{name}' tensor"))
    }

    fn raw_bytes(&self, name: &str, dtype: &str) -> Result<(&[u8], &[usize])> {
        let e = self.entry(name)?;
        ensure!(e.dtype == dtype, "'{name}' has dtype {}, expected {dtype}", e.dtype);
        let [s, end] = e.data_offsets;
        let (s, end) = (self.data_start + s, self.data_start + end);
        ensure!(s <= end && end <= self.bytes.len(), "'{name}' data offsets out of range");
        Ok((&self.bytes[s..end], &e.shape))
    }

    fn f32s(&self, name: &str) -> Result<(Vec<f32>, Vec<usize>)> {
        let (raw, shape) = self.raw_bytes(name, "F32")?;
        let v = raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok((v, shape.to_vec()))
    }

    fn lines(&self, name: &str) -> Result<Vec<String>> {
        let (raw, _) = self.raw_bytes(name, "U8")?;
        let text = std::str::from_utf8(raw).with_context(|| format!("'{name}' is not UTF-8"))?;
        Ok(text.split('\n').filter(|s| !s.is_empty()).map(String::from).collect())
    }
}

// ── Generic safetensors builder ───────────────────────────────────────────────

/// Minimal safetensors writer for F32 and U8 tensors.
#[derive(Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f32(&mut self, name: &str, data: &[f32], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F32", shape.to_vec()));
    }

    pub fn add_f32_arr2(&mut self, name: &str, arr: &Array2<f32>) {
        let data: Vec<f32> = arr.iter().copied().collect();
        self.add_f32(name, &data, &[arr.nrows(), arr.ncols()]);
    }

    /// Store `lines` joined by `\n` as a U8 tensor.
    pub fn add_lines<S: AsRef<str>>(&mut self, name: &str, lines: &[S]) {
        let joined = lines.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join("\n");
        let bytes = joined.into_bytes();
        let n = bytes.len();
        self.entries.push((name.to_string(), bytes, "U8", vec![n]));
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        use std::io::Write;
        let mut header_map = serde_json::Map::new();
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(name.clone(), serde_json::json!({
                "dtype": dtype,
                "shape": shape,
                "data_offsets": [offset, offset + data.len()],
            }));
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;
        let padded: Vec<u8> = hdr_bytes.into_iter()
            .chain(std::iter::repeat(b' ').take(pad))
            .collect();
        let mut f = std::io::BufWriter::new(
            std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?,
        );
        f.write_all(&(padded.len() as u64).to_le_bytes())?;
        f.write_all(&padded)?;
        for (_, data, _, _) in &self.entries {
            f.write_all(data)?;
        }
        f.flush()?;
        Ok(())
    }
}

// ── Cleaned recordings ────────────────────────────────────────────────────────

/// Save a cleaned recording, creating parent directories as needed.
pub fn save_cleaned(raw: &Raw, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let n_ch = raw.info.n_chan();
    let pos = Array2::from_shape_fn((n_ch, 3), |(c, k)| {
        raw.info.channels[c].pos.map_or(f32::NAN, |p| p[k] as f32)
    });

    let mut w = StWriter::new();
    w.add_f32_arr2("data", &raw.data.mapv(|v| v as f32));
    w.add_f32_arr2("chan_pos", &pos);
    w.add_f32("sfreq", &[raw.sfreq() as f32], &[1]);
    w.add_lines("ch_names", &raw.info.ch_names());
    let types: Vec<&str> = raw.info.channels.iter().map(|c| c.kind.as_str()).collect();
    w.add_lines("ch_types", &types);
    w.write(path)
}

/// Load a recording written by [`save_cleaned`].
pub fn load_cleaned(path: &Path) -> Result<Raw> {
    let st = StFile::open(path)?;

    let (data, shape) = st.f32s("data")?;
    ensure!(shape.len() == 2, "'data' must be 2-D, got shape {shape:?}");
    let data = Array2::from_shape_vec((shape[0], shape[1]), data)?.mapv(|v| v as f64);

    let (pos, pos_shape) = st.f32s("chan_pos")?;
    ensure!(
        pos_shape == [shape[0], 3],
        "'chan_pos' shape {pos_shape:?} does not match {} channels",
        shape[0]
    );
    let sfreq = st.f32s("sfreq")?.0.first().copied().context("empty 'sfreq'")? as f64;

    let names = st.lines("ch_names")?;
    let types = st.lines("ch_types")?;
    if names.len() != shape[0] || types.len() != shape[0] {
        bail!(
            "{}: {} names / {} types for {} channels",
            path.display(),
            names.len(),
            types.len(),
            shape[0]
        );
    }

    let channels = names
        .into_iter()
        .zip(types.iter())
        .enumerate()
        .map(|(c, (name, kind))| {
            let kind: ChannelType = kind.parse()?;
            let p = [pos[c * 3], pos[c * 3 + 1], pos[c * 3 + 2]];
            let pos = p.iter().all(|v| v.is_finite()).then(|| p.map(|v| v as f64));
            Ok(Channel { name, kind, pos })
        })
        .collect::<Result<Vec<_>>>()?;
    Raw::new(data, Info::new(sfreq, channels))
}
