//! Safetensors container used for recordings and pipeline outputs.
//!
//! Layout: 8-byte little-endian header length, a JSON header mapping tensor
//! names to `{dtype, shape, data_offsets}` (plus an optional string map under
//! `__metadata__`), then the raw little-endian tensor bytes.
use anyhow::{bail, Context, Result};
use ndarray::{ArrayBase, Data, Dimension};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

const METADATA_KEY: &str = "__metadata__";

// ── Reader ───────────────────────────────────────────────────────────────────

/// A safetensors file held in memory.
pub struct StFile {
    bytes: Vec<u8>,
    header: serde_json::Map<String, serde_json::Value>,
    data_start: usize,
}

impl StFile {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < 8 {
            bail!("safetensors file too small");
        }
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[..8]);
        let n = u64::from_le_bytes(len) as usize;
        if bytes.len() < 8 + n {
            bail!("safetensors header truncated ({} of {n} bytes)", bytes.len() - 8);
        }
        let header: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&bytes[8..8 + n])
                .context("failed to parse safetensors header")?;
        Ok(Self { bytes, header, data_start: 8 + n })
    }

    /// String entry of the `__metadata__` map.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.header.get(METADATA_KEY)?.get(key)?.as_str()
    }

    /// Shape of a tensor.
    pub fn shape(&self, name: &str) -> Result<Vec<usize>> {
        let entry = self.entry(name)?;
        entry["shape"]
            .as_array()
            .context("tensor shape is not an array")?
            .iter()
            .map(|v| v.as_u64().map(|d| d as usize).context("tensor dimension is not an integer"))
            .collect()
    }

    /// Read a numeric tensor as `f64`, whatever its stored dtype.
    pub fn read_f64(&self, name: &str) -> Result<Vec<f64>> {
        let entry = self.entry(name)?;
        let dtype = entry["dtype"].as_str().context("tensor dtype missing")?;
        let raw = self.raw_bytes(name, entry)?;
        let vals = match dtype {
            "F32" => raw
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                .collect(),
            "F64" => raw
                .chunks_exact(8)
                .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect(),
            "I32" => raw
                .chunks_exact(4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                .collect(),
            "I64" => raw
                .chunks_exact(8)
                .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f64)
                .collect(),
            other => bail!("tensor '{name}' has unsupported dtype {other}"),
        };
        Ok(vals)
    }

    fn entry(&self, name: &str) -> Result<&serde_json::Value> {
        if name == METADATA_KEY {
            bail!("'{METADATA_KEY}' is not a tensor");
        }
        self.header
            .get(name)
            .with_context(|| format!("missing '{name}' tensor"))
    }

    fn raw_bytes(&self, name: &str, entry: &serde_json::Value) -> Result<&[u8]> {
        let offsets = entry["data_offsets"]
            .as_array()
            .with_context(|| format!("tensor '{name}' has no data offsets"))?;
        let (s, e) = match (offsets.first().and_then(|v| v.as_u64()), offsets.get(1).and_then(|v| v.as_u64())) {
            (Some(s), Some(e)) => (s as usize, e as usize),
            _ => bail!("tensor '{name}' has malformed data offsets"),
        };
        let (s, e) = (self.data_start + s, self.data_start + e);
        if s > e || e > self.bytes.len() {
            bail!("tensor '{name}' points outside the file");
        }
        Ok(&self.bytes[s..e])
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Safetensors file writer for F64 tensors with string metadata.
///
/// Files are written to a temporary sibling and renamed into place, so a
/// reader never observes a half-written output.
///
/// ```rust,no_run
/// use eegseg::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f64("signal", &[1.0, 2.0, 3.0], &[3, 1]);
/// w.add_metadata("origin", "demo");
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, Vec<usize>)>,
    metadata: BTreeMap<String, String>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, shape.to_vec()));
    }

    /// Add an array of any dimensionality in logical (row-major) order.
    pub fn add_array<S, D>(&mut self, name: &str, arr: &ArrayBase<S, D>)
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let data: Vec<f64> = arr.iter().copied().collect();
        self.add_f64(name, &data, arr.shape());
    }

    pub fn add_metadata(&mut self, key: &str, value: impl Into<String>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    /// Serialise the whole file into memory.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut header_map = serde_json::Map::new();
        if !self.metadata.is_empty() {
            header_map.insert(METADATA_KEY.to_string(), serde_json::to_value(&self.metadata)?);
        }
        let mut offset: usize = 0;
        for (name, data, shape) in &self.entries {
            header_map.insert(name.clone(), serde_json::json!({
                "dtype": "F64",
                "shape": shape,
                "data_offsets": [offset, offset + data.len()],
            }));
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;

        let mut out = Vec::with_capacity(8 + hdr_bytes.len() + pad + offset);
        out.extend_from_slice(&((hdr_bytes.len() + pad) as u64).to_le_bytes());
        out.extend_from_slice(&hdr_bytes);
        out.extend(std::iter::repeat(b' ').take(pad));
        for (_, data, _) in &self.entries {
            out.extend_from_slice(data);
        }
        Ok(out)
    }

    /// Atomically write the file to `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temporary file in {}", dir.display()))?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}
