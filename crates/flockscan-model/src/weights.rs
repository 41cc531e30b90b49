//! Raw weight artifacts
//!
//! Each layer lives in its own headerless file of little-endian `f32`s:
//! convolution files hold `outC·inC·9` weights followed by `outC` biases,
//! the head file holds 32 weights followed by one bias.  A [`WeightSet`]
//! names the four files, which is all that distinguishes one flock's model
//! from another.

use crate::{Conv2d, LinearHead, LoadError, Result, EMBED_DIM};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const F32_BYTES: usize = std::mem::size_of::<f32>();

/// Locations of the four weight artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightSet {
    pub conv1: PathBuf,
    pub conv2: PathBuf,
    pub conv3: PathBuf,
    pub classifier: PathBuf,
}

impl Default for WeightSet {
    fn default() -> Self {
        Self::from_dir("weights")
    }
}

impl WeightSet {
    pub const CONV1_FILE: &'static str = "c1.bin";
    pub const CONV2_FILE: &'static str = "c2.bin";
    pub const CONV3_FILE: &'static str = "c3.bin";
    pub const CLASSIFIER_FILE: &'static str = "fc.bin";

    /// Conventional file names inside one directory.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            conv1: dir.join(Self::CONV1_FILE),
            conv2: dir.join(Self::CONV2_FILE),
            conv3: dir.join(Self::CONV3_FILE),
            classifier: dir.join(Self::CLASSIFIER_FILE),
        }
    }

    /// Read a JSON weight set.  Relative entries resolve against the
    /// directory holding the JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| LoadError::Io { path: path.to_path_buf(), source })?;
        let set: WeightSet = serde_json::from_str(&text)
            .map_err(|source| LoadError::Config { path: path.to_path_buf(), source })?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(set.resolve_against(base))
    }

    fn resolve_against(self, base: &Path) -> Self {
        let fix = |p: PathBuf| if p.is_relative() { base.join(p) } else { p };
        Self {
            conv1: fix(self.conv1),
            conv2: fix(self.conv2),
            conv3: fix(self.conv3),
            classifier: fix(self.classifier),
        }
    }
}

/// Read exactly `count` floats from the start of `path`.
///
/// Missing files and short reads fail; trailing bytes are ignored with a
/// warning.
pub fn read_f32s(path: &Path, count: usize) -> Result<Vec<f32>> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io { path: path.to_path_buf(), source })?;
    let needed = count * F32_BYTES;
    if bytes.len() < needed {
        return Err(LoadError::Truncated {
            path: path.to_path_buf(),
            expected: count,
            found: bytes.len() / F32_BYTES,
        });
    }
    if bytes.len() > needed {
        warn!("{:?}: ignoring {} trailing bytes", path, bytes.len() - needed);
    }

    let floats = bytes[..needed]
        .chunks_exact(F32_BYTES)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok(floats)
}

/// Load one convolution artifact: weights, then biases.
pub fn load_conv(path: &Path, in_channels: usize, out_channels: usize) -> Result<Conv2d> {
    let n_weight = Conv2d::weight_len(in_channels, out_channels);
    let mut floats = read_f32s(path, n_weight + out_channels)?;
    let bias = floats.split_off(n_weight);
    debug!("{:?}: conv {}->{} ({} weights)", path, in_channels, out_channels, n_weight);
    Conv2d::new(in_channels, out_channels, floats, bias)
}

/// Load the head artifact: 32 weights, then 1 bias.
pub fn load_head(path: &Path) -> Result<LinearHead> {
    let floats = read_f32s(path, EMBED_DIM + 1)?;
    let mut weight = [0.0f32; EMBED_DIM];
    weight.copy_from_slice(&floats[..EMBED_DIM]);
    Ok(LinearHead::new(weight, floats[EMBED_DIM]))
}

fn write_f32s(path: &Path, parts: &[&[f32]]) -> Result<()> {
    let io_err = |source: std::io::Error| LoadError::Io { path: path.to_path_buf(), source };
    let mut out = BufWriter::new(File::create(path).map_err(io_err)?);
    for part in parts {
        for v in part.iter() {
            out.write_all(&v.to_le_bytes()).map_err(io_err)?;
        }
    }
    out.flush().map_err(io_err)
}

pub fn write_conv(path: &Path, conv: &Conv2d) -> Result<()> {
    write_f32s(path, &[conv.weight(), conv.bias()])
}

pub fn write_head(path: &Path, head: &LinearHead) -> Result<()> {
    write_f32s(path, &[head.weight(), &[head.bias()]])
}
