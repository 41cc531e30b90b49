//! # flockscan-model
//!
//! The fixed-topology network behind flockscan: three 3×3 convolutions
//! (1→8→16→32 channels) followed by a 32→1 linear head.  Everything runs in
//! plain `f32` on the CPU; there is no graph runtime and no autograd.
//!
//! ## Features
//!
//! - Planar CHW kernels over `ndarray` views ([`layers`])
//! - OIHW convolution weights with per-channel bias ([`Conv2d`])
//! - Raw little-endian weight artifacts, one file per layer ([`weights`])
//! - Swappable weight sets, so one engine serves every flock species

use std::path::PathBuf;
use thiserror::Error;

pub mod conv;
pub mod layers;
pub mod net;
pub mod weights;

pub use conv::Conv2d;
pub use net::{LinearHead, TinyConvNet};
pub use weights::WeightSet;

/// Kernel side of every convolution.
pub const KERNEL: usize = 3;

/// Channel progression input → c1 → c2 → c3.
pub const CHANNELS: [usize; 4] = [1, 8, 16, 32];

/// Width of the pooled embedding fed to the head.
pub const EMBED_DIM: usize = 32;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read weight artifact {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Weight artifact {path:?} truncated: expected {expected} floats, found {found}")]
    Truncated {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
    #[error("Layer shape mismatch: {0}")]
    Shape(String),
    #[error("Invalid weight set config {path:?}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, LoadError>;
