//! The TinyConvNet parameter set.

use crate::{weights, Conv2d, LoadError, Result, WeightSet, CHANNELS, EMBED_DIM};
use log::info;

/// Fully-connected 32 → 1 head.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearHead {
    weight: [f32; EMBED_DIM],
    bias: f32,
}

impl LinearHead {
    pub fn new(weight: [f32; EMBED_DIM], bias: f32) -> Self {
        Self { weight, bias }
    }

    pub fn zeros() -> Self {
        Self::new([0.0; EMBED_DIM], 0.0)
    }

    pub fn weight(&self) -> &[f32] {
        &self.weight
    }

    pub fn bias(&self) -> f32 {
        self.bias
    }
}

/// Three convolutions plus the linear head.
///
/// Read-only once built; share it between engines with an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct TinyConvNet {
    c1: Conv2d,
    c2: Conv2d,
    c3: Conv2d,
    head: LinearHead,
}

impl TinyConvNet {
    /// Assemble a net, checking the 1→8→16→32 channel chain.
    pub fn from_layers(c1: Conv2d, c2: Conv2d, c3: Conv2d, head: LinearHead) -> Result<Self> {
        for (i, conv) in [&c1, &c2, &c3].into_iter().enumerate() {
            let expected = (CHANNELS[i], CHANNELS[i + 1]);
            let got = (conv.in_channels(), conv.out_channels());
            if got != expected {
                return Err(LoadError::Shape(format!(
                    "conv{} is {}->{}, expected {}->{}",
                    i + 1,
                    got.0,
                    got.1,
                    expected.0,
                    expected.1
                )));
            }
        }
        Ok(Self { c1, c2, c3, head })
    }

    /// All weights and biases zero: every input maps to logit 0.
    pub fn zeros() -> Self {
        Self {
            c1: Conv2d::zeros(CHANNELS[0], CHANNELS[1]),
            c2: Conv2d::zeros(CHANNELS[1], CHANNELS[2]),
            c3: Conv2d::zeros(CHANNELS[2], CHANNELS[3]),
            head: LinearHead::zeros(),
        }
    }

    /// Load all four artifacts.  Nothing is returned unless every one of
    /// them reads completely.
    pub fn load(set: &WeightSet) -> Result<Self> {
        let c1 = weights::load_conv(&set.conv1, CHANNELS[0], CHANNELS[1])?;
        let c2 = weights::load_conv(&set.conv2, CHANNELS[1], CHANNELS[2])?;
        let c3 = weights::load_conv(&set.conv3, CHANNELS[2], CHANNELS[3])?;
        let head = weights::load_head(&set.classifier)?;
        info!("loaded TinyConvNet weights: {:?}", set);
        Self::from_layers(c1, c2, c3, head)
    }

    /// Write the four artifacts in the layout [`Self::load`] reads.
    pub fn save(&self, set: &WeightSet) -> Result<()> {
        weights::write_conv(&set.conv1, &self.c1)?;
        weights::write_conv(&set.conv2, &self.c2)?;
        weights::write_conv(&set.conv3, &self.c3)?;
        weights::write_head(&set.classifier, &self.head)
    }

    pub fn conv1(&self) -> &Conv2d {
        &self.c1
    }

    pub fn conv2(&self) -> &Conv2d {
        &self.c2
    }

    pub fn conv3(&self) -> &Conv2d {
        &self.c3
    }

    pub fn head(&self) -> &LinearHead {
        &self.head
    }
}
