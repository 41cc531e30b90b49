//! 3×3 convolution layer parameters.

use crate::{LoadError, Result, KERNEL};

/// Weights and bias for one 3×3, stride 1, same-padding convolution.
///
/// `weight` is OIHW: output channel, then input channel, then kernel row,
/// then kernel column.
#[derive(Debug, Clone, PartialEq)]
pub struct Conv2d {
    in_channels: usize,
    out_channels: usize,
    weight: Vec<f32>,
    bias: Vec<f32>,
}

impl Conv2d {
    /// Number of weight floats for a layer of this shape.
    pub const fn weight_len(in_channels: usize, out_channels: usize) -> usize {
        out_channels * in_channels * KERNEL * KERNEL
    }

    pub fn new(in_channels: usize, out_channels: usize, weight: Vec<f32>, bias: Vec<f32>) -> Result<Self> {
        let expected = Self::weight_len(in_channels, out_channels);
        if weight.len() != expected {
            return Err(LoadError::Shape(format!(
                "conv {}->{} needs {} weights, got {}",
                in_channels,
                out_channels,
                expected,
                weight.len()
            )));
        }
        if bias.len() != out_channels {
            return Err(LoadError::Shape(format!(
                "conv {}->{} needs {} biases, got {}",
                in_channels,
                out_channels,
                out_channels,
                bias.len()
            )));
        }
        Ok(Self { in_channels, out_channels, weight, bias })
    }

    /// All-zero layer.
    pub fn zeros(in_channels: usize, out_channels: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            weight: vec![0.0; Self::weight_len(in_channels, out_channels)],
            bias: vec![0.0; out_channels],
        }
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn weight(&self) -> &[f32] {
        &self.weight
    }

    pub fn bias(&self) -> &[f32] {
        &self.bias
    }

    /// The nine taps connecting input channel `ic` to output channel `oc`,
    /// row-major.
    #[inline]
    pub fn kernel(&self, oc: usize, ic: usize) -> &[f32] {
        let start = (oc * self.in_channels + ic) * KERNEL * KERNEL;
        &self.weight[start..start + KERNEL * KERNEL]
    }
}
