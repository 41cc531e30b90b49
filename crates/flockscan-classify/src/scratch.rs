// flockscan-classify/src/scratch.rs
// Preallocated intermediates for one forward pass at a time.

use flockscan_model::layers::{
    conv3x3_forward, global_avg_pool, linear_forward, maxpool2x2_forward, relu_inplace, sigmoid,
};
use flockscan_model::{TinyConvNet, CHANNELS, EMBED_DIM};
use flockscan_preprocess::INPUT_SIZE;
use ndarray::{Array3, ArrayView3};

/// Raw output of one forward pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inference {
    pub logit: f32,
    pub probability: f32,
}

/// The five stage buffers plus the pooled embedding.
///
/// A pool serves one inference at a time; every call overwrites all of it.
/// Give each concurrent caller its own pool (the weights can be shared).
#[derive(Debug, Clone)]
pub struct ScratchPool {
    conv1: Array3<f32>, // 8×128×128
    pool1: Array3<f32>, // 8×64×64
    conv2: Array3<f32>, // 16×64×64
    pool2: Array3<f32>, // 16×32×32
    conv3: Array3<f32>, // 32×32×32
    embedding: [f32; EMBED_DIM],
}

impl Default for ScratchPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ScratchPool {
    pub fn new() -> Self {
        let s = INPUT_SIZE as usize;
        Self {
            conv1: Array3::zeros((CHANNELS[1], s, s)),
            pool1: Array3::zeros((CHANNELS[1], s / 2, s / 2)),
            conv2: Array3::zeros((CHANNELS[2], s / 2, s / 2)),
            pool2: Array3::zeros((CHANNELS[2], s / 4, s / 4)),
            conv3: Array3::zeros((CHANNELS[3], s / 4, s / 4)),
            embedding: [0.0; EMBED_DIM],
        }
    }

    /// Total floats held by the pool.
    pub fn len(&self) -> usize {
        self.conv1.len() + self.pool1.len() + self.conv2.len() + self.pool2.len() + self.conv3.len() + EMBED_DIM
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Embedding left behind by the last [`Self::run`].
    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    /// Conv1 → ReLU → Pool → Conv2 → ReLU → Pool → Conv3 → ReLU → GAP → head.
    ///
    /// `input` must be `1×128×128`; the caller checks.
    pub fn run(&mut self, net: &TinyConvNet, input: ArrayView3<f32>) -> Inference {
        conv3x3_forward(input, net.conv1(), self.conv1.view_mut());
        relu_inplace(self.conv1.view_mut());
        maxpool2x2_forward(self.conv1.view(), self.pool1.view_mut());

        conv3x3_forward(self.pool1.view(), net.conv2(), self.conv2.view_mut());
        relu_inplace(self.conv2.view_mut());
        maxpool2x2_forward(self.conv2.view(), self.pool2.view_mut());

        conv3x3_forward(self.pool2.view(), net.conv3(), self.conv3.view_mut());
        relu_inplace(self.conv3.view_mut());

        global_avg_pool(self.conv3.view(), &mut self.embedding);
        let logit = linear_forward(&self.embedding, net.head());
        Inference { logit, probability: sigmoid(logit) }
    }
}
