// flockscan-classify/src/lib.rs
// ============================================================
// flockscan-classify  –  healthy / unhealthy stage
// Runs the fixed TinyConvNet over a canonical 1×128×128 tensor
// out of a preallocated scratch pool.
// ------------------------------------------------------------
// Pipeline: FrameView | path → Array3<f32> → p(unhealthy) → Label
// ------------------------------------------------------------
// Public API
//   * Classifier::load(&WeightSet)    – read the four artifacts
//   * Classifier::classify_frame(..)  – in-memory RGB/BGR frame
//   * Classifier::classify_path(..)   – decode + classify a file
//   * SharedClassifier                – Mutex-serialised handle
//   * batch::run_batch(..)            – directory driver core
// ============================================================

//! flockscan – classification layer
//!
//! This crate provides a small [`Classify`] trait plus the concrete
//! [`Classifier`] that wires `flockscan-preprocess` into the
//! `flockscan-model` kernels.  Each `Classifier` owns its own
//! [`ScratchPool`], so calls take `&mut self`; the weights sit behind an
//! `Arc` and can be shared by as many classifiers as there are threads.

use flockscan_model::{LoadError, TinyConvNet, WeightSet};
use flockscan_preprocess::{FrameView, PreprocessError, Preprocessor, INPUT_SIZE};
use log::debug;
use ndarray::ArrayView3;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;

pub mod batch;
mod scratch;

pub use scratch::{Inference, ScratchPool};

/// Default decision threshold on p(unhealthy).
pub const DEFAULT_THRESHOLD: f32 = 0.50;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("Invalid input shape: expected [1, {size}, {size}], got {got:?}")]
    InputShape { size: u32, got: Vec<usize> },
}

pub type Result<T> = std::result::Result<T, ClassifyError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Healthy,
    Unhealthy,
}

impl Label {
    /// Unhealthy only when `p` is strictly above the threshold, so even
    /// odds stay healthy.
    pub fn from_probability(probability: f32, threshold: f32) -> Self {
        if probability > threshold {
            Label::Unhealthy
        } else {
            Label::Healthy
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // pad so `{:<10}` lines up in batch output
        f.pad(match self {
            Label::Healthy => "HEALTHY",
            Label::Unhealthy => "UNHEALTHY",
        })
    }
}

/// One classified image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    /// Probability of the unhealthy class.
    pub probability: f32,
    pub logit: f32,
    pub label: Label,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierConfig {
    pub threshold: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { threshold: DEFAULT_THRESHOLD }
    }
}

/// Trait for image classifiers.
pub trait Classify {
    /// Classify an already canonical `1×128×128` tensor.
    fn classify_tensor(&mut self, input: ArrayView3<f32>) -> Result<Classification>;

    /// Decode, preprocess and classify an image file.
    fn classify_path(&mut self, path: &Path) -> Result<Classification>;

    fn threshold(&self) -> f32;
}

/// TinyConvNet inference engine with its own scratch pool.
#[derive(Debug, Clone)]
pub struct Classifier {
    net: Arc<TinyConvNet>,
    pool: ScratchPool,
    preprocessor: Preprocessor,
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(net: Arc<TinyConvNet>) -> Self {
        Self::with_config(net, ClassifierConfig::default())
    }

    pub fn with_config(net: Arc<TinyConvNet>, config: ClassifierConfig) -> Self {
        Self {
            net,
            pool: ScratchPool::new(),
            preprocessor: Preprocessor::new(INPUT_SIZE),
            config,
        }
    }

    /// Load the four weight artifacts and build a classifier around them.
    pub fn load(set: &WeightSet, config: ClassifierConfig) -> Result<Self> {
        let net = TinyConvNet::load(set)?;
        Ok(Self::with_config(Arc::new(net), config))
    }

    /// Shared handle to the weights, for building sibling classifiers.
    pub fn net(&self) -> &Arc<TinyConvNet> {
        &self.net
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.config.threshold = threshold;
    }

    /// Run the network once.  Rejects anything but a `1×128×128` tensor.
    pub fn forward(&mut self, input: ArrayView3<f32>) -> Result<Inference> {
        let s = INPUT_SIZE as usize;
        if input.dim() != (1, s, s) {
            return Err(ClassifyError::InputShape { size: INPUT_SIZE, got: input.shape().to_vec() });
        }

        let t0 = Instant::now();
        let out = self.pool.run(&self.net, input);
        debug!(
            "forward: logit={:.4} p={:.4} in {:.2} ms",
            out.logit,
            out.probability,
            t0.elapsed().as_secs_f64() * 1e3
        );
        Ok(out)
    }

    pub fn classify_frame(&mut self, frame: &FrameView) -> Result<Classification> {
        let input = self.preprocessor.run(frame)?;
        self.classify_tensor(input.view())
    }

    fn label(&self, out: Inference) -> Classification {
        Classification {
            probability: out.probability,
            logit: out.logit,
            label: Label::from_probability(out.probability, self.config.threshold),
        }
    }
}

impl Classify for Classifier {
    fn classify_tensor(&mut self, input: ArrayView3<f32>) -> Result<Classification> {
        let out = self.forward(input)?;
        Ok(self.label(out))
    }

    fn classify_path(&mut self, path: &Path) -> Result<Classification> {
        let input = self.preprocessor.run_path(path)?;
        self.classify_tensor(input.view())
    }

    fn threshold(&self) -> f32 {
        self.config.threshold
    }
}

/// A [`Classifier`] behind a mutex, cloneable across threads.
///
/// Calls are serialised; for parallel throughput build one
/// [`Classifier`] per thread from the same `Arc<TinyConvNet>` instead.
#[derive(Debug, Clone)]
pub struct SharedClassifier {
    inner: Arc<Mutex<Classifier>>,
}

impl SharedClassifier {
    pub fn new(classifier: Classifier) -> Self {
        Self { inner: Arc::new(Mutex::new(classifier)) }
    }

    fn with<T>(&self, f: impl FnOnce(&mut Classifier) -> T) -> T {
        // a panicked holder leaves nothing behind: every call rewrites the pool
        let mut guard = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut *guard)
    }

    pub fn classify_frame(&self, frame: &FrameView) -> Result<Classification> {
        self.with(|c| c.classify_frame(frame))
    }
}

impl Classify for SharedClassifier {
    fn classify_tensor(&mut self, input: ArrayView3<f32>) -> Result<Classification> {
        self.with(|c| c.classify_tensor(input))
    }

    fn classify_path(&mut self, path: &Path) -> Result<Classification> {
        self.with(|c| c.classify_path(path))
    }

    fn threshold(&self) -> f32 {
        self.with(|c| c.threshold())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flockscan_model::{Conv2d, LinearHead};
    use ndarray::Array3;

    #[test]
    fn even_odds_are_healthy() {
        assert_eq!(Label::from_probability(0.5, 0.5), Label::Healthy);
        assert_eq!(Label::from_probability(0.5001, 0.5), Label::Unhealthy);
        assert_eq!(Label::from_probability(0.7, 0.8), Label::Healthy);
        assert_eq!(format!("{:<10}|", Label::Healthy), "HEALTHY   |");
    }

    #[test]
    fn set_threshold_relabels_without_reloading() {
        let net = TinyConvNet::from_layers(
            Conv2d::zeros(1, 8),
            Conv2d::zeros(8, 16),
            Conv2d::zeros(16, 32),
            LinearHead::new([0.0; 32], 1.0),
        )
        .unwrap();
        let mut c = Classifier::new(Arc::new(net));
        assert_eq!(c.config().threshold, DEFAULT_THRESHOLD);
        let input = Array3::zeros((1, 128, 128));
        assert_eq!(c.classify_tensor(input.view()).unwrap().label, Label::Unhealthy);

        // p = sigmoid(1) ≈ 0.731
        c.set_threshold(0.8);
        assert_eq!(c.threshold(), 0.8);
        assert_eq!(c.classify_tensor(input.view()).unwrap().label, Label::Healthy);

        let sibling = Classifier::with_config(Arc::clone(c.net()), *c.config());
        assert!(Arc::ptr_eq(sibling.net(), c.net()));
        assert_eq!(sibling.threshold(), 0.8);
    }

    #[test]
    fn rejects_wrong_input_shape() {
        let mut c = Classifier::new(Arc::new(TinyConvNet::zeros()));
        let bad = Array3::<f32>::zeros((3, 128, 128));
        match c.classify_tensor(bad.view()) {
            Err(ClassifyError::InputShape { got, .. }) => assert_eq!(got, vec![3, 128, 128]),
            other => panic!("expected shape error, got {:?}", other),
        }
    }

    #[test]
    fn head_bias_alone_sets_the_logit() {
        let net = TinyConvNet::from_layers(
            Conv2d::zeros(1, 8),
            Conv2d::zeros(8, 16),
            Conv2d::zeros(16, 32),
            LinearHead::new([0.0; 32], 2.0),
        )
        .unwrap();
        let mut c = Classifier::new(Arc::new(net));
        let out = c.classify_tensor(Array3::zeros((1, 128, 128)).view()).unwrap();
        assert_eq!(out.logit, 2.0);
        assert_eq!(out.label, Label::Unhealthy);
        assert!((out.probability - 0.880_797).abs() < 1e-5);
    }

    #[test]
    fn conv3_bias_flows_through_gap_into_head() {
        // relu(bias) survives GAP unchanged; head sums 32 × 0.25
        let net = TinyConvNet::from_layers(
            Conv2d::zeros(1, 8),
            Conv2d::zeros(8, 16),
            Conv2d::new(16, 32, vec![0.0; 32 * 16 * 9], vec![0.25; 32]).unwrap(),
            LinearHead::new([1.0; 32], -8.5),
        )
        .unwrap();
        let mut c = Classifier::new(Arc::new(net));
        let out = c.classify_tensor(Array3::from_elem((1, 128, 128), -1.0).view()).unwrap();
        assert_eq!(out.logit, -0.5);
        assert_eq!(out.label, Label::Healthy);
    }

    #[test]
    fn negative_biases_are_cut_by_relu() {
        let net = TinyConvNet::from_layers(
            Conv2d::zeros(1, 8),
            Conv2d::zeros(8, 16),
            Conv2d::new(16, 32, vec![0.0; 32 * 16 * 9], vec![-4.0; 32]).unwrap(),
            LinearHead::new([1.0; 32], 0.0),
        )
        .unwrap();
        let mut c = Classifier::new(Arc::new(net));
        let out = c.classify_tensor(Array3::zeros((1, 128, 128)).view()).unwrap();
        assert_eq!(out.probability, 0.5);
    }
}
