//! Zero Weights Demo
//!
//! Walks the whole flockscan pipeline without any trained weights:
//! 1. Write an all-zero weight set to a scratch directory
//! 2. Load it back through `WeightSet` / `Classifier::load`
//! 3. Preprocess a synthetic 640x480 BGR frame to 1x128x128
//! 4. Classify it (a zero model always answers p = 0.5)
//!
//! Usage: cargo run -p demos --bin zero_weights_demo

use anyhow::{Context, Result};
use flockscan_classify::{Classifier, ClassifierConfig, Classify};
use flockscan_model::{TinyConvNet, WeightSet};
use flockscan_preprocess::{ChannelOrder, FrameView, Preprocessor};
use std::time::Instant;

const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;

/// Horizontal gradient, written as BGR like a camera would hand it over.
fn synthetic_frame() -> Vec<u8> {
    let mut bytes = Vec::with_capacity((FRAME_WIDTH * FRAME_HEIGHT * 3) as usize);
    for _y in 0..FRAME_HEIGHT {
        for x in 0..FRAME_WIDTH {
            let v = (x * 255 / (FRAME_WIDTH - 1)) as u8;
            bytes.extend_from_slice(&[v / 2, v, 255 - v]);
        }
    }
    bytes
}

fn main() -> Result<()> {
    let dir = tempfile::tempdir().context("Failed to create scratch directory")?;
    let set = WeightSet::from_dir(dir.path());

    println!("Writing zero weights to {}", dir.path().display());
    TinyConvNet::zeros().save(&set).context("Failed to write weights")?;

    let mut classifier =
        Classifier::load(&set, ClassifierConfig::default()).context("Failed to load weights")?;

    let bytes = synthetic_frame();
    let frame = FrameView::packed(&bytes, FRAME_WIDTH, FRAME_HEIGHT, ChannelOrder::Bgr);

    let pre = Preprocessor::default();
    println!("Canonical side: {}", pre.side());

    let t0 = Instant::now();
    let tensor = pre.run(&frame)?;
    let pre_ms = t0.elapsed().as_secs_f64() * 1e3;
    let (min, max) = tensor
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    println!("Tensor {:?}  range [{:.3}, {:.3}]  ({:.2} ms)", tensor.shape(), min, max, pre_ms);

    let t1 = Instant::now();
    let out = classifier.classify_tensor(tensor.view())?;
    println!(
        "{} | prob_unhealthy={:.3} logit={:.3} (threshold={:.2})  ({:.2} ms)",
        out.label,
        out.probability,
        out.logit,
        classifier.threshold(),
        t1.elapsed().as_secs_f64() * 1e3
    );

    Ok(())
}
