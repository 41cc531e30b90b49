//! Shared Weights Demo
//!
//! One `TinyConvNet` behind an `Arc`, one `Classifier` (and therefore one
//! scratch pool) per worker thread.  Each worker classifies a slice of
//! synthetic frames and the results are compared against a single-threaded
//! pass.
//!
//! Usage: cargo run -p demos --bin shared_weights_demo [weights-dir]

use anyhow::{anyhow, Result};
use flockscan_classify::{Classification, Classifier};
use flockscan_model::{TinyConvNet, WeightSet};
use flockscan_preprocess::{ChannelOrder, FrameView};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

const WORKERS: usize = 4;
const FRAMES: usize = 32;
const SIDE: u32 = 256;

fn frame(seed: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity((SIDE * SIDE * 3) as usize);
    for y in 0..SIDE as usize {
        for x in 0..SIDE as usize {
            bytes.extend_from_slice(&[(x * seed % 256) as u8, (y + seed) as u8, ((x ^ y) % 256) as u8]);
        }
    }
    bytes
}

fn classify_all(classifier: &mut Classifier, frames: &[Vec<u8>]) -> Result<Vec<Classification>> {
    frames
        .iter()
        .map(|bytes| {
            let view = FrameView::packed(bytes, SIDE, SIDE, ChannelOrder::Rgb);
            Ok(classifier.classify_frame(&view)?)
        })
        .collect()
}

fn main() -> Result<()> {
    // real weights if a directory is given, zeros otherwise
    let net = match std::env::args().nth(1) {
        Some(dir) => TinyConvNet::load(&WeightSet::from_dir(dir))?,
        None => TinyConvNet::zeros(),
    };
    let mut first = Classifier::new(Arc::new(net));
    let frames: Arc<Vec<Vec<u8>>> = Arc::new((1..=FRAMES).map(frame).collect());

    let t0 = Instant::now();
    let reference = classify_all(&mut first, &frames)?;
    let serial = t0.elapsed();

    let t1 = Instant::now();
    let chunk = FRAMES.div_ceil(WORKERS);
    let handles: Vec<_> = (0..WORKERS)
        .map(|w| {
            // sibling: same weights, its own scratch pool
            let mut classifier = Classifier::with_config(Arc::clone(first.net()), *first.config());
            let frames = Arc::clone(&frames);
            thread::spawn(move || {
                let lo = (w * chunk).min(frames.len());
                let hi = ((w + 1) * chunk).min(frames.len());
                classify_all(&mut classifier, &frames[lo..hi])
            })
        })
        .collect();

    let mut parallel = Vec::with_capacity(FRAMES);
    for h in handles {
        let part = h.join().map_err(|_| anyhow!("worker panicked"))??;
        parallel.extend(part);
    }
    let threaded = t1.elapsed();

    let mismatches = reference.iter().zip(&parallel).filter(|(a, b)| a != b).count();
    println!(
        "{} frames: serial {:.1} ms, {} workers {:.1} ms, mismatches={}",
        FRAMES,
        serial.as_secs_f64() * 1e3,
        WORKERS,
        threaded.as_secs_f64() * 1e3,
        mismatches
    );
    if mismatches > 0 {
        return Err(anyhow!("threaded results diverged from the serial pass"));
    }
    Ok(())
}
