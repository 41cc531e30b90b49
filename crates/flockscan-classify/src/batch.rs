//! Directory batch driver core.
//!
//! Files are classified one after another in sorted order.  A file that
//! fails to decode is counted and logged, never fatal to the batch.

use crate::{Classification, ClassifyError, Classify, Label};
use log::{info, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Extensions the client picks up by default.
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Regular, non-hidden files in `dir` whose extension matches one of
/// `extensions` (case-insensitive), sorted by path.
pub fn collect_images(dir: &Path, extensions: &[&str]) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        let matches = path
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy();
                extensions.iter().any(|want| ext.eq_ignore_ascii_case(want))
            })
            .unwrap_or(false);
        // follows symlinks, like stat(2)
        if matches && std::fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Outcome for one file.
#[derive(Debug)]
pub struct ItemResult {
    pub path: PathBuf,
    pub elapsed: Duration,
    pub outcome: Result<Classification, ClassifyError>,
}

/// Per-file results plus aggregate counts and timing.
#[derive(Debug)]
pub struct BatchSummary {
    pub results: Vec<ItemResult>,
    pub threshold: f32,
    pub healthy: usize,
    pub unhealthy: usize,
    pub errors: usize,
    pub elapsed: Duration,
    min_p: f64,
    max_p: f64,
    sum_p: f64,
}

impl BatchSummary {
    fn new(threshold: f32, capacity: usize) -> Self {
        Self {
            results: Vec::with_capacity(capacity),
            threshold,
            healthy: 0,
            unhealthy: 0,
            errors: 0,
            elapsed: Duration::ZERO,
            min_p: f64::INFINITY,
            max_p: f64::NEG_INFINITY,
            sum_p: 0.0,
        }
    }

    fn record(&mut self, item: ItemResult) {
        match &item.outcome {
            Ok(c) => {
                match c.label {
                    Label::Healthy => self.healthy += 1,
                    Label::Unhealthy => self.unhealthy += 1,
                }
                let p = c.probability as f64;
                self.min_p = self.min_p.min(p);
                self.max_p = self.max_p.max(p);
                self.sum_p += p;
            }
            Err(_) => self.errors += 1,
        }
        self.results.push(item);
    }

    pub fn files(&self) -> usize {
        self.results.len()
    }

    pub fn ok(&self) -> usize {
        self.files() - self.errors
    }

    pub fn min_probability(&self) -> Option<f64> {
        (self.ok() > 0).then_some(self.min_p)
    }

    pub fn max_probability(&self) -> Option<f64> {
        (self.ok() > 0).then_some(self.max_p)
    }

    pub fn avg_probability(&self) -> Option<f64> {
        (self.ok() > 0).then(|| self.sum_p / self.ok() as f64)
    }

    /// Files per second over the whole batch, failures included.
    pub fn throughput_fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if self.files() == 0 || secs <= 0.0 {
            return 0.0;
        }
        self.files() as f64 / secs
    }

    /// Wall time per successfully classified file.
    pub fn avg_ms_per_frame(&self) -> f64 {
        if self.ok() == 0 {
            return 0.0;
        }
        self.elapsed.as_secs_f64() * 1e3 / self.ok() as f64
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- SUMMARY ---")?;
        writeln!(f, "files: {}  (ok={}, errors={})", self.files(), self.ok(), self.errors)?;
        writeln!(
            f,
            "predicted: UNHEALTHY={}, HEALTHY={} (threshold={:.2})",
            self.unhealthy, self.healthy, self.threshold
        )?;
        if let (Some(avg), Some(min), Some(max)) =
            (self.avg_probability(), self.min_probability(), self.max_probability())
        {
            writeln!(f, "p_unhealthy: avg={:.3}  min={:.3}  max={:.3}", avg, min, max)?;
        }
        write!(
            f,
            "time: total={:.1} ms  avg={:.1} ms/frame  fps={:.2}",
            self.elapsed.as_secs_f64() * 1e3,
            self.avg_ms_per_frame(),
            self.throughput_fps()
        )
    }
}

/// Classify every file, reporting each result to `on_item` as it lands.
pub fn run_batch_with<C, F>(classifier: &mut C, files: &[PathBuf], mut on_item: F) -> BatchSummary
where
    C: Classify + ?Sized,
    F: FnMut(&ItemResult),
{
    let mut summary = BatchSummary::new(classifier.threshold(), files.len());
    info!("classifying {} file(s)", files.len());

    let t0 = Instant::now();
    for path in files {
        let s0 = Instant::now();
        let outcome = classifier.classify_path(path);
        let item = ItemResult { path: path.clone(), elapsed: s0.elapsed(), outcome };

        if let Err(e) = &item.outcome {
            warn!("skipping {:?}: {}", path, e);
        }
        on_item(&item);
        summary.record(item);
    }
    summary.elapsed = t0.elapsed();
    summary
}

pub fn run_batch<C: Classify + ?Sized>(classifier: &mut C, files: &[PathBuf]) -> BatchSummary {
    run_batch_with(classifier, files, |_| {})
}
