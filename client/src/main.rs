use anyhow::{bail, ensure, Context, Result};
use clap::{ArgGroup, Parser};
use flockscan_classify::batch::{collect_images, run_batch_with, ItemResult};
use flockscan_classify::{Classification, Classifier, ClassifierConfig, Classify, DEFAULT_THRESHOLD};
use flockscan_model::WeightSet;
use log::info;
use std::path::{Path, PathBuf};

// ================ CLI ================== //

/// Classify bird photos as healthy or unhealthy.
#[derive(Parser, Debug)]
#[command(name = "flockscan", version)]
#[command(group(ArgGroup::new("input").required(true).args(["image", "dir"])))]
struct CliArgs {
    /// Single image to classify
    image: Option<PathBuf>,

    /// Classify every matching image in this directory
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Decision threshold on p(unhealthy)
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f32,

    /// Directory holding c1.bin, c2.bin, c3.bin and fc.bin
    #[arg(long, default_value = "weights")]
    weights: PathBuf,

    /// JSON weight-set description; overrides --weights
    #[arg(long)]
    weights_config: Option<PathBuf>,

    /// File extensions picked up in --dir mode
    #[arg(long, value_delimiter = ',', default_values = ["jpg", "jpeg", "png"])]
    extensions: Vec<String>,
}

// ================ STAGES ================== //

/// 1) Resolve which four artifacts to read
fn weight_set(args: &CliArgs) -> Result<WeightSet> {
    match &args.weights_config {
        Some(path) => WeightSet::from_json_file(path)
            .with_context(|| format!("Failed to read weight config {}", path.display())),
        None => Ok(WeightSet::from_dir(&args.weights)),
    }
}

/// 2) One line per classified file
fn result_line(path: &Path, item: &Classification, threshold: f32) -> String {
    format!(
        "[RESULT] {} | prob_unhealthy={:.3} (threshold={:.2}) | file={}",
        item.label,
        item.probability,
        threshold,
        path.display()
    )
}

/// Directory mode line; the cause of a failure is already logged by the batch runner.
fn item_line(item: &ItemResult) -> String {
    match &item.outcome {
        Ok(c) => format!(
            "[RESULT] {:<10} | p_unhealthy={:.3} | {:.1} ms | {}",
            c.label,
            c.probability,
            item.elapsed.as_secs_f64() * 1e3,
            item.path.display()
        ),
        Err(_) => format!("[ERROR] failed | file={}", item.path.display()),
    }
}

/// 3a) Single image mode
fn classify_one(classifier: &mut Classifier, path: &Path) -> Result<()> {
    let out = classifier
        .classify_path(path)
        .with_context(|| format!("Failed to classify {}", path.display()))?;
    println!("{}", result_line(path, &out, classifier.threshold()));
    Ok(())
}

/// 3b) Directory mode
fn classify_dir(classifier: &mut Classifier, dir: &Path, extensions: &[String]) -> Result<()> {
    let exts: Vec<&str> = extensions.iter().map(String::as_str).collect();
    let files = collect_images(dir, &exts).with_context(|| format!("Failed to list {}", dir.display()))?;
    if files.is_empty() {
        info!("no {} images in {}", exts.join("/"), dir.display());
        return Ok(());
    }

    let summary = run_batch_with(classifier, &files, |item| println!("{}", item_line(item)));
    println!("{summary}");
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 0) Parse CLI arguments
    let args = CliArgs::parse();
    ensure!(
        (0.0..=1.0).contains(&args.threshold),
        "--threshold must be within [0, 1], got {}",
        args.threshold
    );

    // 1) Load the weights
    let set = weight_set(&args)?;
    let mut classifier = Classifier::load(&set, ClassifierConfig { threshold: args.threshold })
        .context("Failed to load model weights")?;

    // 2) Classify
    match (&args.image, &args.dir) {
        (Some(image), None) => classify_one(&mut classifier, image),
        (None, Some(dir)) => classify_dir(&mut classifier, dir, &args.extensions),
        _ => bail!("pass either an image path or --dir, not both"),
    }
}
