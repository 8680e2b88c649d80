use clap::Parser;
use common::{Environment, setup_logging};
use preprocess::Pipeline;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "preprocess", about = "Apply CLAHE to a YOLO dataset before training")]
struct Args {
    /// Dataset root containing one directory per split
    #[arg(long, default_value = "Dataset")]
    dataset: PathBuf,

    /// Split to process; repeat for several
    #[arg(long = "split", default_values_t = [String::from("train"), String::from("valid")])]
    splits: Vec<String>,

    /// Also copy matching YOLO label files into processed_labels/
    #[arg(long)]
    with_labels: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level, Environment::from_env());

    let pipeline = Pipeline::new(args.with_labels, !args.no_progress);

    let mut images = 0;
    let mut skipped = 0;
    let mut labels = 0;

    for split in &args.splits {
        let Some(report) = pipeline.process_split(&args.dataset, split)? else {
            continue;
        };

        tracing::info!(
            split = %report.split,
            processed = report.images.processed.len(),
            skipped = report.images.skipped,
            labels_copied = report.labels_copied,
            labels_missing = report.labels_missing,
            "Split done"
        );

        images += report.images.processed.len();
        skipped += report.images.skipped;
        labels += report.labels_copied;
    }

    tracing::info!(images, skipped, labels, "Preprocessing completed");
    Ok(())
}
