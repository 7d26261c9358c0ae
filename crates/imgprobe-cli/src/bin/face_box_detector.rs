use anyhow::{Context, Result};
use clap::Parser;
use imgprobe_cli::Config;
use imgprobe_core::{CascadeDetector, DetectParams, Frame};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "face-box-detector",
    about = "Detect face boxes with a Haar cascade and print them as JSON"
)]
struct Cli {
    /// Image to scan
    image: PathBuf,
    /// Classifier file, resolved against IMGPROBE_CASCADE_DIR
    /// (default: haarcascade_frontalface_default.xml)
    classifier: Option<String>,
}

fn main() -> Result<()> {
    imgprobe_cli::init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env();

    let cascade_path = config.cascade_path(cli.classifier.as_deref());
    let detector = CascadeDetector::load(&cascade_path)
        .with_context(|| format!("loading classifier {}", cascade_path.display()))?;

    let frame = Frame::load_oriented(&cli.image)?;
    let result = detector.detect_frame(&frame, &DetectParams::default())?;

    imgprobe_cli::print_json(&result)
}
