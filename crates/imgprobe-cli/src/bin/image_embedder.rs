use anyhow::{Context, Result};
use clap::Parser;
use imgprobe_cli::Config;
use imgprobe_core::{Device, Frame, ImageEmbedder};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "image-embedder",
    about = "Print the ResNet-18 embedding of an image as a JSON array"
)]
struct Cli {
    /// Image to embed
    image: PathBuf,
}

fn main() -> Result<()> {
    imgprobe_cli::init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env();

    let frame = Frame::load(&cli.image)?;

    let model_path = config.embed_model_path();
    let device = Device::select(config.allow_accelerator);
    let mut embedder = ImageEmbedder::load(&model_path, device)
        .with_context(|| format!("loading embedding model {}", model_path.display()))?;

    let embedding = embedder.embed(&frame)?;
    tracing::debug!(dims = embedding.len(), device = %device, "embedded image");

    imgprobe_cli::print_json(&embedding)
}
