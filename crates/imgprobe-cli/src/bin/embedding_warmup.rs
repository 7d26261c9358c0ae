//! Build the embedding runtime once so later requests skip model load and
//! device setup. Run before serving image-embedder requests.

use anyhow::{Context, Result};
use clap::Parser;
use imgprobe_cli::Config;
use imgprobe_core::{Device, ImageEmbedder};

const CONFIRMATION: &str = "image2vec inited";

#[derive(Parser)]
#[command(
    name = "embedding-warmup",
    about = "Load the ResNet-18 embedding model ahead of use"
)]
struct Cli {
    /// Accepted and ignored
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
    _ignored: Vec<String>,
}

fn main() -> Result<()> {
    imgprobe_cli::init_tracing();

    Cli::parse();
    let config = Config::from_env();

    let model_path = config.embed_model_path();
    let device = Device::select(config.allow_accelerator);
    let embedder = ImageEmbedder::load(&model_path, device)
        .with_context(|| format!("loading embedding model {}", model_path.display()))?;
    tracing::info!(device = %embedder.device(), "embedding runtime ready");

    println!("{CONFIRMATION}");
    Ok(())
}
