use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facetool_core::{FaceTool, ImageBuffer};
use facetool_engine::OnnxEngine;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "facetool", version, about = "Face detection, feature extraction and verification")]
struct Cli {
    /// Engine configuration file (JSON, or TOML by extension)
    #[arg(short, long, env = "FACETOOL_CONFIG", default_value = "facetool.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Locate faces and print bounding boxes, scores and landmarks
    Detect {
        image: PathBuf,
    },
    /// Locate faces and print an embedding for each
    Extract {
        image: PathBuf,
    },
    /// Compare the best face of two images
    Verify {
        first: PathBuf,
        second: PathBuf,
    },
}

#[derive(Serialize)]
struct VerifyOutput {
    similarity: f32,
}

fn main() -> Result<()> {
    // Logs go to stderr so stdout stays pure JSON.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut tool = FaceTool::new(OnnxEngine::new());
    let config = cli.config.to_string_lossy();
    if !tool.init(&config).context("engine initialization")? {
        bail!("failed to initialize engine from {config}");
    }

    let json = match cli.command {
        Commands::Detect { image } => serde_json::to_string_pretty(&tool.detect(&open(&image)?)?)?,
        Commands::Extract { image } => serde_json::to_string_pretty(&tool.extract(&open(&image)?)?)?,
        Commands::Verify { first, second } => {
            let similarity = tool.verify(&open(&first)?, &open(&second)?)?;
            serde_json::to_string_pretty(&VerifyOutput { similarity })?
        }
    };
    println!("{json}");

    Ok(())
}

fn open(path: &Path) -> Result<ImageBuffer> {
    ImageBuffer::open(path).with_context(|| format!("failed to load image {}", path.display()))
}
