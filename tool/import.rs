use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use burn_mae::{
    checkpoint::{self, DEFAULT_CHECKPOINT_PATH, DEFAULT_CHECKPOINT_URL},
    logging,
    model::{autoencoder::MaskedAutoencoder, autoencoder::MaeArchitecture, mae::MaskedAutoencoderViT},
};

type Backend = burn::backend::NdArray<f32>;


/// Converts a PyTorch MAE checkpoint into a burn `.mpk` record.
#[derive(Debug, Parser)]
struct Args {
    #[arg(long, default_value = DEFAULT_CHECKPOINT_PATH)]
    checkpoint: PathBuf,

    #[arg(long, default_value = DEFAULT_CHECKPOINT_URL)]
    checkpoint_url: String,

    #[arg(long, value_enum, default_value_t = MaeArchitecture::LargePatch16)]
    arch: MaeArchitecture,

    /// Defaults to the checkpoint path with an `.mpk` extension.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    logging::init();
    let args = Args::parse();
    let device = Default::default();

    let path = checkpoint::ensure_checkpoint(&args.checkpoint, &args.checkpoint_url)?;
    let model = <MaskedAutoencoderViT<Backend> as MaskedAutoencoder<Backend>>::construct(args.arch, &device);
    let (model, report) = model
        .load_weights(&path, &device)
        .with_context(|| format!("loading {}", path.display()))?;
    info!(%report, "imported");

    let output = args.output.unwrap_or(path);
    let written = checkpoint::save_burn_record(model, output).context("saving burn record")?;
    info!(path = %written.display(), "saved");

    Ok(())
}
