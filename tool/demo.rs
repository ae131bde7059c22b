use std::path::PathBuf;

use anyhow::Context;
use burn::prelude::*;
use clap::Parser;
use tracing::info;

use burn_mae::{
    download,
    logging,
    model::autoencoder::{MaeArchitecture, MaskedAutoencoder},
    pipeline::{Demo, DemoConfig, DEMO_IMAGE_URL},
};

#[cfg(feature = "backend_wgpu")]
type DemoBackend = burn::backend::Wgpu;
#[cfg(not(feature = "backend_wgpu"))]
type DemoBackend = burn::backend::NdArray<f32>;


/// Masks 75% of an image's patches and reconstructs them with a pretrained MAE.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Image path or http(s) url.
    #[arg(long, default_value = DEMO_IMAGE_URL)]
    image: String,

    /// JSON `DemoConfig`; flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    checkpoint: Option<String>,

    #[arg(long)]
    checkpoint_url: Option<String>,

    #[arg(long, value_enum)]
    arch: Option<MaeArchitecture>,

    #[arg(long)]
    mask_ratio: Option<f32>,

    #[arg(long)]
    seed: Option<u64>,

    /// Write the four panels as png files here. Nothing is written otherwise.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Log filter, overrides `RUST_LOG`.
    #[arg(long)]
    log: Option<String>,
}

impl Args {
    fn demo_config(&self) -> anyhow::Result<DemoConfig> {
        let mut config = match &self.config {
            Some(path) => DemoConfig::load(path)
                .map_err(|err| anyhow::anyhow!("reading config {}: {err:?}", path.display()))?,
            None => DemoConfig::new(),
        };

        if let Some(checkpoint) = &self.checkpoint {
            config.checkpoint_path = checkpoint.clone();
        }
        if let Some(url) = &self.checkpoint_url {
            config.checkpoint_url = url.clone();
        }
        if let Some(arch) = self.arch {
            config.architecture = arch;
        }
        if let Some(mask_ratio) = self.mask_ratio {
            config.mask_ratio = mask_ratio;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }

        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_with_level(args.log.as_deref());

    let config = args.demo_config()?;
    let image = download::open_image(&args.image)
        .with_context(|| format!("loading image {}", args.image))?;

    let device = <DemoBackend as Backend>::Device::default();
    let demo = Demo::<DemoBackend>::new(config, device).context("preparing model")?;
    info!(report = %demo.load_report(), "checkpoint");
    info!(
        image_size = demo.model().image_size(),
        patch_size = demo.model().patch_size(),
        mask_ratio = demo.config().mask_ratio,
        seed = demo.config().seed,
        "model ready",
    );

    let prediction = demo.predict(&image).context("running prediction")?;
    info!(
        loss = prediction.loss,
        masked = prediction.masked_fraction(),
        "prediction finished",
    );

    for (key, panel) in prediction.panels.iter() {
        info!(panel = key, width = panel.width(), height = panel.height());
    }

    if let Some(directory) = &args.output_dir {
        for path in prediction.panels.save(directory)? {
            info!(path = %path.display(), "saved");
        }
    }

    Ok(())
}
