use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::{
    prelude::*,
    tensor::{ElementConversion, TensorData},
};
use image::{DynamicImage, RgbImage};
use ndarray::{Array3, ArrayView3};
use tracing::{debug, info};

use crate::{
    checkpoint::{self, LoadReport, DEFAULT_CHECKPOINT_PATH, DEFAULT_CHECKPOINT_URL},
    display::to_rgb_image,
    error::{MaeError, Result},
    model::{
        autoencoder::{MaeArchitecture, MaskedAutoencoder},
        mae::MaskedAutoencoderViT,
    },
    preprocess::{preprocess, RGB_CHANNELS},
};

/// Fox, from ILSVRC2012_val_00046145.
pub const DEMO_IMAGE_URL: &str =
    "https://user-images.githubusercontent.com/11435359/147738734-196fd92f-9260-48d5-ba7e-bf103d29364d.jpg";

pub const PANEL_KEYS: [&str; 4] = ["original", "masked", "reconstructed", "visible"];


#[derive(Config, Debug)]
pub struct DemoConfig {
    #[config(default = "DEFAULT_CHECKPOINT_PATH.to_string()")]
    pub checkpoint_path: String,
    #[config(default = "DEFAULT_CHECKPOINT_URL.to_string()")]
    pub checkpoint_url: String,
    #[config(default = "MaeArchitecture::LargePatch16")]
    pub architecture: MaeArchitecture,
    /// Fraction of patches hidden from the encoder.
    #[config(default = 0.75)]
    pub mask_ratio: f32,
    /// Seed of the masking noise; equal seeds give equal masks.
    #[config(default = 2)]
    pub seed: u64,
}

impl DemoConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.mask_ratio) {
            return Err(MaeError::InvalidMaskRatio(self.mask_ratio));
        }
        Ok(())
    }
}


/// The four visualization panels of one prediction.
#[derive(Debug, Clone)]
pub struct Panels {
    pub original: RgbImage,
    /// Original with the removed patches zeroed.
    pub masked: RgbImage,
    pub reconstructed: RgbImage,
    /// Reconstruction with the visible patches pasted back.
    pub visible: RgbImage,
}

impl Panels {
    pub fn get(&self, key: &str) -> Option<&RgbImage> {
        match key {
            "original" => Some(&self.original),
            "masked" => Some(&self.masked),
            "reconstructed" => Some(&self.reconstructed),
            "visible" => Some(&self.visible),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &RgbImage)> {
        PANEL_KEYS
            .into_iter()
            .filter_map(move |key| self.get(key).map(|image| (key, image)))
    }

    /// Writes `<key>.png` for every panel into `directory`.
    pub fn save(&self, directory: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;

        self.iter()
            .map(|(key, image)| -> Result<PathBuf> {
                let path = directory.join(format!("{key}.png"));
                image.save(&path)?;
                Ok(path)
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Prediction {
    pub panels: Panels,
    /// Reconstruction loss on the removed patches. Not used for display.
    pub loss: f32,
    /// Per patch, 1 is removed, 0 is kept.
    pub patch_mask: Vec<f32>,
}

impl Prediction {
    pub fn masked_fraction(&self) -> f32 {
        if self.patch_mask.is_empty() {
            return 0.0;
        }
        self.patch_mask.iter().sum::<f32>() / self.patch_mask.len() as f32
    }
}


/// A prepared model plus the settings of the reconstruction demo.
pub struct Demo<B: Backend, M = MaskedAutoencoderViT<B>> {
    model: M,
    config: DemoConfig,
    device: B::Device,
    load_report: LoadReport,
}

impl<B: Backend, M: MaskedAutoencoder<B>> Demo<B, M> {
    /// Downloads the checkpoint if needed, builds the architecture and loads it.
    pub fn new(config: DemoConfig, device: B::Device) -> Result<Self> {
        config.validate()?;

        let path = checkpoint::ensure_checkpoint(&config.checkpoint_path, &config.checkpoint_url)?;
        let model = M::construct(config.architecture, &device);
        let (model, load_report) = model.load_weights(&path, &device)?;
        info!(architecture = %config.architecture, "model loaded");

        Ok(Self {
            model,
            config,
            device,
            load_report,
        })
    }

    /// Wraps an already prepared model.
    pub fn from_model(model: M, config: DemoConfig, device: B::Device) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            model,
            config,
            device,
            load_report: LoadReport::default(),
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn config(&self) -> &DemoConfig {
        &self.config
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    pub fn predict(&self, image: &DynamicImage) -> Result<Prediction> {
        let input = preprocess(image, self.model.image_size())?;

        info!(
            mask_ratio = self.config.mask_ratio,
            seed = self.config.seed,
            "mae with pixel reconstruction",
        );
        run_one_image(
            input.view(),
            &self.model,
            self.config.mask_ratio,
            self.config.seed,
            &self.device,
        )
    }
}


/// Masks and reconstructs one normalized HWC image and renders the four panels.
pub fn run_one_image<B: Backend, M: MaskedAutoencoder<B>>(
    image: ArrayView3<'_, f32>,
    model: &M,
    mask_ratio: f32,
    seed: u64,
    device: &B::Device,
) -> Result<Prediction> {
    let (height, width, channels) = image.dim();
    if channels != RGB_CHANNELS {
        return Err(MaeError::ChannelCount {
            expected: RGB_CHANNELS,
            actual: channels,
        });
    }

    let values: Vec<f32> = image.iter().copied().collect();
    let x = Tensor::<B, 4>::from_data(TensorData::new(values, [1, height, width, channels]), device);

    let output = model.forward(x.clone().permute([0, 3, 1, 2]), mask_ratio, seed);
    let reconstruction = model.unpatchify(output.reconstruction).permute([0, 2, 3, 1]);

    let patch = model.patch_size();
    let [batch, num_patches] = output.mask.dims();
    let mask = Tensor::<B, 3>::ones([batch, num_patches, patch * patch * channels], device)
        * output.mask.clone().unsqueeze_dim::<3>(2);
    let mask = model.unpatchify(mask).permute([0, 2, 3, 1]);

    let masked = x.clone() * mask.clone().neg().add_scalar(1.0);
    let visible = masked.clone() + reconstruction.clone() * mask;

    let loss = output.loss.into_scalar().elem::<f32>();
    let patch_mask = tensor_values(output.mask)?;
    debug!(loss, masked = patch_mask.iter().sum::<f32>(), total = patch_mask.len(), "reconstructed");

    Ok(Prediction {
        panels: Panels {
            original: tensor_to_image(x)?,
            masked: tensor_to_image(masked)?,
            reconstructed: tensor_to_image(reconstruction)?,
            visible: tensor_to_image(visible)?,
        },
        loss,
        patch_mask,
    })
}

fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| MaeError::TensorData(format!("{err:?}")))
}

/// First item of an NHWC batch as an 8-bit image.
fn tensor_to_image<B: Backend>(tensor: Tensor<B, 4>) -> Result<RgbImage> {
    let [_, height, width, channels] = tensor.dims();
    let values = tensor_values(tensor)?;
    let values = values[..height * width * channels].to_vec();

    let array = Array3::from_shape_vec((height, width, channels), values)
        .map_err(|err| MaeError::TensorData(err.to_string()))?;

    to_rgb_image(array.view())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_mirrors_the_demo() {
        let config = DemoConfig::new();

        assert_eq!(config.checkpoint_path, "resources/mae_visualize_vit_large.pth");
        assert_eq!(config.architecture, MaeArchitecture::LargePatch16);
        assert_eq!(config.mask_ratio, 0.75);
        assert_eq!(config.seed, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_mask_ratios_outside_unit_interval() {
        for ratio in [1.0, -0.1, 1.5, f32::NAN] {
            let config = DemoConfig::new().with_mask_ratio(ratio);
            assert!(matches!(config.validate(), Err(MaeError::InvalidMaskRatio(_))));
        }
    }

    #[test]
    fn panels_are_keyed() {
        let image = RgbImage::new(2, 2);
        let panels = Panels {
            original: image.clone(),
            masked: image.clone(),
            reconstructed: image.clone(),
            visible: image,
        };

        let keys: Vec<_> = panels.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, PANEL_KEYS);
        assert!(panels.get("loss").is_none());
    }

    #[test]
    fn saves_one_png_per_panel() {
        let image = RgbImage::new(4, 4);
        let panels = Panels {
            original: image.clone(),
            masked: image.clone(),
            reconstructed: image.clone(),
            visible: image,
        };

        let dir = tempfile::tempdir().unwrap();
        let written = panels.save(dir.path().join("out")).unwrap();

        assert_eq!(written.len(), 4);
        assert!(written.iter().all(|path| path.exists()));
        assert!(dir.path().join("out").join("visible.png").exists());
    }
}
