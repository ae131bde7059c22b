use std::{fmt, path::Path, str::FromStr};

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    checkpoint::LoadReport,
    error::{MaeError, Result},
};


/// Result of one masked forward pass.
#[derive(Debug, Clone)]
pub struct MaeOutput<B: Backend> {
    /// Mean squared error over the removed patches.
    pub loss: Tensor<B, 1>,
    /// `[N, L, patch_size^2 * 3]`
    pub reconstruction: Tensor<B, 3>,
    /// `[N, L]`, 1 is removed, 0 is kept.
    pub mask: Tensor<B, 2>,
}

/// Narrow interface the reconstruction pipeline drives a model through.
pub trait MaskedAutoencoder<B: Backend>: Sized {
    fn construct(architecture: MaeArchitecture, device: &B::Device) -> Self;

    /// Loads parameters from `path` without failing on name mismatches.
    fn load_weights(self, path: &Path, device: &B::Device) -> Result<(Self, LoadReport)>;

    fn patch_size(&self) -> usize;

    fn image_size(&self) -> usize;

    /// Masks `mask_ratio` of the patches of `images` (`[N, 3, H, W]`) with noise
    /// drawn from `seed`, then reconstructs every patch.
    fn forward(&self, images: Tensor<B, 4>, mask_ratio: f32, seed: u64) -> MaeOutput<B>;

    /// `[N, L, patch_size^2 * 3]` -> `[N, 3, H, W]`
    fn unpatchify(&self, patches: Tensor<B, 3>) -> Tensor<B, 4>;
}


#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "import", derive(clap::ValueEnum))]
pub enum MaeArchitecture {
    #[serde(rename = "mae_vit_base_patch16")]
    #[cfg_attr(feature = "import", value(name = "mae_vit_base_patch16"))]
    BasePatch16,
    #[default]
    #[serde(rename = "mae_vit_large_patch16")]
    #[cfg_attr(feature = "import", value(name = "mae_vit_large_patch16"))]
    LargePatch16,
    #[serde(rename = "mae_vit_huge_patch14")]
    #[cfg_attr(feature = "import", value(name = "mae_vit_huge_patch14"))]
    HugePatch14,
}

impl MaeArchitecture {
    pub const ALL: [MaeArchitecture; 3] = [
        MaeArchitecture::BasePatch16,
        MaeArchitecture::LargePatch16,
        MaeArchitecture::HugePatch14,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            MaeArchitecture::BasePatch16 => "mae_vit_base_patch16",
            MaeArchitecture::LargePatch16 => "mae_vit_large_patch16",
            MaeArchitecture::HugePatch14 => "mae_vit_huge_patch14",
        }
    }
}

impl fmt::Display for MaeArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MaeArchitecture {
    type Err = MaeError;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|arch| arch.name() == name)
            .ok_or_else(|| MaeError::UnknownArchitecture(name.to_string()))
    }
}
