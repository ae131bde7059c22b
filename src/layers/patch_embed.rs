use burn::prelude::*;

#[derive(Config, Debug)]
pub struct PatchEmbedConfig {
    pub image_size: usize,
    pub patch_size: usize,
    pub input_channels: usize,
    pub embedding_dimension: usize,
}

impl Default for PatchEmbedConfig {
    fn default() -> Self {
        Self {
            image_size: 224,
            patch_size: 16,
            input_channels: 3,
            embedding_dimension: 768,
        }
    }
}

impl PatchEmbedConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> PatchEmbed<B> {
        PatchEmbed::new(device, self.clone())
    }

    /// Patches along one side of the image.
    pub fn grid_size(&self) -> usize {
        self.image_size / self.patch_size
    }
}

#[derive(Module, Debug)]
pub struct PatchEmbed<B: Backend> {
    proj: nn::conv::Conv2d<B>,
    patch_size: usize,
}

impl<B: Backend> PatchEmbed<B> {
    pub fn new(device: &B::Device, config: PatchEmbedConfig) -> Self {
        assert!(
            config.image_size % config.patch_size == 0,
            "image size {} is not a multiple of the patch size {}",
            config.image_size,
            config.patch_size,
        );

        let kernel_size = [config.patch_size, config.patch_size];
        let proj = nn::conv::Conv2dConfig::new(
            [config.input_channels, config.embedding_dimension],
            kernel_size,
        )
        .with_stride(kernel_size)
        .init(device);

        Self {
            proj,
            patch_size: config.patch_size,
        }
    }

    pub fn patch_size(&self) -> usize {
        self.patch_size
    }

    pub fn parameter_names(&self, prefix: &str) -> Vec<String> {
        let mut names = vec![format!("{prefix}.proj.weight")];
        if self.proj.bias.is_some() {
            names.push(format!("{prefix}.proj.bias"));
        }
        names
    }

    /// `[N, C, H, W]` -> `[N, L, D]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 3> {
        self.proj.forward(x).flatten(2, 3).swap_dims(1, 2)
    }
}
