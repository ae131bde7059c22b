use std::path::Path;

use burn::{
    module::Param,
    nn::Initializer,
    prelude::*,
};

use crate::{
    checkpoint::{self, LoadReport},
    error::Result,
    layers::{
        attention::AttentionConfig,
        block::{Block, BlockConfig},
        layer_norm::{LayerNorm, LayerNormConfig},
        linear_parameter_names,
        patch_embed::{PatchEmbed, PatchEmbedConfig},
        pos_embed,
    },
    model::{
        autoencoder::{MaeArchitecture, MaeOutput, MaskedAutoencoder},
        masking::{masking_noise, random_masking},
    },
};


#[derive(Config, Debug)]
pub struct MaskedAutoencoderConfig {
    pub image_size: usize,
    pub patch_size: usize,
    pub input_channels: usize,
    pub embedding_dimension: usize,
    pub depth: usize,
    pub block_config: BlockConfig,
    pub decoder_embedding_dimension: usize,
    pub decoder_depth: usize,
    pub decoder_block_config: BlockConfig,

    /// Normalize each target patch before computing the loss.
    #[config(default = "false")]
    pub norm_pix_loss: bool,

    #[config(default = "Initializer::Normal{mean:0.0, std:0.02}")]
    pub initializer: Initializer,
}

impl MaskedAutoencoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> MaskedAutoencoderViT<B> {
        MaskedAutoencoderViT::new(device, self.clone())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_dims(
        image_size: usize,
        patch_size: usize,
        embedding_dimension: usize,
        depth: usize,
        num_heads: usize,
        decoder_embedding_dimension: usize,
        decoder_depth: usize,
        decoder_num_heads: usize,
    ) -> Self {
        let block = |dim, num_heads| BlockConfig {
            attn: AttentionConfig {
                dim,
                num_heads,
                ..Default::default()
            },
            ..Default::default()
        };

        Self::new(
            image_size,
            patch_size,
            3,
            embedding_dimension,
            depth,
            block(embedding_dimension, num_heads),
            decoder_embedding_dimension,
            decoder_depth,
            block(decoder_embedding_dimension, decoder_num_heads),
        )
    }

    pub fn vitb() -> Self {
        Self::from_dims(224, 16, 768, 12, 12, 512, 8, 16)
    }

    pub fn vitl() -> Self {
        Self::from_dims(224, 16, 1024, 24, 16, 512, 8, 16)
    }

    pub fn vith() -> Self {
        Self::from_dims(224, 14, 1280, 32, 16, 512, 8, 16)
    }

    pub fn from_architecture(architecture: MaeArchitecture) -> Self {
        match architecture {
            MaeArchitecture::BasePatch16 => Self::vitb(),
            MaeArchitecture::LargePatch16 => Self::vitl(),
            MaeArchitecture::HugePatch14 => Self::vith(),
        }
    }

    fn patch_embed_config(&self) -> PatchEmbedConfig {
        PatchEmbedConfig::new(
            self.image_size,
            self.patch_size,
            self.input_channels,
            self.embedding_dimension,
        )
    }
}


#[derive(Module, Debug)]
pub struct MaskedAutoencoderViT<B: Backend> {
    patch_embed: PatchEmbed<B>,
    cls_token: Param<Tensor<B, 3>>,
    pos_embed: Param<Tensor<B, 3>>,
    blocks: Vec<Block<B>>,
    norm: LayerNorm<B>,

    decoder_embed: nn::Linear<B>,
    mask_token: Param<Tensor<B, 3>>,
    decoder_pos_embed: Param<Tensor<B, 3>>,
    decoder_blocks: Vec<Block<B>>,
    decoder_norm: LayerNorm<B>,
    decoder_pred: nn::Linear<B>,

    image_size: usize,
    input_channels: usize,
    norm_pix_loss: bool,
}

impl<B: Backend> MaskedAutoencoderViT<B> {
    pub fn new(device: &B::Device, config: MaskedAutoencoderConfig) -> Self {
        let patch_embed_config = config.patch_embed_config();
        let grid_size = patch_embed_config.grid_size();
        let patch_embed = patch_embed_config.init(device);

        let cls_token = config
            .initializer
            .init([1, 1, config.embedding_dimension], device);
        let pos_embed =
            pos_embed::sincos_2d(config.embedding_dimension, grid_size, true, device);

        let blocks = (0..config.depth)
            .map(|_| config.block_config.init(device))
            .collect();
        let norm = LayerNormConfig::new(config.embedding_dimension).init(device);

        let decoder_embed = nn::LinearConfig::new(
            config.embedding_dimension,
            config.decoder_embedding_dimension,
        )
        .init(device);
        let mask_token = config
            .initializer
            .init([1, 1, config.decoder_embedding_dimension], device);
        let decoder_pos_embed = pos_embed::sincos_2d(
            config.decoder_embedding_dimension,
            grid_size,
            true,
            device,
        );

        let decoder_blocks = (0..config.decoder_depth)
            .map(|_| config.decoder_block_config.init(device))
            .collect();
        let decoder_norm = LayerNormConfig::new(config.decoder_embedding_dimension).init(device);
        let decoder_pred = nn::LinearConfig::new(
            config.decoder_embedding_dimension,
            config.patch_size * config.patch_size * config.input_channels,
        )
        .init(device);

        Self {
            patch_embed,
            cls_token,
            pos_embed,
            blocks,
            norm,
            decoder_embed,
            mask_token,
            decoder_pos_embed,
            decoder_blocks,
            decoder_norm,
            decoder_pred,
            image_size: config.image_size,
            input_channels: config.input_channels,
            norm_pix_loss: config.norm_pix_loss,
        }
    }

    /// Parameter names as they appear in the reference PyTorch state dict.
    pub fn parameter_names(&self) -> Vec<String> {
        let mut names = vec![
            "cls_token".to_string(),
            "pos_embed".to_string(),
            "mask_token".to_string(),
            "decoder_pos_embed".to_string(),
        ];

        names.extend(self.patch_embed.parameter_names("patch_embed"));
        for (index, block) in self.blocks.iter().enumerate() {
            names.extend(block.parameter_names(&format!("blocks.{index}")));
        }
        names.extend(self.norm.parameter_names("norm"));

        names.extend(linear_parameter_names("decoder_embed", &self.decoder_embed));
        for (index, block) in self.decoder_blocks.iter().enumerate() {
            names.extend(block.parameter_names(&format!("decoder_blocks.{index}")));
        }
        names.extend(self.decoder_norm.parameter_names("decoder_norm"));
        names.extend(linear_parameter_names("decoder_pred", &self.decoder_pred));

        names
    }

    pub fn num_patches(&self) -> usize {
        let grid = self.image_size / self.patch_embed.patch_size();
        grid * grid
    }

    /// `[N, C, H, W]` -> `[N, L, patch_size^2 * C]`
    pub fn patchify(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        let [batch, channels, height, width] = images.dims();
        let p = self.patch_embed.patch_size();
        assert!(
            height == width && height % p == 0,
            "patchify expects square images with a side divisible by {p}, got {height}x{width}",
        );
        let grid = height / p;

        images
            .reshape([batch, channels, grid, p, grid, p])
            .permute([0, 2, 4, 3, 5, 1])
            .reshape([batch, grid * grid, p * p * channels])
    }

    /// Encodes the visible patches, returning `(latent, mask, ids_restore)`.
    pub fn forward_encoder(
        &self,
        images: Tensor<B, 4>,
        mask_ratio: f32,
        noise: Tensor<B, 2>,
    ) -> (Tensor<B, 3>, Tensor<B, 2>, Tensor<B, 2, Int>) {
        let x = self.patch_embed.forward(images);
        let [batch, num_patches, dim] = x.dims();

        let pos_embed = self.pos_embed.val();
        let x = x + pos_embed.clone().slice([0..1, 1..num_patches + 1, 0..dim]);

        let masked = random_masking(x, mask_ratio, noise);

        let cls = self.cls_token.val() + pos_embed.slice([0..1, 0..1, 0..dim]);
        let cls = cls.expand([batch as i64, -1, -1]);
        let mut x = Tensor::cat(vec![cls, masked.tokens], 1);

        for block in &self.blocks {
            x = block.forward(x);
        }

        (self.norm.forward(x), masked.mask, masked.ids_restore)
    }

    /// Predicts every patch from the latent tokens, `[N, L, patch_size^2 * C]`.
    pub fn forward_decoder(&self, latent: Tensor<B, 3>, ids_restore: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let x = self.decoder_embed.forward(latent);
        let [batch, tokens, dim] = x.dims();
        let num_patches = ids_restore.dims()[1];
        let removed = num_patches + 1 - tokens;

        let visible = x.clone().slice([0..batch, 1..tokens, 0..dim]);
        let patches = if removed > 0 {
            let mask_tokens = self
                .mask_token
                .val()
                .expand([batch as i64, removed as i64, dim as i64]);
            Tensor::cat(vec![visible, mask_tokens], 1)
        } else {
            visible
        };

        let unshuffle = ids_restore
            .unsqueeze_dim::<3>(2)
            .expand([batch as i64, num_patches as i64, dim as i64]);
        let patches = patches.gather(1, unshuffle);

        let cls = x.slice([0..batch, 0..1, 0..dim]);
        let mut x = Tensor::cat(vec![cls, patches], 1) + self.decoder_pos_embed.val();

        for block in &self.decoder_blocks {
            x = block.forward(x);
        }

        let x = self.decoder_pred.forward(self.decoder_norm.forward(x));
        let [_, _, out] = x.dims();

        x.slice([0..batch, 1..num_patches + 1, 0..out])
    }

    /// Mean squared error on the removed patches only.
    pub fn forward_loss(
        &self,
        images: Tensor<B, 4>,
        prediction: Tensor<B, 3>,
        mask: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        let target = self.patchify(images);
        let target = if self.norm_pix_loss {
            let (var, mean) = target.clone().var_mean(2);
            target.sub(mean).div(var.add_scalar(1e-6).sqrt())
        } else {
            target
        };

        let [batch, num_patches, _] = prediction.dims();
        let loss = prediction
            .sub(target)
            .powf_scalar(2.0)
            .mean_dim(2)
            .reshape([batch, num_patches]);

        // an unmasked forward has nothing to score
        loss.mul(mask.clone()).sum().div(mask.sum().clamp_min(1.0))
    }
}

impl<B: Backend> MaskedAutoencoder<B> for MaskedAutoencoderViT<B> {
    fn construct(architecture: MaeArchitecture, device: &B::Device) -> Self {
        MaskedAutoencoderConfig::from_architecture(architecture).init(device)
    }

    fn load_weights(self, path: &Path, device: &B::Device) -> Result<(Self, LoadReport)> {
        checkpoint::load_weights(self, path, device)
    }

    fn patch_size(&self) -> usize {
        self.patch_embed.patch_size()
    }

    fn image_size(&self) -> usize {
        self.image_size
    }

    fn forward(&self, images: Tensor<B, 4>, mask_ratio: f32, seed: u64) -> MaeOutput<B> {
        let [batch, ..] = images.dims();
        let noise = masking_noise(seed, batch, self.num_patches(), &images.device());

        let (latent, mask, ids_restore) =
            self.forward_encoder(images.clone(), mask_ratio, noise);
        let reconstruction = self.forward_decoder(latent, ids_restore);
        let loss = self.forward_loss(images, reconstruction.clone(), mask.clone());

        MaeOutput {
            loss,
            reconstruction,
            mask,
        }
    }

    fn unpatchify(&self, patches: Tensor<B, 3>) -> Tensor<B, 4> {
        let [batch, num_patches, _] = patches.dims();
        let p = self.patch_embed.patch_size();
        let c = self.input_channels;
        let grid = (num_patches as f64).sqrt() as usize;
        assert_eq!(grid * grid, num_patches, "patch count {num_patches} is not a square");

        patches
            .reshape([batch, grid, grid, p, p, c])
            .permute([0, 5, 1, 3, 2, 4])
            .reshape([batch, c, grid * p, grid * p])
    }
}

#[cfg(all(test, feature = "backend_ndarray"))]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray<f32>;

    fn tiny_config() -> MaskedAutoencoderConfig {
        MaskedAutoencoderConfig::from_dims(32, 8, 32, 2, 4, 16, 1, 2)
    }

    #[test]
    fn unpatchify_inverts_patchify() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);

        let images = Tensor::<TestBackend, 1, Int>::arange(0..3 * 32 * 32, &device)
            .float()
            .reshape([1, 3, 32, 32]);
        let patches = model.patchify(images.clone());
        assert_eq!(patches.dims(), [1, 16, 8 * 8 * 3]);

        let restored = model.unpatchify(patches);
        assert_eq!(
            restored.into_data().to_vec::<f32>().unwrap(),
            images.into_data().to_vec::<f32>().unwrap()
        );
    }

    #[test]
    fn patchify_is_channel_last_within_a_patch() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);

        let images = Tensor::<TestBackend, 1, Int>::arange(0..3 * 32 * 32, &device)
            .float()
            .reshape([1, 3, 32, 32]);
        let first = model
            .patchify(images)
            .slice([0..1, 0..1, 0..3])
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        // pixel (0, 0) of each channel plane
        assert_eq!(first, vec![0.0, 1024.0, 2048.0]);
    }

    #[test]
    fn forward_shapes_and_mask_density() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);

        let images = Tensor::<TestBackend, 4>::ones([2, 3, 32, 32], &device);
        let output = model.forward(images, 0.75, 2);

        assert_eq!(output.reconstruction.dims(), [2, 16, 192]);
        assert_eq!(output.mask.dims(), [2, 16]);
        assert_eq!(output.loss.dims(), [1]);

        let mask = output.mask.into_data().to_vec::<f32>().unwrap();
        for sample in mask.chunks(16) {
            assert_eq!(sample.iter().sum::<f32>(), 12.0);
        }
    }

    #[test]
    fn names_cover_reference_layout() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);
        let names = model.parameter_names();

        // 4 embeddings, patch embed, 2 encoder blocks, norm, decoder embed,
        // 1 decoder block, decoder norm, decoder pred
        assert_eq!(names.len(), 4 + 2 + 2 * 12 + 2 + 2 + 12 + 2 + 2);
        assert!(names.contains(&"blocks.1.attn.qkv.weight".to_string()));
        assert!(names.contains(&"decoder_blocks.0.mlp.fc1.bias".to_string()));
        assert!(names.contains(&"decoder_pred.weight".to_string()));
    }

    #[test]
    fn unmasked_forward_scores_zero_loss() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);

        let images = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);
        let output = model.forward(images, 0.0, 2);

        let loss = output.loss.into_scalar();
        assert!(loss.is_finite());
        assert_eq!(loss, 0.0);
        assert_eq!(output.mask.sum().into_scalar(), 0.0);
    }

    fn fixture(name: &str) -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(name)
    }

    // same dims as tests/fixtures/export_checkpoint.py
    fn fixture_model(device: &<TestBackend as Backend>::Device) -> MaskedAutoencoderViT<TestBackend> {
        MaskedAutoencoderConfig::from_dims(32, 8, 32, 1, 4, 16, 1, 2).init(device)
    }

    fn assert_filled(values: Vec<f32>, expected: f32) {
        assert!(!values.is_empty());
        for value in values {
            assert!((value - expected).abs() < 1e-6, "{value} != {expected}");
        }
    }

    #[test]
    fn pytorch_checkpoint_with_extra_entry_loads() {
        let device = Default::default();
        let (model, report) = fixture_model(&device)
            .load_weights(&fixture("mae_tiny_extra_key.pth"), &device)
            .unwrap();

        assert!(report.missing_keys.is_empty());
        assert_eq!(report.unexpected_keys, vec!["head.weight".to_string()]);

        // weight/bias land on gamma/beta
        assert_filled(model.norm.gamma.val().into_data().to_vec::<f32>().unwrap(), 0.01);
        assert_filled(model.decoder_norm.beta.val().into_data().to_vec::<f32>().unwrap(), 0.01);

        // linear weights arrive as [out, in] and are stored as [in, out]
        let weight = model.decoder_pred.weight.val();
        assert_eq!(weight.dims(), [16, 192]);
        let weight = weight.into_data().to_vec::<f32>().unwrap();
        assert!((weight[1] - 0.016).abs() < 1e-6);
        assert!((weight[192] - 0.001).abs() < 1e-6);
    }

    #[test]
    fn pytorch_checkpoint_with_missing_entry_loads() {
        let device = Default::default();
        let (model, report) = fixture_model(&device)
            .load_weights(&fixture("mae_tiny_missing_key.pth"), &device)
            .unwrap();

        assert_eq!(report.missing_keys, vec!["decoder_pred.bias".to_string()]);
        assert!(report.unexpected_keys.is_empty());

        assert_filled(model.cls_token.val().into_data().to_vec::<f32>().unwrap(), 0.01);
        assert_filled(model.norm.gamma.val().into_data().to_vec::<f32>().unwrap(), 0.01);
    }

    #[test]
    fn presets_match_reference_sizes() {
        let large = MaskedAutoencoderConfig::from_architecture(MaeArchitecture::LargePatch16);
        assert_eq!(large.embedding_dimension, 1024);
        assert_eq!(large.depth, 24);
        assert_eq!(large.decoder_embedding_dimension, 512);
        assert_eq!(large.patch_size, 16);

        let huge = MaskedAutoencoderConfig::vith();
        assert_eq!(huge.patch_size, 14);
        assert_eq!(huge.image_size / huge.patch_size, 16);
    }
}
