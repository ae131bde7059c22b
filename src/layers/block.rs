use burn::prelude::*;

use crate::layers::{
    attention::{
        Attention,
        AttentionConfig,
    },
    layer_norm::{
        LayerNorm,
        LayerNormConfig,
    },
    mlp::{
        Mlp,
        MlpConfig,
    },
};


#[derive(Config, Debug)]
pub struct BlockConfig {
    pub attn: AttentionConfig,
    pub mlp_ratio: f32,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            attn: AttentionConfig::default(),
            mlp_ratio: 4.0,
        }
    }
}

impl BlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Block<B> {
        Block::new(device, self.clone())
    }

    pub fn with_dim(mut self, dim: usize, num_heads: usize) -> Self {
        self.attn.dim = dim;
        self.attn.num_heads = num_heads;
        self
    }

    fn mlp_config(&self) -> MlpConfig {
        let hidden = (self.attn.dim as f32 * self.mlp_ratio) as usize;
        MlpConfig::new(self.attn.dim).with_hidden_features(hidden.into())
    }
}


/// Pre-norm transformer block.
#[derive(Module, Debug)]
pub struct Block<B: Backend> {
    norm1: LayerNorm<B>,
    attn: Attention<B>,
    norm2: LayerNorm<B>,
    mlp: Mlp<B>,
}

impl<B: Backend> Block<B> {
    pub fn new(
        device: &B::Device,
        config: BlockConfig,
    ) -> Self {
        let norm1 = LayerNormConfig::new(config.attn.dim).init(device);
        let attn = config.attn.init(device);
        let norm2 = LayerNormConfig::new(config.attn.dim).init(device);
        let mlp = config.mlp_config().init(device);

        Self {
            norm1,
            attn,
            norm2,
            mlp,
        }
    }

    /// Checkpoint parameter names of this block rooted at `prefix`.
    pub fn parameter_names(&self, prefix: &str) -> Vec<String> {
        let mut names = self.norm1.parameter_names(&format!("{prefix}.norm1"));
        names.extend(self.attn.parameter_names(&format!("{prefix}.attn")));
        names.extend(self.norm2.parameter_names(&format!("{prefix}.norm2")));
        names.extend(self.mlp.parameter_names(&format!("{prefix}.mlp")));
        names
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = x.clone() + self.attn.forward(self.norm1.forward(x));
        x.clone() + self.mlp.forward(self.norm2.forward(x))
    }
}
