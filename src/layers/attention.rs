use burn::{prelude::*, tensor::activation::softmax};

use crate::layers::linear_parameter_names;

#[derive(Config, Debug)]
pub struct AttentionConfig {
    pub dim: usize,
    pub num_heads: usize,
    pub qkv_bias: bool,
    pub proj_bias: bool,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            dim: 768,
            num_heads: 12,
            qkv_bias: true,
            proj_bias: true,
        }
    }
}

impl AttentionConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Attention<B> {
        Attention::new(device, self.clone())
    }
}

/// Multi-head self attention with a fused qkv projection.
#[derive(Module, Debug)]
pub struct Attention<B: Backend> {
    pub qkv: nn::Linear<B>,
    pub proj: nn::Linear<B>,
    pub num_heads: usize,
    pub scale: f32,
}

impl<B: Backend> Attention<B> {
    pub fn new(device: &B::Device, config: AttentionConfig) -> Self {
        assert!(
            config.dim % config.num_heads == 0,
            "attention dim {} must be divisible by the head count {}",
            config.dim,
            config.num_heads,
        );

        let head_dim = config.dim / config.num_heads;
        let scale = (head_dim as f32).powf(-0.5);

        let qkv = nn::LinearConfig::new(config.dim, config.dim * 3)
            .with_bias(config.qkv_bias)
            .init::<B>(device);

        let proj = nn::LinearConfig::new(config.dim, config.dim)
            .with_bias(config.proj_bias)
            .init::<B>(device);

        Self {
            qkv,
            proj,
            num_heads: config.num_heads,
            scale,
        }
    }

    pub fn parameter_names(&self, prefix: &str) -> Vec<String> {
        let mut names = linear_parameter_names(&format!("{prefix}.qkv"), &self.qkv);
        names.extend(linear_parameter_names(&format!("{prefix}.proj"), &self.proj));
        names
    }

    #[allow(non_snake_case, clippy::single_range_in_vec_init)]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [B, N, C] = x.shape().dims();
        let head_dim = C / self.num_heads;

        let qkv = self
            .qkv
            .forward(x)
            .reshape([B, N, 3, self.num_heads, head_dim])
            .permute([2, 0, 3, 1, 4]);

        let q: Tensor<B, 4> = qkv
            .clone()
            .slice([0..1])
            .reshape([B, self.num_heads, N, head_dim]);
        let k: Tensor<B, 4> = qkv
            .clone()
            .slice([1..2])
            .reshape([B, self.num_heads, N, head_dim]);
        let v: Tensor<B, 4> = qkv.slice([2..3]).reshape([B, self.num_heads, N, head_dim]);

        let attn = (q * self.scale).matmul(k.swap_dims(2, 3));
        let attn = softmax(attn, 3);

        let x = attn.matmul(v).swap_dims(1, 2).reshape([B, N, C]);

        self.proj.forward(x)
    }
}
