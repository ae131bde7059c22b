use burn::prelude::*;

use crate::layers::linear_parameter_names;

#[derive(Config, Debug)]
pub struct MlpConfig {
    pub in_features: usize,
    pub hidden_features: Option<usize>,
    pub out_features: Option<usize>,
    #[config(default = true)]
    pub bias: bool,
}

impl MlpConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        Mlp::new(device, self.clone())
    }
}

#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    pub act: nn::Gelu,
    pub fc1: nn::Linear<B>,
    pub fc2: nn::Linear<B>,
}

impl<B: Backend> Mlp<B> {
    fn new(device: &B::Device, config: MlpConfig) -> Self {
        let hidden_features = config.hidden_features.unwrap_or(config.in_features);
        let fc1 = nn::LinearConfig::new(config.in_features, hidden_features)
            .with_bias(config.bias)
            .init(device);

        let out_features = config.out_features.unwrap_or(config.in_features);
        let fc2 = nn::LinearConfig::new(hidden_features, out_features)
            .with_bias(config.bias)
            .init(device);

        Self {
            act: nn::Gelu::new(),
            fc1,
            fc2,
        }
    }

    pub fn parameter_names(&self, prefix: &str) -> Vec<String> {
        let mut names = linear_parameter_names(&format!("{prefix}.fc1"), &self.fc1);
        names.extend(linear_parameter_names(&format!("{prefix}.fc2"), &self.fc2));
        names
    }

    pub fn forward<const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        let x = self.fc1.forward(x);
        let x = self.act.forward(x);
        self.fc2.forward(x)
    }
}
