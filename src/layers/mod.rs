pub mod attention;
pub mod block;
pub mod layer_norm;
pub mod mlp;
pub mod patch_embed;
pub mod pos_embed;

use burn::{nn::Linear, prelude::Backend};

pub(crate) fn linear_parameter_names<B: Backend>(prefix: &str, linear: &Linear<B>) -> Vec<String> {
    let mut names = vec![format!("{prefix}.weight")];
    if linear.bias.is_some() {
        names.push(format!("{prefix}.bias"));
    }
    names
}
