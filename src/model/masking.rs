use burn::{prelude::*, tensor::TensorData};
use rand::{rngs::StdRng, Rng, SeedableRng};


/// Number of patches left visible out of `num_patches` for `mask_ratio`.
pub fn kept_patches(num_patches: usize, mask_ratio: f32) -> usize {
    (num_patches as f64 * (1.0 - mask_ratio as f64)) as usize
}

/// Uniform `[0, 1)` noise of shape `[batch, num_patches]`, fully determined by `seed`.
pub fn masking_noise<B: Backend>(
    seed: u64,
    batch: usize,
    num_patches: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let mut rng = StdRng::seed_from_u64(seed);
    let values: Vec<f32> = (0..batch * num_patches).map(|_| rng.gen::<f32>()).collect();

    Tensor::from_data(TensorData::new(values, [batch, num_patches]), device)
}

#[derive(Debug, Clone)]
pub struct MaskedTokens<B: Backend> {
    /// `[N, kept, D]`, visible tokens in shuffled order.
    pub tokens: Tensor<B, 3>,
    /// `[N, L]`, 1 is removed, 0 is kept, in original patch order.
    pub mask: Tensor<B, 2>,
    /// `[N, L]`, inverse of the shuffle permutation.
    pub ids_restore: Tensor<B, 2, Int>,
}

/// Per-sample random masking by argsort of `noise`.
///
/// The patches with the smallest noise values are kept.
pub fn random_masking<B: Backend>(
    x: Tensor<B, 3>,
    mask_ratio: f32,
    noise: Tensor<B, 2>,
) -> MaskedTokens<B> {
    let [batch, num_patches, dim] = x.dims();
    let keep = kept_patches(num_patches, mask_ratio);
    let device = x.device();

    let ids_shuffle = noise.argsort(1);
    let ids_restore = ids_shuffle.clone().argsort(1);

    let ids_keep = ids_shuffle.slice([0..batch, 0..keep]);
    let gather_index = ids_keep
        .unsqueeze_dim::<3>(2)
        .expand([batch as i64, keep as i64, dim as i64]);
    let tokens = x.gather(1, gather_index);

    let mask = Tensor::<B, 2>::ones([batch, num_patches], &device).slice_assign(
        [0..batch, 0..keep],
        Tensor::zeros([batch, keep], &device),
    );
    let mask = mask.gather(1, ids_restore.clone());

    MaskedTokens {
        tokens,
        mask,
        ids_restore,
    }
}
