use burn::{module::Param, prelude::*};

const TEMPERATURE: f64 = 10_000.0;

/// Fixed 2-D sin-cos positional embedding for a `grid_size` x `grid_size` patch grid.
///
/// Returns `[1, grid_size^2 (+1), embed_dim]`. With `cls_token` a zero row is
/// prepended for the class token slot.
pub fn sincos_2d<B: Backend>(
    embed_dim: usize,
    grid_size: usize,
    cls_token: bool,
    device: &B::Device,
) -> Param<Tensor<B, 3>> {
    let values = sincos_2d_values(embed_dim, grid_size, cls_token);
    let tokens = values.len() / embed_dim;

    let tensor = Tensor::<B, 1>::from_floats(values.as_slice(), device).reshape([
        1,
        tokens,
        embed_dim,
    ]);

    Param::from_tensor(tensor).set_require_grad(false)
}

/// Row-major host values of [`sincos_2d`].
///
/// The first half of each row encodes the column coordinate, the second half the row.
pub fn sincos_2d_values(embed_dim: usize, grid_size: usize, cls_token: bool) -> Vec<f32> {
    assert!(
        embed_dim % 4 == 0,
        "sin-cos embedding dimension {embed_dim} must be divisible by 4",
    );

    let half = embed_dim / 2;
    let offset = if cls_token { embed_dim } else { 0 };
    let mut values = vec![0.0f32; offset + grid_size * grid_size * embed_dim];

    for row in 0..grid_size {
        for col in 0..grid_size {
            let start = offset + (row * grid_size + col) * embed_dim;
            let token = &mut values[start..start + embed_dim];
            write_sincos_1d(&mut token[..half], col as f64);
            write_sincos_1d(&mut token[half..], row as f64);
        }
    }

    values
}

fn write_sincos_1d(out: &mut [f32], position: f64) {
    let quarter = out.len() / 2;

    for i in 0..quarter {
        let omega = 1.0 / TEMPERATURE.powf(i as f64 / quarter as f64);
        let angle = position * omega;
        out[i] = angle.sin() as f32;
        out[quarter + i] = angle.cos() as f32;
    }
}
