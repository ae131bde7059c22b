#![cfg_attr(not(feature = "backend_wgpu"), allow(dead_code))]

#[cfg(feature = "backend_wgpu")]
use burn::{backend::wgpu::Wgpu, prelude::*};
#[cfg(feature = "backend_wgpu")]
use burn_mae::model::{autoencoder::MaskedAutoencoder, mae::MaskedAutoencoderConfig};
#[cfg(feature = "backend_wgpu")]
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

#[cfg(feature = "backend_wgpu")]
criterion_group! {
    name = mae_burn_benchmarks;
    config = Criterion::default().sample_size(50);
    targets = reconstruction_benchmark,
}
#[cfg(feature = "backend_wgpu")]
criterion_main!(mae_burn_benchmarks);

#[cfg(feature = "backend_wgpu")]
fn reconstruction_benchmark(c: &mut Criterion) {
    let configs = [
        (MaskedAutoencoderConfig::vitb(), "vitb"),
        (MaskedAutoencoderConfig::vitl(), "vitl"),
        // (MaskedAutoencoderConfig::vith(), "vith"),
    ];

    let mut group = c.benchmark_group("burn_mae_reconstruction");
    for (config, name) in configs.iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("mae", name), &config, |b, &config| {
            let device = Default::default();
            let model = config.init::<Wgpu>(&device);
            let input: Tensor<Wgpu, 4> = Tensor::zeros(
                [
                    1,
                    config.input_channels,
                    config.image_size,
                    config.image_size,
                ],
                &device,
            );

            b.iter(|| {
                let output = model.forward(input.clone(), 0.75, 2);
                model.unpatchify(output.reconstruction).to_data()
            });
        });
    }
}

#[cfg(not(feature = "backend_wgpu"))]
fn main() {
    eprintln!(
        "mae benchmark requires `--features backend_wgpu`. \
         Re-run with `cargo bench --features backend_wgpu`."
    );
}
