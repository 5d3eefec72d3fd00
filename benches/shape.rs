use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use model_runner::data::ensure_channels;
use ndarray::{ArrayD, IxDyn};

const SIDE: usize = 75;

fn bench_ensure_channels(c: &mut Criterion) {
    for batch in [32usize, 256] {
        let grayscale = ArrayD::<f32>::zeros(IxDyn(&[batch, SIDE, SIDE]));
        c.bench_with_input(
            BenchmarkId::new("ensure_channels_3d", batch),
            &grayscale,
            |b, input| {
                b.iter(|| ensure_channels(black_box(input.clone())).expect("ensure_channels"));
            },
        );
        let two_band = ArrayD::<f32>::zeros(IxDyn(&[batch, SIDE, SIDE, 2]));
        c.bench_with_input(
            BenchmarkId::new("ensure_channels_passthrough", batch),
            &two_band,
            |b, input| {
                b.iter(|| ensure_channels(black_box(input.clone())).expect("ensure_channels"));
            },
        );
    }
}

criterion_group!(benches, bench_ensure_channels);
criterion_main!(benches);
