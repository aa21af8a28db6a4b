//! Render stage benchmarks
//!
//! Measures the per-block cost of the filtering stage and of gain changes.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use trieq_core::{Band, FilteringSource, ToneSource};

fn stereo_stage() -> FilteringSource {
    let stage = FilteringSource::new(Some(Box::new(ToneSource::new(440.0, 0.5))), 2)
        .expect("default stage");
    stage.prepare_to_play(1024, 48000.0).expect("prepare");
    stage
}

fn benchmark_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_block");

    // Typical buffer sizes used in real-time audio
    for block_size in [64, 128, 256, 512, 1024].iter() {
        let stage = stereo_stage();
        let mut left = vec![0.0_f32; *block_size];
        let mut right = vec![0.0_f32; *block_size];

        group.throughput(Throughput::Elements(*block_size as u64 * 2));
        group.bench_function(format!("stereo_{}_samples", block_size), |b| {
            b.iter(|| {
                stage.render_block(
                    black_box(&mut [left.as_mut_slice(), right.as_mut_slice()]),
                    *block_size,
                );
            })
        });
    }

    group.finish();
}

fn benchmark_high_order(c: &mut Criterion) {
    let stage = stereo_stage();
    for band in Band::ALL {
        stage.set_band_order(band, 10);
    }
    let mut left = vec![0.0_f32; 512];
    let mut right = vec![0.0_f32; 512];

    c.bench_function("render_block_order_10", |b| {
        b.iter(|| {
            stage.render_block(black_box(&mut [left.as_mut_slice(), right.as_mut_slice()]), 512);
        })
    });
}

fn benchmark_gain_change(c: &mut Criterion) {
    let stage = stereo_stage();
    let mut left = vec![0.0_f32; 256];
    let mut right = vec![0.0_f32; 256];
    let mut gain = 1.0_f32;

    c.bench_function("gain_change_then_render", |b| {
        b.iter(|| {
            gain = if gain > 2.0 { 0.5 } else { gain * 1.1 };
            stage.set_mid_gain(black_box(gain)).expect("valid gain");
            stage.render_block(&mut [left.as_mut_slice(), right.as_mut_slice()], 256);
        })
    });
}

criterion_group!(benches, benchmark_render, benchmark_high_order, benchmark_gain_change);
criterion_main!(benches);
