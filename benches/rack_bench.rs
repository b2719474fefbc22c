//! Benchmarks for the rack and the heavier engines.
//!
//! Run with: cargo bench
//!
//! Reference timing at 48kHz sample rate:
//!   - 64 samples  = 1.33ms deadline
//!   - 128 samples = 2.67ms deadline
//!   - 256 samples = 5.33ms deadline
//!   - 512 samples = 10.67ms deadline

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use hexrack::block::AudioBlock;
use hexrack::engines::{create_engine, Engine};
use hexrack::Rack;

const BLOCK_SIZES: &[usize] = &[64, 128, 256, 512];
const SAMPLE_RATE: f32 = 48_000.0;

fn test_signal(size: usize) -> Vec<f32> {
    (0..size)
        .map(|n| (std::f32::consts::TAU * 440.0 * n as f32 / SAMPLE_RATE).sin() * 0.5)
        .collect()
}

fn bench_single_engines(c: &mut Criterion) {
    let mut group = c.benchmark_group("engines");

    // Representative cheap, mid and heavy engines.
    let picks: &[(u32, &str)] = &[
        (24, "bit_crusher"),
        (39, "room_reverb"),
        (44, "convolution"),
        (45, "pitch_pv"),
        (46, "pitch_psola"),
    ];

    for &(id, label) in picks {
        for &size in BLOCK_SIZES {
            let mut engine = create_engine(id).unwrap();
            engine.prepare(SAMPLE_RATE, size);
            engine.update_params(&[0.6, 0.5, 0.5, 0.5, 0.5, 1.0]);
            let input = test_signal(size);
            let mut buffer = input.clone();

            group.bench_with_input(BenchmarkId::new(label, size), &size, |b, _| {
                b.iter(|| {
                    buffer.copy_from_slice(&input);
                    engine.process(&mut AudioBlock::mono(black_box(&mut buffer)));
                    buffer[0]
                })
            });
        }
    }

    group.finish();
}

fn bench_full_rack(c: &mut Criterion) {
    let mut group = c.benchmark_group("rack");

    for &size in BLOCK_SIZES {
        let (mut rack, mut handle) = Rack::new(SAMPLE_RATE, size);
        // A plausible chain: crusher -> low pass -> chorus -> delay -> reverb.
        for (slot, id) in [(0u32, 24u32), (1, 10), (2, 25), (3, 33), (4, 39)]
            .iter()
            .map(|&(s, id)| (s as usize, id))
        {
            handle.set_engine(slot, id).unwrap();
            handle.set_param(slot, 0, 0.5);
            handle.set_param(slot, 1, 0.4);
            handle.set_param(slot, 2, 0.5);
        }

        let input = test_signal(size);
        let mut buffer = input.clone();
        // Adopt the engines before timing.
        rack.process(&mut AudioBlock::mono(&mut buffer));

        group.bench_with_input(BenchmarkId::new("five_slots", size), &size, |b, _| {
            b.iter(|| {
                buffer.copy_from_slice(&input);
                rack.process(&mut AudioBlock::mono(black_box(&mut buffer)));
                buffer[0]
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_engines, bench_full_rack);
criterion_main!(benches);
