//! Catalog-wide engine invariants.
//!
//! Every engine, mono and stereo, has to hold the same basic promises:
//! finite in → finite out, a clean dry path at mix zero, silence after
//! reset, idempotent prepare, and no blowups over long random input.

use hexrack::block::AudioBlock;
use hexrack::engines::{catalog, create_engine, mix_index, Engine};

const SAMPLE_RATE: f32 = 48_000.0;
const BLOCK: usize = 256;

/// Deterministic noise for fuzzing (64-bit LCG).
struct Lcg(u64);

impl Lcg {
    fn next_f32(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
    }
}

fn moderate_params(count: usize, rng: &mut Lcg) -> Vec<f32> {
    (0..count)
        .map(|_| 0.2 + 0.6 * (rng.next_f32() * 0.5 + 0.5))
        .collect()
}

#[test]
fn finite_input_gives_finite_bounded_output() {
    for entry in catalog() {
        let mut engine = create_engine(entry.id).unwrap();
        engine.prepare(SAMPLE_RATE, BLOCK);
        let mut rng = Lcg(entry.id as u64 + 1);
        engine.update_params(&moderate_params(engine.parameter_count(), &mut rng));
        engine.reset();

        for _ in 0..50 {
            let mut left: Vec<f32> = (0..BLOCK).map(|_| rng.next_f32() * 0.5).collect();
            let mut right: Vec<f32> = (0..BLOCK).map(|_| rng.next_f32() * 0.5).collect();
            engine.process(&mut AudioBlock::stereo(&mut left, &mut right));
            for s in left.iter().chain(right.iter()) {
                assert!(s.is_finite(), "{}: non-finite output", entry.name);
                assert!(s.abs() <= 10.0, "{}: unbounded output {s}", entry.name);
            }
        }
    }
}

#[test]
fn mix_zero_is_pure_dry_path() {
    for entry in catalog() {
        let Some(mix) = mix_index(entry.id) else {
            continue;
        };
        let mut engine = create_engine(entry.id).unwrap();
        engine.prepare(SAMPLE_RATE, BLOCK);

        let mut params = vec![0.5; engine.parameter_count()];
        params[mix] = 0.0;
        engine.update_params(&params);
        engine.reset();

        let mut rng = Lcg(7);
        for _ in 0..8 {
            let mut samples: Vec<f32> = (0..BLOCK).map(|_| rng.next_f32() * 0.8).collect();
            let original = samples.clone();
            engine.process(&mut AudioBlock::mono(&mut samples));
            for (a, b) in samples.iter().zip(original.iter()) {
                assert!(
                    (a - b).abs() < 1e-6,
                    "{}: dry path not clean ({a} vs {b})",
                    entry.name
                );
            }
        }
    }
}

#[test]
fn reset_then_silence_yields_silence() {
    for entry in catalog() {
        let mut engine = create_engine(entry.id).unwrap();
        engine.prepare(SAMPLE_RATE, BLOCK);
        let mut rng = Lcg(entry.id as u64 * 13 + 5);
        engine.update_params(&moderate_params(engine.parameter_count(), &mut rng));

        // Pump signal through to charge any internal state.
        for _ in 0..32 {
            let mut samples: Vec<f32> = (0..BLOCK).map(|_| rng.next_f32()).collect();
            engine.process(&mut AudioBlock::mono(&mut samples));
        }

        engine.reset();
        // Enough zero blocks to flush the longest latency in the catalog.
        let mut worst = 0.0f32;
        for _ in 0..64 {
            let mut samples = vec![0.0f32; BLOCK];
            engine.process(&mut AudioBlock::mono(&mut samples));
            worst = samples.iter().fold(worst, |acc, &s| acc.max(s.abs()));
        }
        assert!(
            worst < 1e-6,
            "{}: residual output {worst} after reset",
            entry.name
        );
    }
}

#[test]
fn prepare_twice_is_a_noop() {
    for entry in catalog() {
        let run = |double_prepare: bool| -> Vec<f32> {
            let mut engine = create_engine(entry.id).unwrap();
            engine.prepare(SAMPLE_RATE, BLOCK);
            if double_prepare {
                engine.prepare(SAMPLE_RATE, BLOCK);
            }
            let mut params = vec![0.5; engine.parameter_count()];
            if let Some(mix) = mix_index(entry.id) {
                params[mix] = 1.0;
            }
            engine.update_params(&params);
            engine.reset();

            let mut out = Vec::new();
            for block_index in 0..8 {
                let mut samples: Vec<f32> = (0..BLOCK)
                    .map(|n| {
                        let t = (block_index * BLOCK + n) as f32;
                        (std::f32::consts::TAU * 440.0 * t / SAMPLE_RATE).sin() * 0.5
                    })
                    .collect();
                engine.process(&mut AudioBlock::mono(&mut samples));
                out.extend_from_slice(&samples);
            }
            out
        };

        let once = run(false);
        let twice = run(true);
        for (a, b) in once.iter().zip(twice.iter()) {
            assert!(
                (a - b).abs() < 1e-6,
                "{}: double prepare changed output",
                entry.name
            );
        }
    }
}

#[test]
fn thousand_random_blocks_never_produce_non_finite() {
    for entry in catalog() {
        let mut engine = create_engine(entry.id).unwrap();
        engine.prepare(SAMPLE_RATE, 64);
        let mut rng = Lcg(0xfeed + entry.id as u64);
        engine.reset();

        for block_index in 0..1_000 {
            // Re-randomize parameters every few blocks to sweep the maps.
            if block_index % 50 == 0 {
                engine.update_params(&moderate_params(engine.parameter_count(), &mut rng));
            }
            let mut samples: Vec<f32> = (0..64).map(|_| rng.next_f32()).collect();
            engine.process(&mut AudioBlock::mono(&mut samples));
            assert!(
                samples.iter().all(|s| s.is_finite()),
                "{}: non-finite after {block_index} blocks",
                entry.name
            );
        }
    }
}

#[test]
fn mono_and_stereo_both_accepted() {
    for entry in catalog() {
        let mut engine = create_engine(entry.id).unwrap();
        engine.prepare(SAMPLE_RATE, BLOCK);
        engine.update_params(&vec![0.5; engine.parameter_count()]);
        engine.reset();

        let mut mono = vec![0.25f32; BLOCK];
        engine.process(&mut AudioBlock::mono(&mut mono));

        let mut left = vec![0.25f32; BLOCK];
        let mut right = vec![-0.25f32; BLOCK];
        engine.process(&mut AudioBlock::stereo(&mut left, &mut right));

        assert!(mono.iter().all(|s| s.is_finite()), "{}", entry.name);
        assert!(
            left.iter().chain(right.iter()).all(|s| s.is_finite()),
            "{}",
            entry.name
        );
    }
}
