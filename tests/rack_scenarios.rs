//! End-to-end rack scenarios: chains, bypass, ordering, and the concrete
//! bit-crusher setups.

use hexrack::block::AudioBlock;
use hexrack::Rack;

fn sine(freq: f32, amp: f32, sample_rate: f32, frames: usize) -> Vec<f32> {
    (0..frames)
        .map(|n| amp * (std::f32::consts::TAU * freq * n as f32 / sample_rate).sin())
        .collect()
}

fn rms(buffer: &[f32]) -> f32 {
    (buffer.iter().map(|x| x * x).sum::<f32>() / buffer.len() as f32).sqrt()
}

fn run_blocks(rack: &mut Rack, samples: &mut [f32], block: usize) {
    for chunk in samples.chunks_mut(block) {
        rack.process(&mut AudioBlock::mono(chunk));
    }
}

/// Heavy crush: 1 bit, /16 hold, fully wet. Loud, square-ish, no silence.
#[test]
fn bit_crusher_heavy_settings() {
    let sample_rate = 44_100.0;
    let (mut rack, mut handle) = Rack::new(sample_rate, 512);
    handle.set_engine(0, 24).unwrap();
    handle.set_param(0, 0, 0.9);
    handle.set_param(0, 1, 0.9);
    handle.set_param(0, 2, 1.0);

    let mut samples = sine(440.0, 0.5, sample_rate, 44_100);
    run_blocks(&mut rack, &mut samples, 512);

    // Skip the parameter settling window.
    let settled = &samples[4_410..];
    assert!(rms(settled) >= 0.3, "rms {}", rms(settled));
    let near_zero = settled.iter().filter(|s| s.abs() < 1e-2).count();
    assert!(
        (near_zero as f32) < settled.len() as f32 * 0.10,
        "{near_zero} near-zero samples of {}",
        settled.len()
    );
}

/// Gentle crush: 24 bits, no downsampling — transparent.
#[test]
fn bit_crusher_default_settings_transparent() {
    let sample_rate = 44_100.0;
    let (mut rack, mut handle) = Rack::new(sample_rate, 512);
    handle.set_engine(0, 24).unwrap();
    handle.set_param(0, 0, 0.1);
    handle.set_param(0, 1, 0.1);
    handle.set_param(0, 2, 1.0);

    let mut samples = sine(440.0, 0.5, sample_rate, 44_100);
    let reference = samples.clone();
    run_blocks(&mut rack, &mut samples, 512);

    let diff: Vec<f32> = samples
        .iter()
        .zip(reference.iter())
        .skip(4_410)
        .map(|(a, b)| a - b)
        .collect();
    assert!(rms(&diff) < 1e-3, "diff rms {}", rms(&diff));
}

/// Slot 1 crushes, slot 2 reverberates at half mix. Bypassing slot 1 must
/// give reverb-only; engaging it must crush before the reverb.
#[test]
fn crusher_into_reverb_with_bypass() {
    let sample_rate = 48_000.0;
    let frames = 48_000;

    let build = |bypass_crusher: bool| -> Vec<f32> {
        let (mut rack, mut handle) = Rack::new(sample_rate, 512);
        handle.set_engine(0, 24).unwrap(); // Bit Crusher, heavy
        handle.set_param(0, 0, 0.9);
        handle.set_param(0, 1, 0.9);
        handle.set_param(0, 2, 1.0);
        handle.set_engine(1, 39).unwrap(); // Room Reverb, half mix
        handle.set_param(1, 0, 0.5);
        handle.set_param(1, 1, 0.5);
        handle.set_param(1, 2, 0.5);
        handle.set_bypass(0, bypass_crusher);

        let mut samples = sine(440.0, 0.5, sample_rate, frames);
        run_blocks(&mut rack, &mut samples, 512);
        samples
    };

    let reverb_only = build(true);
    let crushed = build(false);

    // Reference: reverb alone over the same input.
    let (mut rack, mut handle) = Rack::new(sample_rate, 512);
    handle.set_engine(1, 39).unwrap();
    handle.set_param(1, 0, 0.5);
    handle.set_param(1, 1, 0.5);
    handle.set_param(1, 2, 0.5);
    let mut reference = sine(440.0, 0.5, sample_rate, frames);
    run_blocks(&mut rack, &mut reference, 512);

    for (a, b) in reverb_only.iter().zip(reference.iter()) {
        assert!((a - b).abs() < 1e-6, "bypassed chain differs from reverb-only");
    }

    // The crushed chain must actually differ, audibly.
    let diff: Vec<f32> = crushed
        .iter()
        .zip(reverb_only.iter())
        .map(|(a, b)| a - b)
        .collect();
    assert!(rms(&diff[9_600..]) > 0.05, "crusher had no effect through the chain");
}

/// Within a block, slot k+1 must observe slot k's output: a full-gain
/// chain of two inverters cancels out.
#[test]
fn slots_process_in_order() {
    let (mut rack, mut handle) = Rack::new(48_000.0, 512);
    handle.set_engine(0, 4).unwrap(); // Phase Invert (both)
    handle.set_param(0, 0, 1.0);
    handle.set_engine(1, 4).unwrap();
    handle.set_param(1, 0, 1.0);

    let mut samples = sine(440.0, 0.5, 48_000.0, 512);
    let original = samples.clone();
    rack.process(&mut AudioBlock::mono(&mut samples));
    for (a, b) in samples.iter().zip(original.iter()) {
        assert!((a - b).abs() < 1e-6, "double inversion should cancel");
    }
}

/// A parameter index beyond the active engine's count must not propagate.
#[test]
fn out_of_range_parameter_is_inert() {
    let (mut rack, mut handle) = Rack::new(48_000.0, 512);
    handle.set_engine(0, 1).unwrap(); // Gain: 2 params
    handle.set_param(0, 0, 0.5);
    handle.set_param(0, 1, 0.5);

    let mut baseline = sine(440.0, 0.5, 48_000.0, 2_048);
    run_blocks(&mut rack, &mut baseline, 512);

    let (mut rack2, mut handle2) = Rack::new(48_000.0, 512);
    handle2.set_engine(0, 1).unwrap();
    handle2.set_param(0, 0, 0.5);
    handle2.set_param(0, 1, 0.5);
    // Junk beyond the engine's parameter count.
    for index in 2..hexrack::MAX_PARAMS {
        handle2.set_param(0, index, 0.913);
    }
    let mut with_junk = sine(440.0, 0.5, 48_000.0, 2_048);
    run_blocks(&mut rack2, &mut with_junk, 512);

    assert_eq!(baseline, with_junk);
}

/// Engine swap mid-stream: old instance keeps running until the block
/// boundary, then the new one takes over; the retiree comes back on the
/// reclaim queue.
#[test]
fn engine_swap_mid_stream() {
    let (mut rack, mut handle) = Rack::new(48_000.0, 512);
    handle.set_engine(0, 18).unwrap(); // Soft Clip
    handle.set_param(0, 0, 1.0);
    handle.set_param(0, 2, 1.0);

    let mut samples = sine(440.0, 0.9, 48_000.0, 512);
    rack.process(&mut AudioBlock::mono(&mut samples));
    assert_eq!(handle.reclaim(), 1); // pass-through retired

    handle.set_engine(0, 0).unwrap(); // back to empty
    let mut samples = sine(440.0, 0.9, 48_000.0, 512);
    let original = samples.clone();
    rack.process(&mut AudioBlock::mono(&mut samples));
    assert_eq!(samples, original, "empty slot must be identity");
    assert_eq!(handle.reclaim(), 1); // soft clip retired
}

/// The rack must survive an arbitrary pause plus reset, then behave as if
/// freshly prepared.
#[test]
fn reset_after_pause_is_clean() {
    let (mut rack, mut handle) = Rack::new(48_000.0, 512);
    handle.set_engine(0, 33).unwrap(); // Digital Delay
    handle.set_param(0, 0, 0.3);
    handle.set_param(0, 1, 0.6);
    handle.set_param(0, 2, 1.0);

    let mut samples = sine(440.0, 0.8, 48_000.0, 24_000);
    run_blocks(&mut rack, &mut samples, 512);

    // Host pauses the stream, then resets.
    rack.reset();

    let mut silence = vec![0.0f32; 24_000];
    run_blocks(&mut rack, &mut silence, 512);
    let residual = silence.iter().fold(0.0f32, |a, &b| a.max(b.abs()));
    assert!(residual < 1e-6, "delay tail survived reset: {residual}");
}
