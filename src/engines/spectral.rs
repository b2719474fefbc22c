//! Spectral engines: freeze, gate, robotizer, whisperizer.
//!
//! All four share the streaming STFT core. The freeze holds a captured
//! magnitude frame while phases keep advancing at each bin's natural rate;
//! the gate zeroes weak bins against an absolute or percentile threshold;
//! the robotizer and whisperizer rewrite phases wholesale.

use rustfft::num_complex::Complex;
use std::f32::consts::TAU;

use crate::block::AudioBlock;
use crate::dsp::noise::NoiseSource;
use crate::dsp::stft::StftCore;
use crate::dsp::Smoothed;
use crate::engines::pitch::box_smooth;
use crate::engines::{db_to_gain, map_lin, Engine};
use crate::MAX_BLOCK_SIZE;

const FREEZE_FFT: usize = 2048;
const GATE_FFT: usize = 2048;
const VOICE_FFT: usize = 1024;

struct FreezeChannel {
    stft: StftCore,
    frozen_mag: Vec<f32>,
    synth_phase: Vec<f32>,
    captured: bool,
}

impl FreezeChannel {
    fn new() -> Self {
        let half = FREEZE_FFT / 2 + 1;
        Self {
            stft: StftCore::new(FREEZE_FFT),
            frozen_mag: vec![0.0; half],
            synth_phase: vec![0.0; half],
            captured: false,
        }
    }

    fn reset(&mut self) {
        self.stft.reset();
        self.frozen_mag.fill(0.0);
        self.synth_phase.fill(0.0);
        self.captured = false;
    }
}

/// Captures the magnitude spectrum on trigger and sustains it while phases
/// advance by each bin's natural frequency per hop.
pub struct SpectralFreeze {
    channels: [FreezeChannel; 2],
    dry: Vec<f32>,
    frozen: bool,
    decay: f32,
    mix: Smoothed,
}

const FREEZE_PARAMS: &[&str] = &["Freeze", "Decay", "Mix"];

impl SpectralFreeze {
    pub fn new() -> Self {
        Self {
            channels: [FreezeChannel::new(), FreezeChannel::new()],
            dry: Vec::new(),
            frozen: false,
            decay: 0.0,
            mix: Smoothed::new(1.0),
        }
    }
}

impl Default for SpectralFreeze {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for SpectralFreeze {
    fn name(&self) -> &'static str {
        "Spectral Freeze"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        FREEZE_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, max_frames: usize) {
        self.dry.clear();
        self.dry.resize(max_frames.max(MAX_BLOCK_SIZE), 0.0);
        self.mix.prepare(sample_rate);
        for ch in &mut self.channels {
            ch.reset();
        }
    }

    fn reset(&mut self) {
        for ch in &mut self.channels {
            ch.reset();
        }
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            let engaged = v >= 0.5;
            if !engaged {
                // Re-arm so the next trigger captures a fresh frame.
                for ch in &mut self.channels {
                    ch.captured = false;
                }
            }
            self.frozen = engaged;
        }
        if let Some(&v) = params.get(1) {
            self.decay = v.clamp(0.0, 1.0);
        }
        if let Some(&v) = params.get(2) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn latency_samples(&self) -> usize {
        FREEZE_FFT
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let frames = block.frames();
        let frozen = self.frozen;
        // Per-frame magnitude multiplier: 1.0 holds forever.
        let decay_factor = 1.0 - 0.02 * self.decay * self.decay;
        let half = FREEZE_FFT / 2;
        let mix_start = self.mix;

        for ch in 0..block.channel_count() {
            let mut mix = mix_start;
            let samples = block.channel_mut(ch);
            self.dry[..frames].copy_from_slice(samples);

            let state = &mut self.channels[ch];
            let FreezeChannel {
                stft,
                frozen_mag,
                synth_phase,
                captured,
            } = state;
            let hop = stft.hop();

            stft.process(samples, |spec| {
                if !frozen {
                    // Track live phases so a capture starts in phase.
                    for k in 0..=half {
                        synth_phase[k] = spec[k].arg();
                    }
                    return;
                }
                if !*captured {
                    for k in 0..=half {
                        frozen_mag[k] = spec[k].norm();
                        synth_phase[k] = spec[k].arg();
                    }
                    *captured = true;
                }
                for k in 0..=half {
                    synth_phase[k] = (synth_phase[k]
                        + TAU * (k * hop) as f32 / FREEZE_FFT as f32)
                        .rem_euclid(TAU);
                    frozen_mag[k] *= decay_factor;
                }
                spec[0] = Complex::new(frozen_mag[0] * synth_phase[0].cos(), 0.0);
                spec[half] = Complex::new(frozen_mag[half] * synth_phase[half].cos(), 0.0);
                for k in 1..half {
                    let c = Complex::from_polar(frozen_mag[k], synth_phase[k]);
                    spec[k] = c;
                    spec[FREEZE_FFT - k] = c.conj();
                }
            });

            for (s, &d) in samples.iter_mut().zip(self.dry[..frames].iter()) {
                let m = mix.next();
                *s = d * (1.0 - m) + *s * m;
            }
            if ch + 1 == block.channel_count() {
                self.mix = mix;
            }
        }
    }
}

struct GateChannel {
    stft: StftCore,
    histogram: [u32; 64],
}

impl GateChannel {
    fn new() -> Self {
        Self {
            stft: StftCore::new(GATE_FFT),
            histogram: [0; 64],
        }
    }
}

/// Zeroes bins under a threshold: absolute (dB against full scale) or a
/// relative percentile of the current frame.
pub struct SpectralGate {
    channels: [GateChannel; 2],
    dry: Vec<f32>,
    threshold: f32,
    relative: bool,
    mix: Smoothed,
}

const GATE_PARAMS: &[&str] = &["Threshold", "Mode", "Mix"];

impl SpectralGate {
    pub fn new() -> Self {
        Self {
            channels: [GateChannel::new(), GateChannel::new()],
            dry: Vec::new(),
            threshold: 0.2,
            relative: false,
            mix: Smoothed::new(1.0),
        }
    }
}

impl Default for SpectralGate {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for SpectralGate {
    fn name(&self) -> &'static str {
        "Spectral Gate"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        GATE_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, max_frames: usize) {
        self.dry.clear();
        self.dry.resize(max_frames.max(MAX_BLOCK_SIZE), 0.0);
        self.mix.prepare(sample_rate);
        for ch in &mut self.channels {
            ch.stft.reset();
        }
    }

    fn reset(&mut self) {
        for ch in &mut self.channels {
            ch.stft.reset();
        }
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.threshold = v.clamp(0.0, 1.0);
        }
        if let Some(&v) = params.get(1) {
            self.relative = v >= 0.5;
        }
        if let Some(&v) = params.get(2) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn latency_samples(&self) -> usize {
        GATE_FFT
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let frames = block.frames();
        let half = GATE_FFT / 2;
        let relative = self.relative;
        let threshold = self.threshold;
        // Absolute scale: a full-scale sine peaks its bin near M/4.
        let absolute_floor =
            db_to_gain(map_lin(threshold, -90.0, 0.0)) * (GATE_FFT as f32 / 4.0);
        let mix_start = self.mix;

        for ch in 0..block.channel_count() {
            let mut mix = mix_start;
            let samples = block.channel_mut(ch);
            self.dry[..frames].copy_from_slice(samples);

            let state = &mut self.channels[ch];
            let GateChannel { stft, histogram } = state;

            stft.process(samples, |spec| {
                let floor = if relative {
                    percentile_floor(spec, half, threshold, histogram)
                } else {
                    absolute_floor
                };
                for k in 0..=half {
                    if spec[k].norm() < floor {
                        spec[k] = Complex::default();
                        if k > 0 && k < half {
                            spec[GATE_FFT - k] = Complex::default();
                        }
                    }
                }
            });

            for (s, &d) in samples.iter_mut().zip(self.dry[..frames].iter()) {
                let m = mix.next();
                *s = d * (1.0 - m) + *s * m;
            }
            if ch + 1 == block.channel_count() {
                self.mix = mix;
            }
        }
    }
}

/// Magnitude below which `quantile` of the frame's bins fall, via a coarse
/// log-domain histogram (no sorting on the audio thread).
fn percentile_floor(
    spec: &[Complex<f32>],
    half: usize,
    quantile: f32,
    histogram: &mut [u32; 64],
) -> f32 {
    let max = spec[..=half]
        .iter()
        .map(|c| c.norm())
        .fold(0.0f32, f32::max);
    if max <= 0.0 {
        return 0.0;
    }
    histogram.fill(0);
    // Buckets span 120 dB below the frame maximum.
    let buckets = histogram.len() as f32;
    for c in spec[..=half].iter() {
        let norm = c.norm() / max;
        let db = 20.0 * norm.max(1e-7).log10();
        let idx = (((db + 120.0) / 120.0) * buckets).clamp(0.0, buckets - 1.0) as usize;
        histogram[idx] += 1;
    }
    let target = (quantile * (half + 1) as f32) as u32;
    let mut seen = 0u32;
    for (idx, &count) in histogram.iter().enumerate() {
        seen += count;
        if seen >= target {
            let db = (idx as f32 + 1.0) / buckets * 120.0 - 120.0;
            return max * db_to_gain(db);
        }
    }
    max
}

struct VoiceChannel {
    stft: StftCore,
    smoothed: Vec<f32>,
    scratch: Vec<f32>,
}

impl VoiceChannel {
    fn new() -> Self {
        let half = VOICE_FFT / 2 + 1;
        Self {
            stft: StftCore::new(VOICE_FFT),
            smoothed: vec![0.0; half],
            scratch: vec![0.0; half],
        }
    }
}

/// Zeroes every phase: the frame rate becomes the only pitch.
pub struct Robotizer {
    channels: [VoiceChannel; 2],
    dry: Vec<f32>,
    mix: Smoothed,
}

const ROBOT_PARAMS: &[&str] = &["Mix"];

impl Robotizer {
    pub fn new() -> Self {
        Self {
            channels: [VoiceChannel::new(), VoiceChannel::new()],
            dry: Vec::new(),
            mix: Smoothed::new(1.0),
        }
    }
}

impl Default for Robotizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Robotizer {
    fn name(&self) -> &'static str {
        "Robotizer"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        ROBOT_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, max_frames: usize) {
        self.dry.clear();
        self.dry.resize(max_frames.max(MAX_BLOCK_SIZE), 0.0);
        self.mix.prepare(sample_rate);
        for ch in &mut self.channels {
            ch.stft.reset();
        }
    }

    fn reset(&mut self) {
        for ch in &mut self.channels {
            ch.stft.reset();
        }
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn latency_samples(&self) -> usize {
        VOICE_FFT
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let frames = block.frames();
        let half = VOICE_FFT / 2;
        let mix_start = self.mix;
        for ch in 0..block.channel_count() {
            let mut mix = mix_start;
            let samples = block.channel_mut(ch);
            self.dry[..frames].copy_from_slice(samples);

            self.channels[ch].stft.process(samples, |spec| {
                spec[0] = Complex::new(spec[0].norm(), 0.0);
                spec[half] = Complex::new(spec[half].norm(), 0.0);
                for k in 1..half {
                    let c = Complex::new(spec[k].norm(), 0.0);
                    spec[k] = c;
                    spec[VOICE_FFT - k] = c;
                }
            });

            for (s, &d) in samples.iter_mut().zip(self.dry[..frames].iter()) {
                let m = mix.next();
                *s = d * (1.0 - m) + *s * m;
            }
            if ch + 1 == block.channel_count() {
                self.mix = mix;
            }
        }
    }
}

/// Replaces every phase with noise; magnitudes optionally smoothed across
/// bins so only the broad envelope survives.
pub struct Whisperizer {
    channels: [VoiceChannel; 2],
    rng: NoiseSource,
    dry: Vec<f32>,
    smooth: f32,
    mix: Smoothed,
}

const WHISPER_PARAMS: &[&str] = &["Smooth", "Mix"];

impl Whisperizer {
    pub fn new() -> Self {
        Self {
            channels: [VoiceChannel::new(), VoiceChannel::new()],
            rng: NoiseSource::new(0x77f5),
            dry: Vec::new(),
            smooth: 0.0,
            mix: Smoothed::new(1.0),
        }
    }
}

impl Default for Whisperizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Whisperizer {
    fn name(&self) -> &'static str {
        "Whisperizer"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        WHISPER_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, max_frames: usize) {
        self.dry.clear();
        self.dry.resize(max_frames.max(MAX_BLOCK_SIZE), 0.0);
        self.mix.prepare(sample_rate);
        for ch in &mut self.channels {
            ch.stft.reset();
        }
    }

    fn reset(&mut self) {
        for ch in &mut self.channels {
            ch.stft.reset();
        }
        self.rng.reseed(0x77f5);
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.smooth = v.clamp(0.0, 1.0);
        }
        if let Some(&v) = params.get(1) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn latency_samples(&self) -> usize {
        VOICE_FFT
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let frames = block.frames();
        let half = VOICE_FFT / 2;
        let width = 1 + (self.smooth * 31.0) as usize;
        let mix_start = self.mix;
        for ch in 0..block.channel_count() {
            let mut mix = mix_start;
            let samples = block.channel_mut(ch);
            self.dry[..frames].copy_from_slice(samples);

            let state = &mut self.channels[ch];
            let VoiceChannel {
                stft,
                smoothed,
                scratch,
            } = state;
            let rng = &mut self.rng;

            stft.process(samples, |spec| {
                for k in 0..=half {
                    scratch[k] = spec[k].norm();
                }
                if width > 1 {
                    box_smooth(&scratch[..=half], &mut smoothed[..=half], width);
                } else {
                    smoothed[..=half].copy_from_slice(&scratch[..=half]);
                }
                spec[0] = Complex::new(smoothed[0], 0.0);
                spec[half] = Complex::new(smoothed[half], 0.0);
                for k in 1..half {
                    let phase = rng.next_unipolar() * TAU;
                    let c = Complex::from_polar(smoothed[k], phase);
                    spec[k] = c;
                    spec[VOICE_FFT - k] = c.conj();
                }
            });

            for (s, &d) in samples.iter_mut().zip(self.dry[..frames].iter()) {
                let m = mix.next();
                *s = d * (1.0 - m) + *s * m;
            }
            if ch + 1 == block.channel_count() {
                self.mix = mix;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|n| (TAU * freq * n as f32 / 48_000.0).sin())
            .collect()
    }

    fn rms(buffer: &[f32]) -> f32 {
        (buffer.iter().map(|x| x * x).sum::<f32>() / buffer.len() as f32).sqrt()
    }

    #[test]
    fn test_freeze_sustains_after_input_stops() {
        let mut engine = SpectralFreeze::new();
        engine.prepare(48_000.0, 512);
        engine.update_params(&[0.0, 0.0, 1.0]);
        engine.reset();

        // Feed a tone unfrozen, then freeze and feed silence.
        let mut tone = sine(440.0, 16_384);
        for chunk in tone.chunks_mut(512) {
            engine.process(&mut AudioBlock::mono(chunk));
        }
        engine.update_params(&[1.0, 0.0, 1.0]);
        let mut silence = vec![0.0f32; 32_768];
        for chunk in silence.chunks_mut(512) {
            engine.process(&mut AudioBlock::mono(chunk));
        }
        // The tail (well past the STFT latency) must still carry energy.
        assert!(
            rms(&silence[16_384..]) > 0.05,
            "freeze did not sustain: {}",
            rms(&silence[16_384..])
        );
    }

    #[test]
    fn test_unfrozen_passes_signal() {
        let mut engine = SpectralFreeze::new();
        engine.prepare(48_000.0, 512);
        engine.update_params(&[0.0, 0.0, 1.0]);
        engine.reset();

        let mut samples = sine(440.0, 32_768);
        let in_rms = rms(&samples);
        for chunk in samples.chunks_mut(512) {
            engine.process(&mut AudioBlock::mono(chunk));
        }
        let steady = &samples[FREEZE_FFT * 2..];
        assert!((rms(steady) - in_rms).abs() / in_rms < 0.05);
    }

    #[test]
    fn test_gate_full_threshold_silences() {
        let mut engine = SpectralGate::new();
        engine.prepare(48_000.0, 512);
        // Absolute mode, threshold at 0 dB: everything gated.
        engine.update_params(&[1.0, 0.0, 1.0]);
        engine.reset();

        let mut samples = sine(440.0, 16_384);
        for chunk in samples.chunks_mut(512) {
            engine.process(&mut AudioBlock::mono(chunk));
        }
        assert!(rms(&samples[GATE_FFT * 2..]) < 1e-3);
    }

    #[test]
    fn test_gate_open_passes() {
        let mut engine = SpectralGate::new();
        engine.prepare(48_000.0, 512);
        engine.update_params(&[0.0, 0.0, 1.0]);
        engine.reset();

        let mut samples = sine(440.0, 32_768);
        let in_rms = rms(&samples);
        for chunk in samples.chunks_mut(512) {
            engine.process(&mut AudioBlock::mono(chunk));
        }
        let steady = &samples[GATE_FFT * 2..];
        assert!((rms(steady) - in_rms).abs() / in_rms < 0.05);
    }

    #[test]
    fn test_robotizer_output_finite() {
        let mut engine = Robotizer::new();
        engine.prepare(48_000.0, 512);
        engine.update_params(&[1.0]);
        engine.reset();

        let mut samples = sine(220.0, 16_384);
        for chunk in samples.chunks_mut(512) {
            engine.process(&mut AudioBlock::mono(chunk));
        }
        assert!(samples.iter().all(|s| s.is_finite()));
        assert!(rms(&samples[VOICE_FFT * 2..]) > 0.05);
    }
}
