//! Pitch engines.
//!
//! Two independent shifter implementations coexist: a frequency-domain
//! phase vocoder and a time-domain pitch-synchronous overlap-add. The
//! harmonizer reuses the phase-vocoder core with a ratio chosen from a
//! detected note and a scale; the octaver is a cheap analog-style
//! flip-flop divider.
//!
//! Both shifters keep a true dry path: at mix 0 the output is the
//! unprocessed, undelayed input.

use std::f32::consts::TAU;

use rustfft::num_complex::Complex;

use crate::block::AudioBlock;
use crate::dsp::env_follower::EnvFollower;
use crate::dsp::filter::OnePole;
use crate::dsp::stft::StftCore;
use crate::dsp::Smoothed;
use crate::engines::{map_lin, Engine};
use crate::MAX_BLOCK_SIZE;

/// Phase-vocoder frame size. Hop is fft/4, fixed: tying the hop to a user
/// parameter breaks constant overlap-add and modulates amplitude with
/// frequency.
const PV_FFT_SIZE: usize = 4096;

/// Pitch detector search range in Hz.
const DETECT_LOW_HZ: f32 = 60.0;
const DETECT_HIGH_HZ: f32 = 500.0;

// ---------------------------------------------------------------------------
// Pitch detection (shared by PSOLA and the harmonizer)
// ---------------------------------------------------------------------------

/// Normalized autocorrelation over `window` (newest sample last).
/// Coarse pass on a 2:1 decimated copy, refined at full rate with
/// parabolic interpolation for sub-sample period accuracy.
/// Returns (period in samples, confidence in [0,1]).
fn detect_period(
    window: &[f32],
    decimated: &mut Vec<f32>,
    min_period: usize,
    max_period: usize,
) -> Option<(f32, f32)> {
    let n = window.len();
    if n < max_period + min_period {
        return None;
    }

    decimated.clear();
    decimated.extend(window.iter().step_by(2).copied());
    let nd = decimated.len();

    let mut best_lag = 0usize;
    let mut best_score = 0.0f32;
    for lag in (min_period / 2).max(2)..=(max_period / 2).min(nd - 1) {
        let mut r = 0.0f32;
        let mut e0 = 0.0f32;
        let mut e1 = 0.0f32;
        for i in lag..nd {
            r += decimated[i] * decimated[i - lag];
            e1 += decimated[i] * decimated[i];
            e0 += decimated[i - lag] * decimated[i - lag];
        }
        let score = r / (e0 * e1).sqrt().max(1e-9);
        if score > best_score {
            best_score = score;
            best_lag = lag;
        }
    }
    if best_lag == 0 {
        return None;
    }

    // Full-rate refinement around twice the decimated lag.
    let center = best_lag * 2;
    let lo = center.saturating_sub(3).max(min_period);
    let hi = (center + 3).min(max_period).min(n - 1);
    let mut scores = [0.0f32; 7];
    let mut best_full = lo;
    let mut best_full_score = 0.0f32;
    for (idx, lag) in (lo..=hi).enumerate() {
        let mut r = 0.0f32;
        let mut e0 = 0.0f32;
        let mut e1 = 0.0f32;
        for i in lag..n {
            r += window[i] * window[i - lag];
            e1 += window[i] * window[i];
            e0 += window[i - lag] * window[i - lag];
        }
        let score = r / (e0 * e1).sqrt().max(1e-9);
        scores[idx] = score;
        if score > best_full_score {
            best_full_score = score;
            best_full = lag;
        }
    }

    // Parabolic peak interpolation over the refined scores.
    let mut period = best_full as f32;
    let idx = best_full - lo;
    if idx > 0 && idx < hi - lo {
        let (a, b, c) = (scores[idx - 1], scores[idx], scores[idx + 1]);
        let denom = a - 2.0 * b + c;
        if denom.abs() > 1e-9 {
            let delta = 0.5 * (a - c) / denom;
            if delta.abs() < 1.0 {
                period += delta;
            }
        }
    }

    Some((period, best_full_score.clamp(0.0, 1.0)))
}

// ---------------------------------------------------------------------------
// Phase-vocoder core
// ---------------------------------------------------------------------------

/// One channel of phase-vocoder state on top of the streaming STFT.
struct PvCore {
    stft: StftCore,
    prev_phase: Vec<f32>,
    synth_phase: Vec<f32>,
    mag: Vec<f32>,
    freq: Vec<f32>,
    new_mag: Vec<f32>,
    new_freq: Vec<f32>,
    env: Vec<f32>,
    env_shifted: Vec<f32>,
    env_scratch: Vec<f32>,
}

impl PvCore {
    fn new() -> Self {
        let half = PV_FFT_SIZE / 2 + 1;
        Self {
            stft: StftCore::new(PV_FFT_SIZE),
            prev_phase: vec![0.0; half],
            synth_phase: vec![0.0; half],
            mag: vec![0.0; half],
            freq: vec![0.0; half],
            new_mag: vec![0.0; half],
            new_freq: vec![0.0; half],
            env: vec![0.0; half],
            env_shifted: vec![0.0; half],
            env_scratch: vec![0.0; half],
        }
    }

    fn reset(&mut self) {
        self.stft.reset();
        self.prev_phase.fill(0.0);
        self.synth_phase.fill(0.0);
    }

    fn latency(&self) -> usize {
        self.stft.latency()
    }

    /// Stream one channel through the shifter.
    fn process(&mut self, samples: &mut [f32], ratio: f32, formant: f32, gate: f32) {
        let m = PV_FFT_SIZE;
        let half = m / 2;
        let hop = self.stft.hop();
        let identity = (ratio - 1.0).abs() < 1e-6
            && (formant - 1.0).abs() < 1e-6
            && gate <= 0.0;

        let Self {
            stft,
            prev_phase,
            synth_phase,
            mag,
            freq,
            new_mag,
            new_freq,
            env,
            env_shifted,
            env_scratch,
        } = self;

        stft.process(samples, |spec| {
            // Analysis: magnitude and instantaneous frequency in bin units.
            for k in 0..=half {
                let m_k = spec[k].norm();
                let phase = spec[k].arg();
                let expected = TAU * (k * hop) as f32 / m as f32;
                let mut delta = phase - prev_phase[k] - expected;
                delta -= TAU * (delta / TAU).round();
                mag[k] = m_k;
                freq[k] = k as f32 + delta * m as f32 / (TAU * hop as f32);
                prev_phase[k] = phase;
            }

            if identity {
                // No spectral edit: leave the frame untouched but keep the
                // synthesis phase tracking so engaging the shift later
                // doesn't discontinue phase.
                for k in 0..=half {
                    synth_phase[k] = prev_phase[k];
                }
                return;
            }

            // Optional formant shift: scale the spectral envelope along
            // the bin axis, whiten, then re-color before remapping.
            if (formant - 1.0).abs() > 1e-6 {
                spectral_envelope(mag, env, env_scratch);
                for k in 0..=half {
                    let src = (k as f32 / formant).round() as usize;
                    env_shifted[k] = if src <= half { env[src] } else { 0.0 };
                }
                for k in 0..=half {
                    mag[k] = mag[k] / env[k].max(1e-9) * env_shifted[k];
                }
            }

            // Remap bins by the pitch ratio, accumulating on collision.
            new_mag[..=half].fill(0.0);
            new_freq[..=half].fill(0.0);
            for k in 0..=half {
                let idx = (k as f32 * ratio).round() as usize;
                if idx <= half {
                    new_mag[idx] += mag[k];
                    new_freq[idx] = freq[k] * ratio;
                }
            }

            // Spectral gate against the frame maximum.
            if gate > 0.0 {
                let max = new_mag[..=half].iter().fold(0.0f32, |a, &b| a.max(b));
                let threshold = gate * max;
                for v in new_mag[..=half].iter_mut() {
                    if *v < threshold {
                        *v = 0.0;
                    }
                }
            }

            // Synthesis: integrate the remapped frequencies per hop.
            for k in 0..=half {
                synth_phase[k] =
                    (synth_phase[k] + TAU * new_freq[k] * hop as f32 / m as f32)
                        .rem_euclid(TAU);
            }
            spec[0] = Complex::new(new_mag[0] * synth_phase[0].cos(), 0.0);
            spec[half] = Complex::new(new_mag[half] * synth_phase[half].cos(), 0.0);
            for k in 1..half {
                let c = Complex::from_polar(new_mag[k], synth_phase[k]);
                spec[k] = c;
                spec[m - k] = c.conj();
            }
        });
    }
}

/// Sliding box average with a running sum, edges clamped.
pub(crate) fn box_smooth(input: &[f32], output: &mut [f32], width: usize) {
    let n = input.len();
    let half = width / 2;
    let mut hi = half.min(n - 1);
    let mut sum: f32 = input[..=hi].iter().sum();
    let mut count = hi + 1;
    output[0] = sum / count as f32;
    for i in 1..n {
        if hi + 1 < n {
            hi += 1;
            sum += input[hi];
            count += 1;
        }
        if i > half {
            sum -= input[i - half - 1];
            count -= 1;
        }
        output[i] = sum / count as f32;
    }
}

/// Crude spectral envelope: two box-smoothing passes over the magnitudes.
fn spectral_envelope(mag: &[f32], env: &mut [f32], scratch: &mut [f32]) {
    const WIDTH: usize = 32;
    box_smooth(mag, scratch, WIDTH);
    box_smooth(scratch, env, WIDTH);
}

/// Frequency-domain pitch shifter (phase vocoder).
///
/// Stereo runs two independent cores. FFT 4096, hop 1024, Hann both ways;
/// the overlap-add scale lives in the STFT core and is pinned by its unity
/// round-trip test.
pub struct PitchShiftPv {
    cores: [PvCore; 2],
    dry: Vec<f32>,
    semitones: Smoothed,
    formant: Smoothed,
    gate: f32,
    mix: Smoothed,
}

const PV_PARAMS: &[&str] = &["Shift", "Formant", "Gate", "Mix"];

impl PitchShiftPv {
    pub fn new() -> Self {
        Self {
            cores: [PvCore::new(), PvCore::new()],
            dry: Vec::new(),
            semitones: Smoothed::new(0.0),
            formant: Smoothed::new(1.0),
            gate: 0.0,
            mix: Smoothed::new(1.0),
        }
    }
}

impl Default for PitchShiftPv {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for PitchShiftPv {
    fn name(&self) -> &'static str {
        "Pitch Shift PV"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        PV_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, max_frames: usize) {
        self.dry.clear();
        self.dry.resize(max_frames.max(MAX_BLOCK_SIZE), 0.0);
        // Ratio moves are audible as chirps; slew them over ~80 ms.
        self.semitones.prepare_tau(sample_rate, 0.080);
        self.formant.prepare_tau(sample_rate, 0.080);
        self.mix.prepare(sample_rate);
        for core in &mut self.cores {
            core.reset();
        }
    }

    fn reset(&mut self) {
        for core in &mut self.cores {
            core.reset();
        }
        self.semitones.snap();
        self.formant.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.semitones.set_target(map_lin(v, -24.0, 24.0));
        }
        if let Some(&v) = params.get(1) {
            self.formant
                .set_target(crate::engines::map_exp(v, 0.5, 2.0));
        }
        if let Some(&v) = params.get(2) {
            self.gate = v.clamp(0.0, 1.0);
        }
        if let Some(&v) = params.get(3) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn latency_samples(&self) -> usize {
        self.cores[0].latency()
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let frames = block.frames();
        let semis = self.semitones.advance(frames);
        let ratio = 2.0f32.powf(semis / 12.0);
        let formant = self.formant.advance(frames);
        let mix_start = self.mix;
        for ch in 0..block.channel_count() {
            let mut mix = mix_start;
            let samples = block.channel_mut(ch);
            self.dry[..frames].copy_from_slice(samples);
            self.cores[ch].process(samples, ratio, formant, self.gate);
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

// ---------------------------------------------------------------------------
// TD-PSOLA
// ---------------------------------------------------------------------------

const DET_HOP: usize = 512;
const MAX_EPOCHS: usize = 32;

struct PsolaChannel {
    ring: Vec<f32>,
    out: Vec<f32>,
    write: u64,
    epochs: [u64; MAX_EPOCHS],
    epoch_count: usize,
    last_epoch: u64,
    t0: f32,
    voiced: bool,
    next_mark: f64,
    det_counter: usize,
    det_window: Vec<f32>,
    det_decimated: Vec<f32>,
}

impl PsolaChannel {
    fn new() -> Self {
        Self {
            ring: Vec::new(),
            out: Vec::new(),
            write: 0,
            epochs: [0; MAX_EPOCHS],
            epoch_count: 0,
            last_epoch: 0,
            t0: 300.0,
            voiced: false,
            next_mark: 0.0,
            det_counter: 0,
            det_window: Vec::new(),
            det_decimated: Vec::new(),
        }
    }

    fn prepare(&mut self, max_period: usize) {
        let ring_len = (4 * max_period).next_power_of_two();
        self.ring.clear();
        self.ring.resize(ring_len, 0.0);
        self.out.clear();
        self.out.resize(ring_len, 0.0);
        self.det_window.clear();
        self.det_window.resize(2 * max_period, 0.0);
        self.det_decimated = Vec::with_capacity(max_period + 1);
        self.reset();
    }

    fn reset(&mut self) {
        self.ring.fill(0.0);
        self.out.fill(0.0);
        self.write = 0;
        self.epoch_count = 0;
        self.last_epoch = 0;
        self.voiced = false;
        self.next_mark = 0.0;
        self.det_counter = 0;
    }

    fn push_epoch(&mut self, e: u64) {
        if self.epoch_count == MAX_EPOCHS {
            self.epochs.copy_within(1.., 0);
            self.epoch_count -= 1;
        }
        self.epochs[self.epoch_count] = e;
        self.epoch_count += 1;
        self.last_epoch = e;
    }

    fn nearest_epoch(&self, target: u64) -> Option<u64> {
        self.epochs[..self.epoch_count]
            .iter()
            .copied()
            .min_by_key(|&e| e.abs_diff(target))
    }
}

/// Time-domain pitch shifter: pitch-synchronous overlap-add.
///
/// The input ring holds at least four maximum periods. Epochs ride the
/// waveform peaks; synthesis marks advance by T0/α and each grabs a
/// two-period Hann grain from the nearest epoch. The output frequency is
/// set by the mark spacing alone, so a drifting epoch selector cannot
/// collapse it to a subharmonic.
pub struct PitchShiftPsola {
    channels: [PsolaChannel; 2],
    alpha: f32,
    sensitivity: f32,
    mix: Smoothed,
    min_period: usize,
    max_period: usize,
}

const PSOLA_PARAMS: &[&str] = &["Pitch", "Sensitivity", "Mix"];

impl PitchShiftPsola {
    pub fn new() -> Self {
        Self {
            channels: [PsolaChannel::new(), PsolaChannel::new()],
            alpha: 1.0,
            sensitivity: 0.5,
            mix: Smoothed::new(1.0),
            min_period: 96,
            max_period: 800,
        }
    }

    fn process_channel(&mut self, ch: usize, samples: &mut [f32], mix_start: Smoothed) -> Smoothed {
        let mut mix = mix_start;
        let alpha = self.alpha;
        let latency = (2 * self.max_period) as u64;
        let unity = (alpha - 1.0).abs() < 1e-3;
        let voicing_floor = 0.25 + 0.35 * (1.0 - self.sensitivity);
        let (min_p, max_p) = (self.min_period, self.max_period);
        let state = &mut self.channels[ch];
        let mask = state.ring.len() - 1;
        let out_mask = state.out.len() - 1;

        for s in samples.iter_mut() {
            state.ring[(state.write as usize) & mask] = *s;
            state.write += 1;

            // Periodic pitch analysis.
            state.det_counter += 1;
            if state.det_counter >= DET_HOP && state.write >= state.det_window.len() as u64 {
                state.det_counter = 0;
                let n = state.det_window.len();
                for (i, slot) in state.det_window.iter_mut().enumerate() {
                    let idx = state.write - n as u64 + i as u64;
                    *slot = state.ring[(idx as usize) & mask];
                }
                if let Some((period, confidence)) = detect_period(
                    &state.det_window,
                    &mut state.det_decimated,
                    min_p,
                    max_p,
                ) {
                    if confidence > voicing_floor {
                        state.t0 = period;
                        state.voiced = true;
                    } else {
                        state.voiced = false;
                    }
                } else {
                    state.voiced = false;
                }
            }

            let t0 = state.t0.clamp(min_p as f32, max_p as f32);
            let quarter = (t0 * 0.25) as u64;

            // Epoch marking: predict one period past the previous epoch and
            // snap to the local waveform peak. Candidates closer than half
            // a period are dropped by construction of the prediction.
            if state.voiced {
                if state.epoch_count == 0 {
                    if state.write > (2.0 * t0) as u64 {
                        state.last_epoch = state.write - (1.5 * t0) as u64;
                        let e = peak_near(&state.ring, mask, state.last_epoch, quarter, state.write);
                        state.push_epoch(e);
                    }
                } else {
                    loop {
                        let predicted = state.last_epoch + t0 as u64;
                        if predicted + quarter >= state.write {
                            break;
                        }
                        let e = peak_near(&state.ring, mask, predicted, quarter, state.write);
                        if e >= state.last_epoch + (0.5 * t0) as u64 {
                            state.push_epoch(e);
                        } else {
                            state.last_epoch = predicted;
                        }
                    }
                }
            }

            // Synthesis marks: spacing T0/α on the output axis.
            let hop_s = (t0 / alpha) as f64;
            if state.next_mark == 0.0 {
                state.next_mark = state.write as f64;
            }
            while state.next_mark + t0 as f64 <= state.write as f64 {
                let q = state.next_mark;
                let center = if unity || !state.voiced || state.epoch_count == 0 {
                    q.round() as u64
                } else {
                    state.nearest_epoch(q.round() as u64).unwrap_or(q.round() as u64)
                };

                let half = t0.round().max(2.0) as i64;
                let gain = if hop_s < t0 as f64 {
                    ((hop_s as f32) / t0).sqrt()
                } else {
                    1.0
                };
                for i in -half..half {
                    let src = center as i64 + i;
                    if src < 0 || src >= state.write as i64 {
                        continue;
                    }
                    let w = 0.5
                        * (1.0
                            - (std::f32::consts::PI * (i + half) as f32 / half as f32).cos());
                    let dst = (q.round() as i64 + i) as usize;
                    state.out[dst & out_mask] +=
                        state.ring[(src as usize) & mask] * w * gain;
                }
                state.next_mark += hop_s;
            }

            // Emit with the fixed synthesis delay.
            let wet = if state.write > latency {
                let p = ((state.write - 1 - latency) as usize) & out_mask;
                let v = state.out[p];
                state.out[p] = 0.0;
                v
            } else {
                0.0
            };
            let m = mix.next();
            *s = *s * (1.0 - m) + wet * m;
        }
        mix
    }
}

fn peak_near(ring: &[f32], mask: usize, predicted: u64, quarter: u64, write: u64) -> u64 {
    let lo = predicted.saturating_sub(quarter);
    let hi = (predicted + quarter).min(write.saturating_sub(1));
    let mut best = predicted.min(hi);
    let mut best_val = f32::MIN;
    let mut idx = lo;
    while idx <= hi {
        let v = ring[(idx as usize) & mask];
        if v > best_val {
            best_val = v;
            best = idx;
        }
        idx += 1;
    }
    best
}

impl Default for PitchShiftPsola {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for PitchShiftPsola {
    fn name(&self) -> &'static str {
        "Pitch Shift PSOLA"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        PSOLA_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.min_period = (sample_rate / DETECT_HIGH_HZ) as usize;
        self.max_period = (sample_rate / DETECT_LOW_HZ) as usize;
        for ch in &mut self.channels {
            ch.prepare(self.max_period);
        }
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        for ch in &mut self.channels {
            ch.reset();
        }
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.alpha = 2.0f32.powf(map_lin(v, -12.0, 12.0) / 12.0);
        }
        if let Some(&v) = params.get(1) {
            self.sensitivity = v.clamp(0.0, 1.0);
        }
        if let Some(&v) = params.get(2) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn latency_samples(&self) -> usize {
        2 * self.max_period
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let mix = self.mix;
        let channel_count = block.channel_count();
        for ch in 0..channel_count {
            let advanced = self.process_channel(ch, block.channel_mut(ch), mix);
            if ch + 1 == channel_count {
                self.mix = advanced;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Harmonizer
// ---------------------------------------------------------------------------

const MAJOR: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];
const MINOR: [i32; 7] = [0, 2, 3, 5, 7, 8, 10];
// Scale steps for third, fourth, fifth, sixth, octave.
const INTERVAL_STEPS: [usize; 5] = [2, 3, 4, 5, 7];

/// Scale-aware pitch shifter: detects the played note, finds the diatonic
/// interval above it in the selected key, and drives the phase-vocoder
/// core with that ratio.
pub struct Harmonizer {
    cores: [PvCore; 2],
    dry: Vec<f32>,
    det_window: Vec<f32>,
    det_decimated: Vec<f32>,
    det_fill: Vec<f32>,
    det_pos: usize,
    key: i32,
    minor: bool,
    interval: usize,
    shift_semitones: Smoothed,
    mix: Smoothed,
    sample_rate: f32,
    min_period: usize,
    max_period: usize,
}

const HARMONIZER_PARAMS: &[&str] = &["Key", "Scale", "Interval", "Mix"];

impl Harmonizer {
    pub fn new() -> Self {
        Self {
            cores: [PvCore::new(), PvCore::new()],
            dry: Vec::new(),
            det_window: Vec::new(),
            det_decimated: Vec::new(),
            det_fill: Vec::new(),
            det_pos: 0,
            key: 0,
            minor: false,
            interval: 2,
            shift_semitones: Smoothed::new(4.0),
            mix: Smoothed::new(0.5),
            sample_rate: 48_000.0,
            min_period: 96,
            max_period: 800,
        }
    }

    /// Diatonic semitone distance from a pitch class to the interval above
    /// it in the key.
    fn diatonic_shift(&self, midi: f32) -> f32 {
        let scale = if self.minor { &MINOR } else { &MAJOR };
        let pc = ((midi.round() as i32 - self.key).rem_euclid(12)) as i32;
        // Nearest scale degree.
        let (degree, _) = scale
            .iter()
            .enumerate()
            .min_by_key(|(_, &d)| (d - pc).abs())
            .unwrap();
        let steps = INTERVAL_STEPS[self.interval];
        let target_degree = degree + steps;
        let octaves = (target_degree / 7) as i32;
        let target = scale[target_degree % 7] + 12 * octaves;
        (target - scale[degree]) as f32
    }
}

impl Default for Harmonizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Harmonizer {
    fn name(&self) -> &'static str {
        "Harmonizer"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        HARMONIZER_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, max_frames: usize) {
        self.sample_rate = sample_rate;
        self.min_period = (sample_rate / DETECT_HIGH_HZ) as usize;
        self.max_period = (sample_rate / DETECT_LOW_HZ) as usize;
        self.dry.clear();
        self.dry.resize(max_frames.max(MAX_BLOCK_SIZE), 0.0);
        self.det_window.clear();
        self.det_window.resize(2 * self.max_period, 0.0);
        self.det_fill.clear();
        self.det_fill.resize(2 * self.max_period, 0.0);
        self.det_decimated = Vec::with_capacity(self.max_period + 1);
        self.det_pos = 0;
        self.shift_semitones.prepare_tau(sample_rate, 0.080);
        self.mix.prepare(sample_rate);
        for core in &mut self.cores {
            core.reset();
        }
    }

    fn reset(&mut self) {
        for core in &mut self.cores {
            core.reset();
        }
        self.det_fill.fill(0.0);
        self.det_pos = 0;
        self.shift_semitones.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.key = (v.clamp(0.0, 1.0) * 11.0).round() as i32;
        }
        if let Some(&v) = params.get(1) {
            self.minor = v >= 0.5;
        }
        if let Some(&v) = params.get(2) {
            self.interval =
                ((v.clamp(0.0, 1.0) * (INTERVAL_STEPS.len() - 1) as f32).round()) as usize;
        }
        if let Some(&v) = params.get(3) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn latency_samples(&self) -> usize {
        self.cores[0].latency()
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let frames = block.frames();

        // Track the input pitch from channel 0 and retune the shift.
        {
            let reference = block.channel_mut(0);
            for &s in reference.iter() {
                self.det_fill[self.det_pos] = s;
                self.det_pos += 1;
                if self.det_pos >= self.det_fill.len() {
                    self.det_pos = 0;
                    self.det_window.copy_from_slice(&self.det_fill);
                    if let Some((period, confidence)) = detect_period(
                        &self.det_window,
                        &mut self.det_decimated,
                        self.min_period,
                        self.max_period,
                    ) {
                        if confidence > 0.4 {
                            let freq = self.sample_rate / period;
                            let midi = 69.0 + 12.0 * (freq / 440.0).log2();
                            let shift = self.diatonic_shift(midi);
                            self.shift_semitones.set_target(shift);
                        }
                    }
                }
            }
        }

        let semis = self.shift_semitones.advance(frames);
        let ratio = 2.0f32.powf(semis / 12.0);
        let mix_start = self.mix;
        for ch in 0..block.channel_count() {
            let mut mix = mix_start;
            let samples = block.channel_mut(ch);
            self.dry[..frames].copy_from_slice(samples);
            self.cores[ch].process(samples, ratio, 1.0, 0.0);
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

// ---------------------------------------------------------------------------
// Octaver
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Default)]
struct OctaverChannel {
    flip: f32,
    prev: f32,
}

/// Analog-style sub-octave: a flip-flop toggled on positive zero
/// crossings, shaped by the input envelope and a tone filter.
pub struct Octaver {
    channels: [OctaverChannel; 2],
    envs: [EnvFollower; 2],
    tones: [OnePole; 2],
    sub: Smoothed,
    mix: Smoothed,
    sample_rate: f32,
}

const OCTAVER_PARAMS: &[&str] = &["Sub", "Tone", "Mix"];

impl Octaver {
    pub fn new() -> Self {
        Self {
            channels: [OctaverChannel::default(); 2],
            envs: [EnvFollower::new(), EnvFollower::new()],
            tones: [OnePole::new(), OnePole::new()],
            sub: Smoothed::new(0.7),
            mix: Smoothed::new(0.5),
            sample_rate: 48_000.0,
        }
    }
}

impl Default for Octaver {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Octaver {
    fn name(&self) -> &'static str {
        "Octaver"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        OCTAVER_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        for env in &mut self.envs {
            env.set_times(0.005, 0.050, sample_rate);
        }
        for tone in &mut self.tones {
            tone.set_cutoff(800.0, sample_rate);
        }
        self.sub.prepare(sample_rate);
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        self.channels = [OctaverChannel::default(); 2];
        for env in &mut self.envs {
            env.reset();
        }
        for tone in &mut self.tones {
            tone.reset();
        }
        self.sub.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.sub.set_target(v.clamp(0.0, 1.0));
        }
        if let Some(&v) = params.get(1) {
            let cutoff = crate::engines::map_exp(v, 200.0, 4_000.0);
            for tone in &mut self.tones {
                tone.set_cutoff(cutoff, self.sample_rate);
            }
        }
        if let Some(&v) = params.get(2) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        for ch in 0..block.channel_count() {
            let mut sub = self.sub;
            let mut mix = self.mix;
            let state = &mut self.channels[ch];
            let env = &mut self.envs[ch];
            let tone = &mut self.tones[ch];
            for s in block.channel_mut(ch).iter_mut() {
                // Toggle on positive-going zero crossings: half the input
                // frequency.
                if state.prev <= 0.0 && *s > 0.0 {
                    state.flip = if state.flip > 0.0 { -1.0 } else { 1.0 };
                }
                state.prev = *s;
                let wet = tone.lowpass(state.flip * env.tick(*s)) * sub.next();
                *s = *s * (1.0 - mix.next())
                    + (*s * 0.5 + wet) * mix.current();
            }
            if ch + 1 == block.channel_count() {
                self.sub = sub;
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
    fn test_detector_finds_220hz() {
        let window = sine(220.0, 1_600);
        let mut scratch = Vec::new();
        let (period, confidence) =
            detect_period(&window, &mut scratch, 96, 800).expect("no pitch found");
        let expected = 48_000.0 / 220.0;
        assert!(
            (period - expected).abs() < 0.5,
            "period {period} vs {expected}"
        );
        assert!(confidence > 0.8);
    }

    #[test]
    fn test_pv_unity_preserves_rms() {
        let mut engine = PitchShiftPv::new();
        engine.prepare(48_000.0, 512);
        // Shift 0 semitones, formant 1, gate 0, fully wet.
        engine.update_params(&[0.5, 0.5, 0.0, 1.0]);
        engine.reset();

        let latency = engine.latency_samples();
        let mut samples = sine(440.0, latency + 48_000);
        let in_rms = rms(&samples);
        for chunk in samples.chunks_mut(512) {
            engine.process(&mut AudioBlock::mono(chunk));
        }
        let steady = &samples[latency + PV_FFT_SIZE / 4..];
        let db = 20.0 * (rms(steady) / in_rms).log10();
        assert!(db.abs() < 0.1, "unity gain error {db} dB");
    }

    #[test]
    fn test_diatonic_third_in_c_major() {
        let mut h = Harmonizer::new();
        h.key = 0;
        h.minor = false;
        h.interval = 0; // third
        // C (midi 60) -> E: 4 semitones. D (62) -> F: 3 semitones.
        assert_eq!(h.diatonic_shift(60.0), 4.0);
        assert_eq!(h.diatonic_shift(62.0), 3.0);
    }

    #[test]
    fn test_octaver_produces_subharmonic() {
        let mut engine = Octaver::new();
        engine.prepare(48_000.0, 512);
        engine.update_params(&[1.0, 0.5, 1.0]);
        engine.reset();

        let mut samples = sine(440.0, 24_000);
        engine.process(&mut AudioBlock::mono(&mut samples));
        assert!(samples.iter().all(|s| s.is_finite()));
        assert!(rms(&samples[12_000..]) > 0.1);
    }
}
