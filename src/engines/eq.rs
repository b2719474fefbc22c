//! EQ and filter engines.
//!
//! The four basic responses share one state-variable filter engine; the
//! bell, auto-wah, comb and formant engines build on the same primitives.
//! Filters process each channel through independent state, so a stereo
//! input never bleeds across channels.

use crate::block::AudioBlock;
use crate::dsp::delay::DelayLine;
use crate::dsp::env_follower::EnvFollower;
use crate::dsp::filter::Svf;
use crate::dsp::mix::blend_dry_wet;
use crate::dsp::Smoothed;
use crate::engines::{db_to_gain, map_exp, map_lin, Engine};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FilterResponse {
    LowPass,
    HighPass,
    BandPass,
    Notch,
}

/// One engine covers the four basic SVF responses; the factory instantiates
/// it once per response id.
pub struct SvfEngine {
    response: FilterResponse,
    filters: [Svf; 2],
    cutoff: f32,
    resonance: f32,
    mix: Smoothed,
    sample_rate: f32,
}

const SVF_PARAMS: &[&str] = &["Cutoff", "Resonance", "Mix"];

impl SvfEngine {
    pub fn new(response: FilterResponse) -> Self {
        Self {
            response,
            filters: [Svf::new(), Svf::new()],
            cutoff: 1_000.0,
            resonance: 0.0,
            mix: Smoothed::new(1.0),
            sample_rate: 48_000.0,
        }
    }

    fn apply_coeffs(&mut self) {
        for f in &mut self.filters {
            f.set(self.cutoff, self.resonance, self.sample_rate);
        }
    }
}

impl Engine for SvfEngine {
    fn name(&self) -> &'static str {
        match self.response {
            FilterResponse::LowPass => "Low Pass",
            FilterResponse::HighPass => "High Pass",
            FilterResponse::BandPass => "Band Pass",
            FilterResponse::Notch => "Notch",
        }
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        SVF_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        self.mix.prepare(sample_rate);
        self.apply_coeffs();
    }

    fn reset(&mut self) {
        for f in &mut self.filters {
            f.reset();
        }
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.cutoff = map_exp(v, 20.0, 20_000.0);
        }
        if let Some(&v) = params.get(1) {
            self.resonance = v.clamp(0.0, 1.0) * 0.95;
        }
        if let Some(&v) = params.get(2) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
        self.apply_coeffs();
    }

    fn process(&mut self, block: &mut AudioBlock) {
        for ch in 0..block.channel_count() {
            let filter = &mut self.filters[ch];
            let response = self.response;
            let mut mix = self.mix;
            for s in block.channel_mut(ch).iter_mut() {
                let outs = filter.tick(*s);
                let wet = match response {
                    FilterResponse::LowPass => outs.lowpass,
                    FilterResponse::HighPass => outs.highpass,
                    FilterResponse::BandPass => outs.bandpass * filter.k(),
                    FilterResponse::Notch => outs.notch,
                };
                *s = blend_dry_wet(*s, wet, mix.next());
            }
            if ch + 1 == block.channel_count() {
                self.mix = mix;
            }
        }
    }
}

/// Parametric bell: dry plus weighted normalized bandpass.
pub struct BellEq {
    filters: [Svf; 2],
    frequency: f32,
    gain: f32,
    q: f32,
    sample_rate: f32,
}

const BELL_PARAMS: &[&str] = &["Frequency", "Gain", "Width"];

impl BellEq {
    pub fn new() -> Self {
        Self {
            filters: [Svf::new(), Svf::new()],
            frequency: 1_000.0,
            gain: 1.0,
            q: 1.0,
            sample_rate: 48_000.0,
        }
    }

    fn apply_coeffs(&mut self) {
        for f in &mut self.filters {
            f.set_q(self.frequency, self.q, self.sample_rate);
        }
    }
}

impl Default for BellEq {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for BellEq {
    fn name(&self) -> &'static str {
        "Bell EQ"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        BELL_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        self.apply_coeffs();
    }

    fn reset(&mut self) {
        for f in &mut self.filters {
            f.reset();
        }
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.frequency = map_exp(v, 40.0, 16_000.0);
        }
        if let Some(&v) = params.get(1) {
            self.gain = db_to_gain(map_lin(v, -18.0, 18.0));
        }
        if let Some(&v) = params.get(2) {
            // Narrow at 0, wide at 1.
            self.q = map_exp(1.0 - v, 0.4, 8.0);
        }
        self.apply_coeffs();
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let weight = self.gain - 1.0;
        for ch in 0..block.channel_count() {
            let filter = &mut self.filters[ch];
            for s in block.channel_mut(ch).iter_mut() {
                let outs = filter.tick(*s);
                *s += weight * outs.bandpass * filter.k();
            }
        }
    }
}

/// Envelope-driven bandpass sweep.
pub struct AutoWah {
    filters: [Svf; 2],
    envs: [EnvFollower; 2],
    sensitivity: f32,
    resonance: f32,
    mix: Smoothed,
    sample_rate: f32,
}

const WAH_PARAMS: &[&str] = &["Sensitivity", "Resonance", "Mix"];

impl AutoWah {
    pub fn new() -> Self {
        Self {
            filters: [Svf::new(), Svf::new()],
            envs: [EnvFollower::new(), EnvFollower::new()],
            sensitivity: 0.5,
            resonance: 0.7,
            mix: Smoothed::new(1.0),
            sample_rate: 48_000.0,
        }
    }
}

impl Default for AutoWah {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for AutoWah {
    fn name(&self) -> &'static str {
        "Auto Wah"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        WAH_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        self.mix.prepare(sample_rate);
        for env in &mut self.envs {
            env.set_times(0.002, 0.120, sample_rate);
        }
    }

    fn reset(&mut self) {
        for f in &mut self.filters {
            f.reset();
        }
        for env in &mut self.envs {
            env.reset();
        }
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.sensitivity = v.clamp(0.0, 1.0);
        }
        if let Some(&v) = params.get(1) {
            self.resonance = v.clamp(0.0, 1.0) * 0.9;
        }
        if let Some(&v) = params.get(2) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let frames = block.frames();
        for ch in 0..block.channel_count() {
            let mut mix = self.mix;
            // Coefficient updates are throttled to every 16 samples; the
            // sweep itself moves slowly enough that this stays inaudible.
            for start in (0..frames).step_by(16) {
                let env = self.envs[ch].value();
                let sweep = (env * (1.0 + self.sensitivity * 8.0)).clamp(0.0, 1.0);
                let cutoff = 220.0 * (1.0 + 15.0 * sweep * self.sensitivity);
                self.filters[ch].set(cutoff, self.resonance, self.sample_rate);

                let end = (start + 16).min(frames);
                let samples = &mut block.channel_mut(ch)[start..end];
                for s in samples.iter_mut() {
                    self.envs[ch].tick(*s);
                    let outs = self.filters[ch].tick(*s);
                    let wet = outs.bandpass * self.filters[ch].k() * 1.5;
                    *s = blend_dry_wet(*s, wet, mix.next());
                }
            }
            if ch + 1 == block.channel_count() {
                self.mix = mix;
            }
        }
    }
}

/// Tuned feedback comb.
pub struct CombFilter {
    delays: [DelayLine; 2],
    frequency: Smoothed,
    feedback: Smoothed,
    mix: Smoothed,
    sample_rate: f32,
}

const COMB_PARAMS: &[&str] = &["Frequency", "Feedback", "Mix"];

impl CombFilter {
    pub fn new() -> Self {
        Self {
            delays: [DelayLine::new(), DelayLine::new()],
            frequency: Smoothed::new(220.0),
            feedback: Smoothed::new(0.5),
            mix: Smoothed::new(1.0),
            sample_rate: 48_000.0,
        }
    }
}

impl Default for CombFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for CombFilter {
    fn name(&self) -> &'static str {
        "Comb Filter"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        COMB_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        // Lowest tunable frequency is 40 Hz.
        let max_delay = (sample_rate / 40.0).ceil() as usize + 2;
        for d in &mut self.delays {
            d.resize(max_delay);
        }
        self.frequency.prepare(sample_rate);
        self.feedback.prepare(sample_rate);
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        for d in &mut self.delays {
            d.reset();
        }
        self.frequency.snap();
        self.feedback.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.frequency.set_target(map_exp(v, 40.0, 2_000.0));
        }
        if let Some(&v) = params.get(1) {
            self.feedback.set_target(v.clamp(0.0, 1.0) * 0.95);
        }
        if let Some(&v) = params.get(2) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        for ch in 0..block.channel_count() {
            let mut frequency = self.frequency;
            let mut feedback = self.feedback;
            let mut mix = self.mix;
            let delay = &mut self.delays[ch];
            for s in block.channel_mut(ch).iter_mut() {
                let period = self.sample_rate / frequency.next().max(1.0);
                let delayed = delay.read_frac(period - 1.0);
                let wet = *s + delayed * feedback.next();
                delay.write_advance(wet);
                *s = blend_dry_wet(*s, wet, mix.next());
            }
            if ch + 1 == block.channel_count() {
                self.frequency = frequency;
                self.feedback = feedback;
                self.mix = mix;
            }
        }
    }
}

// Formant table: (F1, F2, F3) per vowel, A E I O U.
const VOWELS: [[f32; 3]; 5] = [
    [800.0, 1150.0, 2900.0],
    [400.0, 1600.0, 2700.0],
    [250.0, 1750.0, 2600.0],
    [400.0, 750.0, 2400.0],
    [350.0, 600.0, 2400.0],
];

const FORMANT_GAINS: [f32; 3] = [1.0, 0.63, 0.35];

/// Three parallel bandpass resonators morphing along an A-E-I-O-U path.
pub struct FormantFilter {
    banks: [[Svf; 3]; 2],
    vowel: f32,
    resonance: f32,
    mix: Smoothed,
    sample_rate: f32,
}

const FORMANT_PARAMS: &[&str] = &["Vowel", "Resonance", "Mix"];

impl FormantFilter {
    pub fn new() -> Self {
        Self {
            banks: [
                [Svf::new(), Svf::new(), Svf::new()],
                [Svf::new(), Svf::new(), Svf::new()],
            ],
            vowel: 0.0,
            resonance: 0.6,
            mix: Smoothed::new(1.0),
            sample_rate: 48_000.0,
        }
    }

    fn apply_coeffs(&mut self) {
        let pos = self.vowel * (VOWELS.len() - 1) as f32;
        let idx = (pos as usize).min(VOWELS.len() - 2);
        let frac = pos - idx as f32;
        let q = map_lin(self.resonance, 4.0, 14.0);

        for bank in &mut self.banks {
            for (i, filter) in bank.iter_mut().enumerate() {
                let freq = VOWELS[idx][i] + (VOWELS[idx + 1][i] - VOWELS[idx][i]) * frac;
                filter.set_q(freq, q, self.sample_rate);
            }
        }
    }
}

impl Default for FormantFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for FormantFilter {
    fn name(&self) -> &'static str {
        "Formant Filter"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        FORMANT_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        self.mix.prepare(sample_rate);
        self.apply_coeffs();
    }

    fn reset(&mut self) {
        for bank in &mut self.banks {
            for f in bank {
                f.reset();
            }
        }
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.vowel = v.clamp(0.0, 1.0);
        }
        if let Some(&v) = params.get(1) {
            self.resonance = v.clamp(0.0, 1.0);
        }
        if let Some(&v) = params.get(2) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
        self.apply_coeffs();
    }

    fn process(&mut self, block: &mut AudioBlock) {
        for ch in 0..block.channel_count() {
            let mut mix = self.mix;
            let bank = &mut self.banks[ch];
            for s in block.channel_mut(ch).iter_mut() {
                let mut wet = 0.0;
                for (filter, gain) in bank.iter_mut().zip(FORMANT_GAINS.iter()) {
                    let outs = filter.tick(*s);
                    wet += outs.bandpass * filter.k() * gain * 2.0;
                }
                *s = blend_dry_wet(*s, wet, mix.next());
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
            .map(|n| (std::f32::consts::TAU * freq * n as f32 / 48_000.0).sin())
            .collect()
    }

    fn peak(buffer: &[f32]) -> f32 {
        buffer.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()))
    }

    #[test]
    fn test_lowpass_attenuates_highs() {
        let mut engine = SvfEngine::new(FilterResponse::LowPass);
        engine.prepare(48_000.0, 512);
        // Cutoff near the bottom of the range.
        engine.update_params(&[0.2, 0.0, 1.0]);
        engine.reset();

        let mut samples = sine(8_000.0, 4_096);
        engine.process(&mut AudioBlock::mono(&mut samples));
        assert!(peak(&samples[2_048..]) < 0.1);
    }

    #[test]
    fn test_dry_mix_is_identity() {
        let mut engine = SvfEngine::new(FilterResponse::HighPass);
        engine.prepare(48_000.0, 512);
        engine.update_params(&[0.5, 0.5, 0.0]);
        engine.reset();

        let mut samples = sine(440.0, 512);
        let original = samples.clone();
        engine.process(&mut AudioBlock::mono(&mut samples));
        for (a, b) in samples.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_bell_boosts_center() {
        let mut engine = BellEq::new();
        engine.prepare(48_000.0, 512);
        // Center on 1 kHz region with maximum boost.
        engine.update_params(&[0.54, 1.0, 0.5]);
        engine.reset();

        let mut on_center = sine(1_000.0, 8_192);
        engine.process(&mut AudioBlock::mono(&mut on_center));
        assert!(peak(&on_center[4_096..]) > 1.5);
    }

    #[test]
    fn test_comb_stays_finite_at_max_feedback() {
        let mut engine = CombFilter::new();
        engine.prepare(48_000.0, 512);
        engine.update_params(&[0.5, 1.0, 1.0]);
        engine.reset();

        let mut samples = sine(220.0, 48_000);
        engine.process(&mut AudioBlock::mono(&mut samples));
        assert!(samples.iter().all(|s| s.is_finite()));
    }
}
