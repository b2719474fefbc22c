//! Reverb engines built on a Schroeder core: four parallel damped combs
//! into two series allpasses per channel.
//!
//! Room, hall and plate share the core with different delay scales and
//! feedback ranges; the gated variant adds an envelope gate on the wet
//! path; the spring variant swaps the topology for a dispersive allpass
//! chain. The right channel's delays are offset by a fixed 23 samples so
//! stereo tails decorrelate.

use crate::block::AudioBlock;
use crate::dsp::env_follower::EnvFollower;
use crate::dsp::lfo::Lfo;
use crate::dsp::mix::blend_dry_wet;
use crate::dsp::Smoothed;
use crate::engines::{map_lin, Engine};

// Comb and allpass delay times in ms, mutually prime so the tail stays
// dense instead of ringing at one period.
const COMB_DELAYS_MS: [f32; 4] = [29.7, 37.1, 41.1, 43.7];
const ALLPASS_DELAYS_MS: [f32; 2] = [5.0, 1.7];
const STEREO_SPREAD_SAMPLES: usize = 23;

struct Comb {
    buffer: Vec<f32>,
    delay: usize,
    pos: usize,
    feedback: f32,
    damp: f32,
    filter_state: f32,
}

impl Comb {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            delay: 1,
            pos: 0,
            feedback: 0.5,
            damp: 0.5,
            filter_state: 0.0,
        }
    }

    fn resize(&mut self, max_samples: usize) {
        self.buffer.clear();
        self.buffer.resize(max_samples.max(1), 0.0);
        self.pos = 0;
    }

    fn set_delay(&mut self, samples: usize) {
        self.delay = samples.clamp(1, self.buffer.len().max(1));
        self.pos %= self.delay;
    }

    #[inline]
    fn tick(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.pos];
        // One-pole lowpass in the loop soaks up highs each pass.
        self.filter_state = output * (1.0 - self.damp) + self.filter_state * self.damp;
        if self.filter_state.abs() < 1e-18 {
            self.filter_state = 0.0;
        }
        self.buffer[self.pos] = input + self.filter_state * self.feedback;
        self.pos += 1;
        if self.pos >= self.delay {
            self.pos = 0;
        }
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
        self.pos = 0;
    }
}

struct Allpass {
    buffer: Vec<f32>,
    delay: usize,
    pos: usize,
    feedback: f32,
}

impl Allpass {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            delay: 1,
            pos: 0,
            feedback: 0.5,
        }
    }

    fn resize(&mut self, max_samples: usize) {
        self.buffer.clear();
        self.buffer.resize(max_samples.max(1), 0.0);
        self.pos = 0;
    }

    fn set_delay(&mut self, samples: usize) {
        self.delay = samples.clamp(1, self.buffer.len().max(1));
        self.pos %= self.delay;
    }

    #[inline]
    fn tick(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.pos];
        let output = -self.feedback * input + delayed;
        self.buffer[self.pos] = input + self.feedback * output;
        self.pos += 1;
        if self.pos >= self.delay {
            self.pos = 0;
        }
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

/// One channel of Schroeder reverb.
struct SchroederCore {
    combs: [Comb; 4],
    allpasses: [Allpass; 2],
}

impl SchroederCore {
    fn new() -> Self {
        Self {
            combs: [Comb::new(), Comb::new(), Comb::new(), Comb::new()],
            allpasses: [Allpass::new(), Allpass::new()],
        }
    }

    fn prepare(&mut self, sample_rate: f32, delay_scale: f32, spread: usize) {
        for (comb, &ms) in self.combs.iter_mut().zip(COMB_DELAYS_MS.iter()) {
            let samples = (ms * delay_scale * sample_rate / 1000.0) as usize + spread;
            comb.resize(samples + 1);
            comb.set_delay(samples);
        }
        for (ap, &ms) in self.allpasses.iter_mut().zip(ALLPASS_DELAYS_MS.iter()) {
            let samples = (ms * delay_scale * sample_rate / 1000.0) as usize + spread;
            ap.resize(samples + 1);
            ap.set_delay(samples);
        }
    }

    fn set_feedback(&mut self, feedback: f32) {
        for comb in &mut self.combs {
            comb.feedback = feedback.clamp(0.0, 0.985);
        }
    }

    fn set_damping(&mut self, damp: f32) {
        for comb in &mut self.combs {
            comb.damp = damp.clamp(0.0, 1.0);
        }
    }

    #[inline]
    fn tick(&mut self, input: f32) -> f32 {
        let mut output = 0.0;
        for comb in &mut self.combs {
            output += comb.tick(input);
        }
        output *= 0.25;
        for ap in &mut self.allpasses {
            output = ap.tick(output);
        }
        output
    }

    fn reset(&mut self) {
        for comb in &mut self.combs {
            comb.reset();
        }
        for ap in &mut self.allpasses {
            ap.reset();
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReverbCharacter {
    Room,
    Hall,
    Plate,
}

impl ReverbCharacter {
    fn delay_scale(self) -> f32 {
        match self {
            ReverbCharacter::Room => 0.6,
            ReverbCharacter::Hall => 1.35,
            ReverbCharacter::Plate => 1.0,
        }
    }

    fn feedback_range(self) -> (f32, f32) {
        match self {
            ReverbCharacter::Room => (0.60, 0.88),
            ReverbCharacter::Hall => (0.75, 0.97),
            ReverbCharacter::Plate => (0.70, 0.95),
        }
    }
}

/// Room/hall/plate reverb. Hall adds a pre-delay parameter.
pub struct ReverbEngine {
    character: ReverbCharacter,
    cores: [SchroederCore; 2],
    predelay: [crate::dsp::delay::DelayLine; 2],
    predelay_samples: f32,
    mix: Smoothed,
    sample_rate: f32,
}

const ROOM_PARAMS: &[&str] = &["Size", "Damping", "Mix"];
const HALL_PARAMS: &[&str] = &["Size", "Damping", "Predelay", "Mix"];

impl ReverbEngine {
    pub fn new(character: ReverbCharacter) -> Self {
        Self {
            character,
            cores: [SchroederCore::new(), SchroederCore::new()],
            predelay: [
                crate::dsp::delay::DelayLine::new(),
                crate::dsp::delay::DelayLine::new(),
            ],
            predelay_samples: 0.0,
            mix: Smoothed::new(0.3),
            sample_rate: 48_000.0,
        }
    }
}

impl Engine for ReverbEngine {
    fn name(&self) -> &'static str {
        match self.character {
            ReverbCharacter::Room => "Room Reverb",
            ReverbCharacter::Hall => "Hall Reverb",
            ReverbCharacter::Plate => "Plate Reverb",
        }
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        match self.character {
            ReverbCharacter::Hall => HALL_PARAMS,
            _ => ROOM_PARAMS,
        }
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        let scale = self.character.delay_scale();
        self.cores[0].prepare(sample_rate, scale, 0);
        self.cores[1].prepare(sample_rate, scale, STEREO_SPREAD_SAMPLES);
        let predelay_max = (0.120 * sample_rate) as usize + 2;
        for p in &mut self.predelay {
            p.resize(predelay_max);
        }
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        for core in &mut self.cores {
            core.reset();
        }
        for p in &mut self.predelay {
            p.reset();
        }
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        let (fb_lo, fb_hi) = self.character.feedback_range();
        if let Some(&v) = params.first() {
            let feedback = map_lin(v, fb_lo, fb_hi);
            for core in &mut self.cores {
                core.set_feedback(feedback);
            }
        }
        if let Some(&v) = params.get(1) {
            for core in &mut self.cores {
                core.set_damping(v);
            }
        }
        let mix_index = if self.character == ReverbCharacter::Hall {
            if let Some(&v) = params.get(2) {
                self.predelay_samples = map_lin(v, 0.0, 0.100) * self.sample_rate;
            }
            3
        } else {
            2
        };
        if let Some(&v) = params.get(mix_index) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let use_predelay = self.character == ReverbCharacter::Hall;
        for ch in 0..block.channel_count() {
            let mut mix = self.mix;
            let core = &mut self.cores[ch];
            let pre = &mut self.predelay[ch];
            for s in block.channel_mut(ch).iter_mut() {
                let feed = if use_predelay {
                    pre.write_advance(*s);
                    pre.read_frac(self.predelay_samples)
                } else {
                    *s
                };
                let wet = core.tick(feed);
                *s = blend_dry_wet(*s, wet, mix.next());
            }
            if ch + 1 == block.channel_count() {
                self.mix = mix;
            }
        }
    }
}

/// Reverb whose tail is chopped by an input-driven gate: the 80s drum
/// sound. Wet passes while the input envelope is above threshold plus a
/// hold window, then closes fast.
pub struct GatedReverb {
    cores: [SchroederCore; 2],
    env: EnvFollower,
    gate_gain: f32,
    hold_counter: u32,
    threshold: f32,
    hold_samples: u32,
    mix: Smoothed,
    sample_rate: f32,
}

const GATED_PARAMS: &[&str] = &["Size", "Threshold", "Hold", "Mix"];

impl GatedReverb {
    pub fn new() -> Self {
        Self {
            cores: [SchroederCore::new(), SchroederCore::new()],
            env: EnvFollower::new(),
            gate_gain: 0.0,
            hold_counter: 0,
            threshold: 0.05,
            hold_samples: 4_800,
            mix: Smoothed::new(0.4),
            sample_rate: 48_000.0,
        }
    }
}

impl Default for GatedReverb {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for GatedReverb {
    fn name(&self) -> &'static str {
        "Gated Reverb"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        GATED_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        self.cores[0].prepare(sample_rate, 1.0, 0);
        self.cores[1].prepare(sample_rate, 1.0, STEREO_SPREAD_SAMPLES);
        self.env.set_times(0.001, 0.010, sample_rate);
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        for core in &mut self.cores {
            core.reset();
        }
        self.env.reset();
        self.gate_gain = 0.0;
        self.hold_counter = 0;
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            let feedback = map_lin(v, 0.7, 0.95);
            for core in &mut self.cores {
                core.set_feedback(feedback);
                core.set_damping(0.3);
            }
        }
        if let Some(&v) = params.get(1) {
            self.threshold = crate::engines::db_to_gain(map_lin(v, -60.0, -10.0));
        }
        if let Some(&v) = params.get(2) {
            self.hold_samples = (map_lin(v, 0.020, 0.500) * self.sample_rate) as u32;
        }
        if let Some(&v) = params.get(3) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let frames = block.frames();
        let (left, mut right) = block.split_mut();
        for i in 0..frames {
            let peak = match &right {
                Some(r) => left[i].abs().max(r[i].abs()),
                None => left[i].abs(),
            };
            if self.env.tick(peak) > self.threshold {
                self.hold_counter = self.hold_samples;
            }
            let target = if self.hold_counter > 0 {
                self.hold_counter -= 1;
                1.0
            } else {
                0.0
            };
            // Fast 2 ms slew in both directions.
            self.gate_gain += 0.01 * (target - self.gate_gain);

            let mix = self.mix.next();
            let wet_l = self.cores[0].tick(left[i]) * self.gate_gain;
            left[i] = blend_dry_wet(left[i], wet_l, mix);
            if let Some(r) = right.as_deref_mut() {
                let wet_r = self.cores[1].tick(r[i]) * self.gate_gain;
                r[i] = blend_dry_wet(r[i], wet_r, mix);
            }
        }
    }
}

/// Dispersive spring tank: three long allpasses in series with a slow
/// chirp modulation, plus one comb for body.
pub struct SpringReverb {
    allpasses: [[Allpass; 3]; 2],
    combs: [Comb; 2],
    chirp: Lfo,
    tension: f32,
    mix: Smoothed,
    sample_rate: f32,
}

const SPRING_PARAMS: &[&str] = &["Tension", "Decay", "Mix"];
const SPRING_ALLPASS_MS: [f32; 3] = [31.0, 23.0, 17.0];

impl SpringReverb {
    pub fn new() -> Self {
        Self {
            allpasses: [
                [Allpass::new(), Allpass::new(), Allpass::new()],
                [Allpass::new(), Allpass::new(), Allpass::new()],
            ],
            combs: [Comb::new(), Comb::new()],
            chirp: Lfo::sine(),
            tension: 0.5,
            mix: Smoothed::new(0.4),
            sample_rate: 48_000.0,
        }
    }

    fn apply_tension(&mut self) {
        // Higher tension shortens the spring and brightens the boing.
        let scale = map_lin(1.0 - self.tension, 0.6, 1.4);
        for bank in &mut self.allpasses {
            for (ap, &ms) in bank.iter_mut().zip(SPRING_ALLPASS_MS.iter()) {
                ap.set_delay((ms * scale * self.sample_rate / 1000.0) as usize);
                ap.feedback = 0.6;
            }
        }
    }
}

impl Default for SpringReverb {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for SpringReverb {
    fn name(&self) -> &'static str {
        "Spring Reverb"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        SPRING_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        let max = (0.050 * 1.4 * sample_rate) as usize + STEREO_SPREAD_SAMPLES + 2;
        for bank in &mut self.allpasses {
            for ap in bank {
                ap.resize(max);
            }
        }
        for (i, comb) in self.combs.iter_mut().enumerate() {
            let samples = (0.041 * sample_rate) as usize + i * STEREO_SPREAD_SAMPLES;
            comb.resize(samples + 1);
            comb.set_delay(samples);
            comb.damp = 0.4;
        }
        self.apply_tension();
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        for bank in &mut self.allpasses {
            for ap in bank {
                ap.reset();
            }
        }
        for comb in &mut self.combs {
            comb.reset();
        }
        self.chirp.reset();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.tension = v.clamp(0.0, 1.0);
            self.apply_tension();
        }
        if let Some(&v) = params.get(1) {
            let feedback = map_lin(v, 0.5, 0.9);
            for comb in &mut self.combs {
                comb.feedback = feedback;
            }
        }
        if let Some(&v) = params.get(2) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        for ch in 0..block.channel_count() {
            let mut mix = self.mix;
            for s in block.channel_mut(ch).iter_mut() {
                let mut wet = self.combs[ch].tick(*s);
                for ap in &mut self.allpasses[ch] {
                    wet = ap.tick(wet);
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

    #[test]
    fn test_reverb_produces_tail() {
        let mut engine = ReverbEngine::new(ReverbCharacter::Room);
        engine.prepare(48_000.0, 512);
        engine.update_params(&[0.5, 0.5, 1.0]);
        engine.reset();

        let mut samples = vec![0.0f32; 24_000];
        samples[0] = 1.0;
        engine.process(&mut AudioBlock::mono(&mut samples));

        let tail: f32 = samples[4_800..].iter().map(|x| x * x).sum();
        assert!(tail > 1e-4, "no reverb tail: {tail}");
    }

    #[test]
    fn test_reverb_stable_at_max_size() {
        let mut engine = ReverbEngine::new(ReverbCharacter::Hall);
        engine.prepare(48_000.0, 512);
        engine.update_params(&[1.0, 0.0, 0.5, 1.0]);
        engine.reset();

        let mut samples = vec![0.1f32; 96_000];
        engine.process(&mut AudioBlock::mono(&mut samples));
        assert!(samples.iter().all(|s| s.is_finite() && s.abs() < 10.0));
    }

    #[test]
    fn test_gated_reverb_cuts_tail() {
        let mut engine = GatedReverb::new();
        engine.prepare(48_000.0, 512);
        // Big room, high threshold, shortest hold, fully wet.
        engine.update_params(&[1.0, 1.0, 0.0, 1.0]);
        engine.reset();

        // A loud burst then silence.
        let mut samples = vec![0.0f32; 96_000];
        for s in samples.iter_mut().take(4_800) {
            *s = 0.8;
        }
        engine.process(&mut AudioBlock::mono(&mut samples));

        let late: f32 = samples[48_000..].iter().map(|x| x * x).sum::<f32>();
        assert!(late < 1e-2, "gate failed to close: {late}");
    }

    #[test]
    fn test_dry_mix_identity() {
        let mut engine = ReverbEngine::new(ReverbCharacter::Plate);
        engine.prepare(48_000.0, 512);
        engine.update_params(&[0.7, 0.4, 0.0]);
        engine.reset();

        let mut samples: Vec<f32> = (0..512).map(|n| (n as f32 * 0.1).sin()).collect();
        let original = samples.clone();
        engine.process(&mut AudioBlock::mono(&mut samples));
        for (a, b) in samples.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
