//! Modulation engines: chorus, flanger, phaser, tremolo, vibrato, auto-pan,
//! ring modulator, rotary.
//!
//! All of these sweep something with an LFO. Delay-based engines run the
//! right channel's LFO a quarter turn behind the left so stereo input gets
//! width for free; amplitude-based engines state their mono policy inline.

use crate::block::AudioBlock;
use crate::dsp::delay::DelayLine;
use crate::dsp::lfo::{Lfo, LfoShape};
use crate::dsp::mix::blend_dry_wet;
use crate::dsp::Smoothed;
use crate::engines::{map_exp, map_lin, Engine};

fn ms_to_samples(ms: f32, sample_rate: f32) -> f32 {
    ms * sample_rate / 1000.0
}

/// Dual-voice chorus around a 20 ms center delay.
pub struct Chorus {
    delays: [DelayLine; 2],
    lfos: [Lfo; 2],
    rate: f32,
    depth: Smoothed,
    mix: Smoothed,
    sample_rate: f32,
}

const CHORUS_PARAMS: &[&str] = &["Rate", "Depth", "Mix"];

impl Chorus {
    pub fn new() -> Self {
        let mut lfos = [Lfo::sine(), Lfo::sine()];
        lfos[1].set_phase(0.25);
        Self {
            delays: [DelayLine::new(), DelayLine::new()],
            lfos,
            rate: 0.8,
            depth: Smoothed::new(0.5),
            mix: Smoothed::new(0.5),
            sample_rate: 48_000.0,
        }
    }
}

impl Default for Chorus {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Chorus {
    fn name(&self) -> &'static str {
        "Chorus"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        CHORUS_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        let max = ms_to_samples(40.0, sample_rate) as usize + 2;
        for d in &mut self.delays {
            d.resize(max);
        }
        self.depth.prepare(sample_rate);
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        for d in &mut self.delays {
            d.reset();
        }
        self.lfos[0].reset();
        self.lfos[1].reset();
        self.lfos[1].set_phase(0.25);
        self.depth.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.rate = map_exp(v, 0.05, 8.0);
        }
        if let Some(&v) = params.get(1) {
            self.depth.set_target(v.clamp(0.0, 1.0));
        }
        if let Some(&v) = params.get(2) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let center = ms_to_samples(20.0, self.sample_rate);
        let swing = ms_to_samples(8.0, self.sample_rate);
        for ch in 0..block.channel_count() {
            let mut depth = self.depth;
            let mut mix = self.mix;
            let delay = &mut self.delays[ch];
            let lfo = &mut self.lfos[ch];
            for s in block.channel_mut(ch).iter_mut() {
                let sweep = lfo.tick(self.rate, self.sample_rate) * depth.next();
                delay.write_advance(*s);
                let wet = delay.read_frac(center + sweep * swing);
                *s = blend_dry_wet(*s, wet, mix.next());
            }
            if ch + 1 == block.channel_count() {
                self.depth = depth;
                self.mix = mix;
            }
        }
    }
}

/// Short swept delay with feedback for jet-engine combing.
pub struct Flanger {
    delays: [DelayLine; 2],
    lfos: [Lfo; 2],
    rate: f32,
    depth: Smoothed,
    feedback: Smoothed,
    mix: Smoothed,
    sample_rate: f32,
}

const FLANGER_PARAMS: &[&str] = &["Rate", "Depth", "Feedback", "Mix"];

impl Flanger {
    pub fn new() -> Self {
        let mut lfos = [Lfo::sine(), Lfo::sine()];
        lfos[1].set_phase(0.25);
        Self {
            delays: [DelayLine::new(), DelayLine::new()],
            lfos,
            rate: 0.3,
            depth: Smoothed::new(0.7),
            feedback: Smoothed::new(0.4),
            mix: Smoothed::new(0.5),
            sample_rate: 48_000.0,
        }
    }
}

impl Default for Flanger {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Flanger {
    fn name(&self) -> &'static str {
        "Flanger"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        FLANGER_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        let max = ms_to_samples(12.0, sample_rate) as usize + 2;
        for d in &mut self.delays {
            d.resize(max);
        }
        self.depth.prepare(sample_rate);
        self.feedback.prepare(sample_rate);
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        for d in &mut self.delays {
            d.reset();
        }
        self.lfos[0].reset();
        self.lfos[1].reset();
        self.lfos[1].set_phase(0.25);
        self.depth.snap();
        self.feedback.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.rate = map_exp(v, 0.05, 5.0);
        }
        if let Some(&v) = params.get(1) {
            self.depth.set_target(v.clamp(0.0, 1.0));
        }
        if let Some(&v) = params.get(2) {
            self.feedback.set_target(v.clamp(0.0, 1.0) * 0.9);
        }
        if let Some(&v) = params.get(3) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        for ch in 0..block.channel_count() {
            let mut depth = self.depth;
            let mut feedback = self.feedback;
            let mut mix = self.mix;
            let delay = &mut self.delays[ch];
            let lfo = &mut self.lfos[ch];
            for s in block.channel_mut(ch).iter_mut() {
                // Sweep 0.5–6 ms.
                let sweep = 0.5 * (lfo.tick(self.rate, self.sample_rate) + 1.0);
                let time =
                    ms_to_samples(0.5 + 5.5 * sweep * depth.next(), self.sample_rate);
                let wet = delay.read_frac(time);
                delay.write_advance(*s + wet * feedback.next());
                *s = blend_dry_wet(*s, wet, mix.next());
            }
            if ch + 1 == block.channel_count() {
                self.depth = depth;
                self.feedback = feedback;
                self.mix = mix;
            }
        }
    }
}

#[derive(Clone, Copy, Default)]
struct AllpassStage {
    x1: f32,
    y1: f32,
}

impl AllpassStage {
    #[inline]
    fn tick(&mut self, x: f32, a: f32) -> f32 {
        let y = -a * x + self.x1 + a * self.y1;
        self.x1 = x;
        self.y1 = if y.abs() < 1e-18 { 0.0 } else { y };
        y
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

const PHASER_STAGES: usize = 4;

/// Four cascaded first-order allpasses with a swept corner.
pub struct Phaser {
    stages: [[AllpassStage; PHASER_STAGES]; 2],
    lfos: [Lfo; 2],
    last_wet: [f32; 2],
    rate: f32,
    depth: Smoothed,
    feedback: Smoothed,
    mix: Smoothed,
    sample_rate: f32,
}

const PHASER_PARAMS: &[&str] = &["Rate", "Depth", "Feedback", "Mix"];

impl Phaser {
    pub fn new() -> Self {
        let mut lfos = [Lfo::sine(), Lfo::sine()];
        lfos[1].set_phase(0.25);
        Self {
            stages: [[AllpassStage::default(); PHASER_STAGES]; 2],
            lfos,
            last_wet: [0.0; 2],
            rate: 0.5,
            depth: Smoothed::new(0.8),
            feedback: Smoothed::new(0.3),
            mix: Smoothed::new(0.5),
            sample_rate: 48_000.0,
        }
    }
}

impl Default for Phaser {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Phaser {
    fn name(&self) -> &'static str {
        "Phaser"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        PHASER_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        self.depth.prepare(sample_rate);
        self.feedback.prepare(sample_rate);
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        for bank in &mut self.stages {
            for stage in bank {
                stage.reset();
            }
        }
        self.lfos[0].reset();
        self.lfos[1].reset();
        self.lfos[1].set_phase(0.25);
        self.last_wet = [0.0; 2];
        self.depth.snap();
        self.feedback.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.rate = map_exp(v, 0.05, 4.0);
        }
        if let Some(&v) = params.get(1) {
            self.depth.set_target(v.clamp(0.0, 1.0));
        }
        if let Some(&v) = params.get(2) {
            self.feedback.set_target(v.clamp(0.0, 1.0) * 0.85);
        }
        if let Some(&v) = params.get(3) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        for ch in 0..block.channel_count() {
            let mut depth = self.depth;
            let mut feedback = self.feedback;
            let mut mix = self.mix;
            let lfo = &mut self.lfos[ch];
            for s in block.channel_mut(ch).iter_mut() {
                let sweep = lfo.unipolar();
                lfo.tick(self.rate, self.sample_rate);
                // Corner sweeps 200 Hz – 3 kHz.
                let freq = 200.0 * (15.0f32).powf(sweep * depth.next());
                let t = (std::f32::consts::PI * freq / self.sample_rate).tan();
                let a = (t - 1.0) / (t + 1.0);

                let mut y = *s + self.last_wet[ch] * feedback.next();
                for stage in &mut self.stages[ch] {
                    y = stage.tick(y, a);
                }
                self.last_wet[ch] = y;
                *s = blend_dry_wet(*s, y, mix.next());
            }
            if ch + 1 == block.channel_count() {
                self.depth = depth;
                self.feedback = feedback;
                self.mix = mix;
            }
        }
    }
}

/// Amplitude modulation. Depth is the whole story, so there is no separate
/// mix parameter.
pub struct Tremolo {
    lfo: Lfo,
    rate: f32,
    depth: Smoothed,
    sample_rate: f32,
}

const TREMOLO_PARAMS: &[&str] = &["Rate", "Depth", "Shape"];

impl Tremolo {
    pub fn new() -> Self {
        Self {
            lfo: Lfo::sine(),
            rate: 4.0,
            depth: Smoothed::new(0.5),
            sample_rate: 48_000.0,
        }
    }
}

impl Default for Tremolo {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Tremolo {
    fn name(&self) -> &'static str {
        "Tremolo"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        TREMOLO_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        self.depth.prepare(sample_rate);
    }

    fn reset(&mut self) {
        self.lfo.reset();
        self.depth.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.rate = map_exp(v, 0.5, 20.0);
        }
        if let Some(&v) = params.get(1) {
            self.depth.set_target(v.clamp(0.0, 1.0));
        }
        if let Some(&v) = params.get(2) {
            self.lfo.set_shape(match (v.clamp(0.0, 1.0) * 3.0).round() as u32 {
                0 => LfoShape::Sine,
                1 => LfoShape::Triangle,
                2 => LfoShape::Saw,
                _ => LfoShape::Square,
            });
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        // Both channels share one LFO so the image never wobbles.
        let frames = block.frames();
        let (left, mut right) = block.split_mut();
        for i in 0..frames {
            let gain = 1.0 - self.depth.next() * self.lfo.unipolar();
            self.lfo.tick(self.rate, self.sample_rate);
            left[i] *= gain;
            if let Some(r) = right.as_deref_mut() {
                r[i] *= gain;
            }
        }
    }
}

/// Pitch wobble via a modulated short delay. Fully wet by design.
pub struct Vibrato {
    delays: [DelayLine; 2],
    lfo: Lfo,
    rate: f32,
    depth: Smoothed,
    sample_rate: f32,
}

const VIBRATO_PARAMS: &[&str] = &["Rate", "Depth"];

impl Vibrato {
    pub fn new() -> Self {
        Self {
            delays: [DelayLine::new(), DelayLine::new()],
            lfo: Lfo::sine(),
            rate: 5.0,
            depth: Smoothed::new(0.3),
            sample_rate: 48_000.0,
        }
    }
}

impl Default for Vibrato {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Vibrato {
    fn name(&self) -> &'static str {
        "Vibrato"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        VIBRATO_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        let max = ms_to_samples(12.0, sample_rate) as usize + 2;
        for d in &mut self.delays {
            d.resize(max);
        }
        self.depth.prepare(sample_rate);
    }

    fn reset(&mut self) {
        for d in &mut self.delays {
            d.reset();
        }
        self.lfo.reset();
        self.depth.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.rate = map_exp(v, 0.5, 12.0);
        }
        if let Some(&v) = params.get(1) {
            self.depth.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn latency_samples(&self) -> usize {
        ms_to_samples(5.0, self.sample_rate) as usize
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let center = ms_to_samples(5.0, self.sample_rate);
        let swing = ms_to_samples(4.0, self.sample_rate);
        let frames = block.frames();
        let (left, mut right) = block.split_mut();
        for i in 0..frames {
            // One LFO for both channels keeps left and right in tune.
            let sweep = self.lfo.tick(self.rate, self.sample_rate) * self.depth.next();
            let time = center + sweep * swing;

            self.delays[0].write_advance(left[i]);
            left[i] = self.delays[0].read_frac(time);
            if let Some(r) = right.as_deref_mut() {
                self.delays[1].write_advance(r[i]);
                r[i] = self.delays[1].read_frac(time);
            }
        }
    }
}

/// LFO-driven constant-power panner. On mono input this degenerates to
/// tremolo at half depth.
pub struct AutoPan {
    lfo: Lfo,
    rate: f32,
    depth: Smoothed,
    sample_rate: f32,
}

const AUTOPAN_PARAMS: &[&str] = &["Rate", "Depth"];

impl AutoPan {
    pub fn new() -> Self {
        Self {
            lfo: Lfo::sine(),
            rate: 1.0,
            depth: Smoothed::new(0.5),
            sample_rate: 48_000.0,
        }
    }
}

impl Default for AutoPan {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for AutoPan {
    fn name(&self) -> &'static str {
        "Auto Pan"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        AUTOPAN_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        self.depth.prepare(sample_rate);
    }

    fn reset(&mut self) {
        self.lfo.reset();
        self.depth.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.rate = map_exp(v, 0.05, 10.0);
        }
        if let Some(&v) = params.get(1) {
            self.depth.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let frames = block.frames();
        let (left, mut right) = block.split_mut();
        for i in 0..frames {
            let depth = self.depth.next();
            let pan = self.lfo.tick(self.rate, self.sample_rate) * depth;
            match right.as_deref_mut() {
                Some(r) => {
                    let angle = (pan + 1.0) * std::f32::consts::FRAC_PI_4;
                    left[i] *= angle.cos() * std::f32::consts::SQRT_2;
                    r[i] *= angle.sin() * std::f32::consts::SQRT_2;
                }
                None => {
                    left[i] *= 1.0 - 0.5 * depth * (pan + 1.0) * 0.5;
                }
            }
        }
    }
}

/// Classic carrier multiply.
pub struct RingMod {
    phase: f32,
    frequency: Smoothed,
    mix: Smoothed,
    sample_rate: f32,
}

const RING_PARAMS: &[&str] = &["Frequency", "Mix"];

impl RingMod {
    pub fn new() -> Self {
        Self {
            phase: 0.0,
            frequency: Smoothed::new(440.0),
            mix: Smoothed::new(1.0),
            sample_rate: 48_000.0,
        }
    }
}

impl Default for RingMod {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for RingMod {
    fn name(&self) -> &'static str {
        "Ring Mod"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        RING_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        self.frequency.prepare(sample_rate);
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        self.phase = 0.0;
        self.frequency.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.frequency.set_target(map_exp(v, 20.0, 4_000.0));
        }
        if let Some(&v) = params.get(1) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let frames = block.frames();
        let (left, mut right) = block.split_mut();
        for i in 0..frames {
            let carrier = (std::f32::consts::TAU * self.phase).sin();
            self.phase += self.frequency.next() / self.sample_rate;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
            let mix = self.mix.next();
            left[i] = blend_dry_wet(left[i], left[i] * carrier, mix);
            if let Some(r) = right.as_deref_mut() {
                r[i] = blend_dry_wet(r[i], r[i] * carrier, mix);
            }
        }
    }
}

/// Rotary-speaker flavor: coupled tremolo, vibrato and pan from one rotor
/// whose speed ramps between slow and fast.
pub struct Rotary {
    delays: [DelayLine; 2],
    rotor: Lfo,
    speed: Smoothed,
    depth: Smoothed,
    mix: Smoothed,
    sample_rate: f32,
}

const ROTARY_PARAMS: &[&str] = &["Speed", "Depth", "Mix"];

impl Rotary {
    pub fn new() -> Self {
        Self {
            delays: [DelayLine::new(), DelayLine::new()],
            rotor: Lfo::sine(),
            speed: Smoothed::new(1.0),
            depth: Smoothed::new(0.6),
            mix: Smoothed::new(1.0),
            sample_rate: 48_000.0,
        }
    }
}

impl Default for Rotary {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Rotary {
    fn name(&self) -> &'static str {
        "Rotary"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        ROTARY_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        let max = ms_to_samples(6.0, sample_rate) as usize + 2;
        for d in &mut self.delays {
            d.resize(max);
        }
        // Rotor speed ramps like a real motor: slow spin-up and spin-down.
        self.speed.prepare_tau(sample_rate, 0.8);
        self.depth.prepare(sample_rate);
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        for d in &mut self.delays {
            d.reset();
        }
        self.rotor.reset();
        self.speed.snap();
        self.depth.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.speed.set_target(map_lin(v, 0.7, 7.0));
        }
        if let Some(&v) = params.get(1) {
            self.depth.set_target(v.clamp(0.0, 1.0));
        }
        if let Some(&v) = params.get(2) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let center = ms_to_samples(2.0, self.sample_rate);
        let frames = block.frames();
        let (left, mut right) = block.split_mut();
        for i in 0..frames {
            let depth = self.depth.next();
            let angle = self.rotor.tick(self.speed.next(), self.sample_rate);
            let tremolo = 1.0 - 0.35 * depth * (angle + 1.0) * 0.5;
            let doppler = center * (1.0 + 0.8 * depth * angle);
            let mix = self.mix.next();

            self.delays[0].write_advance(left[i]);
            let wet_l = self.delays[0].read_frac(doppler) * tremolo;
            left[i] = blend_dry_wet(left[i], wet_l, mix);

            if let Some(r) = right.as_deref_mut() {
                self.delays[1].write_advance(r[i]);
                // Opposite side of the cabinet: inverted doppler swing.
                let wet_r = self.delays[1]
                    .read_frac(center * (1.0 - 0.8 * depth * angle))
                    * (2.0 - tremolo).min(1.0);
                r[i] = blend_dry_wet(r[i], wet_r, mix);
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

    #[test]
    fn test_tremolo_modulates_amplitude() {
        let mut engine = Tremolo::new();
        engine.prepare(48_000.0, 512);
        engine.update_params(&[0.8, 1.0, 0.0]);
        engine.reset();

        let mut samples = vec![1.0f32; 48_000];
        engine.process(&mut AudioBlock::mono(&mut samples));

        let min = samples.iter().fold(f32::MAX, |a, &b| a.min(b));
        let max = samples.iter().fold(f32::MIN, |a, &b| a.max(b));
        assert!(max > 0.9);
        assert!(min < 0.1, "tremolo floor too high: {min}");
    }

    #[test]
    fn test_chorus_dry_mix_identity() {
        let mut engine = Chorus::new();
        engine.prepare(48_000.0, 512);
        engine.update_params(&[0.5, 0.5, 0.0]);
        engine.reset();

        let mut samples = sine(440.0, 1_024);
        let original = samples.clone();
        engine.process(&mut AudioBlock::mono(&mut samples));
        for (a, b) in samples.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_phaser_stays_finite_with_feedback() {
        let mut engine = Phaser::new();
        engine.prepare(48_000.0, 512);
        engine.update_params(&[0.5, 1.0, 1.0, 1.0]);
        engine.reset();

        let mut samples = sine(440.0, 48_000);
        engine.process(&mut AudioBlock::mono(&mut samples));
        assert!(samples.iter().all(|s| s.is_finite() && s.abs() < 10.0));
    }

    #[test]
    fn test_ring_mod_produces_sidebands() {
        let mut engine = RingMod::new();
        engine.prepare(48_000.0, 512);
        engine.update_params(&[0.5, 1.0]);
        engine.reset();

        let mut samples = sine(440.0, 4_096);
        let original = samples.clone();
        engine.process(&mut AudioBlock::mono(&mut samples));
        // The carrier multiply must change the waveform.
        let diff: f32 = samples
            .iter()
            .zip(original.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        assert!(diff > 1.0);
    }
}
