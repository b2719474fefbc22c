//! Distortion engines: clippers, waveshapers, tape saturation and the
//! bit crusher.
//!
//! The shapers are stateless per sample; only the bit crusher and the tape
//! stage carry per-channel state (hold/counter and DC removal).

use crate::block::AudioBlock;
use crate::dsp::filter::{DcBlocker, OnePole};
use crate::dsp::mix::blend_dry_wet;
use crate::dsp::Smoothed;
use crate::engines::{db_to_gain, map_lin, Engine};

#[inline]
fn soft_clip(x: f32, drive: f32) -> f32 {
    (x * drive).tanh()
}

#[inline]
fn hard_clip(x: f32, drive: f32, threshold: f32) -> f32 {
    (x * drive).clamp(-threshold, threshold)
}

#[inline]
fn foldback(x: f32, drive: f32, threshold: f32) -> f32 {
    let mut y = x * drive;
    // Reflect into range; bounded iterations keep worst-case cost fixed.
    for _ in 0..8 {
        if y > threshold {
            y = 2.0 * threshold - y;
        } else if y < -threshold {
            y = -2.0 * threshold - y;
        } else {
            break;
        }
    }
    y.clamp(-threshold, threshold)
}

/// Warm symmetric saturation.
pub struct SoftClip {
    drive: Smoothed,
    output: Smoothed,
    mix: Smoothed,
}

const SOFT_PARAMS: &[&str] = &["Drive", "Output", "Mix"];

impl SoftClip {
    pub fn new() -> Self {
        Self {
            drive: Smoothed::new(1.0),
            output: Smoothed::new(1.0),
            mix: Smoothed::new(1.0),
        }
    }
}

impl Default for SoftClip {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for SoftClip {
    fn name(&self) -> &'static str {
        "Soft Clip"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        SOFT_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.drive.prepare(sample_rate);
        self.output.prepare(sample_rate);
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        self.drive.snap();
        self.output.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.drive.set_target(map_lin(v, 1.0, 12.0));
        }
        if let Some(&v) = params.get(1) {
            self.output.set_target(db_to_gain(map_lin(v, -24.0, 6.0)));
        }
        if let Some(&v) = params.get(2) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        for ch in 0..block.channel_count() {
            let mut drive = self.drive;
            let mut output = self.output;
            let mut mix = self.mix;
            for s in block.channel_mut(ch).iter_mut() {
                let wet = soft_clip(*s, drive.next()) * output.next();
                *s = blend_dry_wet(*s, wet, mix.next());
            }
            if ch + 1 == block.channel_count() {
                self.drive = drive;
                self.output = output;
                self.mix = mix;
            }
        }
    }
}

/// Buzzy clipper with adjustable threshold.
pub struct HardClip {
    drive: Smoothed,
    threshold: Smoothed,
    mix: Smoothed,
}

const HARD_PARAMS: &[&str] = &["Drive", "Threshold", "Mix"];

impl HardClip {
    pub fn new() -> Self {
        Self {
            drive: Smoothed::new(1.0),
            threshold: Smoothed::new(1.0),
            mix: Smoothed::new(1.0),
        }
    }
}

impl Default for HardClip {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for HardClip {
    fn name(&self) -> &'static str {
        "Hard Clip"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        HARD_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.drive.prepare(sample_rate);
        self.threshold.prepare(sample_rate);
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        self.drive.snap();
        self.threshold.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.drive.set_target(map_lin(v, 1.0, 16.0));
        }
        if let Some(&v) = params.get(1) {
            // Threshold floor keeps the divide-free shaper well-behaved.
            self.threshold.set_target(map_lin(v, 0.05, 1.0));
        }
        if let Some(&v) = params.get(2) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        for ch in 0..block.channel_count() {
            let mut drive = self.drive;
            let mut threshold = self.threshold;
            let mut mix = self.mix;
            for s in block.channel_mut(ch).iter_mut() {
                let wet = hard_clip(*s, drive.next(), threshold.next());
                *s = blend_dry_wet(*s, wet, mix.next());
            }
            if ch + 1 == block.channel_count() {
                self.drive = drive;
                self.threshold = threshold;
                self.mix = mix;
            }
        }
    }
}

/// Metallic wavefolding.
pub struct Foldback {
    drive: Smoothed,
    threshold: Smoothed,
    mix: Smoothed,
}

const FOLD_PARAMS: &[&str] = &["Drive", "Threshold", "Mix"];

impl Foldback {
    pub fn new() -> Self {
        Self {
            drive: Smoothed::new(1.0),
            threshold: Smoothed::new(1.0),
            mix: Smoothed::new(1.0),
        }
    }
}

impl Default for Foldback {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Foldback {
    fn name(&self) -> &'static str {
        "Foldback"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        FOLD_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.drive.prepare(sample_rate);
        self.threshold.prepare(sample_rate);
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        self.drive.snap();
        self.threshold.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.drive.set_target(map_lin(v, 1.0, 10.0));
        }
        if let Some(&v) = params.get(1) {
            self.threshold.set_target(map_lin(v, 0.1, 1.0));
        }
        if let Some(&v) = params.get(2) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        for ch in 0..block.channel_count() {
            let mut drive = self.drive;
            let mut threshold = self.threshold;
            let mut mix = self.mix;
            for s in block.channel_mut(ch).iter_mut() {
                let wet = foldback(*s, drive.next(), threshold.next());
                *s = blend_dry_wet(*s, wet, mix.next());
            }
            if ch + 1 == block.channel_count() {
                self.drive = drive;
                self.threshold = threshold;
                self.mix = mix;
            }
        }
    }
}

/// Asymmetric clipper with a tone control after the shaper.
pub struct Overdrive {
    tone_filters: [OnePole; 2],
    dc: [DcBlocker; 2],
    drive: Smoothed,
    output: Smoothed,
    mix: Smoothed,
    tone: f32,
    sample_rate: f32,
}

const DRIVE_PARAMS: &[&str] = &["Drive", "Tone", "Output", "Mix"];

impl Overdrive {
    pub fn new() -> Self {
        Self {
            tone_filters: [OnePole::new(), OnePole::new()],
            dc: [DcBlocker::new(), DcBlocker::new()],
            drive: Smoothed::new(2.0),
            output: Smoothed::new(1.0),
            mix: Smoothed::new(1.0),
            tone: 4_000.0,
            sample_rate: 48_000.0,
        }
    }
}

impl Default for Overdrive {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Overdrive {
    fn name(&self) -> &'static str {
        "Overdrive"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        DRIVE_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        self.drive.prepare(sample_rate);
        self.output.prepare(sample_rate);
        self.mix.prepare(sample_rate);
        for f in &mut self.tone_filters {
            f.set_cutoff(self.tone, sample_rate);
        }
    }

    fn reset(&mut self) {
        for f in &mut self.tone_filters {
            f.reset();
        }
        for d in &mut self.dc {
            d.reset();
        }
        self.drive.snap();
        self.output.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.drive.set_target(map_lin(v, 1.0, 20.0));
        }
        if let Some(&v) = params.get(1) {
            self.tone = crate::engines::map_exp(v, 500.0, 12_000.0);
            for f in &mut self.tone_filters {
                f.set_cutoff(self.tone, self.sample_rate);
            }
        }
        if let Some(&v) = params.get(2) {
            self.output.set_target(db_to_gain(map_lin(v, -24.0, 6.0)));
        }
        if let Some(&v) = params.get(3) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        for ch in 0..block.channel_count() {
            let mut drive = self.drive;
            let mut output = self.output;
            let mut mix = self.mix;
            let tone = &mut self.tone_filters[ch];
            let dc = &mut self.dc[ch];
            for s in block.channel_mut(ch).iter_mut() {
                // Positive half clips sooner than the negative: even
                // harmonics, then the DC blocker removes the offset.
                let d = drive.next();
                let shaped = ((*s + 0.08) * d).tanh() - (0.08 * d).tanh();
                let wet = dc.tick(tone.lowpass(shaped)) * output.next();
                *s = blend_dry_wet(*s, wet, mix.next());
            }
            if ch + 1 == block.channel_count() {
                self.drive = drive;
                self.output = output;
                self.mix = mix;
            }
        }
    }
}

/// Tape-style saturation: biased tanh with DC restoration.
pub struct TapeSaturator {
    dc: [DcBlocker; 2],
    drive: Smoothed,
    bias: Smoothed,
    mix: Smoothed,
}

const TAPE_PARAMS: &[&str] = &["Drive", "Bias", "Mix"];

impl TapeSaturator {
    pub fn new() -> Self {
        Self {
            dc: [DcBlocker::new(), DcBlocker::new()],
            drive: Smoothed::new(1.5),
            bias: Smoothed::new(0.0),
            mix: Smoothed::new(1.0),
        }
    }
}

impl Default for TapeSaturator {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for TapeSaturator {
    fn name(&self) -> &'static str {
        "Tape Saturator"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        TAPE_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.drive.prepare(sample_rate);
        self.bias.prepare(sample_rate);
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        for d in &mut self.dc {
            d.reset();
        }
        self.drive.snap();
        self.bias.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.drive.set_target(map_lin(v, 0.5, 8.0));
        }
        if let Some(&v) = params.get(1) {
            self.bias.set_target(map_lin(v, 0.0, 0.3));
        }
        if let Some(&v) = params.get(2) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        for ch in 0..block.channel_count() {
            let mut drive = self.drive;
            let mut bias = self.bias;
            let mut mix = self.mix;
            let dc = &mut self.dc[ch];
            for s in block.channel_mut(ch).iter_mut() {
                let d = drive.next();
                let b = bias.next();
                let wet = dc.tick(((*s + b) * d).tanh() / d.max(1.0).tanh());
                *s = blend_dry_wet(*s, wet, mix.next());
            }
            if ch + 1 == block.channel_count() {
                self.drive = drive;
                self.bias = bias;
                self.mix = mix;
            }
        }
    }
}

/// Morphs between tanh and cubic-fold transfer curves.
pub struct Waveshaper {
    drive: Smoothed,
    shape: Smoothed,
    mix: Smoothed,
}

const SHAPER_PARAMS: &[&str] = &["Drive", "Shape", "Mix"];

impl Waveshaper {
    pub fn new() -> Self {
        Self {
            drive: Smoothed::new(1.0),
            shape: Smoothed::new(0.0),
            mix: Smoothed::new(1.0),
        }
    }
}

impl Default for Waveshaper {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Waveshaper {
    fn name(&self) -> &'static str {
        "Waveshaper"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        SHAPER_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.drive.prepare(sample_rate);
        self.shape.prepare(sample_rate);
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        self.drive.snap();
        self.shape.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.drive.set_target(map_lin(v, 1.0, 10.0));
        }
        if let Some(&v) = params.get(1) {
            self.shape.set_target(v.clamp(0.0, 1.0));
        }
        if let Some(&v) = params.get(2) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        for ch in 0..block.channel_count() {
            let mut drive = self.drive;
            let mut shape = self.shape;
            let mut mix = self.mix;
            for s in block.channel_mut(ch).iter_mut() {
                let x = *s * drive.next();
                let smooth = x.tanh();
                let folded = (x * std::f32::consts::FRAC_PI_2).sin();
                let wet = smooth + (folded - smooth) * shape.next();
                *s = blend_dry_wet(*s, wet, mix.next());
            }
            if ch + 1 == block.channel_count() {
                self.drive = drive;
                self.shape = shape;
                self.mix = mix;
            }
        }
    }
}

// Bit depth steps selected by the normalized knob, coarsest last.
const BIT_STEPS: [u32; 5] = [24, 12, 8, 4, 1];
const RATE_STEPS: [f32; 5] = [1.0, 2.0, 4.0, 8.0, 16.0];

#[derive(Clone, Copy, Default)]
struct CrushChannel {
    held: f32,
    counter: f32,
}

/// Sample-and-hold plus mid-rise quantization.
///
/// The hold factor is a float accumulator so that smoothed rate changes
/// sweep through fractional values without a step. The mid-rise quantizer
/// never outputs exactly zero, so even one-bit crushing keeps full swing.
pub struct BitCrusher {
    channels: [CrushChannel; 2],
    bits: u32,
    rate: Smoothed,
    mix: Smoothed,
}

const CRUSH_PARAMS: &[&str] = &["Bits", "Downsample", "Mix"];

impl BitCrusher {
    pub fn new() -> Self {
        Self {
            channels: [CrushChannel::default(); 2],
            bits: 24,
            rate: Smoothed::new(1.0),
            mix: Smoothed::new(1.0),
        }
    }

    #[inline]
    fn quantize(x: f32, bits: u32) -> f32 {
        if bits >= 24 {
            return x;
        }
        // Mid-rise: step centers between levels, outputs odd multiples of
        // half a step.
        let step = 2.0f32.powi(1 - bits as i32);
        let x = x.clamp(-1.0, 1.0);
        (step * ((x / step).floor() + 0.5)).clamp(-1.0, 1.0)
    }

    fn pick<T: Copy>(v: f32, steps: &[T; 5]) -> T {
        let idx = ((v.clamp(0.0, 1.0) * 5.0) as usize).min(4);
        steps[idx]
    }
}

impl Default for BitCrusher {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for BitCrusher {
    fn name(&self) -> &'static str {
        "Bit Crusher"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        CRUSH_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.rate.prepare(sample_rate);
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        self.channels = [CrushChannel::default(); 2];
        self.rate.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.bits = Self::pick(v, &BIT_STEPS);
        }
        if let Some(&v) = params.get(1) {
            self.rate.set_target(Self::pick(v, &RATE_STEPS));
        }
        if let Some(&v) = params.get(2) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let bits = self.bits;
        for ch in 0..block.channel_count() {
            let mut rate = self.rate;
            let mut mix = self.mix;
            let state = &mut self.channels[ch];
            for s in block.channel_mut(ch).iter_mut() {
                let factor = rate.next().max(1.0);
                state.counter += 1.0;
                if state.counter >= factor {
                    state.counter -= factor;
                    state.held = Self::quantize(*s, bits);
                }
                *s = blend_dry_wet(*s, state.held, mix.next());
            }
            if ch + 1 == block.channel_count() {
                self.rate = rate;
                self.mix = mix;
            }
        }
    }
}
