//! Spatial engines: widener, Haas delay, mid/side balance, static panner.
//!
//! All of these are stereo-coupled by nature. On mono input the widener,
//! Haas and panner pass the signal through untouched; mid/side degenerates
//! to its mid gain.

use crate::block::AudioBlock;
use crate::dsp::delay::DelayLine;
use crate::dsp::mix::blend_dry_wet;
use crate::dsp::Smoothed;
use crate::engines::{db_to_gain, map_lin, Engine};

/// Mid/side width scaling. Width 0 collapses to mono, 1 is untouched,
/// 2 doubles the side signal.
pub struct StereoWidener {
    width: Smoothed,
}

const WIDEN_PARAMS: &[&str] = &["Width"];

impl StereoWidener {
    pub fn new() -> Self {
        Self {
            width: Smoothed::new(1.0),
        }
    }
}

impl Default for StereoWidener {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for StereoWidener {
    fn name(&self) -> &'static str {
        "Stereo Widener"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        WIDEN_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.width.prepare(sample_rate);
    }

    fn reset(&mut self) {
        self.width.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.width.set_target(map_lin(v, 0.0, 2.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let (left, right) = block.split_mut();
        if let Some(right) = right {
            for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                let width = self.width.next();
                let mid = 0.5 * (*l + *r);
                let side = 0.5 * (*l - *r) * width;
                *l = mid + side;
                *r = mid - side;
            }
        }
    }
}

/// Precedence-effect widener: one side delayed a few milliseconds.
pub struct HaasDelay {
    delay: DelayLine,
    delay_samples: Smoothed,
    right_side: bool,
    mix: Smoothed,
    sample_rate: f32,
}

const HAAS_PARAMS: &[&str] = &["Delay", "Side", "Mix"];

impl HaasDelay {
    pub fn new() -> Self {
        Self {
            delay: DelayLine::new(),
            delay_samples: Smoothed::new(480.0),
            right_side: true,
            mix: Smoothed::new(1.0),
            sample_rate: 48_000.0,
        }
    }
}

impl Default for HaasDelay {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for HaasDelay {
    fn name(&self) -> &'static str {
        "Haas Delay"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        HAAS_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        self.delay.resize((0.040 * sample_rate) as usize + 2);
        self.delay_samples.prepare_tau(sample_rate, 0.050);
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        self.delay.reset();
        self.delay_samples.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.delay_samples
                .set_target(map_lin(v, 0.001, 0.035) * self.sample_rate);
        }
        if let Some(&v) = params.get(1) {
            self.right_side = v >= 0.5;
        }
        if let Some(&v) = params.get(2) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let (left, right) = block.split_mut();
        if let Some(right) = right {
            for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                let t = self.delay_samples.next();
                let mix = self.mix.next();
                let target = if self.right_side { &mut *r } else { &mut *l };
                self.delay.write_advance(*target);
                let delayed = self.delay.read_frac(t);
                *target = blend_dry_wet(*target, delayed, mix);
            }
        }
    }
}

/// Independent mid and side gains.
pub struct MidSide {
    mid: Smoothed,
    side: Smoothed,
}

const MIDSIDE_PARAMS: &[&str] = &["Mid", "Side"];

impl MidSide {
    pub fn new() -> Self {
        Self {
            mid: Smoothed::new(1.0),
            side: Smoothed::new(1.0),
        }
    }
}

impl Default for MidSide {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MidSide {
    fn name(&self) -> &'static str {
        "Mid Side"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        MIDSIDE_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.mid.prepare(sample_rate);
        self.side.prepare(sample_rate);
    }

    fn reset(&mut self) {
        self.mid.snap();
        self.side.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.mid.set_target(db_to_gain(map_lin(v, -12.0, 12.0)));
        }
        if let Some(&v) = params.get(1) {
            self.side.set_target(db_to_gain(map_lin(v, -12.0, 12.0)));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let (left, right) = block.split_mut();
        match right {
            Some(right) => {
                for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                    let mid_gain = self.mid.next();
                    let side_gain = self.side.next();
                    let mid = 0.5 * (*l + *r) * mid_gain;
                    let side = 0.5 * (*l - *r) * side_gain;
                    *l = mid + side;
                    *r = mid - side;
                }
            }
            None => {
                for s in left.iter_mut() {
                    *s *= self.mid.next();
                    self.side.next();
                }
            }
        }
    }
}

/// Static constant-power pan. Mono input has no image to move; it passes
/// through untouched.
pub struct Panner {
    pan: Smoothed,
}

const PAN_PARAMS: &[&str] = &["Pan"];

impl Panner {
    pub fn new() -> Self {
        Self {
            pan: Smoothed::new(0.0),
        }
    }
}

impl Default for Panner {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Panner {
    fn name(&self) -> &'static str {
        "Panner"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        PAN_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.pan.prepare(sample_rate);
    }

    fn reset(&mut self) {
        self.pan.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.pan.set_target(map_lin(v, -1.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let (left, right) = block.split_mut();
        if let Some(right) = right {
            for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                let pan = self.pan.next();
                let angle = (pan + 1.0) * std::f32::consts::FRAC_PI_4;
                *l *= angle.cos() * std::f32::consts::SQRT_2;
                *r *= angle.sin() * std::f32::consts::SQRT_2;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widener_zero_collapses_to_mono() {
        let mut engine = StereoWidener::new();
        engine.prepare(48_000.0, 512);
        engine.update_params(&[0.0]);
        engine.reset();

        let mut left = vec![1.0f32; 64];
        let mut right = vec![-1.0f32; 64];
        engine.process(&mut AudioBlock::stereo(&mut left, &mut right));
        for (l, r) in left.iter().zip(right.iter()) {
            assert!((l - r).abs() < 1e-6);
        }
    }

    #[test]
    fn test_widener_unity_is_identity() {
        let mut engine = StereoWidener::new();
        engine.prepare(48_000.0, 512);
        engine.update_params(&[0.5]);
        engine.reset();

        let mut left = vec![0.7f32; 64];
        let mut right = vec![-0.3f32; 64];
        engine.process(&mut AudioBlock::stereo(&mut left, &mut right));
        for l in &left {
            assert!((l - 0.7).abs() < 1e-5);
        }
        for r in &right {
            assert!((r + 0.3).abs() < 1e-5);
        }
    }

    #[test]
    fn test_haas_delays_one_side() {
        let mut engine = HaasDelay::new();
        engine.prepare(48_000.0, 512);
        engine.update_params(&[0.5, 1.0, 1.0]);
        engine.reset();

        let mut left = vec![0.0f32; 2_048];
        let mut right = vec![0.0f32; 2_048];
        left[0] = 1.0;
        right[0] = 1.0;
        engine.process(&mut AudioBlock::stereo(&mut left, &mut right));

        assert!((left[0] - 1.0).abs() < 1e-6, "left must be untouched");
        assert!(right[0].abs() < 1e-3, "right must be delayed away");
        assert!(right.iter().any(|s| s.abs() > 0.5), "delayed copy missing");
    }

    #[test]
    fn test_panner_hard_left() {
        let mut engine = Panner::new();
        engine.prepare(48_000.0, 512);
        engine.update_params(&[0.0]);
        engine.reset();

        let mut left = vec![0.5f32; 64];
        let mut right = vec![0.5f32; 64];
        engine.process(&mut AudioBlock::stereo(&mut left, &mut right));
        assert!(left[63] > 0.6, "left should gain");
        assert!(right[63].abs() < 1e-3, "right should vanish");
    }
}
