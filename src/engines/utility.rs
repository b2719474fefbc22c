//! Utility engines: pass-through, gain/pan, DC removal, mono fold-down,
//! polarity flip.

use crate::block::AudioBlock;
use crate::dsp::filter::DcBlocker;
use crate::dsp::Smoothed;
use crate::engines::{db_to_gain, map_lin, Engine};

/// The identity engine behind every empty slot (id 0). Allocation-free,
/// zero latency, touches nothing.
pub struct Passthrough;

impl Engine for Passthrough {
    fn name(&self) -> &'static str {
        "None"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &[]
    }

    fn prepare(&mut self, _sample_rate: f32, _max_frames: usize) {}

    fn reset(&mut self) {}

    fn update_params(&mut self, _params: &[f32]) {}

    fn process(&mut self, _block: &mut AudioBlock) {}
}

/// Gain and constant-power pan. Mono input ignores pan.
pub struct Gain {
    gain: Smoothed,
    pan: Smoothed,
}

const GAIN_PARAMS: &[&str] = &["Gain", "Pan"];

impl Gain {
    pub fn new() -> Self {
        Self {
            gain: Smoothed::new(1.0),
            pan: Smoothed::new(0.0),
        }
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Gain {
    fn name(&self) -> &'static str {
        "Gain"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        GAIN_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.gain.prepare(sample_rate);
        self.pan.prepare(sample_rate);
    }

    fn reset(&mut self) {
        self.gain.snap();
        self.pan.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            // 0.5 is unity; edges are -24 dB and +24 dB.
            self.gain.set_target(db_to_gain(map_lin(v, -24.0, 24.0)));
        }
        if let Some(&v) = params.get(1) {
            self.pan.set_target(map_lin(v, -1.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let (left, right) = block.split_mut();
        match right {
            Some(right) => {
                for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                    let g = self.gain.next();
                    let pan = self.pan.next();
                    // Constant-power law: -3 dB in the center.
                    let angle = (pan + 1.0) * std::f32::consts::FRAC_PI_4;
                    *l *= g * angle.cos() * std::f32::consts::SQRT_2;
                    *r *= g * angle.sin() * std::f32::consts::SQRT_2;
                }
            }
            None => {
                for s in left.iter_mut() {
                    let g = self.gain.next();
                    self.pan.next();
                    *s *= g;
                }
            }
        }
    }
}

/// Removes DC offset with a pole just below the cutoff knob.
pub struct DcBlock {
    filters: [DcBlocker; 2],
    cutoff: f32,
    sample_rate: f32,
}

const DC_PARAMS: &[&str] = &["Cutoff"];

impl DcBlock {
    pub fn new() -> Self {
        Self {
            filters: [DcBlocker::new(), DcBlocker::new()],
            cutoff: 20.0,
            sample_rate: 48_000.0,
        }
    }
}

impl Default for DcBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for DcBlock {
    fn name(&self) -> &'static str {
        "DC Blocker"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        DC_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        for f in &mut self.filters {
            f.set_cutoff(self.cutoff, sample_rate);
        }
    }

    fn reset(&mut self) {
        for f in &mut self.filters {
            f.reset();
        }
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.cutoff = map_lin(v, 5.0, 120.0);
            for f in &mut self.filters {
                f.set_cutoff(self.cutoff, self.sample_rate);
            }
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        for ch in 0..block.channel_count() {
            let filter = &mut self.filters[ch];
            for s in block.channel_mut(ch).iter_mut() {
                *s = filter.tick(*s);
            }
        }
    }
}

/// Blends a stereo signal toward its mono sum. Mono input passes untouched.
pub struct MonoMaker {
    amount: Smoothed,
}

const MONO_PARAMS: &[&str] = &["Amount"];

impl MonoMaker {
    pub fn new() -> Self {
        Self {
            amount: Smoothed::new(0.0),
        }
    }
}

impl Default for MonoMaker {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MonoMaker {
    fn name(&self) -> &'static str {
        "Mono Maker"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        MONO_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.amount.prepare(sample_rate);
    }

    fn reset(&mut self) {
        self.amount.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.amount.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let (left, right) = block.split_mut();
        if let Some(right) = right {
            for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                let amount = self.amount.next();
                let mid = 0.5 * (*l + *r);
                *l += (mid - *l) * amount;
                *r += (mid - *r) * amount;
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum InvertMode {
    Left,
    Right,
    Both,
}

/// Polarity flip for one or both channels. Mono input flips on Left/Both.
pub struct PhaseInvert {
    mode: InvertMode,
}

const INVERT_PARAMS: &[&str] = &["Channel"];

impl PhaseInvert {
    pub fn new() -> Self {
        Self {
            mode: InvertMode::Both,
        }
    }
}

impl Default for PhaseInvert {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for PhaseInvert {
    fn name(&self) -> &'static str {
        "Phase Invert"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        INVERT_PARAMS
    }

    fn prepare(&mut self, _sample_rate: f32, _max_frames: usize) {}

    fn reset(&mut self) {}

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            // Discrete selector: no smoothing, takes effect at block rate.
            self.mode = match (v.clamp(0.0, 1.0) * 2.0).round() as u32 {
                0 => InvertMode::Left,
                1 => InvertMode::Right,
                _ => InvertMode::Both,
            };
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let (left, right) = block.split_mut();
        let flip_left = self.mode != InvertMode::Right;
        let flip_right = self.mode != InvertMode::Left;

        if flip_left {
            for s in left.iter_mut() {
                *s = -*s;
            }
        }
        if let Some(right) = right {
            if flip_right {
                for s in right.iter_mut() {
                    *s = -*s;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_is_identity() {
        let mut engine = Passthrough;
        engine.prepare(48_000.0, 512);
        let mut samples = vec![0.1, -0.2, 0.3];
        let original = samples.clone();
        engine.process(&mut AudioBlock::mono(&mut samples));
        assert_eq!(samples, original);
    }

    #[test]
    fn test_gain_unity_at_center() {
        let mut engine = Gain::new();
        engine.prepare(48_000.0, 512);
        engine.update_params(&[0.5]);
        engine.reset();

        let mut samples = vec![0.5f32; 64];
        engine.process(&mut AudioBlock::mono(&mut samples));
        for s in &samples {
            assert!((s - 0.5).abs() < 1e-4);
        }
    }

    #[test]
    fn test_mono_maker_full_collapse() {
        let mut engine = MonoMaker::new();
        engine.prepare(48_000.0, 512);
        engine.update_params(&[1.0]);
        engine.reset();

        let mut left = vec![1.0f32; 32];
        let mut right = vec![-1.0f32; 32];
        engine.process(&mut AudioBlock::stereo(&mut left, &mut right));
        for (l, r) in left.iter().zip(right.iter()) {
            assert!(l.abs() < 1e-6);
            assert!(r.abs() < 1e-6);
        }
    }

    #[test]
    fn test_phase_invert_both() {
        let mut engine = PhaseInvert::new();
        engine.update_params(&[1.0]);
        let mut samples = vec![0.5, -0.25];
        engine.process(&mut AudioBlock::mono(&mut samples));
        assert_eq!(samples, vec![-0.5, 0.25]);
    }
}
