//! Dynamics engines: compressor, limiter, gate, expander, transient shaper.
//!
//! All gain computers run in the dB domain off a rectified envelope
//! follower. The limiter and gate link channels on the per-sample maximum
//! so the stereo image stays put; the compressor, expander and transient
//! shaper track each channel independently.

use crate::block::AudioBlock;
use crate::dsp::env_follower::EnvFollower;
use crate::dsp::mix::blend_dry_wet;
use crate::dsp::Smoothed;
use crate::engines::{db_to_gain, map_exp, map_lin, Engine};

const SILENCE_DB: f32 = -90.0;

#[inline]
fn gain_to_db(gain: f32) -> f32 {
    if gain > 1e-5 {
        20.0 * gain.log10()
    } else {
        SILENCE_DB
    }
}

/// Feed-forward compressor with soft makeup and dry/wet blend.
pub struct Compressor {
    envs: [EnvFollower; 2],
    threshold_db: f32,
    ratio: f32,
    attack: f32,
    release: f32,
    makeup: Smoothed,
    mix: Smoothed,
    sample_rate: f32,
}

const COMP_PARAMS: &[&str] = &["Threshold", "Ratio", "Attack", "Release", "Makeup", "Mix"];

impl Compressor {
    pub fn new() -> Self {
        Self {
            envs: [EnvFollower::new(), EnvFollower::new()],
            threshold_db: -18.0,
            ratio: 4.0,
            attack: 0.005,
            release: 0.100,
            makeup: Smoothed::new(1.0),
            mix: Smoothed::new(1.0),
            sample_rate: 48_000.0,
        }
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Compressor {
    fn name(&self) -> &'static str {
        "Compressor"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        COMP_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        self.makeup.prepare(sample_rate);
        self.mix.prepare(sample_rate);
        for env in &mut self.envs {
            env.set_times(self.attack, self.release, sample_rate);
        }
    }

    fn reset(&mut self) {
        for env in &mut self.envs {
            env.reset();
        }
        self.makeup.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.threshold_db = map_lin(v, -60.0, 0.0);
        }
        if let Some(&v) = params.get(1) {
            self.ratio = map_lin(v, 1.0, 20.0);
        }
        if let Some(&v) = params.get(2) {
            self.attack = map_exp(v, 0.0001, 0.100);
        }
        if let Some(&v) = params.get(3) {
            self.release = map_exp(v, 0.010, 1.0);
        }
        if let Some(&v) = params.get(4) {
            self.makeup.set_target(db_to_gain(map_lin(v, 0.0, 24.0)));
        }
        if let Some(&v) = params.get(5) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
        for env in &mut self.envs {
            env.set_times(self.attack, self.release, self.sample_rate);
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let inv_ratio = 1.0 - 1.0 / self.ratio.max(1.0);
        for ch in 0..block.channel_count() {
            let env = &mut self.envs[ch];
            // Each channel re-reads the same smoother targets; restart the
            // trajectories so both channels hear identical values.
            let mut makeup = self.makeup;
            let mut mix = self.mix;
            for s in block.channel_mut(ch).iter_mut() {
                let level_db = gain_to_db(env.tick(*s));
                let over = level_db - self.threshold_db;
                let gr_db = if over > 0.0 { over * inv_ratio } else { 0.0 };
                let wet = *s * db_to_gain(-gr_db) * makeup.next();
                *s = blend_dry_wet(*s, wet, mix.next());
            }
            if ch + 1 == block.channel_count() {
                self.makeup = makeup;
                self.mix = mix;
            }
        }
    }
}

/// Hard ceiling limiter, stereo-linked.
pub struct Limiter {
    env: EnvFollower,
    ceiling: f32,
    release: f32,
    sample_rate: f32,
}

const LIMIT_PARAMS: &[&str] = &["Ceiling", "Release"];

impl Limiter {
    pub fn new() -> Self {
        Self {
            env: EnvFollower::new(),
            ceiling: 1.0,
            release: 0.050,
            sample_rate: 48_000.0,
        }
    }
}

impl Default for Limiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Limiter {
    fn name(&self) -> &'static str {
        "Limiter"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        LIMIT_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        self.env.set_times(0.0, self.release, sample_rate);
    }

    fn reset(&mut self) {
        self.env.reset();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.ceiling = db_to_gain(map_lin(v, -24.0, 0.0));
        }
        if let Some(&v) = params.get(1) {
            self.release = map_exp(v, 0.010, 0.500);
            self.env.set_times(0.0, self.release, self.sample_rate);
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
            let env = self.env.tick(peak);
            let gain = if env > self.ceiling {
                self.ceiling / env
            } else {
                1.0
            };
            left[i] *= gain;
            if let Some(r) = right.as_deref_mut() {
                r[i] *= gain;
            }
        }
    }
}

/// Downward noise gate, stereo-linked, with attack/release gate-gain slew.
pub struct NoiseGate {
    env: EnvFollower,
    gate_gain: f32,
    threshold: f32,
    attack_coeff: f32,
    release_coeff: f32,
    sample_rate: f32,
}

const GATE_PARAMS: &[&str] = &["Threshold", "Attack", "Release"];

impl NoiseGate {
    pub fn new() -> Self {
        Self {
            env: EnvFollower::new(),
            gate_gain: 0.0,
            threshold: db_to_gain(-50.0),
            attack_coeff: 1.0,
            release_coeff: 1.0,
            sample_rate: 48_000.0,
        }
    }

    fn set_slews(&mut self, attack: f32, release: f32) {
        let coeff = |t: f32| {
            if t <= 0.0 {
                1.0
            } else {
                1.0 - (-1.0 / (t * self.sample_rate)).exp()
            }
        };
        self.attack_coeff = coeff(attack);
        self.release_coeff = coeff(release);
    }
}

impl Default for NoiseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for NoiseGate {
    fn name(&self) -> &'static str {
        "Noise Gate"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        GATE_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        self.env.set_times(0.0005, 0.002, sample_rate);
        self.set_slews(0.002, 0.080);
    }

    fn reset(&mut self) {
        self.env.reset();
        self.gate_gain = 0.0;
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.threshold = db_to_gain(map_lin(v, -80.0, -10.0));
        }
        let attack = params.get(1).map(|&v| map_exp(v, 0.0002, 0.050));
        let release = params.get(2).map(|&v| map_exp(v, 0.010, 1.0));
        if attack.is_some() || release.is_some() {
            self.set_slews(attack.unwrap_or(0.002), release.unwrap_or(0.080));
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
            let open = self.env.tick(peak) > self.threshold;
            let (target, coeff) = if open {
                (1.0, self.attack_coeff)
            } else {
                (0.0, self.release_coeff)
            };
            self.gate_gain += coeff * (target - self.gate_gain);
            left[i] *= self.gate_gain;
            if let Some(r) = right.as_deref_mut() {
                r[i] *= self.gate_gain;
            }
        }
    }
}

/// Downward expander: attenuates below the threshold by (ratio − 1) dB per
/// dB. Per-channel envelopes.
pub struct Expander {
    envs: [EnvFollower; 2],
    threshold_db: f32,
    ratio: f32,
    release: f32,
    sample_rate: f32,
}

const EXPAND_PARAMS: &[&str] = &["Threshold", "Ratio", "Release"];

impl Expander {
    pub fn new() -> Self {
        Self {
            envs: [EnvFollower::new(), EnvFollower::new()],
            threshold_db: -40.0,
            ratio: 2.0,
            release: 0.120,
            sample_rate: 48_000.0,
        }
    }
}

impl Default for Expander {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Expander {
    fn name(&self) -> &'static str {
        "Expander"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        EXPAND_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        for env in &mut self.envs {
            env.set_times(0.001, self.release, sample_rate);
        }
    }

    fn reset(&mut self) {
        for env in &mut self.envs {
            env.reset();
        }
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.threshold_db = map_lin(v, -80.0, -10.0);
        }
        if let Some(&v) = params.get(1) {
            self.ratio = map_lin(v, 1.0, 8.0);
        }
        if let Some(&v) = params.get(2) {
            self.release = map_exp(v, 0.020, 1.0);
            for env in &mut self.envs {
                env.set_times(0.001, self.release, self.sample_rate);
            }
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let slope = self.ratio.max(1.0) - 1.0;
        for ch in 0..block.channel_count() {
            let env = &mut self.envs[ch];
            for s in block.channel_mut(ch).iter_mut() {
                let level_db = gain_to_db(env.tick(*s));
                let under = self.threshold_db - level_db;
                let gr_db = if under > 0.0 {
                    (under * slope).min(60.0)
                } else {
                    0.0
                };
                *s *= db_to_gain(-gr_db);
            }
        }
    }
}

/// Splits level into onset and tail portions via a fast/slow envelope pair
/// and gains each independently.
pub struct TransientShaper {
    fast: [EnvFollower; 2],
    slow: [EnvFollower; 2],
    attack_db: f32,
    sustain_db: f32,
}

const TRANSIENT_PARAMS: &[&str] = &["Attack", "Sustain"];

impl TransientShaper {
    pub fn new() -> Self {
        Self {
            fast: [EnvFollower::new(), EnvFollower::new()],
            slow: [EnvFollower::new(), EnvFollower::new()],
            attack_db: 0.0,
            sustain_db: 0.0,
        }
    }
}

impl Default for TransientShaper {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for TransientShaper {
    fn name(&self) -> &'static str {
        "Transient Shaper"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        TRANSIENT_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        for env in &mut self.fast {
            env.set_times(0.0005, 0.020, sample_rate);
        }
        for env in &mut self.slow {
            env.set_times(0.020, 0.200, sample_rate);
        }
    }

    fn reset(&mut self) {
        for env in self.fast.iter_mut().chain(self.slow.iter_mut()) {
            env.reset();
        }
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.attack_db = map_lin(v, -12.0, 12.0);
        }
        if let Some(&v) = params.get(1) {
            self.sustain_db = map_lin(v, -12.0, 12.0);
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        for ch in 0..block.channel_count() {
            let fast = &mut self.fast[ch];
            let slow = &mut self.slow[ch];
            for s in block.channel_mut(ch).iter_mut() {
                let f = fast.tick(*s);
                let sl = slow.tick(*s);
                // Onset measure in [0,1]: how far the fast envelope leads.
                let onset = ((f - sl) / sl.max(1e-4)).clamp(0.0, 1.0);
                let db = self.attack_db * onset + self.sustain_db * (1.0 - onset);
                *s *= db_to_gain(db);
            }
        }
    }
}
