//! Delay engines: digital, ping-pong, tape, multi-tap, reverse, modulated.
//!
//! Delay times are smoothed with a long time constant, so dragging the time
//! knob bends pitch like a tape machine instead of clicking. Feedback paths
//! clamp at 0.95 to stay bounded.

use crate::block::AudioBlock;
use crate::dsp::delay::DelayLine;
use crate::dsp::filter::OnePole;
use crate::dsp::lfo::Lfo;
use crate::dsp::mix::blend_dry_wet;
use crate::dsp::Smoothed;
use crate::engines::{map_exp, Engine};

const MAX_DELAY_SECONDS: f32 = 2.0;
const TIME_SMOOTH_TAU: f32 = 0.080;

fn time_samples(v: f32, sample_rate: f32) -> f32 {
    map_exp(v, 0.010, MAX_DELAY_SECONDS) * sample_rate
}

/// Plain feedback delay, channels independent.
pub struct DigitalDelay {
    delays: [DelayLine; 2],
    time: Smoothed,
    feedback: Smoothed,
    mix: Smoothed,
    sample_rate: f32,
}

const DELAY_PARAMS: &[&str] = &["Time", "Feedback", "Mix"];

impl DigitalDelay {
    pub fn new() -> Self {
        Self {
            delays: [DelayLine::new(), DelayLine::new()],
            time: Smoothed::new(0.25 * 48_000.0),
            feedback: Smoothed::new(0.4),
            mix: Smoothed::new(0.5),
            sample_rate: 48_000.0,
        }
    }
}

impl Default for DigitalDelay {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for DigitalDelay {
    fn name(&self) -> &'static str {
        "Digital Delay"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        DELAY_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        let max = (MAX_DELAY_SECONDS * sample_rate) as usize + 2;
        for d in &mut self.delays {
            d.resize(max);
        }
        self.time.prepare_tau(sample_rate, TIME_SMOOTH_TAU);
        self.feedback.prepare(sample_rate);
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        for d in &mut self.delays {
            d.reset();
        }
        self.time.snap();
        self.feedback.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.time.set_target(time_samples(v, self.sample_rate));
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
            let mut time = self.time;
            let mut feedback = self.feedback;
            let mut mix = self.mix;
            let delay = &mut self.delays[ch];
            for s in block.channel_mut(ch).iter_mut() {
                let wet = delay.read_frac(time.next());
                delay.write_advance(*s + wet * feedback.next());
                *s = blend_dry_wet(*s, wet, mix.next());
            }
            if ch + 1 == block.channel_count() {
                self.time = time;
                self.feedback = feedback;
                self.mix = mix;
            }
        }
    }
}

/// Feedback crosses sides: left's tail reappears right and back again.
/// On mono input this is an ordinary feedback delay.
pub struct PingPongDelay {
    delays: [DelayLine; 2],
    time: Smoothed,
    feedback: Smoothed,
    mix: Smoothed,
    sample_rate: f32,
}

impl PingPongDelay {
    pub fn new() -> Self {
        Self {
            delays: [DelayLine::new(), DelayLine::new()],
            time: Smoothed::new(0.25 * 48_000.0),
            feedback: Smoothed::new(0.4),
            mix: Smoothed::new(0.5),
            sample_rate: 48_000.0,
        }
    }
}

impl Default for PingPongDelay {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for PingPongDelay {
    fn name(&self) -> &'static str {
        "Ping Pong Delay"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        DELAY_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        let max = (MAX_DELAY_SECONDS * sample_rate) as usize + 2;
        for d in &mut self.delays {
            d.resize(max);
        }
        self.time.prepare_tau(sample_rate, TIME_SMOOTH_TAU);
        self.feedback.prepare(sample_rate);
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        for d in &mut self.delays {
            d.reset();
        }
        self.time.snap();
        self.feedback.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.time.set_target(time_samples(v, self.sample_rate));
        }
        if let Some(&v) = params.get(1) {
            self.feedback.set_target(v.clamp(0.0, 1.0) * 0.95);
        }
        if let Some(&v) = params.get(2) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let frames = block.frames();
        let (left, right) = block.split_mut();
        match right {
            Some(right) => {
                for i in 0..frames {
                    let t = self.time.next();
                    let fb = self.feedback.next();
                    let mix = self.mix.next();
                    let tail_l = self.delays[0].read_frac(t);
                    let tail_r = self.delays[1].read_frac(t);
                    // Cross-feed: each side repeats into the other.
                    self.delays[0].write_advance(left[i] + tail_r * fb);
                    self.delays[1].write_advance(right[i] + tail_l * fb);
                    left[i] = blend_dry_wet(left[i], tail_l, mix);
                    right[i] = blend_dry_wet(right[i], tail_r, mix);
                }
            }
            None => {
                for s in left.iter_mut() {
                    let t = self.time.next();
                    let fb = self.feedback.next();
                    let wet = self.delays[0].read_frac(t);
                    self.delays[0].write_advance(*s + wet * fb);
                    *s = blend_dry_wet(*s, wet, self.mix.next());
                }
            }
        }
    }
}

/// Feedback through a lowpass, read head wobbled by a slow LFO.
pub struct TapeDelay {
    delays: [DelayLine; 2],
    tone_filters: [OnePole; 2],
    wow: Lfo,
    time: Smoothed,
    feedback: Smoothed,
    mix: Smoothed,
    tone: f32,
    wow_depth: f32,
    sample_rate: f32,
}

const TAPE_DELAY_PARAMS: &[&str] = &["Time", "Feedback", "Tone", "Wow", "Mix"];

impl TapeDelay {
    pub fn new() -> Self {
        Self {
            delays: [DelayLine::new(), DelayLine::new()],
            tone_filters: [OnePole::new(), OnePole::new()],
            wow: Lfo::sine(),
            time: Smoothed::new(0.3 * 48_000.0),
            feedback: Smoothed::new(0.45),
            mix: Smoothed::new(0.5),
            tone: 4_000.0,
            wow_depth: 0.2,
            sample_rate: 48_000.0,
        }
    }
}

impl Default for TapeDelay {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for TapeDelay {
    fn name(&self) -> &'static str {
        "Tape Delay"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        TAPE_DELAY_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        let max = (MAX_DELAY_SECONDS * sample_rate) as usize + 2;
        for d in &mut self.delays {
            d.resize(max);
        }
        for f in &mut self.tone_filters {
            f.set_cutoff(self.tone, sample_rate);
        }
        self.time.prepare_tau(sample_rate, TIME_SMOOTH_TAU);
        self.feedback.prepare(sample_rate);
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        for d in &mut self.delays {
            d.reset();
        }
        for f in &mut self.tone_filters {
            f.reset();
        }
        self.wow.reset();
        self.time.snap();
        self.feedback.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.time.set_target(time_samples(v, self.sample_rate));
        }
        if let Some(&v) = params.get(1) {
            self.feedback.set_target(v.clamp(0.0, 1.0) * 0.95);
        }
        if let Some(&v) = params.get(2) {
            self.tone = map_exp(v, 800.0, 12_000.0);
            for f in &mut self.tone_filters {
                f.set_cutoff(self.tone, self.sample_rate);
            }
        }
        if let Some(&v) = params.get(3) {
            self.wow_depth = v.clamp(0.0, 1.0);
        }
        if let Some(&v) = params.get(4) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let wow_swing = 0.004 * self.sample_rate * self.wow_depth;
        let frames = block.frames();
        for i in 0..frames {
            let wobble = self.wow.tick(0.6, self.sample_rate) * wow_swing;
            let t = (self.time.next() + wobble).max(1.0);
            let fb = self.feedback.next();
            let mix = self.mix.next();
            for ch in 0..block.channel_count() {
                let s = &mut block.channel_mut(ch)[i];
                let wet = self.delays[ch].read_frac(t);
                let fed = self.tone_filters[ch].lowpass(*s + wet * fb);
                self.delays[ch].write_advance(fed);
                *s = blend_dry_wet(*s, wet, mix);
            }
        }
    }
}

const TAP_COUNT: usize = 4;
const TAP_GAINS: [f32; TAP_COUNT] = [1.0, 0.7, 0.5, 0.35];

/// Four taps fanned out behind the main time, spacing set by spread.
pub struct MultiTapDelay {
    delays: [DelayLine; 2],
    time: Smoothed,
    spread: Smoothed,
    feedback: Smoothed,
    mix: Smoothed,
    sample_rate: f32,
}

const MULTITAP_PARAMS: &[&str] = &["Time", "Spread", "Feedback", "Mix"];

impl MultiTapDelay {
    pub fn new() -> Self {
        Self {
            delays: [DelayLine::new(), DelayLine::new()],
            time: Smoothed::new(0.2 * 48_000.0),
            spread: Smoothed::new(0.5),
            feedback: Smoothed::new(0.3),
            mix: Smoothed::new(0.5),
            sample_rate: 48_000.0,
        }
    }
}

impl Default for MultiTapDelay {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MultiTapDelay {
    fn name(&self) -> &'static str {
        "Multi Tap Delay"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        MULTITAP_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        // Furthest tap reaches 1 + 3·spread times the base delay.
        let max = (MAX_DELAY_SECONDS * sample_rate * 2.0) as usize + 2;
        for d in &mut self.delays {
            d.resize(max);
        }
        self.time.prepare_tau(sample_rate, TIME_SMOOTH_TAU);
        self.spread.prepare(sample_rate);
        self.feedback.prepare(sample_rate);
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        for d in &mut self.delays {
            d.reset();
        }
        self.time.snap();
        self.spread.snap();
        self.feedback.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.time
                .set_target(map_exp(v, 0.010, 0.5) * self.sample_rate);
        }
        if let Some(&v) = params.get(1) {
            self.spread.set_target(v.clamp(0.0, 1.0));
        }
        if let Some(&v) = params.get(2) {
            self.feedback.set_target(v.clamp(0.0, 1.0) * 0.7);
        }
        if let Some(&v) = params.get(3) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        for ch in 0..block.channel_count() {
            let mut time = self.time;
            let mut spread = self.spread;
            let mut feedback = self.feedback;
            let mut mix = self.mix;
            let delay = &mut self.delays[ch];
            for s in block.channel_mut(ch).iter_mut() {
                let base = time.next();
                let sp = spread.next();
                let mut wet = 0.0;
                for (tap, gain) in TAP_GAINS.iter().enumerate() {
                    let t = base * (1.0 + tap as f32 * sp);
                    wet += delay.read_frac(t) * gain;
                }
                wet *= 0.5;
                delay.write_advance(*s + wet * feedback.next());
                *s = blend_dry_wet(*s, wet, mix.next());
            }
            if ch + 1 == block.channel_count() {
                self.time = time;
                self.spread = spread;
                self.feedback = feedback;
                self.mix = mix;
            }
        }
    }
}

#[derive(Default)]
struct ReverseChannel {
    buffer: Vec<f32>,
    write: usize,
}

/// Plays the previous capture window backwards while recording the next.
/// Window length changes land at the wrap point, never mid-window.
pub struct ReverseDelay {
    channels: [ReverseChannel; 2],
    window: usize,
    pending_window: usize,
    mix: Smoothed,
    sample_rate: f32,
}

const REVERSE_PARAMS: &[&str] = &["Time", "Mix"];

impl ReverseDelay {
    pub fn new() -> Self {
        Self {
            channels: [ReverseChannel::default(), ReverseChannel::default()],
            window: 12_000,
            pending_window: 12_000,
            mix: Smoothed::new(0.5),
            sample_rate: 48_000.0,
        }
    }
}

impl Default for ReverseDelay {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for ReverseDelay {
    fn name(&self) -> &'static str {
        "Reverse Delay"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        REVERSE_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        let max = (MAX_DELAY_SECONDS * sample_rate) as usize;
        for ch in &mut self.channels {
            ch.buffer.clear();
            // Two half-windows: one recording, one playing.
            ch.buffer.resize(2 * max, 0.0);
            ch.write = 0;
        }
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        for ch in &mut self.channels {
            ch.buffer.fill(0.0);
            ch.write = 0;
        }
        self.window = self.pending_window;
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            let samples = (map_exp(v, 0.050, MAX_DELAY_SECONDS) * self.sample_rate) as usize;
            self.pending_window = samples.max(256);
        }
        if let Some(&v) = params.get(1) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn latency_samples(&self) -> usize {
        self.window
    }

    fn process(&mut self, block: &mut AudioBlock) {
        for ch in 0..block.channel_count() {
            let mut mix = self.mix;
            let window = &mut self.window;
            let pending = self.pending_window;
            let state = &mut self.channels[ch];
            for s in block.channel_mut(ch).iter_mut() {
                let w = (*window).min(state.buffer.len() / 2);
                // Which half are we writing? Read the other half backwards.
                let half = state.write / w;
                let offset = state.write % w;
                let read_half = 1 - half;
                let read_idx = read_half * w + (w - 1 - offset);

                state.buffer[half * w + offset] = *s;
                let wet = state.buffer[read_idx];
                *s = blend_dry_wet(*s, wet, mix.next());

                state.write += 1;
                if state.write >= 2 * w {
                    state.write = 0;
                    *window = pending.min(state.buffer.len() / 2).max(256);
                }
            }
            if ch + 1 == block.channel_count() {
                self.mix = mix;
            }
        }
    }
}

/// Feedback delay with an LFO on the read head: between chorus and tape.
pub struct ModDelay {
    delays: [DelayLine; 2],
    lfo: Lfo,
    time: Smoothed,
    rate: f32,
    depth: Smoothed,
    feedback: Smoothed,
    mix: Smoothed,
    sample_rate: f32,
}

const MOD_DELAY_PARAMS: &[&str] = &["Time", "Rate", "Depth", "Feedback", "Mix"];

impl ModDelay {
    pub fn new() -> Self {
        Self {
            delays: [DelayLine::new(), DelayLine::new()],
            lfo: Lfo::sine(),
            time: Smoothed::new(0.15 * 48_000.0),
            rate: 0.5,
            depth: Smoothed::new(0.3),
            feedback: Smoothed::new(0.4),
            mix: Smoothed::new(0.5),
            sample_rate: 48_000.0,
        }
    }
}

impl Default for ModDelay {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for ModDelay {
    fn name(&self) -> &'static str {
        "Mod Delay"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        MOD_DELAY_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, _max_frames: usize) {
        self.sample_rate = sample_rate;
        let max = (MAX_DELAY_SECONDS * sample_rate) as usize + 2;
        for d in &mut self.delays {
            d.resize(max);
        }
        self.time.prepare_tau(sample_rate, TIME_SMOOTH_TAU);
        self.depth.prepare(sample_rate);
        self.feedback.prepare(sample_rate);
        self.mix.prepare(sample_rate);
    }

    fn reset(&mut self) {
        for d in &mut self.delays {
            d.reset();
        }
        self.lfo.reset();
        self.time.snap();
        self.depth.snap();
        self.feedback.snap();
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.time.set_target(time_samples(v, self.sample_rate));
        }
        if let Some(&v) = params.get(1) {
            self.rate = map_exp(v, 0.05, 6.0);
        }
        if let Some(&v) = params.get(2) {
            self.depth.set_target(v.clamp(0.0, 1.0));
        }
        if let Some(&v) = params.get(3) {
            self.feedback.set_target(v.clamp(0.0, 1.0) * 0.9);
        }
        if let Some(&v) = params.get(4) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn process(&mut self, block: &mut AudioBlock) {
        let swing = 0.008 * self.sample_rate;
        let frames = block.frames();
        for i in 0..frames {
            let wobble = self.lfo.tick(self.rate, self.sample_rate) * self.depth.next() * swing;
            let t = (self.time.next() + wobble).max(1.0);
            let fb = self.feedback.next();
            let mix = self.mix.next();
            for ch in 0..block.channel_count() {
                let s = &mut block.channel_mut(ch)[i];
                let wet = self.delays[ch].read_frac(t);
                self.delays[ch].write_advance(*s + wet * fb);
                *s = blend_dry_wet(*s, wet, mix);
            }
        }
    }
}
