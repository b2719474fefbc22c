//! Filters: a topology-preserving state-variable filter plus one-pole
//! helpers.
//!
//! The SVF computes all four responses per tick; callers pick the one they
//! need, or combine them (the bell response is dry plus weighted bandpass).

use std::f32::consts::TAU;

pub struct FilterOutputs {
    pub lowpass: f32,
    pub bandpass: f32,
    pub highpass: f32,
    pub notch: f32,
}

/// Zero-delay-feedback state-variable filter.
pub struct Svf {
    ic1eq: f32, // First integrator's memory
    ic2eq: f32, // Second integrator's memory
    g: f32,
    k: f32,
}

impl Svf {
    pub fn new() -> Self {
        Self {
            ic1eq: 0.0,
            ic2eq: 0.0,
            g: 0.1,
            k: 2.0,
        }
    }

    /// Recompute coefficients. `resonance` in [0,1): 0 is maximally damped.
    /// Cheap enough to call once per block.
    pub fn set(&mut self, cutoff_hz: f32, resonance: f32, sample_rate: f32) {
        let nyquist = sample_rate * 0.45;
        let cutoff = cutoff_hz.clamp(10.0, nyquist);
        self.g = (std::f32::consts::PI * cutoff / sample_rate).tan();
        self.k = 2.0 - 2.0 * resonance.clamp(0.0, 0.98);
    }

    /// Coefficients from an explicit quality factor (`k = 1/Q`), for bell
    /// and formant responses.
    pub fn set_q(&mut self, cutoff_hz: f32, q: f32, sample_rate: f32) {
        let nyquist = sample_rate * 0.45;
        let cutoff = cutoff_hz.clamp(10.0, nyquist);
        self.g = (std::f32::consts::PI * cutoff / sample_rate).tan();
        self.k = 1.0 / q.clamp(0.1, 20.0);
    }

    pub fn k(&self) -> f32 {
        self.k
    }

    #[inline]
    pub fn tick(&mut self, sample: f32) -> FilterOutputs {
        let h = 1.0 / (1.0 + self.g * (self.g + self.k));
        let v3 = sample - self.ic2eq;
        let v1 = h * (self.ic1eq + self.g * v3);
        let v2 = self.ic2eq + self.g * v1;

        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;

        FilterOutputs {
            lowpass: v2,
            bandpass: v1,
            highpass: sample - self.k * v1 - v2,
            notch: sample - self.k * v1,
        }
    }

    pub fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }
}

impl Default for Svf {
    fn default() -> Self {
        Self::new()
    }
}

/// One-pole lowpass. `coeff` from a cutoff: `1 − exp(−2π·fc/Fs)`.
#[derive(Debug, Clone, Copy)]
pub struct OnePole {
    state: f32,
    coeff: f32,
}

impl OnePole {
    pub fn new() -> Self {
        Self {
            state: 0.0,
            coeff: 1.0,
        }
    }

    pub fn set_cutoff(&mut self, cutoff_hz: f32, sample_rate: f32) {
        let fc = cutoff_hz.clamp(1.0, sample_rate * 0.45);
        self.coeff = 1.0 - (-TAU * fc / sample_rate).exp();
    }

    #[inline]
    pub fn lowpass(&mut self, sample: f32) -> f32 {
        self.state += self.coeff * (sample - self.state);
        self.state
    }

    #[inline]
    pub fn highpass(&mut self, sample: f32) -> f32 {
        sample - self.lowpass(sample)
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

impl Default for OnePole {
    fn default() -> Self {
        Self::new()
    }
}

/// DC blocker: unity-gain highpass with a pole just inside the unit circle.
#[derive(Debug, Clone, Copy)]
pub struct DcBlocker {
    x1: f32,
    y1: f32,
    r: f32,
}

impl DcBlocker {
    pub fn new() -> Self {
        Self {
            x1: 0.0,
            y1: 0.0,
            r: 0.995,
        }
    }

    pub fn set_cutoff(&mut self, cutoff_hz: f32, sample_rate: f32) {
        let fc = cutoff_hz.clamp(1.0, 400.0);
        self.r = (1.0 - TAU * fc / sample_rate).clamp(0.9, 0.9999);
    }

    #[inline]
    pub fn tick(&mut self, sample: f32) -> f32 {
        let y = sample - self.x1 + self.r * self.y1;
        self.x1 = sample;
        // Flush the feedback path out of the denormal range.
        self.y1 = if y.abs() < 1e-18 { 0.0 } else { y };
        y
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}

impl Default for DcBlocker {
    fn default() -> Self {
        Self::new()
    }
}
