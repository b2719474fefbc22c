//! The engine contract and the effect catalog.
//!
//! Every effect, from the pass-through to the phase vocoder, satisfies the
//! same small trait. Instances are manufactured by [`factory`] from a stable
//! integer id; the rack owns them and drives the block lifecycle:
//! `prepare` → (`update_params` → `process`)* → `reset`/drop.

use crate::block::AudioBlock;

pub mod convolution;
pub mod delay;
pub mod distortion;
pub mod dynamics;
pub mod eq;
pub mod factory;
pub mod modulation;
pub mod pitch;
pub mod reverb;
pub mod spatial;
pub mod spectral;
pub mod utility;

pub use factory::{catalog, create_engine, mix_index, EngineCategory, ENGINE_COUNT};

/// Uniform contract every effect satisfies.
///
/// Realtime rules for `process`: no allocation, no locks, no blocking, no
/// panics, and finite input must produce finite output for one or two
/// channels of any length up to the prepared maximum.
pub trait Engine: Send {
    /// Short ASCII display name.
    fn name(&self) -> &'static str;

    /// Host-facing parameter names, in index order.
    fn parameter_names(&self) -> &'static [&'static str];

    /// Idempotent; (re)allocates internal state for a sample rate and block
    /// size ceiling. Never called on the audio thread.
    fn prepare(&mut self, sample_rate: f32, max_frames: usize);

    /// Return to the state of a freshly prepared instance: delay lines
    /// zeroed, phases reset, smoothed parameters snapped to their targets.
    fn reset(&mut self);

    /// Write normalized [0,1] targets into the engine's smoothed scalars.
    /// Indices beyond `params.len()` keep their previous targets.
    fn update_params(&mut self, params: &[f32]);

    /// In-place block transform.
    fn process(&mut self, block: &mut AudioBlock);

    /// Fixed latency the engine introduces, for host compensation.
    fn latency_samples(&self) -> usize {
        0
    }

    fn parameter_count(&self) -> usize {
        self.parameter_names().len()
    }

    fn parameter_name(&self, index: usize) -> &'static str {
        self.parameter_names().get(index).copied().unwrap_or("")
    }
}

impl Engine for Box<dyn Engine> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        (**self).parameter_names()
    }

    fn prepare(&mut self, sample_rate: f32, max_frames: usize) {
        (**self).prepare(sample_rate, max_frames)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn update_params(&mut self, params: &[f32]) {
        (**self).update_params(params)
    }

    fn process(&mut self, block: &mut AudioBlock) {
        (**self).process(block)
    }

    fn latency_samples(&self) -> usize {
        (**self).latency_samples()
    }
}

// Parameter mapping helpers. Knobs arrive normalized in [0,1]; each engine
// owns its semantic ranges.

/// Linear map of a normalized value onto [lo, hi].
#[inline]
pub(crate) fn map_lin(v: f32, lo: f32, hi: f32) -> f32 {
    lo + (hi - lo) * v.clamp(0.0, 1.0)
}

/// Exponential map onto [lo, hi]; natural for frequencies and times.
#[inline]
pub(crate) fn map_exp(v: f32, lo: f32, hi: f32) -> f32 {
    debug_assert!(lo > 0.0 && hi > lo);
    lo * (hi / lo).powf(v.clamp(0.0, 1.0))
}

#[inline]
pub(crate) fn db_to_gain(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_lin_endpoints() {
        assert_eq!(map_lin(0.0, 10.0, 20.0), 10.0);
        assert_eq!(map_lin(1.0, 10.0, 20.0), 20.0);
        assert_eq!(map_lin(2.0, 10.0, 20.0), 20.0);
    }

    #[test]
    fn test_map_exp_midpoint_is_geometric() {
        let mid = map_exp(0.5, 20.0, 20_000.0);
        let geo = (20.0f32 * 20_000.0).sqrt();
        assert!((mid - geo).abs() < 1.0);
    }

    #[test]
    fn test_db_to_gain() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_gain(-6.0) - 0.5012).abs() < 1e-3);
    }
}
