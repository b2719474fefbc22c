//! Low-level DSP primitives shared by the effect engines.
//!
//! These components are allocation-free after `prepare`-time sizing and are
//! realtime-safe, so engines can embed them directly in their state structs.
//! They stay focused on the signal math; the engine layer owns parameter
//! mapping and per-block orchestration.

/// Fractional-read delay line.
pub mod delay;
/// Peak envelope follower with independent attack/release.
pub mod env_follower;
/// State-variable filter and one-pole helpers.
pub mod filter;
/// Phase accumulator for low-frequency modulation.
pub mod lfo;
/// Dry/wet blending helpers.
pub mod mix;
/// Deterministic pseudo-random source for noise-flavored engines.
pub mod noise;
/// One-pole target-tracking parameter smoother.
pub mod smoother;
/// Streaming short-time Fourier transform core with fixed hop.
pub mod stft;

pub use smoother::Smoothed;
