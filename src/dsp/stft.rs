//! Streaming short-time Fourier transform core.
//!
//! Drives every frequency-domain engine: samples stream through an input
//! ring; every `hop` samples a full frame is windowed, transformed, handed
//! to the engine's spectrum callback, inverse-transformed, windowed again
//! and overlap-added into an output ring. The same Hann window is used for
//! analysis and synthesis, so overlapped frames sum w²-weighted.
//!
//! The hop is fixed at `fft_size / OVERLAP`. Tying it to a user parameter
//! breaks the constant-overlap-add condition and shows up as
//! frequency-dependent amplitude modulation; grain-flavored parameters must
//! act on the spectrum callback instead.
//!
//! The single output scale is `1/(M · Σ_hops w²)`: the unnormalized inverse
//! transform contributes M, the doubled window contributes the overlap sum.
//! Getting this wrong by any factor shows up as a flat gain error, which the
//! unity round-trip test pins down to 1e-4.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Overlap factor: hop = fft_size / OVERLAP (75% overlap).
pub const OVERLAP: usize = 4;

/// Periodic Hann window. The periodic variant (denominator `size`, not
/// `size − 1`) is the one whose squared overlaps at hop M/4 sum to a
/// constant.
pub fn hann_periodic(size: usize) -> Vec<f32> {
    (0..size)
        .map(|n| {
            let x = std::f32::consts::TAU * n as f32 / size as f32;
            0.5 * (1.0 - x.cos())
        })
        .collect()
}

/// Sum of squared window overlaps at offset `p` within one hop.
pub fn overlap_sq_sum(window: &[f32], hop: usize, p: usize) -> f32 {
    let mut sum = 0.0;
    let mut idx = p;
    while idx < window.len() {
        sum += window[idx] * window[idx];
        idx += hop;
    }
    sum
}

/// Worst-case relative deviation of the squared-window overlap sum across
/// one hop. Zero means perfect constant-overlap-add. The check sums the
/// squared normalized overlaps directly; no hidden factor of M.
pub fn cola_deviation(window: &[f32], hop: usize) -> f32 {
    let mean = (0..hop)
        .map(|p| overlap_sq_sum(window, hop, p))
        .sum::<f32>()
        / hop as f32;
    (0..hop)
        .map(|p| (overlap_sq_sum(window, hop, p) / mean - 1.0).abs())
        .fold(0.0f32, f32::max)
}

/// One channel of streaming STFT state.
pub struct StftCore {
    fft_size: usize,
    hop: usize,
    window: Vec<f32>,
    scale: f32,
    fwd: Arc<dyn Fft<f32>>,
    inv: Arc<dyn Fft<f32>>,
    in_ring: Vec<f32>,
    out_ring: Vec<f32>,
    pos: usize,
    hop_counter: usize,
    frame: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl StftCore {
    pub fn new(fft_size: usize) -> Self {
        assert!(fft_size.is_power_of_two());
        let hop = fft_size / OVERLAP;
        let window = hann_periodic(fft_size);
        debug_assert!(cola_deviation(&window, hop) < 1e-3);

        // Overlap sum of w² is constant across positions for the periodic
        // Hann at this hop; sample it at position 0.
        let ola = overlap_sq_sum(&window, hop, 0);
        let scale = 1.0 / (fft_size as f32 * ola);

        let mut planner = FftPlanner::new();
        let fwd = planner.plan_fft_forward(fft_size);
        let inv = planner.plan_fft_inverse(fft_size);
        let scratch_len = fwd
            .get_inplace_scratch_len()
            .max(inv.get_inplace_scratch_len());

        Self {
            fft_size,
            hop,
            window,
            scale,
            fwd,
            inv,
            in_ring: vec![0.0; fft_size],
            out_ring: vec![0.0; fft_size],
            pos: 0,
            hop_counter: 0,
            frame: vec![Complex::default(); fft_size],
            scratch: vec![Complex::default(); scratch_len],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Samples between a sample entering and its transformed version
    /// leaving.
    pub fn latency(&self) -> usize {
        self.fft_size
    }

    /// Stream a channel through the transform in place. `spectrum_fn` sees
    /// each full frame after the forward transform and may rewrite it.
    pub fn process(
        &mut self,
        channel: &mut [f32],
        mut spectrum_fn: impl FnMut(&mut [Complex<f32>]),
    ) {
        for sample in channel.iter_mut() {
            self.in_ring[self.pos] = *sample;
            *sample = self.out_ring[self.pos];
            self.out_ring[self.pos] = 0.0;

            self.pos += 1;
            if self.pos >= self.fft_size {
                self.pos = 0;
            }

            self.hop_counter += 1;
            if self.hop_counter >= self.hop {
                self.hop_counter = 0;
                self.run_frame(&mut spectrum_fn);
            }
        }
    }

    fn run_frame(&mut self, spectrum_fn: &mut impl FnMut(&mut [Complex<f32>])) {
        let m = self.fft_size;

        // Unroll the ring oldest-first and apply the analysis window.
        for n in 0..m {
            let idx = self.pos + n;
            let idx = if idx >= m { idx - m } else { idx };
            self.frame[n] = Complex::new(self.in_ring[idx] * self.window[n], 0.0);
        }

        self.fwd.process_with_scratch(&mut self.frame, &mut self.scratch);
        spectrum_fn(&mut self.frame);
        self.inv.process_with_scratch(&mut self.frame, &mut self.scratch);

        // Synthesis window + overlap-add back into the output ring.
        for n in 0..m {
            let idx = self.pos + n;
            let idx = if idx >= m { idx - m } else { idx };
            self.out_ring[idx] += self.frame[n].re * self.window[n] * self.scale;
        }
    }

    pub fn reset(&mut self) {
        self.in_ring.fill(0.0);
        self.out_ring.fill(0.0);
        self.pos = 0;
        self.hop_counter = 0;
    }
}
