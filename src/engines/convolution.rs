//! Non-uniform partitioned convolution.
//!
//! The impulse response is split into segments of exponentially growing
//! partition sizes: the first segment runs at the base block B0 (smallest
//! power of two covering the prepared block size), later segments double up
//! to a cap. Small segments tick every B0 samples; a segment of size B only
//! ticks when its own boundary passes, so the added latency is B0 — the
//! smallest partition — not the largest.
//!
//! Per segment, the frequency-domain machinery is ordinary overlap-save:
//! spectra of the most recent input blocks multiplied against the
//! precomputed partition spectra and accumulated. The inverse-transform
//! scale is folded into the partition spectra once at IR load, so the
//! per-block work is bare complex multiply-adds.
//!
//! Scheduling invariant: a segment at IR offset `off` with partition size
//! `B` writes output for `[t − B + off, t + off)` when its boundary ticks
//! at time `t`. Emission lags input by B0, so every position is complete
//! before it is read as long as `off ≥ B − B0`, which the doubling layout
//! guarantees (each segment starts after four partitions of the previous
//! size).

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::block::AudioBlock;
use crate::dsp::filter::OnePole;
use crate::dsp::mix::blend_dry_wet;
use crate::dsp::noise::NoiseSource;
use crate::dsp::Smoothed;
use crate::engines::{map_exp, Engine};
use crate::error::IrError;

/// Largest partition size.
const MAX_PART_SIZE: usize = 8192;
/// Partitions per segment before the size doubles.
const PARTS_PER_SEGMENT: usize = 4;
/// IR length ceiling (~21 s at 48 kHz).
pub const MAX_IR_SAMPLES: usize = 1 << 20;

/// Immutable per-segment data shared by both channels.
struct SegmentLayout {
    part_size: usize,
    offset: usize,
    /// Partition spectra, inverse-scale pre-applied.
    spectra: Vec<Vec<Complex<f32>>>,
    fwd: Arc<dyn Fft<f32>>,
    inv: Arc<dyn Fft<f32>>,
}

/// Mutable per-channel, per-segment state.
struct SegmentState {
    history: Vec<Vec<Complex<f32>>>,
    head: usize,
    work: Vec<Complex<f32>>,
    acc: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

struct ConvChannel {
    in_hist: Vec<f32>,
    out_acc: Vec<f32>,
    clock: u64,
    segments: Vec<SegmentState>,
    damp: OnePole,
}

impl ConvChannel {
    fn reset(&mut self) {
        self.in_hist.fill(0.0);
        self.out_acc.fill(0.0);
        self.clock = 0;
        for seg in &mut self.segments {
            for spec in &mut seg.history {
                spec.fill(Complex::default());
            }
            seg.head = 0;
        }
        self.damp.reset();
    }
}

/// Convolution reverb with a stereo-shared mono IR applied per channel.
pub struct ConvolutionReverb {
    layouts: Vec<SegmentLayout>,
    channels: [Option<ConvChannel>; 2],
    ir: Vec<f32>,
    b0: usize,
    damp_cutoff: f32,
    mix: Smoothed,
    sample_rate: f32,
    prepared: bool,
}

const CONV_PARAMS: &[&str] = &["Damp", "Mix"];

impl ConvolutionReverb {
    pub fn new() -> Self {
        Self {
            layouts: Vec::new(),
            channels: [None, None],
            ir: Vec::new(),
            b0: 128,
            damp_cutoff: 12_000.0,
            mix: Smoothed::new(0.4),
            sample_rate: 48_000.0,
            prepared: false,
        }
    }

    /// Install an impulse response. Allocates; call from the resource
    /// thread, never the audio thread. An empty or oversized IR is
    /// rejected and the previous layout stays in place.
    pub fn set_impulse_response(&mut self, ir: &[f32]) -> Result<(), IrError> {
        if ir.is_empty() {
            return Err(IrError::Empty);
        }
        if ir.len() > MAX_IR_SAMPLES {
            return Err(IrError::TooLong {
                got: ir.len(),
                max: MAX_IR_SAMPLES,
            });
        }
        self.ir = ir.to_vec();
        if self.prepared {
            self.build_layout();
        }
        Ok(())
    }

    /// Deterministic exponentially decaying noise burst, used when no IR
    /// has been installed.
    fn synthetic_ir(sample_rate: f32) -> Vec<f32> {
        let len = (1.5 * sample_rate) as usize;
        let mut rng = NoiseSource::new(0x5eed);
        let decay = 6.9 / len as f32; // -60 dB over the tail
        (0..len)
            .map(|n| rng.next_bipolar() * (-(n as f32) * decay).exp() * 0.25)
            .collect()
    }

    fn build_layout(&mut self) {
        let mut planner = FftPlanner::new();
        self.layouts.clear();

        let mut part_size = self.b0;
        let mut covered = 0usize;
        while covered < self.ir.len() {
            let remaining = self.ir.len() - covered;
            let at_cap = part_size >= MAX_PART_SIZE;
            let part_count = if at_cap {
                remaining.div_ceil(part_size)
            } else {
                PARTS_PER_SEGMENT.min(remaining.div_ceil(part_size))
            };

            let fft_size = 2 * part_size;
            let fwd = planner.plan_fft_forward(fft_size);
            let inv = planner.plan_fft_inverse(fft_size);
            let scale = 1.0 / fft_size as f32;

            let mut spectra = Vec::with_capacity(part_count);
            let mut scratch =
                vec![Complex::default(); fwd.get_inplace_scratch_len().max(1)];
            for p in 0..part_count {
                let start = covered + p * part_size;
                let end = (start + part_size).min(self.ir.len());
                let mut buf = vec![Complex::default(); fft_size];
                for (i, &h) in self.ir[start..end].iter().enumerate() {
                    buf[i] = Complex::new(h * scale, 0.0);
                }
                fwd.process_with_scratch(&mut buf, &mut scratch);
                spectra.push(buf);
            }

            self.layouts.push(SegmentLayout {
                part_size,
                offset: covered,
                spectra,
                fwd,
                inv,
            });

            covered += part_count * part_size;
            if !at_cap {
                part_size = (part_size * 2).min(MAX_PART_SIZE);
            }
        }

        let max_part = self
            .layouts
            .last()
            .map(|l| l.part_size)
            .unwrap_or(self.b0);
        let max_offset = self
            .layouts
            .last()
            .map(|l| l.offset + l.spectra.len() * l.part_size)
            .unwrap_or(self.b0);
        let in_len = (2 * max_part).next_power_of_two();
        let out_len = (max_offset + self.b0 + crate::MAX_BLOCK_SIZE + max_part)
            .next_power_of_two();

        for slot in &mut self.channels {
            let states = self
                .layouts
                .iter()
                .map(|layout| {
                    let fft_size = 2 * layout.part_size;
                    let scratch_len = layout
                        .fwd
                        .get_inplace_scratch_len()
                        .max(layout.inv.get_inplace_scratch_len())
                        .max(1);
                    SegmentState {
                        history: vec![
                            vec![Complex::default(); fft_size];
                            layout.spectra.len()
                        ],
                        head: 0,
                        work: vec![Complex::default(); fft_size],
                        acc: vec![Complex::default(); fft_size],
                        scratch: vec![Complex::default(); scratch_len],
                    }
                })
                .collect();
            let mut damp = OnePole::new();
            damp.set_cutoff(self.damp_cutoff, self.sample_rate);
            *slot = Some(ConvChannel {
                in_hist: vec![0.0; in_len],
                out_acc: vec![0.0; out_len],
                clock: 0,
                segments: states,
                damp,
            });
        }
    }

    fn process_channel(&mut self, ch: usize, samples: &mut [f32], mix_start: Smoothed) -> Smoothed {
        let mut mix = mix_start;
        let b0 = self.b0 as u64;
        // Fully open damping is a hard bypass so a delta IR stays exact.
        let damp_on = self.damp_cutoff < 19_000.0;
        let Some(channel) = self.channels[ch].as_mut() else {
            return mix;
        };
        let in_mask = channel.in_hist.len() - 1;
        let out_mask = channel.out_acc.len() - 1;

        for s in samples.iter_mut() {
            channel.in_hist[(channel.clock as usize) & in_mask] = *s;
            channel.clock += 1;
            let t = channel.clock;

            for (layout, state) in self.layouts.iter().zip(channel.segments.iter_mut()) {
                let b = layout.part_size as u64;
                if t % b != 0 {
                    continue;
                }
                let fft_size = 2 * layout.part_size;

                // Newest input spectrum: the last 2B samples.
                for i in 0..fft_size {
                    let idx = t as i64 - fft_size as i64 + i as i64;
                    state.work[i] = if idx >= 0 {
                        Complex::new(channel.in_hist[(idx as usize) & in_mask], 0.0)
                    } else {
                        Complex::default()
                    };
                }
                layout
                    .fwd
                    .process_with_scratch(&mut state.work, &mut state.scratch);
                state.history[state.head].copy_from_slice(&state.work);

                // MAC over the partition ring, newest spectrum first.
                state.acc.fill(Complex::default());
                let parts = layout.spectra.len();
                for (j, part) in layout.spectra.iter().enumerate() {
                    let slot = (state.head + parts - j) % parts;
                    let hist = &state.history[slot];
                    for (a, (x, h)) in state
                        .acc
                        .iter_mut()
                        .zip(hist.iter().zip(part.iter()))
                    {
                        *a += x * h;
                    }
                }
                state.head = (state.head + 1) % parts;

                layout
                    .inv
                    .process_with_scratch(&mut state.acc, &mut state.scratch);

                // Overlap-save: the second half is valid, landing at the
                // segment's IR offset.
                let base = t as i64 - layout.part_size as i64 + layout.offset as i64;
                for i in 0..layout.part_size {
                    let pos = (base + i as i64) as usize;
                    channel.out_acc[pos & out_mask] += state.acc[layout.part_size + i].re;
                }
            }

            let wet = if t > b0 {
                let pos = ((t - 1 - b0) as usize) & out_mask;
                let v = channel.out_acc[pos];
                channel.out_acc[pos] = 0.0;
                v
            } else {
                0.0
            };
            let wet = if damp_on { channel.damp.lowpass(wet) } else { wet };
            *s = blend_dry_wet(*s, wet, mix.next());
        }
        mix
    }
}

impl Default for ConvolutionReverb {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for ConvolutionReverb {
    fn name(&self) -> &'static str {
        "Convolution Reverb"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        CONV_PARAMS
    }

    fn prepare(&mut self, sample_rate: f32, max_frames: usize) {
        self.sample_rate = sample_rate;
        self.b0 = max_frames.next_power_of_two().clamp(64, MAX_PART_SIZE);
        if self.ir.is_empty() {
            self.ir = Self::synthetic_ir(sample_rate);
        }
        self.mix.prepare(sample_rate);
        self.prepared = true;
        self.build_layout();
    }

    fn reset(&mut self) {
        for channel in self.channels.iter_mut().flatten() {
            channel.reset();
        }
        self.mix.snap();
    }

    fn update_params(&mut self, params: &[f32]) {
        if let Some(&v) = params.first() {
            self.damp_cutoff = map_exp(1.0 - v, 1_000.0, 20_000.0);
            for channel in self.channels.iter_mut().flatten() {
                channel.damp.set_cutoff(self.damp_cutoff, self.sample_rate);
            }
        }
        if let Some(&v) = params.get(1) {
            self.mix.set_target(v.clamp(0.0, 1.0));
        }
    }

    fn latency_samples(&self) -> usize {
        self.b0
    }

    fn process(&mut self, block: &mut AudioBlock) {
        // Both channels replay the same mix trajectory; keep the last.
        let mix = self.mix;
        let channel_count = block.channel_count();
        for ch in 0..channel_count {
            let advanced = self.process_channel(ch, block.channel_mut(ch), mix);
            if ch + 1 == channel_count {
                self.mix = advanced;
            }
        }
    }
}

/// Load a mono impulse response from a WAV file, downmixing multi-channel
/// content. Resource-thread only.
pub fn load_ir_wav(path: &std::path::Path) -> Result<Vec<f32>, IrError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    if interleaved.is_empty() {
        return Err(IrError::Empty);
    }
    let frames = interleaved.len() / channels;
    if frames > MAX_IR_SAMPLES {
        return Err(IrError::TooLong {
            got: frames,
            max: MAX_IR_SAMPLES,
        });
    }

    let norm = 1.0 / channels as f32;
    let ir: Vec<f32> = (0..frames)
        .map(|f| {
            interleaved[f * channels..(f + 1) * channels]
                .iter()
                .sum::<f32>()
                * norm
        })
        .collect();
    log::info!(
        "loaded impulse response: {} frames, {} ch, {} Hz",
        frames,
        channels,
        spec.sample_rate
    );
    Ok(ir)
}
