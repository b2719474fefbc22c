//! The six-slot effect rack and its control-side handle.
//!
//! `Rack` lives on the audio thread; `RackHandle` lives with the host's
//! control thread. They share the atomic parameter plane and a pair of
//! wait-free SPSC rings: commands (new engine instances) flow control →
//! audio and are adopted at the next block boundary; retired instances
//! flow back and are dropped by `reclaim` off the audio thread.
//!
//! Per block: adopt commands, scrub non-finite input, then for each slot
//! in order — skip it when bypassed, empty, or its mix parameter sits at
//! zero — push the parameter snapshot into the engine and process in
//! place. Blocks longer than the prepared maximum are split into
//! sub-blocks; the rack itself never fails mid-callback.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

use crate::block::AudioBlock;
use crate::engines::{factory, Engine};
use crate::error::RackError;
use crate::params::{ParamPlane, RackState, SlotState};
use crate::{MAX_PARAMS, SLOT_COUNT};

const COMMAND_QUEUE_SIZE: usize = 64;
const RETIRE_QUEUE_SIZE: usize = 64;

/// Diagnostic counters, readable from the control thread.
pub struct DspCounters {
    scrubbed_samples: AtomicU64,
    dropped_retirees: AtomicU64,
}

impl DspCounters {
    fn new() -> Self {
        Self {
            scrubbed_samples: AtomicU64::new(0),
            dropped_retirees: AtomicU64::new(0),
        }
    }

    /// Non-finite input samples replaced with zero so far.
    pub fn scrubbed_samples(&self) -> u64 {
        self.scrubbed_samples.load(Ordering::Relaxed)
    }

    /// Retired engines dropped on the audio thread because the reclaim
    /// queue was full. Should stay zero when `reclaim` runs regularly.
    pub fn dropped_retirees(&self) -> u64 {
        self.dropped_retirees.load(Ordering::Relaxed)
    }
}

/// Prepare configuration shared so the handle constructs new engines at
/// the rack's current sample rate and block ceiling.
struct PrepareConfig {
    sample_rate_bits: AtomicU32,
    max_frames: AtomicU32,
}

enum RackCommand {
    SetEngine {
        slot: usize,
        id: u32,
        engine: Box<dyn Engine>,
        mix_index: Option<usize>,
    },
}

struct RetiredEngine(#[allow(dead_code)] Box<dyn Engine>);

struct Slot {
    engine: Box<dyn Engine>,
    id: u32,
    mix_index: Option<usize>,
}

/// Audio-thread half of the rack.
pub struct Rack {
    slots: Vec<Slot>,
    plane: Arc<ParamPlane>,
    counters: Arc<DspCounters>,
    config: Arc<PrepareConfig>,
    cmd_rx: Consumer<RackCommand>,
    retire_tx: Producer<RetiredEngine>,
    snapshot: [f32; MAX_PARAMS],
    max_frames: usize,
}

impl Rack {
    /// Build a rack (all slots empty) and its control handle.
    pub fn new(sample_rate: f32, max_frames: usize) -> (Rack, RackHandle) {
        #[cfg(debug_assertions)]
        factory::validate_catalog();

        let plane = Arc::new(ParamPlane::new());
        let counters = Arc::new(DspCounters::new());
        let config = Arc::new(PrepareConfig {
            sample_rate_bits: AtomicU32::new(sample_rate.to_bits()),
            max_frames: AtomicU32::new(max_frames as u32),
        });
        let (cmd_tx, cmd_rx) = RingBuffer::<RackCommand>::new(COMMAND_QUEUE_SIZE);
        let (retire_tx, retire_rx) = RingBuffer::<RetiredEngine>::new(RETIRE_QUEUE_SIZE);

        let slots = (0..SLOT_COUNT)
            .map(|_| {
                let mut engine = factory::create_engine(0).expect("pass-through must exist");
                engine.prepare(sample_rate, max_frames);
                Slot {
                    engine,
                    id: 0,
                    mix_index: None,
                }
            })
            .collect();

        let rack = Rack {
            slots,
            plane: Arc::clone(&plane),
            counters: Arc::clone(&counters),
            config: Arc::clone(&config),
            cmd_rx,
            retire_tx,
            snapshot: [0.0; MAX_PARAMS],
            max_frames: max_frames.max(1),
        };
        let handle = RackHandle {
            plane,
            counters,
            config,
            cmd_tx,
            retire_rx,
            engine_ids: [0; SLOT_COUNT],
        };
        (rack, handle)
    }

    /// Re-prepare every engine for a new sample rate or block ceiling.
    /// Host calls this with the stream stopped; it allocates.
    pub fn prepare(&mut self, sample_rate: f32, max_frames: usize) {
        self.max_frames = max_frames.max(1);
        self.config
            .sample_rate_bits
            .store(sample_rate.to_bits(), Ordering::Relaxed);
        self.config
            .max_frames
            .store(max_frames as u32, Ordering::Relaxed);
        for slot in &mut self.slots {
            slot.engine.prepare(sample_rate, max_frames);
            slot.engine.reset();
        }
        log::debug!("rack prepared: {sample_rate} Hz, max {max_frames} frames");
    }

    /// Flush every engine back to its zero transient response.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.engine.reset();
        }
    }

    /// Latency of the active chain: the sum of engaged engines' latencies.
    pub fn latency_samples(&self) -> usize {
        self.slots
            .iter()
            .enumerate()
            .filter(|(i, slot)| !self.plane.bypass(*i) && slot.id != 0)
            .map(|(_, slot)| slot.engine.latency_samples())
            .sum()
    }

    /// The realtime block callback. In-place, never fails, never
    /// allocates.
    pub fn process(&mut self, block: &mut AudioBlock) {
        self.adopt_commands();

        let scrubbed = block.scrub_non_finite();
        if scrubbed > 0 {
            self.counters
                .scrubbed_samples
                .fetch_add(scrubbed as u64, Ordering::Relaxed);
        }

        let max = self.max_frames;
        let (left, mut right) = block.split_mut();
        let frames = left.len();
        let mut start = 0;
        while start < frames {
            let end = (start + max).min(frames);
            let mut chunk = match right.as_deref_mut() {
                Some(r) => AudioBlock::stereo(&mut left[start..end], &mut r[start..end]),
                None => AudioBlock::mono(&mut left[start..end]),
            };
            self.process_chunk(&mut chunk);
            start = end;
        }
    }

    fn process_chunk(&mut self, chunk: &mut AudioBlock) {
        for index in 0..self.slots.len() {
            if self.plane.bypass(index) {
                continue;
            }
            let slot = &mut self.slots[index];
            if slot.id == 0 {
                continue;
            }
            self.plane.snapshot(index, &mut self.snapshot);
            // Automatic bypass: a dry/wet of zero means the engine cannot
            // contribute; skip its work entirely.
            if let Some(mix) = slot.mix_index {
                if self.snapshot[mix] <= 0.0 {
                    continue;
                }
            }
            let count = slot.engine.parameter_count().min(MAX_PARAMS);
            slot.engine.update_params(&self.snapshot[..count]);
            slot.engine.process(chunk);
        }
    }

    fn adopt_commands(&mut self) {
        while let Ok(command) = self.cmd_rx.pop() {
            match command {
                RackCommand::SetEngine {
                    slot,
                    id,
                    engine,
                    mix_index,
                } => {
                    if slot >= self.slots.len() {
                        continue;
                    }
                    let old = std::mem::replace(&mut self.slots[slot].engine, engine);
                    self.slots[slot].id = id;
                    self.slots[slot].mix_index = mix_index;
                    self.plane.set_engine_id(slot, id);
                    if self.retire_tx.push(RetiredEngine(old)).is_err() {
                        // Queue full: the drop below frees on the audio
                        // thread. Counted so the host can see it happened.
                        self.counters
                            .dropped_retirees
                            .fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }
}

/// Control-thread half of the rack.
pub struct RackHandle {
    plane: Arc<ParamPlane>,
    counters: Arc<DspCounters>,
    config: Arc<PrepareConfig>,
    cmd_tx: Producer<RackCommand>,
    retire_rx: Consumer<RetiredEngine>,
    engine_ids: [u32; SLOT_COUNT],
}

impl RackHandle {
    /// Construct, prepare and publish a new engine for a slot. On failure
    /// the slot keeps its current engine.
    pub fn set_engine(&mut self, slot: usize, id: u32) -> Result<(), RackError> {
        if slot >= SLOT_COUNT {
            return Err(RackError::SlotOutOfRange(slot));
        }
        let mut engine = factory::create_engine(id)?;
        let sample_rate = f32::from_bits(self.config.sample_rate_bits.load(Ordering::Relaxed));
        let max_frames = self.config.max_frames.load(Ordering::Relaxed) as usize;
        engine.prepare(sample_rate, max_frames);

        let command = RackCommand::SetEngine {
            slot,
            id,
            engine,
            mix_index: factory::mix_index(id),
        };
        if self.cmd_tx.push(command).is_err() {
            log::warn!("rack command queue full; engine change for slot {slot} dropped");
            return Ok(());
        }
        self.engine_ids[slot] = id;
        Ok(())
    }

    pub fn set_param(&self, slot: usize, index: usize, value: f32) {
        self.plane.set(slot, index, value);
    }

    pub fn param(&self, slot: usize, index: usize) -> f32 {
        self.plane.get(slot, index)
    }

    pub fn set_bypass(&self, slot: usize, bypass: bool) {
        self.plane.set_bypass(slot, bypass);
    }

    pub fn bypass(&self, slot: usize) -> bool {
        self.plane.bypass(slot)
    }

    pub fn engine_id(&self, slot: usize) -> u32 {
        self.engine_ids.get(slot).copied().unwrap_or(0)
    }

    pub fn counters(&self) -> &DspCounters {
        &self.counters
    }

    /// Drop engines the audio thread has retired. Call periodically from
    /// the control or resource thread. Returns how many were freed.
    pub fn reclaim(&mut self) -> usize {
        let mut freed = 0;
        while self.retire_rx.pop().is_ok() {
            freed += 1;
        }
        freed
    }

    /// Snapshot (engine id, bypass, parameters) for every slot.
    pub fn save_state(&self) -> RackState {
        let slots = (0..SLOT_COUNT)
            .map(|slot| SlotState {
                engine: self.engine_ids[slot],
                bypass: self.plane.bypass(slot),
                params: (0..MAX_PARAMS).map(|i| self.plane.get(slot, i)).collect(),
            })
            .collect();
        RackState { slots }
    }

    /// Restore a saved snapshot. Unknown engine ids leave their slot
    /// unchanged; extra or missing parameters are tolerated.
    pub fn load_state(&mut self, state: &RackState) -> Result<(), RackError> {
        for (slot, saved) in state.slots.iter().take(SLOT_COUNT).enumerate() {
            for (index, &value) in saved.params.iter().take(MAX_PARAMS).enumerate() {
                self.plane.set(slot, index, value);
            }
            self.plane.set_bypass(slot, saved.bypass);
            if let Err(err) = self.set_engine(slot, saved.engine) {
                log::warn!("slot {slot}: {err}; keeping current engine");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|n| (std::f32::consts::TAU * freq * n as f32 / 48_000.0).sin())
            .collect()
    }

    fn run(rack: &mut Rack, samples: &mut [f32]) {
        rack.process(&mut AudioBlock::mono(samples));
    }

    #[test]
    fn test_empty_rack_is_identity() {
        let (mut rack, _handle) = Rack::new(48_000.0, 512);
        let mut samples = sine(440.0, 512);
        let original = samples.clone();
        run(&mut rack, &mut samples);
        assert_eq!(samples, original);
    }

    #[test]
    fn test_engine_adopted_at_block_boundary() {
        let (mut rack, mut handle) = Rack::new(48_000.0, 512);
        handle.set_engine(0, 19).unwrap(); // Hard Clip
        handle.set_param(0, 0, 1.0); // heavy drive
        handle.set_param(0, 1, 0.1); // low threshold
        handle.set_param(0, 2, 1.0); // fully wet

        // First block adopts the engine; smoothed parameters settle over
        // the following blocks.
        let mut peak = 1.0;
        for _ in 0..8 {
            let mut samples = sine(440.0, 512);
            run(&mut rack, &mut samples);
            peak = samples.iter().fold(0.0f32, |a, &b| a.max(b.abs()));
        }
        assert!(peak < 0.2, "clip not applied: {peak}");
        assert_eq!(handle.reclaim(), 1);
    }

    #[test]
    fn test_bypass_skips_slot() {
        let (mut rack, mut handle) = Rack::new(48_000.0, 512);
        handle.set_engine(0, 19).unwrap();
        handle.set_param(0, 0, 1.0);
        handle.set_param(0, 2, 1.0);
        handle.set_bypass(0, true);

        let mut samples = sine(440.0, 512);
        let original = samples.clone();
        run(&mut rack, &mut samples);
        assert_eq!(samples, original);
    }

    #[test]
    fn test_mix_zero_short_circuits() {
        let (mut rack, mut handle) = Rack::new(48_000.0, 512);
        handle.set_engine(0, 18).unwrap(); // Soft Clip
        handle.set_param(0, 0, 1.0);
        handle.set_param(0, 2, 0.0); // mix zero

        let mut samples = sine(440.0, 512);
        let original = samples.clone();
        run(&mut rack, &mut samples);
        assert_eq!(samples, original, "mix 0 must leave the buffer untouched");
    }

    #[test]
    fn test_oversize_block_split_into_sub_blocks() {
        let (mut rack, mut handle) = Rack::new(48_000.0, 128);
        handle.set_engine(0, 18).unwrap();
        handle.set_param(0, 0, 0.5);
        handle.set_param(0, 2, 1.0);

        // Four times the prepared maximum: must process, not fail.
        let mut samples = sine(440.0, 512);
        run(&mut rack, &mut samples);
        assert!(samples.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_non_finite_input_scrubbed_and_counted() {
        let (mut rack, handle) = Rack::new(48_000.0, 512);
        let mut samples = sine(440.0, 512);
        samples[10] = f32::NAN;
        samples[20] = f32::INFINITY;
        run(&mut rack, &mut samples);
        assert!(samples.iter().all(|s| s.is_finite()));
        assert_eq!(handle.counters().scrubbed_samples(), 2);
    }

    #[test]
    fn test_unknown_engine_keeps_slot() {
        let (mut rack, mut handle) = Rack::new(48_000.0, 512);
        handle.set_engine(0, 18).unwrap();
        assert!(handle.set_engine(0, 9_999).is_err());

        let mut samples = sine(440.0, 512);
        run(&mut rack, &mut samples);
        assert_eq!(handle.engine_id(0), 18);
    }

    #[test]
    fn test_state_round_trip() {
        let (_rack, mut handle) = Rack::new(48_000.0, 512);
        handle.set_engine(1, 24).unwrap();
        handle.set_param(1, 0, 0.9);
        handle.set_param(1, 2, 0.7);
        handle.set_bypass(2, true);

        let state = handle.save_state();
        assert_eq!(state.slots[1].engine, 24);
        assert_eq!(state.slots[1].params[0], 0.9);
        assert!(state.slots[2].bypass);

        let (_rack2, mut handle2) = Rack::new(48_000.0, 512);
        handle2.load_state(&state).unwrap();
        assert_eq!(handle2.engine_id(1), 24);
        assert_eq!(handle2.param(1, 0), 0.9);
        assert!(handle2.bypass(2));
    }

    #[test]
    fn test_stereo_block_processing() {
        let (mut rack, mut handle) = Rack::new(48_000.0, 512);
        handle.set_engine(0, 1).unwrap(); // Gain
        handle.set_param(0, 0, 0.5); // unity
        handle.set_param(0, 1, 0.5); // centered

        let mut left = sine(440.0, 512);
        let mut right = sine(220.0, 512);
        rack.process(&mut AudioBlock::stereo(&mut left, &mut right));
        assert!(left.iter().all(|s| s.is_finite()));
        assert!(right.iter().all(|s| s.is_finite()));
    }
}
