pub mod block;
pub mod dsp; // Allocation-free signal-processing primitives
pub mod engines; // Engine contract, factory, and the effect catalog
pub mod error;
pub mod params;
pub mod rack;

pub use block::AudioBlock;
pub use engines::Engine;
pub use rack::{Rack, RackHandle};

/// Largest block the rack will hand to an engine in one `process` call.
/// Hosts may deliver more; the rack splits into sub-blocks of this size.
pub const MAX_BLOCK_SIZE: usize = 2048;

/// Number of effect slots in the rack.
pub const SLOT_COUNT: usize = 6;

/// Upper bound on per-engine parameters exposed to the host.
pub const MAX_PARAMS: usize = 15;
