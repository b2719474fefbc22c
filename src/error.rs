//! Error types for resource-thread work.
//!
//! The audio path is infallible by construction: `process` never returns a
//! `Result`. Errors only arise when loading resources (impulse responses)
//! or constructing engines on the control/resource threads.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IrError {
    #[error("failed to read impulse response: {0}")]
    Io(#[from] hound::Error),

    #[error("impulse response is empty")]
    Empty,

    #[error("impulse response too long: {got} samples (max {max})")]
    TooLong { got: usize, max: usize },
}

#[derive(Debug, Error)]
pub enum RackError {
    #[error("unknown engine id {0}")]
    UnknownEngine(u32),

    #[error("slot index {0} out of range")]
    SlotOutOfRange(usize),

    #[error(transparent)]
    Ir(#[from] IrError),
}
