//! Error taxonomy for the frame core.
//!
//! Nothing in here is fatal to the stream. The pipeline recovers every
//! [`StageError`] by passing the previous image through unchanged, and a
//! zero-extent input frame is skipped rather than reported.

use thiserror::Error;

/// Malformed pixel buffers, rejected when a [`crate::frame::Frame`] is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame dimensions overflowed usize")]
    DimensionsOverflow,
    #[error("RGBA buffer length mismatch: expected {expected} bytes, got {actual} bytes")]
    BufferLengthMismatch { expected: usize, actual: usize },
    #[error("frame of {bytes} bytes exceeds the {limit} byte budget")]
    TooLarge { bytes: usize, limit: usize },
}

/// Failures of a processing stage. Every variant degrades to pass-through.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageError {
    /// The kernel was never loaded (not found, failed to compile, no device).
    #[error("kernel '{kernel}' is unavailable")]
    Unavailable { kernel: &'static str },
    /// The kernel exists but failed while processing this frame.
    #[error("kernel '{kernel}' failed: {message}")]
    Kernel {
        kernel: &'static str,
        message: String,
    },
    /// Caller-supplied parameters that cannot be sanitized.
    #[error("invalid frame parameters: {0}")]
    Parameters(#[from] ParameterError),
}

impl StageError {
    pub fn kernel(kernel: &'static str, message: impl Into<String>) -> Self {
        Self::Kernel {
            kernel,
            message: message.into(),
        }
    }
}

/// A control-surface value that cannot be clamped into range.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ParameterError {
    #[error("{field} must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f32 },
}
