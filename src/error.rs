//! Error types for echoic.
//!
//! Two tiers, matching how faults propagate at runtime: [`EchoicError`] is
//! fatal (bad configuration, construction-time shape mismatch — the loop
//! must never start), while [`TickFault`] and [`CaptureFault`] describe
//! per-tick conditions the streaming loop absorbs and continues past.

use thiserror::Error;

/// Fatal errors. Raised at construction/configuration time only.
#[derive(Error, Debug)]
pub enum EchoicError {
    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Construction-time shape mismatch
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Configuration file could not be read
    #[error("config IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration JSON could not be parsed
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Recoverable per-tick faults.
///
/// When `step`/`update` returns one of these, the memory state is guaranteed
/// untouched for that tick. The loop logs the fault, counts it, and awaits
/// the next frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TickFault {
    /// A NaN or Inf reached the update (e.g. from a capture glitch)
    #[error("non-finite value in {stage} vector at index {index}")]
    NonFinite {
        /// Which vector carried the bad value ("write" or "key")
        stage: &'static str,
        index: usize,
    },

    /// The captured frame does not have the configured width
    #[error("frame length {got} does not match configured width {expected}")]
    FrameLength { expected: usize, got: usize },
}

/// Conditions reported by a capture collaborator ([`FrameSource`]).
///
/// `Overflow` and `Timeout` are recoverable (the tick is skipped);
/// `Closed` ends the run cleanly.
///
/// [`FrameSource`]: crate::stream::FrameSource
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureFault {
    /// The capture buffer overflowed and the frame was lost
    #[error("capture buffer overflowed")]
    Overflow,

    /// No frame arrived within the bounded wait
    #[error("no frame available within the capture timeout")]
    Timeout,

    /// The source has shut down and will produce no more frames
    #[error("capture source closed")]
    Closed,
}

/// Result type alias for fallible echoic operations.
pub type Result<T> = std::result::Result<T, EchoicError>;
