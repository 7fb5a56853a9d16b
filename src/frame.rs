//! Frame normalization: raw capture samples → bounded write vector.
//!
//! Capture devices hand over frames at arbitrary amplitude (typically signed
//! 16-bit samples). Before a frame is written into the associative memory it
//! is scaled into a bounded numerical regime, otherwise the state matrix
//! grows without bound under loud input.
//!
//! # Policy choice
//!
//! Two admissible policies, fixed per configuration:
//!
//! - [`FrameScalePolicy::FullScale`] divides by a fixed full-scale constant.
//!   With the default divisor of 65536.0, i16 samples land in roughly
//!   [-0.5, 0.5]. Amplitude information is preserved: quiet input writes
//!   weakly, loud input writes strongly.
//! - [`FrameScalePolicy::UnitNorm`] divides by the frame's own L2 norm plus
//!   a stabilizing constant, producing unit-scale vectors robust to
//!   loud/quiet swings. The stabilizer keeps the denominator strictly
//!   positive for silent frames.

use serde::{Deserialize, Serialize};

use crate::error::{EchoicError, Result};
use crate::math;

/// How a raw frame is scaled into a write vector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FrameScalePolicy {
    /// Divide every sample by a fixed full-scale constant.
    FullScale {
        /// Full-scale divisor (65536.0 maps i16 range to ~[-0.5, 0.5])
        divisor: f64,
    },

    /// Divide by the frame's L2 norm plus a stabilizer.
    UnitNorm {
        /// Additive constant keeping the denominator positive for silence
        stabilizer: f64,
    },
}

impl Default for FrameScalePolicy {
    fn default() -> Self {
        FrameScalePolicy::FullScale { divisor: 65536.0 }
    }
}

impl FrameScalePolicy {
    /// Reject non-positive or non-finite policy parameters.
    pub(crate) fn validate(&self) -> Result<()> {
        let (name, value) = match *self {
            FrameScalePolicy::FullScale { divisor } => ("divisor", divisor),
            FrameScalePolicy::UnitNorm { stabilizer } => ("stabilizer", stabilizer),
        };
        if !(value.is_finite() && value > 0.0) {
            return Err(EchoicError::InvalidConfig(format!(
                "frame scale {} must be positive and finite, got {}",
                name, value
            )));
        }
        Ok(())
    }
}

/// Converts raw captured frames into bounded write vectors.
#[derive(Clone, Copy, Debug)]
pub struct FrameNormalizer {
    policy: FrameScalePolicy,
}

impl FrameNormalizer {
    pub fn new(policy: FrameScalePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> FrameScalePolicy {
        self.policy
    }

    /// Scale a raw frame according to the configured policy.
    ///
    /// Never divides by zero: the full-scale divisor is validated positive
    /// at configuration time, and the unit-norm denominator carries the
    /// stabilizer.
    pub fn normalize(&self, raw: &[f64]) -> Vec<f64> {
        let scale = match self.policy {
            FrameScalePolicy::FullScale { divisor } => 1.0 / divisor,
            FrameScalePolicy::UnitNorm { stabilizer } => 1.0 / (math::l2_norm(raw) + stabilizer),
        };
        raw.iter().map(|s| s * scale).collect()
    }
}
