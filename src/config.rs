//! Engine configuration.
//!
//! All recognized parameters live in [`EngineConfig`]: frame width, key
//! dimension, sample rate, learning rate, random seed, and the two
//! normalization policies. A config is validated before any component is
//! constructed — an invalid configuration is fatal and the loop never
//! starts.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EchoicError, Result};
use crate::frame::FrameScalePolicy;
use crate::projector::KeyNormPolicy;

/// Configuration for the echoic engine.
///
/// Defaults mirror the reference capture setup: 2048-sample frames at
/// 44.1 kHz, 32-dimensional keys, full learning rate, full-scale frame
/// normalization, unit-normalized keys.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frame width `D`: samples per captured frame.
    pub frame_len: usize,
    /// Key dimension `K`.
    pub key_dim: usize,
    /// Capture sample rate in Hz (collaborator configuration, echoed here
    /// so one document describes a run).
    pub sample_rate: u32,
    /// Learning rate `beta` in `(0, 1]`.
    pub beta: f64,
    /// Seed for the projection matrix. Same seed, same matrix.
    pub seed: u64,
    /// How raw frames are scaled into write vectors.
    pub frame_scale: FrameScalePolicy,
    /// Whether projected keys are L2-normalized.
    pub key_norm: KeyNormPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_len: 2048,
            key_dim: 32,
            sample_rate: 44_100,
            beta: 1.0,
            seed: 0,
            frame_scale: FrameScalePolicy::default(),
            key_norm: KeyNormPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Validate every parameter. Called by the engine constructor; callers
    /// building components by hand can invoke it directly.
    pub fn validate(&self) -> Result<()> {
        if self.frame_len == 0 {
            return Err(EchoicError::InvalidConfig(
                "frame_len must be positive".into(),
            ));
        }
        if self.key_dim == 0 {
            return Err(EchoicError::InvalidConfig(
                "key_dim must be positive".into(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(EchoicError::InvalidConfig(
                "sample_rate must be positive".into(),
            ));
        }
        if !(self.beta.is_finite() && self.beta > 0.0 && self.beta <= 1.0) {
            return Err(EchoicError::InvalidConfig(format!(
                "beta must be in (0, 1], got {}",
                self.beta
            )));
        }
        self.frame_scale.validate()?;
        self.key_norm.validate()?;
        Ok(())
    }

    /// Parse and validate a JSON config document.
    ///
    /// Unspecified fields take their defaults, so a partial document like
    /// `{"frame_len": 4096, "key_dim": 8}` is a complete configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}
