//! # Echoic: streaming associative audio memory
//!
//! Echoic maintains an online associative memory over a stream of fixed-size
//! audio frames. Each tick, one frame is normalized, projected to a
//! low-dimensional key, and written into a `K×D` state matrix by a delta
//! (error-correction) rule; the memory's reconstruction of the frame — read
//! back *before* the write — is handed downstream for playback or
//! visualization.
//!
//! ## Quick Start
//!
//! ```rust
//! use echoic::{Echoic, EngineConfig};
//!
//! let config = EngineConfig {
//!     frame_len: 256,
//!     key_dim: 8,
//!     ..EngineConfig::default()
//! };
//! let mut engine = Echoic::new(config).unwrap();
//!
//! // One compute cycle: normalize → project → delta update → read-back.
//! let frame = vec![100.0; 256];
//! let tick = engine.step(&frame).unwrap();
//! assert_eq!(tick.read.len(), 256);
//! ```
//!
//! ## Core Concepts
//!
//! - **Write vector**: the captured frame scaled into a bounded regime
//!   ([`FrameNormalizer`])
//! - **Key**: a fixed seeded random projection of the write vector,
//!   addressing the memory ([`KeyProjector`])
//! - **Delta rule**: one rank-1 correction of the state per frame
//!   ([`AssociativeMemory`])
//! - **Read-back**: the reconstruction from the pre-update state, published
//!   each tick
//! - **Streaming loop**: one tick per captured frame, compute unconditional,
//!   publication throttleable ([`StreamLoop`])
//!
//! Determinism is a hard guarantee: the same seed, dimensions, and frame
//! sequence reproduce the same `(state, read)` sequence on any machine.

pub mod config;
pub mod error;
pub mod frame;
pub mod math;
pub mod memory;
pub mod projector;
pub mod stream;

// Re-exports for convenience
pub use config::EngineConfig;
pub use error::{CaptureFault, EchoicError, Result, TickFault};
pub use frame::{FrameNormalizer, FrameScalePolicy};
pub use memory::{AssociativeMemory, StateSnapshot};
pub use projector::{KeyNormPolicy, KeyProjector};
pub use stream::{FrameSink, FrameSource, LoopOptions, LoopStats, StreamLoop, TickSnapshot};

/// Everything one compute cycle produces.
///
/// All three vectors are transient: nothing here is retained between ticks
/// except the state mutation already applied inside the engine.
#[derive(Clone, Debug)]
pub struct Tick {
    /// The normalized frame that was written into memory.
    pub write: Vec<f64>,
    /// The key that addressed the memory.
    pub key: Vec<f64>,
    /// Reconstruction from the state as it stood *before* this tick's write.
    pub read: Vec<f64>,
}

/// The engine facade — primary interface for per-frame compute.
///
/// Owns the three numerical components and threads the state explicitly:
/// no ambient globals, a single mutable owner. The streaming loop
/// ([`StreamLoop`]) drives an `Echoic` once per captured frame; embedders
/// with their own scheduling can call [`step`](Self::step) directly.
///
/// # Example
///
/// ```rust
/// use echoic::{Echoic, EngineConfig};
///
/// let mut engine = Echoic::new(EngineConfig {
///     frame_len: 64,
///     key_dim: 4,
///     ..EngineConfig::default()
/// })
/// .unwrap();
///
/// // Same seed + same frames = same read-backs, bit for bit.
/// let frame: Vec<f64> = (0..64).map(|i| (i as f64 * 0.2).sin()).collect();
/// let first = engine.step(&frame).unwrap();
/// assert_eq!(first.read, vec![0.0; 64]); // empty memory reads silence
/// ```
#[derive(Clone)]
pub struct Echoic {
    config: EngineConfig,
    normalizer: FrameNormalizer,
    projector: KeyProjector,
    memory: AssociativeMemory,
}

impl Echoic {
    /// Validate the configuration and build the engine.
    ///
    /// Fails fast on invalid dimensions, learning rate, or policy
    /// parameters — a bad configuration must never reach the loop.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let normalizer = FrameNormalizer::new(config.frame_scale);
        let projector = KeyProjector::new(
            config.frame_len,
            config.key_dim,
            config.seed,
            config.key_norm,
        )?;
        let memory = AssociativeMemory::new(config.key_dim, config.frame_len, config.beta)?;
        Ok(Self {
            config,
            normalizer,
            projector,
            memory,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn memory(&self) -> &AssociativeMemory {
        &self.memory
    }

    pub fn projector(&self) -> &KeyProjector {
        &self.projector
    }

    /// Run one full compute cycle on a raw captured frame.
    ///
    /// Normalize → project-to-key → delta update, in that order, exactly
    /// once. On any recoverable fault (wrong frame length, non-finite
    /// values) the memory state is untouched and the caller may simply
    /// proceed to the next frame.
    pub fn step(&mut self, raw: &[f64]) -> std::result::Result<Tick, TickFault> {
        if raw.len() != self.config.frame_len {
            return Err(TickFault::FrameLength {
                expected: self.config.frame_len,
                got: raw.len(),
            });
        }

        let write = self.normalizer.normalize(raw);
        if let Some(index) = math::first_non_finite(&write) {
            return Err(TickFault::NonFinite {
                stage: "write",
                index,
            });
        }

        let key = self.projector.key(&write);
        let read = self.memory.update(&write, &key)?;

        Ok(Tick { write, key, read })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> EngineConfig {
        EngineConfig {
            frame_len: 32,
            key_dim: 4,
            seed: 42,
            ..EngineConfig::default()
        }
    }

    fn test_frames(n: usize, len: usize) -> Vec<Vec<f64>> {
        (0..n)
            .map(|t| {
                (0..len)
                    .map(|i| 1000.0 * ((i + 1) as f64 * (t + 1) as f64 * 0.01).sin())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_engine_construction() {
        let engine = Echoic::new(small_config()).unwrap();
        assert_eq!(engine.config().frame_len, 32);
        assert_eq!(engine.memory().ticks(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            key_dim: 0,
            ..EngineConfig::default()
        };
        assert!(Echoic::new(config).is_err());
    }

    #[test]
    fn test_determinism_across_runs() {
        let frames = test_frames(20, 32);

        let mut a = Echoic::new(small_config()).unwrap();
        let mut b = Echoic::new(small_config()).unwrap();

        for frame in &frames {
            let ta = a.step(frame).unwrap();
            let tb = b.step(frame).unwrap();
            assert_eq!(ta.key, tb.key);
            assert_eq!(ta.read, tb.read);
            assert_eq!(a.memory().state(), b.memory().state());
        }
    }

    #[test]
    fn test_different_seed_different_keys() {
        let frames = test_frames(1, 32);
        let mut a = Echoic::new(small_config()).unwrap();
        let mut b = Echoic::new(EngineConfig {
            seed: 43,
            ..small_config()
        })
        .unwrap();
        assert_ne!(a.step(&frames[0]).unwrap().key, b.step(&frames[0]).unwrap().key);
    }

    #[test]
    fn test_wrong_frame_length_is_recoverable() {
        let mut engine = Echoic::new(small_config()).unwrap();
        let fault = engine.step(&[1.0; 16]).unwrap_err();
        assert_eq!(
            fault,
            TickFault::FrameLength {
                expected: 32,
                got: 16
            }
        );
        assert_eq!(engine.memory().ticks(), 0);

        // A correct frame right after is processed normally.
        assert!(engine.step(&test_frames(1, 32)[0]).is_ok());
        assert_eq!(engine.memory().ticks(), 1);
    }

    #[test]
    fn test_non_finite_frame_is_recoverable() {
        let mut engine = Echoic::new(small_config()).unwrap();
        let mut bad = test_frames(1, 32).remove(0);
        bad[5] = f64::NAN;

        let fault = engine.step(&bad).unwrap_err();
        assert!(matches!(fault, TickFault::NonFinite { stage: "write", .. }));
        assert!(engine.memory().state().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_repeated_frame_converges_to_recall() {
        // With unit keys and beta=1, the second exposure of a frame reads it
        // back exactly.
        let mut engine = Echoic::new(small_config()).unwrap();
        let frame = test_frames(1, 32).remove(0);

        let first = engine.step(&frame).unwrap();
        assert_eq!(first.read, vec![0.0; 32]);

        let second = engine.step(&frame).unwrap();
        for (r, w) in second.read.iter().zip(second.write.iter()) {
            assert!((r - w).abs() < 1e-9, "recall should be exact: {} vs {}", r, w);
        }
    }
}
