//! Associative memory state and the delta-rule update.
//!
//! A `K×D` matrix functions as a content-addressable memory trained online:
//! every observed frame is simultaneously a read and a write, one rank-1
//! correction per tick, with no separate training phase.
//!
//! # The update
//!
//! For a write vector `w` (the normalized frame) and key `k`:
//!
//! ```text
//! read  = k · state            (reconstruction from the pre-update state)
//! delta = w - read             (prediction error)
//! state += beta · outer(delta, k)ᵀ
//! ```
//!
//! This is a Widrow–Hoff delta rule over a linear key→frame map — one step
//! of online least-squares correction per frame. With `beta` near 1 and
//! near-orthonormal keys, a single exposure stores a frame almost exactly;
//! repeated similar keys overwrite older associations, which is the intended
//! recency behavior, not a defect.
//!
//! The returned read vector is always computed *before* the state mutation,
//! so tick `n`'s reconstruction reflects exactly frames `1..n-1`.
//!
//! # Usage
//!
//! ```rust
//! use echoic::AssociativeMemory;
//!
//! let mut memory = AssociativeMemory::new(2, 4, 1.0).unwrap();
//! let write = vec![1.0, 0.0, 0.0, 0.0];
//! let key = vec![1.0, 0.0];
//!
//! let read = memory.update(&write, &key).unwrap();
//! assert_eq!(read, vec![0.0; 4]); // empty memory reads zero
//!
//! let read = memory.update(&write, &key).unwrap();
//! assert_eq!(read, write); // exact recall after one exposure
//! ```

use serde::Serialize;

use crate::error::{EchoicError, Result, TickFault};
use crate::math;

/// Display-ready copy of the memory state for publication to sinks.
///
/// Handed to visualizers/playback collaborators that defer consumption to
/// another thread — the live matrix is never aliased across threads. This is
/// an export format, not a restore format: memory state does not survive
/// process restarts.
#[derive(Clone, Debug, Serialize)]
pub struct StateSnapshot {
    pub key_dim: usize,
    pub frame_len: usize,
    /// Updates applied so far (skipped ticks not counted).
    pub ticks: u64,
    /// Flat row-major `key_dim × frame_len`.
    pub state: Vec<f64>,
}

/// Online associative memory over a `K×D` state matrix.
///
/// The matrix is the sole mutable numerical state in the engine. It is
/// mutated exactly once per admitted frame by [`update`](Self::update), in
/// place, by its single owner. Shape and learning rate are fixed for the
/// lifetime of the value.
#[derive(Clone, Debug)]
pub struct AssociativeMemory {
    key_dim: usize,
    frame_len: usize,
    beta: f64,
    /// Flat row-major: `state[k * frame_len + d]`.
    state: Vec<f64>,
    ticks: u64,
}

impl AssociativeMemory {
    /// Create a zeroed memory.
    ///
    /// `beta` is the learning rate in `(0, 1]` scaling each correction.
    pub fn new(key_dim: usize, frame_len: usize, beta: f64) -> Result<Self> {
        if key_dim == 0 || frame_len == 0 {
            return Err(EchoicError::InvalidConfig(format!(
                "memory dimensions must be positive, got {}x{}",
                key_dim, frame_len
            )));
        }
        if !(beta.is_finite() && beta > 0.0 && beta <= 1.0) {
            return Err(EchoicError::InvalidConfig(format!(
                "beta must be in (0, 1], got {}",
                beta
            )));
        }
        Ok(Self {
            key_dim,
            frame_len,
            beta,
            state: vec![0.0; key_dim * frame_len],
            ticks: 0,
        })
    }

    pub fn key_dim(&self) -> usize {
        self.key_dim
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Number of updates applied (skipped ticks do not count).
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Read-only view of the state matrix (row-major `K × D`).
    pub fn state(&self) -> &[f64] {
        &self.state
    }

    /// Reconstruct a frame from the current state without mutating it.
    ///
    /// `read[d] = Σ_k key[k] · state[k·D + d]`
    ///
    /// # Panics
    /// Panics if `key.len() != self.key_dim()`.
    pub fn read(&self, key: &[f64]) -> Vec<f64> {
        assert_eq!(
            key.len(),
            self.key_dim,
            "Expected key_dim={}, got {}",
            self.key_dim,
            key.len()
        );

        let d_len = self.frame_len;
        let mut read = vec![0.0; d_len];
        for (k, &kv) in key.iter().enumerate() {
            if kv == 0.0 {
                continue;
            }
            let row = &self.state[k * d_len..(k + 1) * d_len];
            for (r, &s) in read.iter_mut().zip(row.iter()) {
                *r += kv * s;
            }
        }
        read
    }

    /// Apply one delta-rule update and return the pre-update reconstruction.
    ///
    /// If `write` or `key` contains a non-finite value the state is left
    /// untouched and the tick is reported as a recoverable
    /// [`TickFault::NonFinite`] — a capture glitch must never corrupt the
    /// accumulated state.
    ///
    /// # Panics
    /// Panics if `write.len() != self.frame_len()` or
    /// `key.len() != self.key_dim()`.
    pub fn update(
        &mut self,
        write: &[f64],
        key: &[f64],
    ) -> std::result::Result<Vec<f64>, TickFault> {
        assert_eq!(
            write.len(),
            self.frame_len,
            "Expected frame_len={}, got {}",
            self.frame_len,
            write.len()
        );
        assert_eq!(
            key.len(),
            self.key_dim,
            "Expected key_dim={}, got {}",
            self.key_dim,
            key.len()
        );

        // Guard BEFORE any mutation: a poisoned update is unrecoverable.
        if let Some(index) = math::first_non_finite(write) {
            return Err(TickFault::NonFinite {
                stage: "write",
                index,
            });
        }
        if let Some(index) = math::first_non_finite(key) {
            return Err(TickFault::NonFinite {
                stage: "key",
                index,
            });
        }

        let read = self.read(key);

        // state[k·D + d] += beta · (write[d] - read[d]) · key[k]
        let d_len = self.frame_len;
        let beta = self.beta;
        for (k, &kv) in key.iter().enumerate() {
            if kv == 0.0 {
                continue;
            }
            let scale = beta * kv;
            let row = &mut self.state[k * d_len..(k + 1) * d_len];
            for ((s, &w), &r) in row.iter_mut().zip(write.iter()).zip(read.iter()) {
                *s += scale * (w - r);
            }
        }
        self.ticks += 1;

        Ok(read)
    }

    /// Export a display-ready copy of the state.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            key_dim: self.key_dim,
            frame_len: self.frame_len,
            ticks: self.ticks,
            state: self.state.clone(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
