//! Key projection: a fixed random map from frame space to key space.
//!
//! The projector owns the `D×K` matrix `to_key` that addresses the
//! associative memory. It is generated once from a seed and never mutated:
//! the same seed reproduces the same matrix bit-for-bit, on any machine.
//!
//! Entries are random signs scaled by `1/sqrt(K)`, so projecting a bounded
//! frame yields a bounded key regardless of the key dimension.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{EchoicError, Result};
use crate::math;

/// Whether the projected key is L2-normalized before addressing the memory.
///
/// The two variants correspond to the two behaviors observed in practice:
/// normalized keys give scale-invariant addressing and faster convergence
/// with correlated input; raw keys let frame energy modulate the write
/// strength. `Unit` is the default.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum KeyNormPolicy {
    /// Divide the projected key by its L2 norm.
    ///
    /// If the norm is at or below `epsilon` the key is treated as all-zero,
    /// which makes the whole tick a state-preserving no-op: a zero key reads
    /// zero and writes a zero rank-1 correction.
    Unit {
        /// Norm floor guarding the division
        epsilon: f64,
    },

    /// Use the raw projection unchanged.
    Raw,
}

impl Default for KeyNormPolicy {
    fn default() -> Self {
        KeyNormPolicy::Unit { epsilon: 1e-10 }
    }
}

impl KeyNormPolicy {
    pub(crate) fn validate(&self) -> Result<()> {
        if let KeyNormPolicy::Unit { epsilon } = *self {
            if !(epsilon.is_finite() && epsilon > 0.0) {
                return Err(EchoicError::InvalidConfig(format!(
                    "key norm epsilon must be positive and finite, got {}",
                    epsilon
                )));
            }
        }
        Ok(())
    }
}

/// Fixed random projection from a `D`-length frame to a `K`-length key.
#[derive(Clone, Debug)]
pub struct KeyProjector {
    frame_len: usize,
    key_dim: usize,
    policy: KeyNormPolicy,
    /// Flat row-major `frame_len × key_dim`: `to_key[d * key_dim + k]`.
    to_key: Vec<f64>,
}

impl KeyProjector {
    /// Create a projector with a deterministic matrix for the given seed.
    ///
    /// Fails fast on zero dimensions or an invalid normalization policy —
    /// the streaming loop must never start over a malformed projection.
    pub fn new(
        frame_len: usize,
        key_dim: usize,
        seed: u64,
        policy: KeyNormPolicy,
    ) -> Result<Self> {
        if frame_len == 0 || key_dim == 0 {
            return Err(EchoicError::InvalidConfig(format!(
                "projection dimensions must be positive, got {}x{}",
                frame_len, key_dim
            )));
        }
        policy.validate()?;
        Ok(Self {
            frame_len,
            key_dim,
            policy,
            to_key: Self::generate_matrix(frame_len, key_dim, seed),
        })
    }

    /// Deterministically generate the projection matrix.
    ///
    /// The seed is domain-separated through SHA-256 so the projector's
    /// random stream never collides with other seeded consumers of the same
    /// configuration seed. Entries are `±1/sqrt(K)`.
    fn generate_matrix(frame_len: usize, key_dim: usize, seed: u64) -> Vec<f64> {
        let mut hasher = Sha256::new();
        hasher.update(seed.to_le_bytes());
        hasher.update(b"to_key");
        let hash = hasher.finalize();
        let derived_seed = u64::from_le_bytes(hash[0..8].try_into().unwrap());

        let mut rng = ChaCha8Rng::seed_from_u64(derived_seed);
        let scale = 1.0 / (key_dim as f64).sqrt();

        (0..frame_len * key_dim)
            .map(|_| {
                let r = rng.next_u32();
                if r & 1 == 0 {
                    scale
                } else {
                    -scale
                }
            })
            .collect()
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn key_dim(&self) -> usize {
        self.key_dim
    }

    pub fn policy(&self) -> KeyNormPolicy {
        self.policy
    }

    /// Read-only view of the projection matrix (row-major `D × K`).
    pub fn matrix(&self) -> &[f64] {
        &self.to_key
    }

    /// Raw projection: `key_raw[k] = Σ_d write[d] · to_key[d·K + k]`.
    ///
    /// No side effects, no normalization.
    ///
    /// # Panics
    /// Panics if `write.len() != self.frame_len()`.
    pub fn project(&self, write: &[f64]) -> Vec<f64> {
        assert_eq!(
            write.len(),
            self.frame_len,
            "Expected frame_len={}, got {}",
            self.frame_len,
            write.len()
        );

        let k_dim = self.key_dim;
        let mut key = vec![0.0; k_dim];
        for (d, &w) in write.iter().enumerate() {
            if w == 0.0 {
                continue;
            }
            let base = d * k_dim;
            for (k, out) in key.iter_mut().enumerate() {
                *out += w * self.to_key[base + k];
            }
        }
        key
    }

    /// Project and apply the configured key normalization.
    pub fn key(&self, write: &[f64]) -> Vec<f64> {
        let mut key = self.project(write);
        if let KeyNormPolicy::Unit { epsilon } = self.policy {
            let norm = math::l2_norm(&key);
            if norm <= epsilon {
                key.fill(0.0);
            } else {
                for v in &mut key {
                    *v /= norm;
                }
            }
        }
        key
    }
}
