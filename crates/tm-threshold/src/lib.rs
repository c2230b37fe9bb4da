//! Threshold signature shares for the trip master decision engine.
//!
//! Each replica holds a Shamir share `x_i` of a group signing key. A
//! [`Contribution`] is a non-interactive Schnorr proof of knowledge of `x_i`
//! over a fixed payload (a `{state, dts}` pair): it is simultaneously
//!
//! - an individually-verifiable proof against the replica's own public share
//!   `y_i = g^{x_i}` (used by the aggregator to accept or drop an incoming
//!   share before it is ever stored), and
//! - one term of an aggregate one-step threshold identification equation that,
//!   once F+1 contributions for the same payload are collected, verifies
//!   against the single group public key `Y = g^x` without ever
//!   reconstructing `x`.
//!
//! # Security
//!
//! Proven secure under the (t-1)-OMDL assumption in the random oracle model.
//!
//! # Example
//!
//! ```ignore
//! use tm_threshold::{SecretShare, verify};
//!
//! let share = SecretShare::new(index, scalar);
//! let contribution = share.contribute(&mut rng, &payload);
//!
//! let valid = verify(&group_pubkey, &contributions, threshold, &payload)?;
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;
use sha2::{Digest, Sha512};

pub mod curve;
mod error;
mod lagrange;
mod types;

pub use curve::{ThresholdCurve, ThresholdPoint, ThresholdScalar};
pub use curve::ristretto::Ristretto255;
pub use error::ThresholdError;
pub use lagrange::compute_lagrange_coefficients;
pub use types::*;

/// Hash a commitment and payload to a scalar challenge: `H(u_i || payload) -> c_i`.
pub fn hash_to_challenge<S: ThresholdScalar, P: ThresholdPoint<Scalar = S>>(
    commitment: &P,
    payload: &[u8],
) -> S {
    let mut hasher = Sha512::new();
    hasher.update(commitment.compress());
    hasher.update(payload);
    let hash: [u8; 64] = hasher.finalize().into();
    S::from_bytes_wide(&hash)
}

/// A replica's Shamir share of the group signing key.
#[derive(Clone, Debug)]
pub struct SecretShare<S: ThresholdScalar> {
    /// Replica index (1-indexed, matches the TM replica id).
    pub index: u32,
    /// The secret scalar `x_i`.
    pub scalar: S,
}

impl<S: ThresholdScalar> SecretShare<S> {
    pub fn new(index: u32, scalar: S) -> Self {
        assert!(index > 0, "index must be 1-indexed");
        Self { index, scalar }
    }

    /// Generate a contribution (Schnorr proof) over `payload`.
    ///
    /// Returns `(u_i, s_i)` where:
    /// - `u_i = g^{r_i}` (commitment)
    /// - `s_i = r_i + c_i * x_i` (response)
    /// - `c_i = H(u_i || payload)`
    pub fn contribute<P: ThresholdPoint<Scalar = S>, R: rand_core::RngCore + rand_core::CryptoRng>(
        &self,
        rng: &mut R,
        payload: &[u8],
    ) -> Contribution<P> {
        let r = S::random(rng);
        let commitment = P::generator().mul_scalar(&r);
        let challenge: S = hash_to_challenge(&commitment, payload);
        let response = r.add(&challenge.mul(&self.scalar));

        Contribution {
            index: self.index,
            commitment,
            response,
        }
    }

    /// Derive this replica's public share `y_i = g^{x_i}`.
    pub fn public_share<P: ThresholdPoint<Scalar = S>>(&self) -> P {
        P::generator().mul_scalar(&self.scalar)
    }
}

/// A single replica's contribution toward a combined threshold signature.
#[derive(Clone, Debug)]
pub struct Contribution<P: ThresholdPoint> {
    /// Replica index (1-indexed).
    pub index: u32,
    /// Schnorr commitment `u_i = g^{r_i}`.
    pub commitment: P,
    /// Schnorr response `s_i = r_i + c_i * x_i`.
    pub response: P::Scalar,
}

impl<P: ThresholdPoint> Contribution<P> {
    pub fn new(index: u32, commitment: P, response: P::Scalar) -> Self {
        Self {
            index,
            commitment,
            response,
        }
    }

    /// Verify this contribution alone, against the replica's own public
    /// share. This is the accept-rule check the aggregator runs before
    /// storing an incoming share: it does not require the group key or any
    /// other replica's contribution.
    pub fn verify_individual(&self, public_share: &P, payload: &[u8]) -> bool {
        let challenge: P::Scalar = hash_to_challenge(&self.commitment, payload);
        let lhs = P::generator().mul_scalar(&self.response);
        let rhs = self.commitment.add(&public_share.mul_scalar(&challenge));
        lhs == rhs
    }

    pub fn to_bytes(&self) -> [u8; 68] {
        let mut buf = [0u8; 68];
        buf[0..4].copy_from_slice(&self.index.to_le_bytes());
        buf[4..36].copy_from_slice(&self.commitment.compress());
        buf[36..68].copy_from_slice(&self.response.to_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8; 68]) -> Result<Self, ThresholdError> {
        let index = u32::from_le_bytes(bytes[0..4].try_into().unwrap());

        let point_bytes: [u8; 32] = bytes[4..36].try_into().unwrap();
        let commitment = P::decompress(&point_bytes).ok_or(ThresholdError::InvalidCommitment)?;

        let response_bytes: [u8; 32] = bytes[36..68].try_into().unwrap();
        let response = P::Scalar::from_canonical_bytes(&response_bytes)
            .ok_or(ThresholdError::InvalidResponse)?;

        Ok(Self {
            index,
            commitment,
            response,
        })
    }
}

/// Compute weights and normalizer for the combine-verify equation.
///
/// Given contributions with indices `Q = {i_1, ..., i_k}` and challenges `c_i`:
/// - `c̄ = Π c_i` (normalizer)
/// - `μ_i = λ_i * Π_{j≠i} c_j` (weight for index i)
///
/// Where `λ_i` are Lagrange coefficients for set Q.
pub fn compute_weights<P: ThresholdPoint>(
    contributions: &[Contribution<P>],
    payload: &[u8],
) -> Result<(P::Scalar, Vec<P::Scalar>), ThresholdError> {
    if contributions.is_empty() {
        return Err(ThresholdError::EmptyContributions);
    }

    let k = contributions.len();

    let challenges: Vec<P::Scalar> = contributions
        .iter()
        .map(|c| hash_to_challenge(&c.commitment, payload))
        .collect();

    for c in &challenges {
        if c == &P::Scalar::zero() {
            return Err(ThresholdError::ZeroChallenge);
        }
    }

    let normalizer: P::Scalar = challenges
        .iter()
        .fold(P::Scalar::one(), |acc, c| acc.mul(c));

    let indices: Vec<u32> = contributions.iter().map(|c| c.index).collect();
    let lagrange = compute_lagrange_coefficients::<P::Scalar>(&indices)?;

    let mut weights: Vec<P::Scalar> = Vec::with_capacity(k);
    for i in 0..k {
        let mut weight = lagrange[i].clone();
        for (j, c_j) in challenges.iter().enumerate() {
            if i != j {
                weight = weight.mul(c_j);
            }
        }
        weights.push(weight);
    }

    Ok((normalizer, weights))
}

/// Verify a combined threshold signature.
///
/// Given the group public key `Y = g^x`, a set of contributions for indices
/// in Q with `|Q| >= threshold`, and the signed payload, checks:
///
/// ```text
/// g^{Σ μ_i·s_i} = Y^{c̄} · Π u_i^{μ_i}
/// ```
pub fn verify<P: ThresholdPoint>(
    group_pubkey: &P,
    contributions: &[Contribution<P>],
    threshold: u32,
    payload: &[u8],
) -> Result<bool, ThresholdError> {
    if contributions.len() < threshold as usize {
        return Err(ThresholdError::InsufficientContributions {
            got: contributions.len(),
            need: threshold as usize,
        });
    }

    let mut indices: Vec<u32> = contributions.iter().map(|c| c.index).collect();
    indices.sort();
    for i in 1..indices.len() {
        if indices[i] == indices[i - 1] {
            return Err(ThresholdError::DuplicateIndex(indices[i]));
        }
    }

    let (normalizer, weights) = compute_weights(contributions, payload)?;

    let mut lhs_exponent = P::Scalar::zero();
    for (c, mu) in contributions.iter().zip(weights.iter()) {
        let term = mu.mul(&c.response);
        lhs_exponent = lhs_exponent.add(&term);
    }

    let lhs = P::generator().mul_scalar(&lhs_exponent);

    let mut scalars = vec![normalizer];
    let mut points = vec![group_pubkey.clone()];

    for (c, mu) in contributions.iter().zip(weights.iter()) {
        scalars.push(mu.clone());
        points.push(c.commitment.clone());
    }

    let rhs = P::multiscalar_mul(&scalars, &points);

    Ok(lhs == rhs)
}

/// Check whether adding `new_contribution` to an already-collected set still
/// combine-verifies, without re-deriving every weight from scratch by hand.
pub fn verify_incremental<P: ThresholdPoint>(
    group_pubkey: &P,
    existing: &[Contribution<P>],
    new_contribution: &Contribution<P>,
    threshold: u32,
    payload: &[u8],
) -> Result<bool, ThresholdError> {
    for c in existing {
        if c.index == new_contribution.index {
            return Err(ThresholdError::DuplicateIndex(new_contribution.index));
        }
    }

    let mut all: Vec<Contribution<P>> = existing.to_vec();
    all.push(new_contribution.clone());

    verify(group_pubkey, &all, threshold, payload)
}

/// Ristretto255 type aliases, the curve used by the on-disk key material.
pub mod ristretto {
    use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};

    pub type SecretShare = super::SecretShare<Scalar>;
    pub type Contribution = super::Contribution<RistrettoPoint>;

    pub const G: RistrettoPoint = curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
}
