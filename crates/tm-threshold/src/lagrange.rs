//! Lagrange interpolation coefficient computation
//!
//! Given a set Q = {i_1, ..., i_k} of replica indices contributing shares,
//! the Lagrange coefficient for index i is:
//!
//! λ_i = Π_{j ∈ Q, j ≠ i} (j / (j - i))
//!
//! This can be rewritten using a common-denominator technique as:
//!
//! λ_i = ξ · ρ_i · d̄^{-1}
//!
//! Where:
//! - ξ = Π_{j ∈ Q} j
//! - d_i = i · Π_{j ∈ Q, j ≠ i} (j - i)
//! - ρ_i = Π_{j ∈ Q, j ≠ i} d_j
//! - d̄ = Π_{i ∈ Q} d_i
//!
//! This requires only ONE modular inversion instead of k, which matters when
//! the aggregator is re-trying combine candidates many times per dts tick.

use alloc::vec;
use alloc::vec::Vec;

use crate::curve::ThresholdScalar;
use crate::error::ThresholdError;

/// Compute Lagrange interpolation coefficients for a set of replica indices.
///
/// O(k²) field multiplications, O(1) modular inversions.
///
/// Returns the coefficients λ_i in the same order as `indices`.
pub fn compute_lagrange_coefficients<S: ThresholdScalar>(
    indices: &[u32],
) -> Result<Vec<S>, ThresholdError> {
    let k = indices.len();
    if k == 0 {
        return Err(ThresholdError::EmptyContributions);
    }

    for &idx in indices {
        if idx == 0 {
            return Err(ThresholdError::InvalidIndex);
        }
    }

    let mut sorted = indices.to_vec();
    sorted.sort();
    for i in 1..sorted.len() {
        if sorted[i] == sorted[i - 1] {
            return Err(ThresholdError::DuplicateIndex(sorted[i]));
        }
    }

    if k == 1 {
        return Ok(vec![S::one()]);
    }

    let scalars: Vec<S> = indices.iter().map(|&i| S::from_u32(i)).collect();

    // xi = Π_{j in Q} j
    let xi: S = scalars.iter().fold(S::one(), |acc, x| acc.mul(x));

    // d_i = i * Π_{j != i} (j - i)
    let mut d_values: Vec<S> = Vec::with_capacity(k);
    for i in 0..k {
        let mut d = scalars[i].clone();
        for j in 0..k {
            if i != j {
                let diff = scalars[j].sub(&scalars[i]);
                d = d.mul(&diff);
            }
        }
        d_values.push(d);
    }

    // rho_i = Π_{j != i} d_j, via forward/backward prefix products
    let mut rho: Vec<S> = vec![S::one(); k];

    for i in 1..k {
        rho[i] = rho[i - 1].mul(&d_values[i - 1]);
    }

    let mut suffix = S::one();
    for i in (0..k).rev() {
        rho[i] = rho[i].mul(&suffix);
        suffix = suffix.mul(&d_values[i]);
    }

    // d_bar = suffix after the full backward pass = Π d_i
    let d_bar = suffix;
    let d_bar_inv = d_bar.invert();

    let delta = xi.mul(&d_bar_inv);
    let coefficients: Vec<S> = rho.iter().map(|rho_i| delta.mul(rho_i)).collect();

    Ok(coefficients)
}
