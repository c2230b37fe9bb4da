//! Curve abstraction for threshold shares
//!
//! Threshold shares are defined over ristretto255, the curve used for the
//! replica's private share and the group public key on disk. The trait split
//! exists so the Lagrange math in [`crate::lagrange`] stays generic over the
//! scalar field without depending on curve25519-dalek directly.

use core::fmt::Debug;

extern crate alloc;

/// Scalar field element trait.
pub trait ThresholdScalar: Clone + Debug + Sized + PartialEq + Send + Sync {
    fn zero() -> Self;
    fn one() -> Self;
    fn from_u32(v: u32) -> Self;
    fn add(&self, other: &Self) -> Self;
    fn sub(&self, other: &Self) -> Self;
    fn mul(&self, other: &Self) -> Self;
    fn neg(&self) -> Self;

    /// Compute multiplicative inverse.
    fn invert(&self) -> Self;

    fn random<R: rand_core::RngCore + rand_core::CryptoRng>(rng: &mut R) -> Self;

    /// Create from 64-byte wide hash output (reduction mod order).
    fn from_bytes_wide(bytes: &[u8; 64]) -> Self;

    fn to_bytes(&self) -> [u8; 32];

    fn from_canonical_bytes(bytes: &[u8; 32]) -> Option<Self>;
}

/// Curve point trait.
pub trait ThresholdPoint: Clone + Debug + Sized + PartialEq + Send + Sync {
    type Scalar: ThresholdScalar;

    const COMPRESSED_SIZE: usize;

    fn identity() -> Self;
    fn generator() -> Self;
    fn mul_scalar(&self, scalar: &Self::Scalar) -> Self;
    fn add(&self, other: &Self) -> Self;

    /// Multiscalar multiplication (optimized).
    fn multiscalar_mul(scalars: &[Self::Scalar], points: &[Self]) -> Self;

    fn compress(&self) -> [u8; 32];
    fn decompress(bytes: &[u8; 32]) -> Option<Self>;
}

/// Curve backend binding a scalar type to a point type.
pub trait ThresholdCurve: Clone + Debug + Default {
    type Scalar: ThresholdScalar;
    type Point: ThresholdPoint<Scalar = Self::Scalar>;
}

// ============================================================================
// Ristretto255 implementation
// ============================================================================

pub mod ristretto {
    use super::*;
    use curve25519_dalek::{
        constants::RISTRETTO_BASEPOINT_POINT,
        ristretto::{CompressedRistretto, RistrettoPoint},
        scalar::Scalar,
        traits::MultiscalarMul,
    };

    impl ThresholdScalar for Scalar {
        fn zero() -> Self {
            Scalar::ZERO
        }

        fn one() -> Self {
            Scalar::ONE
        }

        fn from_u32(v: u32) -> Self {
            Scalar::from(v)
        }

        fn add(&self, other: &Self) -> Self {
            self + other
        }

        fn sub(&self, other: &Self) -> Self {
            self - other
        }

        fn mul(&self, other: &Self) -> Self {
            self * other
        }

        fn neg(&self) -> Self {
            -self
        }

        fn invert(&self) -> Self {
            Scalar::invert(self)
        }

        fn random<R: rand_core::RngCore + rand_core::CryptoRng>(rng: &mut R) -> Self {
            Scalar::random(rng)
        }

        fn from_bytes_wide(bytes: &[u8; 64]) -> Self {
            Scalar::from_bytes_mod_order_wide(bytes)
        }

        fn to_bytes(&self) -> [u8; 32] {
            Scalar::to_bytes(self)
        }

        fn from_canonical_bytes(bytes: &[u8; 32]) -> Option<Self> {
            Scalar::from_canonical_bytes(*bytes).into_option()
        }
    }

    impl ThresholdPoint for RistrettoPoint {
        type Scalar = Scalar;

        const COMPRESSED_SIZE: usize = 32;

        fn identity() -> Self {
            curve25519_dalek::traits::Identity::identity()
        }

        fn generator() -> Self {
            RISTRETTO_BASEPOINT_POINT
        }

        fn mul_scalar(&self, scalar: &Self::Scalar) -> Self {
            self * scalar
        }

        fn add(&self, other: &Self) -> Self {
            self + other
        }

        fn multiscalar_mul(scalars: &[Self::Scalar], points: &[Self]) -> Self {
            <RistrettoPoint as MultiscalarMul>::multiscalar_mul(scalars, points)
        }

        fn compress(&self) -> [u8; 32] {
            RistrettoPoint::compress(self).to_bytes()
        }

        fn decompress(bytes: &[u8; 32]) -> Option<Self> {
            CompressedRistretto::from_slice(bytes).ok()?.decompress()
        }
    }

    /// Ristretto255 curve backend.
    #[derive(Clone, Debug, Default)]
    pub struct Ristretto255;

    impl ThresholdCurve for Ristretto255 {
        type Scalar = Scalar;
        type Point = RistrettoPoint;
    }
}
