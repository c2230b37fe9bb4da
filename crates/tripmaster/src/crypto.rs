//! Crypto wrapper: RSA sign/verify (v2) and threshold share sign/verify (v1).
//!
//! Key material is read once at startup and is immutable thereafter.
//! Generation of that material (DKG for the threshold share, RSA keypair
//! generation) is out of scope; this module only loads it.

use std::collections::HashMap;
use std::path::Path;

use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
use rand_core::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use tm_threshold::curve::ThresholdPoint;
use tm_threshold::{Contribution, SecretShare};

use crate::types::ReplicaId;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("failed to read key file {0}: {1}")]
    Io(String, String),
    #[error("key file {0} has wrong length: expected {expected}, got {got}", expected = 32, got = .1)]
    BadScalarLength(String, usize),
    #[error("key file {0} does not decode to a valid scalar/point")]
    InvalidEncoding(String),
    #[error("rsa key error: {0}")]
    Rsa(String),
    #[error(transparent)]
    Threshold(#[from] tm_threshold::ThresholdError),
}

/// Threshold signing state for the v1 variant.
pub struct ThresholdCrypto {
    pub group_pubkey: RistrettoPoint,
    pub share: SecretShare<Scalar>,
    pub peer_public_shares: HashMap<ReplicaId, RistrettoPoint>,
}

fn read_scalar(path: &Path) -> Result<Scalar, CryptoError> {
    let bytes = std::fs::read(path)
        .map_err(|e| CryptoError::Io(path.display().to_string(), e.to_string()))?;
    if bytes.len() != 32 {
        return Err(CryptoError::BadScalarLength(
            path.display().to_string(),
            bytes.len(),
        ));
    }
    let arr: [u8; 32] = bytes.try_into().unwrap();
    Scalar::from_canonical_bytes(arr)
        .into_option()
        .ok_or_else(|| CryptoError::InvalidEncoding(path.display().to_string()))
}

fn read_point(path: &Path) -> Result<RistrettoPoint, CryptoError> {
    let bytes = std::fs::read(path)
        .map_err(|e| CryptoError::Io(path.display().to_string(), e.to_string()))?;
    if bytes.len() != 32 {
        return Err(CryptoError::BadScalarLength(
            path.display().to_string(),
            bytes.len(),
        ));
    }
    let arr: [u8; 32] = bytes.try_into().unwrap();
    RistrettoPoint::decompress(&arr)
        .ok_or_else(|| CryptoError::InvalidEncoding(path.display().to_string()))
}

impl ThresholdCrypto {
    /// Load the group public key and this replica's private share from
    /// `key_dir/pubkey_1.pem` and `key_dir/share{id}_1.pem`, and derive peer
    /// public shares from `key_dir/pubshare{id}_1.pem` for every peer id.
    pub fn load(key_dir: &Path, own_id: ReplicaId, peer_ids: &[ReplicaId]) -> Result<Self, CryptoError> {
        let group_pubkey = read_point(&key_dir.join("pubkey_1.pem"))?;
        let own_scalar = read_scalar(&key_dir.join(format!("share{own_id}_1.pem")))?;
        let share = SecretShare::new(own_id, own_scalar);

        let mut peer_public_shares = HashMap::new();
        for &id in peer_ids {
            let point = read_point(&key_dir.join(format!("pubshare{id}_1.pem")))?;
            peer_public_shares.insert(id, point);
        }

        Ok(Self {
            group_pubkey,
            share,
            peer_public_shares,
        })
    }

    /// Produce this replica's contribution (share) over `payload`.
    pub fn sign_share(&self, payload: &[u8]) -> Contribution<RistrettoPoint> {
        self.share.contribute(&mut OsRng, payload)
    }

    /// Verify an incoming share individually against the sender's known
    /// public share, before it is ever stored.
    pub fn verify_share(
        &self,
        sender: ReplicaId,
        contribution: &Contribution<RistrettoPoint>,
        payload: &[u8],
    ) -> bool {
        match self.peer_public_shares.get(&sender) {
            Some(public_share) => contribution.verify_individual(public_share, payload),
            None => false,
        }
    }

    /// Combine-verify a candidate set of contributions against the group key.
    pub fn verify_combined(
        &self,
        contributions: &[Contribution<RistrettoPoint>],
        threshold: u32,
        payload: &[u8],
    ) -> Result<bool, CryptoError> {
        Ok(tm_threshold::verify(
            &self.group_pubkey,
            contributions,
            threshold,
            payload,
        )?)
    }
}

/// RSA signing state for the v2 variant.
pub struct RsaCrypto {
    own_key: RsaPrivateKey,
    proxy_pubkey: RsaPublicKey,
}

impl RsaCrypto {
    pub fn load(key_dir: &Path) -> Result<Self, CryptoError> {
        let own_path = key_dir.join("replica_rsa.pem");
        let own_pem = std::fs::read_to_string(&own_path)
            .map_err(|e| CryptoError::Io(own_path.display().to_string(), e.to_string()))?;
        let own_key = RsaPrivateKey::from_pkcs1_pem(&own_pem)
            .map_err(|e| CryptoError::Rsa(e.to_string()))?;

        let proxy_path = key_dir.join("proxy_rsa_pub.pem");
        let proxy_pem = std::fs::read_to_string(&proxy_path)
            .map_err(|e| CryptoError::Io(proxy_path.display().to_string(), e.to_string()))?;
        let proxy_pubkey = RsaPublicKey::from_pkcs1_pem(&proxy_pem)
            .map_err(|e| CryptoError::Rsa(e.to_string()))?;

        Ok(Self {
            own_key,
            proxy_pubkey,
        })
    }

    /// Sign the 20-byte message header with PKCS#1 v1.5 over its SHA-256
    /// digest, producing the 128-byte signature a `RELAY_*` frame carries.
    pub fn sign_header(&self, header_bytes: &[u8]) -> Result<[u8; 128], CryptoError> {
        let digest = Sha256::digest(header_bytes);
        let sig = self
            .own_key
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(|e| CryptoError::Rsa(e.to_string()))?;
        sig.try_into()
            .map_err(|_| CryptoError::Rsa("unexpected signature length".into()))
    }

    /// Verify the breaker proxy's signature over a `SIGNED_*_ACK` header.
    pub fn verify_proxy_signature(&self, header_bytes: &[u8], sig: &[u8; 128]) -> bool {
        let digest = Sha256::digest(header_bytes);
        self.proxy_pubkey
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, sig)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::traits::PublicKeyParts;

    #[test]
    fn test_sign_verify_round_trip() {
        let mut rng = rand::rngs::OsRng;
        let key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let pubkey = RsaPublicKey::from(&key);

        let header = [9u8; 20];
        let digest = Sha256::digest(header);
        let sig = key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest).unwrap();

        assert!(pubkey
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &sig)
            .is_ok());
        assert_eq!(sig.len(), pubkey.size());
    }

    #[test]
    fn test_tampered_header_fails_verify() {
        let mut rng = rand::rngs::OsRng;
        let key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let pubkey = RsaPublicKey::from(&key);

        let header = [9u8; 20];
        let digest = Sha256::digest(header);
        let sig = key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest).unwrap();

        let tampered_digest = Sha256::digest([8u8; 20]);
        assert!(pubkey
            .verify(Pkcs1v15Sign::new::<Sha256>(), &tampered_digest, &sig)
            .is_err());
    }
}
