//! Replica configuration: peer table, socket paths, key material, timing constants.

use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::types::ReplicaId;

/// Discretized timestamp grid, in milliseconds.
pub const DTS_INTERVAL_MS: u64 = 100;

/// Breaker-proxy resend period for the combined/relay message.
pub const SIGNED_TIMEOUT_MS: u64 = 5_000;

/// Recovery-query resend period.
pub const RECOVERY_TIMEOUT_MS: u64 = 5_000;

/// Number of consecutive-dts shares bundled per broadcast (v1).
pub const SHARES_PER_MSG: usize = 2;

/// Which wire protocol this deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Threshold-signed flood: shares combined by replicas.
    V1,
    /// RSA-signed relay messages; breaker proxy counts matching messages.
    V2,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeerConfig {
    pub id: ReplicaId,
    pub internal_overlay_addr: SocketAddr,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplicaConfig {
    pub replica_id: ReplicaId,
    pub variant: Variant,
    pub ipc_path: PathBuf,
    pub external_overlay_addr: SocketAddr,
    #[serde(default)]
    pub internal_overlay_addr: Option<SocketAddr>,
    pub breaker_proxy_addr: SocketAddr,
    pub key_dir: PathBuf,
    #[serde(default)]
    pub peers: Vec<PeerConfig>,

    /// N = 3F + 2K + 1, the deployment size. Derived from peer count + 1 if
    /// not given explicitly.
    #[serde(default)]
    pub replica_count: Option<u32>,
    /// Byzantine fault tolerance bound F. threshold = F + 1.
    pub byzantine_bound: u32,
}

impl ReplicaConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;
        let config: ReplicaConfig =
            toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the positional replica-id argument against this config, the
    /// disambiguator when several replicas share one config file for local
    /// testing.
    pub fn check_replica_id(&self, cli_replica_id: ReplicaId) -> Result<(), ConfigError> {
        if cli_replica_id != self.replica_id {
            return Err(ConfigError::ReplicaIdMismatch {
                cli: cli_replica_id,
                config: self.replica_id,
            });
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.replica_id == 0 {
            return Err(ConfigError::InvalidReplicaId(self.replica_id));
        }
        if self.variant == Variant::V1 && self.internal_overlay_addr.is_none() {
            return Err(ConfigError::MissingInternalOverlay);
        }
        let n = self.replica_count();
        if n < 3 * self.byzantine_bound + 1 {
            return Err(ConfigError::InsufficientReplicas {
                n,
                f: self.byzantine_bound,
            });
        }
        Ok(())
    }

    pub fn replica_count(&self) -> u32 {
        self.replica_count
            .unwrap_or(self.peers.len() as u32 + 1)
    }

    /// Threshold for combining shares: F + 1.
    pub fn threshold(&self) -> u32 {
        self.byzantine_bound + 1
    }

    pub fn peer_addrs(&self) -> HashMap<ReplicaId, SocketAddr> {
        self.peers
            .iter()
            .map(|p| (p.id, p.internal_overlay_addr))
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {0}: {1}")]
    Io(PathBuf, String),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("replica id must be in [1, N], got {0}")]
    InvalidReplicaId(ReplicaId),
    #[error("v1 deployments require internal_overlay_addr")]
    MissingInternalOverlay,
    #[error("N={n} is too small for F={f} (need N >= 3F+1)")]
    InsufficientReplicas { n: u32, f: u32 },
    #[error("command-line replica id {cli} does not match config replica_id {config}")]
    ReplicaIdMismatch { cli: ReplicaId, config: ReplicaId },
}
