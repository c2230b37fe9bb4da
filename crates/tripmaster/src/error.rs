//! Top-level error type: every startup/runtime failure a replica process can
//! hit, with a process exit-code mapping.

use crate::config::ConfigError;
use crate::crypto::CryptoError;
use crate::network::NetworkError;
use crate::state_machine::ImpossibleTransition;

#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("impossible transition: {0:?}")]
    Impossible(ImpossibleTransition),
}

impl From<ImpossibleTransition> for ReplicaError {
    fn from(e: ImpossibleTransition) -> Self {
        ReplicaError::Impossible(e)
    }
}

impl ReplicaError {
    /// Process exit code: configuration and key-loading failures are
    /// operator errors (2), socket failures are environment errors (3), an
    /// impossible transition is a bug in this binary (1).
    pub fn exit_code(&self) -> i32 {
        match self {
            ReplicaError::Config(_) | ReplicaError::Crypto(_) => 2,
            ReplicaError::Network(_) => 3,
            ReplicaError::Impossible(_) => 1,
        }
    }
}
