//! Trip master: a replicated decision engine that turns a breaker's own
//! local-relay signal into a threshold-confirmed trip/close command,
//! tolerating crashes and disagreement among a small replica set.
//!
//! Two wire variants share one core automaton ([`state_machine`]):
//! v1 floods one-step threshold shares between replicas and combines them
//! locally ([`aggregator`], backed by the [`tm_threshold`] crate); v2 has
//! each replica RSA-sign its relay observation directly to the breaker
//! proxy, which counts matching signed messages itself.

pub mod aggregator;
pub mod bench;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod network;
pub mod recovery;
pub mod replica;
pub mod scheduler;
pub mod state_machine;
pub mod types;

pub use config::ReplicaConfig;
pub use error::ReplicaError;
pub use replica::Replica;
pub use types::{BreakerState, Dts, ReplicaId, StateVector, TmState};
