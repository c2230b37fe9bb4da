//! Core data model: replica identity, dts, breaker state, the per-replica
//! state vector.

use serde::{Deserialize, Serialize};

/// Process-wide replica identity, `1..=N`. The breaker-side proxy uses `N+1`.
pub type ReplicaId = u32;

/// Discretized timestamp: milliseconds, always a multiple of
/// [`crate::config::DTS_INTERVAL_MS`].
pub type Dts = u64;

/// 128-byte RSA-1024 PKCS#1v1.5 signature (v2).
pub type RsaSignature = [u8; 128];

/// Round a raw millisecond timestamp down to the dts grid.
pub fn to_dts(now_ms: u64, interval_ms: u64) -> Dts {
    (now_ms / interval_ms) * interval_ms
}

/// Breaker command state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakerState {
    Close,
    Trip,
}

impl BreakerState {
    pub fn flip(self) -> Self {
        match self {
            BreakerState::Close => BreakerState::Trip,
            BreakerState::Trip => BreakerState::Close,
        }
    }
}

/// `{state, dts}`: a single relay assertion or breaker acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampedState {
    pub state: BreakerState,
    pub dts: Dts,
}

impl StampedState {
    pub fn new(state: BreakerState, dts: Dts) -> Self {
        Self { state, dts }
    }

    /// The wire payload this assertion signs/shares: a deterministic byte
    /// encoding of `{state, dts}`, used as the threshold-signature payload
    /// and the RSA-signed digest input.
    pub fn to_payload(self) -> [u8; 9] {
        let mut buf = [0u8; 9];
        buf[0] = match self.state {
            BreakerState::Close => 0,
            BreakerState::Trip => 1,
        };
        buf[1..9].copy_from_slice(&self.dts.to_le_bytes());
        buf
    }
}

/// Seven-state TM automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TmState {
    Recovery,
    Tripped,
    Closed,
    AttemptTrip,
    AttemptClose,
    WaitTrip,
    WaitClose,
}

/// Ack category forwarded to the local relay proxy. Coarser than
/// [`BreakerState`] only in name — kept distinct because `cb_prev_state`
/// tracks what was *forwarded*, not the raw ack, and the two diverge during
/// recovery (the recovery ack is forwarded unconditionally).
pub type AckCategory = BreakerState;

/// Per-replica state vector.
#[derive(Debug, Clone)]
pub struct StateVector {
    /// Last local-relay assertion observed.
    pub r: StampedState,
    /// Last breaker acknowledgment observed.
    pub b: StampedState,
    pub tm_state: TmState,
    /// dts of the most recent share/message this replica has published for
    /// itself. Advances only on self-publish (open question resolution,
    /// DESIGN.md).
    pub cur_dts: Dts,
    /// Last ack category forwarded to the local relay proxy, for
    /// edge-triggered forwarding. `None` before the first forward.
    pub cb_prev_state: Option<AckCategory>,
}

impl StateVector {
    /// Fresh replica entering RECOVERY: `r.dts = 0`, `b.dts = 0`.
    pub fn recovery_initial() -> Self {
        Self {
            r: StampedState::new(BreakerState::Close, 0),
            b: StampedState::new(BreakerState::Close, 0),
            tm_state: TmState::Recovery,
            cur_dts: 0,
            cb_prev_state: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_dts_rounds_down() {
        assert_eq!(to_dts(1249, 100), 1200);
        assert_eq!(to_dts(1200, 100), 1200);
        assert_eq!(to_dts(99, 100), 0);
    }

    #[test]
    fn test_payload_distinguishes_state_and_dts() {
        let a = StampedState::new(BreakerState::Trip, 5000).to_payload();
        let b = StampedState::new(BreakerState::Close, 5000).to_payload();
        let c = StampedState::new(BreakerState::Trip, 5100).to_payload();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
