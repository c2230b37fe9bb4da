//! Recovery protocol: startup/crash resynchronization.
//!
//! Two collectors run "in parallel" (here: both fed by the replica
//! orchestrator's `tokio::select!` loop) until both have reported in, then
//! the deterministic post-recovery table picks the next `TmState`.

use crate::types::{BreakerState, Dts, StampedState, TmState};

#[derive(Debug, Default)]
pub struct Recovery {
    r: Option<StampedState>,
    b: Option<StampedState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Stop querying the breaker proxy (first valid ack received).
    StopQueryTimer,
    /// Forward the recovery ack to the local relay proxy (unconditional,
    /// unlike the edge-triggered forwarding of normal operation).
    ForwardAck,
}

impl Recovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// First `LR_*` event during recovery sets `r` (`got_r`).
    pub fn on_relay_event(&mut self, state: BreakerState, dts: Dts) {
        if self.r.is_none() {
            self.r = Some(StampedState::new(state, dts));
        }
    }

    /// First valid `SIGNED_*_ACK` during recovery sets `b` (`got_b`) and
    /// requests the query timer be dequeued and the ack forwarded.
    pub fn on_proxy_ack(&mut self, state: BreakerState, dts: Dts) -> Vec<RecoveryAction> {
        if self.b.is_some() {
            return vec![];
        }
        self.b = Some(StampedState::new(state, dts));
        vec![RecoveryAction::StopQueryTimer, RecoveryAction::ForwardAck]
    }

    pub fn is_done(&self) -> bool {
        self.r.is_some() && self.b.is_some()
    }

    /// The deterministic 6-row post-recovery transition table. Panics if
    /// called before both collectors have reported (caller error, not a
    /// protocol condition).
    pub fn resolve(&self) -> (TmState, Option<crate::state_machine::Action>, StampedState, StampedState) {
        let r = self.r.expect("resolve() called before got_r");
        let b = self.b.expect("resolve() called before got_b");

        use crate::state_machine::Action;
        use BreakerState::*;
        use TmState::*;

        let (state, action) = match (r.state, b.state) {
            (Trip, Trip) => (Tripped, None),
            (Close, Close) => (Closed, None),
            (Trip, Close) if r.dts >= b.dts => (AttemptTrip, Some(Action::StartAttemptSender)),
            (Trip, Close) => (WaitClose, None),
            (Close, Trip) if r.dts >= b.dts => (AttemptClose, Some(Action::StartAttemptSender)),
            (Close, Trip) => (WaitTrip, None),
        };

        (state, action, r, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cold_start_agreed_close() {
        let mut rec = Recovery::new();
        let proxy_actions = rec.on_proxy_ack(BreakerState::Close, 1000);
        assert_eq!(
            proxy_actions,
            vec![RecoveryAction::StopQueryTimer, RecoveryAction::ForwardAck]
        );
        assert!(!rec.is_done());

        rec.on_relay_event(BreakerState::Close, 1200);
        assert!(rec.is_done());

        let (state, action, r, b) = rec.resolve();
        assert_eq!(state, TmState::Closed);
        assert!(action.is_none());
        assert_eq!(r.dts, 1200);
        assert_eq!(b.dts, 1000);
    }

    #[test]
    fn test_disagreement_resolved_by_trip() {
        let mut rec = Recovery::new();
        rec.on_proxy_ack(BreakerState::Trip, 900);
        rec.on_relay_event(BreakerState::Close, 800);

        let (state, action, ..) = rec.resolve();
        assert_eq!(state, TmState::WaitTrip);
        assert!(action.is_none());
    }

    #[test]
    fn test_trip_ge_close_starts_attempt_trip() {
        let mut rec = Recovery::new();
        rec.on_relay_event(BreakerState::Trip, 5000);
        rec.on_proxy_ack(BreakerState::Close, 4000);

        let (state, action, ..) = rec.resolve();
        assert_eq!(state, TmState::AttemptTrip);
        assert_eq!(action, Some(crate::state_machine::Action::StartAttemptSender));
    }

    #[test]
    fn test_close_lt_trip_waits_for_trip() {
        let mut rec = Recovery::new();
        rec.on_relay_event(BreakerState::Close, 3000);
        rec.on_proxy_ack(BreakerState::Trip, 4000);

        let (state, action, ..) = rec.resolve();
        assert_eq!(state, TmState::WaitTrip);
        assert!(action.is_none());
    }

    #[test]
    fn test_only_first_ack_is_accepted() {
        let mut rec = Recovery::new();
        let first = rec.on_proxy_ack(BreakerState::Trip, 1000);
        assert!(!first.is_empty());
        let second = rec.on_proxy_ack(BreakerState::Close, 2000);
        assert!(second.is_empty());
    }

    #[test]
    fn test_only_first_relay_event_is_accepted() {
        let mut rec = Recovery::new();
        rec.on_relay_event(BreakerState::Trip, 1000);
        rec.on_relay_event(BreakerState::Close, 2000);
        rec.on_proxy_ack(BreakerState::Trip, 500);

        let (_, _, r, _) = rec.resolve();
        assert_eq!(r, StampedState::new(BreakerState::Trip, 1000));
    }
}
