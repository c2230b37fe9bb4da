//! Dissemination scheduler: drift-free periodic senders.
//!
//! Exactly one of {share sender, signed/relay sender} is ever active per
//! replica; cancellation is modeled as `Drop` rather than a raw
//! `(callback, int, ptr)` dequeue key.

use std::time::Duration;
use tokio::time::Instant;

use crate::types::Dts;

/// What kind of periodic send is currently outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderKind {
    /// v1 ATTEMPT_*: broadcast a share bundle every `DTS_INTERVAL`.
    ShareSender,
    /// v1 TRIPPED/CLOSED: unicast the combined signature every `SIGNED_TIMEOUT`.
    SignedSender,
    /// v2 ATTEMPT_*: unicast a fresh RELAY_* message every `DTS_INTERVAL`.
    RelaySender,
}

/// A cancellable handle to one periodic sender. Dropping it stops the
/// sender: the next `tick()` caller must check `is_some()` on the
/// `Option<SchedulerHandle>` it owns rather than relying on a separate
/// cancel flag, so "dequeue before freeing the message" is automatic.
pub struct SchedulerHandle {
    kind: SenderKind,
    period: Duration,
    /// Absolute dts this sender is currently transmitting for (the payload's
    /// own dts, not the wall-clock tick time).
    dts: Dts,
    next_fire: Instant,
}

impl SchedulerHandle {
    /// Start a sender whose first tick fires immediately (builds and
    /// broadcasts a bundle right away), subsequent ticks rearmed to the
    /// next absolute period boundary.
    pub fn start(kind: SenderKind, period: Duration, dts: Dts, now: Instant) -> Self {
        Self {
            kind,
            period,
            dts,
            next_fire: now,
        }
    }

    pub fn kind(&self) -> SenderKind {
        self.kind
    }

    pub fn dts(&self) -> Dts {
        self.dts
    }

    pub fn next_fire(&self) -> Instant {
        self.next_fire
    }

    /// Rearm for the next period. Drift-free: the next fire time is this
    /// tick's target time plus exactly one period, never `Instant::now() +
    /// period`, so late ticks don't push later ticks out.
    pub fn rearm(&mut self, new_dts: Dts) {
        self.next_fire += self.period;
        self.dts = new_dts;
    }

    pub async fn wait(&self) {
        tokio::time::sleep_until(self.next_fire).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_drift_free_rearm_keeps_exact_period() {
        let period = Duration::from_millis(100);
        let start = Instant::now();
        let mut handle = SchedulerHandle::start(SenderKind::ShareSender, period, 5000, start);

        let first_fire = handle.next_fire();
        handle.rearm(5100);
        let second_fire = handle.next_fire();

        assert_eq!(second_fire - first_fire, period);
        assert_eq!(handle.dts(), 5100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_does_not_drift_after_late_tick() {
        let period = Duration::from_millis(100);
        let start = Instant::now();
        let mut handle = SchedulerHandle::start(SenderKind::RelaySender, period, 0, start);

        // Simulate processing running late: advance real time well past the
        // scheduled fire before rearming.
        tokio::time::advance(Duration::from_millis(250)).await;
        let before = handle.next_fire();
        handle.rearm(100);
        assert_eq!(handle.next_fire() - before, period);
    }

    #[test]
    fn test_exclusive_sender_kind_is_tracked() {
        let handle = SchedulerHandle::start(
            SenderKind::SignedSender,
            Duration::from_secs(5),
            5000,
            Instant::now(),
        );
        assert_eq!(handle.kind(), SenderKind::SignedSender);
    }
}
