//! Share aggregator (v1): per-dts buckets of threshold shares, quorum
//! detection, combine-trial over accepted contributions.

use curve25519_dalek::ristretto::RistrettoPoint;
use tm_threshold::{Contribution, ContributionSet};

use crate::config::{DTS_INTERVAL_MS, SHARES_PER_MSG};
use crate::crypto::ThresholdCrypto;
use crate::types::{BreakerState, Dts, ReplicaId, StampedState};

/// One ring slot: the payload it was created for plus every contribution
/// received for that payload so far.
#[derive(Debug, Clone)]
struct BucketSlot {
    payload: StampedState,
    set: ContributionSet<RistrettoPoint>,
    /// sender ids already present, for the accept-rule's "if recvd[sender]
    /// was 0, increment count" bookkeeping.
    senders: Vec<ReplicaId>,
}

impl BucketSlot {
    fn new(payload: StampedState) -> Self {
        Self {
            payload,
            set: ContributionSet::new(payload.to_payload().to_vec()),
            senders: Vec::new(),
        }
    }

    fn count(&self) -> usize {
        self.set.count()
    }
}

/// A ring of `SHARES_PER_MSG` buckets keyed by `dts mod SHARES_PER_MSG`.
pub struct ShareAggregator {
    slots: Vec<Option<BucketSlot>>,
    /// dts of the most recent share bundle this replica has self-published.
    cur_dts: Dts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    Stored,
    Stale,
    TooFarFuture,
    InvalidProof,
    MismatchedPayload,
}

impl ShareAggregator {
    pub fn new() -> Self {
        Self {
            slots: vec![None; SHARES_PER_MSG],
            cur_dts: 0,
        }
    }

    fn slot_index(dts: Dts) -> usize {
        ((dts / DTS_INTERVAL_MS) as usize) % SHARES_PER_MSG
    }

    /// Self-publish: advance `cur_dts` to `new_dts` and reinitialize every
    /// bucket whose payload.dts no longer matches the slot it now
    /// represents. `cur_dts` only ever advances here, never as a side
    /// effect of accepting an incoming share (see DESIGN.md).
    pub fn advance_self(&mut self, new_dts: Dts, my_state: BreakerState) {
        debug_assert!(new_dts >= self.cur_dts);
        self.cur_dts = new_dts;

        for i in 0..SHARES_PER_MSG {
            let slot_dts = new_dts + (i as u64) * DTS_INTERVAL_MS;
            let needs_reinit = match &self.slots[i] {
                Some(slot) => slot.payload.dts < slot_dts,
                None => true,
            };
            if needs_reinit {
                self.slots[i] = Some(BucketSlot::new(StampedState::new(my_state, slot_dts)));
            }
        }
    }

    /// Accept an incoming share at `slot_dts`, addressed as one entry of a
    /// bundle. Runs the individual Schnorr accept-rule check before storing.
    pub fn accept(
        &mut self,
        crypto: &ThresholdCrypto,
        sender: ReplicaId,
        slot_dts: Dts,
        contribution: Contribution<RistrettoPoint>,
    ) -> AcceptOutcome {
        if slot_dts < self.cur_dts {
            return AcceptOutcome::Stale;
        }
        if slot_dts - self.cur_dts >= (SHARES_PER_MSG as u64) * DTS_INTERVAL_MS {
            return AcceptOutcome::TooFarFuture;
        }

        let idx = Self::slot_index(slot_dts);
        let slot = match &mut self.slots[idx] {
            Some(s) if s.payload.dts == slot_dts => s,
            _ => return AcceptOutcome::MismatchedPayload,
        };

        let payload = slot.payload.to_payload();
        if !crypto.verify_share(sender, &contribution, &payload) {
            return AcceptOutcome::InvalidProof;
        }

        if slot.senders.contains(&sender) {
            return AcceptOutcome::Stored;
        }

        match slot.set.add(contribution) {
            Ok(()) => {
                slot.senders.push(sender);
                AcceptOutcome::Stored
            }
            Err(_) => AcceptOutcome::Stored,
        }
    }

    /// Combine trial: walk buckets from the highest dts down to the
    /// lowest; for each bucket with more than `threshold - 1` entries,
    /// attempt the combine-verify. Returns the first combined signature that
    /// verifies, if any.
    pub fn try_combine(
        &self,
        crypto: &ThresholdCrypto,
        threshold: u32,
    ) -> Option<(Dts, BreakerState, Vec<Contribution<RistrettoPoint>>)> {
        let mut candidates: Vec<&BucketSlot> = self.slots.iter().flatten().collect();
        candidates.sort_by(|a, b| b.payload.dts.cmp(&a.payload.dts));

        for slot in candidates {
            if slot.count() < threshold as usize {
                continue;
            }
            let payload = slot.payload.to_payload();
            let contributions = slot.set.contributions().to_vec();
            if let Ok(true) = crypto.verify_combined(&contributions, threshold, &payload) {
                return Some((slot.payload.dts, slot.payload.state, contributions));
            }
        }
        None
    }
}

impl Default for ShareAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;
    use std::collections::HashMap;
    use tm_threshold::curve::ThresholdPoint;
    use tm_threshold::SecretShare;

    fn make_crypto_set(n: u32, t: u32) -> (RistrettoPoint, Vec<ThresholdCrypto>) {
        use curve25519_dalek::scalar::Scalar;
        let mut rng = OsRng;
        let secret = Scalar::random(&mut rng);
        let group_pubkey: RistrettoPoint = RistrettoPoint::generator().mul_scalar(&secret);

        let mut coeffs = vec![secret];
        for _ in 1..t {
            coeffs.push(Scalar::random(&mut rng));
        }
        let shares: Vec<SecretShare<Scalar>> = (1..=n)
            .map(|i| {
                let x = Scalar::from(i);
                let mut y = Scalar::ZERO;
                let mut x_pow = Scalar::ONE;
                for c in &coeffs {
                    y += c * x_pow;
                    x_pow *= x;
                }
                SecretShare::new(i, y)
            })
            .collect();

        let public_shares: HashMap<ReplicaId, RistrettoPoint> = shares
            .iter()
            .map(|s| (s.index, s.public_share()))
            .collect();

        let cryptos = shares
            .into_iter()
            .map(|s| ThresholdCrypto {
                group_pubkey,
                share: s,
                peer_public_shares: public_shares.clone(),
            })
            .collect();

        (group_pubkey, cryptos)
    }

    #[test]
    fn test_accept_stores_valid_share_and_combines_at_quorum() {
        let (_, cryptos) = make_crypto_set(4, 2);
        let mut agg = ShareAggregator::new();
        agg.advance_self(5000, BreakerState::Trip);

        let payload = StampedState::new(BreakerState::Trip, 5000).to_payload();

        // replica 2's share, accepted by replica 1's aggregator
        let contribution = cryptos[1].sign_share(&payload);
        let outcome = agg.accept(&cryptos[0], 2, 5000, contribution);
        assert_eq!(outcome, AcceptOutcome::Stored);

        // replica 1's own share also goes into the bucket
        let own = cryptos[0].sign_share(&payload);
        agg.accept(&cryptos[0], 1, 5000, own);

        let combined = agg.try_combine(&cryptos[0], 2);
        assert!(combined.is_some());
        let (dts, state, _) = combined.unwrap();
        assert_eq!(dts, 5000);
        assert_eq!(state, BreakerState::Trip);
    }

    #[test]
    fn test_stale_share_dropped() {
        let (_, cryptos) = make_crypto_set(4, 2);
        let mut agg = ShareAggregator::new();
        agg.advance_self(5000, BreakerState::Trip);

        let payload = StampedState::new(BreakerState::Trip, 4900).to_payload();
        let contribution = cryptos[1].sign_share(&payload);
        assert_eq!(
            agg.accept(&cryptos[0], 2, 4900, contribution),
            AcceptOutcome::Stale
        );
    }

    #[test]
    fn test_too_far_future_dropped() {
        let (_, cryptos) = make_crypto_set(4, 2);
        let mut agg = ShareAggregator::new();
        agg.advance_self(5000, BreakerState::Trip);

        let far_dts = 5000 + (SHARES_PER_MSG as u64) * DTS_INTERVAL_MS;
        let payload = StampedState::new(BreakerState::Trip, far_dts).to_payload();
        let contribution = cryptos[1].sign_share(&payload);
        assert_eq!(
            agg.accept(&cryptos[0], 2, far_dts, contribution),
            AcceptOutcome::TooFarFuture
        );
    }

    #[test]
    fn test_forged_proof_rejected() {
        let (_, cryptos) = make_crypto_set(4, 2);
        let mut agg = ShareAggregator::new();
        agg.advance_self(5000, BreakerState::Trip);

        // Sign under the wrong payload, then claim it's for slot 5000.
        let wrong_payload = StampedState::new(BreakerState::Close, 5000).to_payload();
        let forged = cryptos[1].sign_share(&wrong_payload);
        assert_eq!(
            agg.accept(&cryptos[0], 2, 5000, forged),
            AcceptOutcome::InvalidProof
        );
    }

    #[test]
    fn test_mismatched_payload_shares_are_ignored() {
        // Open question resolution: F+1 correct shares for two different
        // (state, dts) pairs at the same slot never combine.
        let (_, cryptos) = make_crypto_set(4, 2);
        let mut agg = ShareAggregator::new();
        agg.advance_self(5000, BreakerState::Trip);

        // The bucket at slot 5000 now expects {Trip, 5000}; a share
        // correctly proven over {Close, 5000} targets the same slot index
        // but a different payload, so it's rejected as mismatched rather
        // than silently accepted under the wrong payload.
        let close_payload = StampedState::new(BreakerState::Close, 5000).to_payload();
        let contribution = cryptos[1].sign_share(&close_payload);
        assert_eq!(
            agg.accept(&cryptos[0], 2, 5000, contribution),
            AcceptOutcome::InvalidProof
        );
    }

    #[test]
    fn test_below_threshold_does_not_combine() {
        let (_, cryptos) = make_crypto_set(4, 2);
        let mut agg = ShareAggregator::new();
        agg.advance_self(5000, BreakerState::Trip);

        let payload = StampedState::new(BreakerState::Trip, 5000).to_payload();
        let own = cryptos[0].sign_share(&payload);
        agg.accept(&cryptos[0], 1, 5000, own);

        assert!(agg.try_combine(&cryptos[0], 2).is_none());
    }

    /// A byzantine replica signs bogus shares every tick (over the wrong
    /// payload, or structurally malformed). Correct
    /// replicas must reject each one at accept time and still combine a
    /// valid signature once enough honest shares arrive — one bad sender
    /// never blocks or corrupts the bucket.
    #[test]
    fn byzantine_bogus_shares() {
        let (_, cryptos) = make_crypto_set(4, 2);
        let mut agg = ShareAggregator::new();
        agg.advance_self(5000, BreakerState::Trip);

        let payload = StampedState::new(BreakerState::Trip, 5000).to_payload();
        let wrong_payload = StampedState::new(BreakerState::Close, 5000).to_payload();

        // Replica 4 broadcasts bogus shares every tick, signed over the
        // wrong payload — always rejected, never stored.
        for _ in 0..3 {
            let bogus = cryptos[3].sign_share(&wrong_payload);
            assert_eq!(
                agg.accept(&cryptos[0], 4, 5000, bogus),
                AcceptOutcome::InvalidProof
            );
        }

        // Honest replicas 1 and 2 still reach quorum despite the noise.
        let own = cryptos[0].sign_share(&payload);
        agg.accept(&cryptos[0], 1, 5000, own);
        let peer = cryptos[1].sign_share(&payload);
        agg.accept(&cryptos[0], 2, 5000, peer);

        let combined = agg.try_combine(&cryptos[0], 2);
        assert!(combined.is_some());
    }
}
