//! Replica orchestrator: owns the state vector, crypto, sockets, and the
//! single outstanding periodic sender, and runs the recovery-then-normal
//! event loop. Grounded on `node.rs`'s `Node` (own state + components,
//! driven by one `tokio::select!` loop) but rebuilt around sockets instead
//! of a block-production cycle.

use std::time::{Duration, Instant};

use curve25519_dalek::ristretto::RistrettoPoint;
use tm_threshold::Contribution;

use crate::aggregator::ShareAggregator;
use crate::bench::LatencyHistogram;
use crate::codec::{self, Header, MessageType, SHARE_ENTRY_LEN};
use crate::config::{ReplicaConfig, Variant, DTS_INTERVAL_MS, SIGNED_TIMEOUT_MS};
use crate::crypto::{RsaCrypto, ThresholdCrypto};
use crate::error::ReplicaError;
use crate::network::{OverlayLink, ProxyLink, RelayLink};
use crate::recovery::Recovery;
use crate::scheduler::{SchedulerHandle, SenderKind};
use crate::state_machine::{self, Action, Event};
use crate::types::{to_dts, BreakerState, Dts, StateVector};

pub struct Replica {
    config: ReplicaConfig,
    sv: StateVector,
    threshold: Option<ThresholdCrypto>,
    rsa: RsaCrypto,
    aggregator: ShareAggregator,
    relay: RelayLink,
    proxy: ProxyLink,
    overlay: Option<OverlayLink>,
    sender: Option<SchedulerHandle>,
    histogram: LatencyHistogram,
    last_lr_instant: Option<Instant>,
    /// The last combined-signature frame sent to the breaker proxy, kept
    /// verbatim so `resend_signed` retransmits the exact bytes rather than
    /// an empty reconstruction.
    cur_signed_frame: Option<Vec<u8>>,
}

impl Replica {
    pub async fn bind(config: ReplicaConfig) -> Result<Self, ReplicaError> {
        let peer_ids: Vec<_> = config.peers.iter().map(|p| p.id).collect();
        let rsa = RsaCrypto::load(&config.key_dir)?;
        let threshold = match config.variant {
            Variant::V1 => Some(ThresholdCrypto::load(&config.key_dir, config.replica_id, &peer_ids)?),
            Variant::V2 => None,
        };

        let relay_peer_path = config.ipc_path.with_extension("peer.sock");
        let relay = RelayLink::bind(&config.ipc_path, &relay_peer_path)?;
        let proxy = ProxyLink::bind(config.external_overlay_addr, config.breaker_proxy_addr).await?;
        let overlay = match (config.variant, config.internal_overlay_addr) {
            (Variant::V1, Some(addr)) => Some(OverlayLink::bind(addr, config.peer_addrs()).await?),
            _ => None,
        };

        Ok(Self {
            config,
            sv: StateVector::recovery_initial(),
            threshold,
            rsa,
            aggregator: ShareAggregator::new(),
            relay,
            proxy,
            overlay,
            sender: None,
            histogram: LatencyHistogram::new(),
            last_lr_instant: None,
            cur_signed_frame: None,
        })
    }

    pub fn histogram(&self) -> &LatencyHistogram {
        &self.histogram
    }

    /// Run the recovery protocol: race a relay-event collector against a
    /// retried `RECOVERY_QUERY`/ack collector until both have reported,
    /// then resolve the post-recovery state.
    pub async fn recover(&mut self) -> Result<(), ReplicaError> {
        let mut rec = Recovery::new();
        let mut query_timer = tokio::time::interval(Duration::from_millis(
            crate::config::RECOVERY_TIMEOUT_MS,
        ));
        let mut querying = true;

        self.send_recovery_query().await?;

        loop {
            if rec.is_done() {
                break;
            }
            tokio::select! {
                frame = self.relay.recv() => {
                    let frame = frame?;
                    if let Some(state) = relay_event_state(frame.header.msg_type) {
                        rec.on_relay_event(state, frame.header.dts);
                    }
                }
                frame = self.proxy.recv() => {
                    let frame = frame?;
                    if let Some(state) = ack_state(frame.header.msg_type) {
                        if !self.verify_ack_signature(&frame) {
                            tracing::warn!(
                                sender = frame.header.sender_id,
                                dts = frame.header.dts,
                                "dropping recovery ack with invalid signature"
                            );
                            continue;
                        }
                        for action in rec.on_proxy_ack(state, frame.header.dts) {
                            match action {
                                crate::recovery::RecoveryAction::StopQueryTimer => querying = false,
                                crate::recovery::RecoveryAction::ForwardAck => {
                                    let ack_type = match state {
                                        BreakerState::Trip => MessageType::SignedTripAck,
                                        BreakerState::Close => MessageType::SignedCloseAck,
                                    };
                                    self.relay.forward_ack(ack_type, self.config.replica_id, frame.header.dts).await?;
                                }
                            }
                        }
                    }
                }
                _ = query_timer.tick(), if querying => {
                    self.send_recovery_query().await?;
                }
            }
        }

        let (tm_state, action, r, b) = rec.resolve();
        self.sv = StateVector {
            r,
            b,
            tm_state,
            cur_dts: r.dts.max(b.dts),
            cb_prev_state: Some(b.state),
        };
        if let Some(action) = action {
            self.dispatch_action(action).await?;
        }
        Ok(())
    }

    async fn send_recovery_query(&self) -> Result<(), ReplicaError> {
        let header = Header {
            msg_type: MessageType::RecoveryQuery,
            sender_id: self.config.replica_id,
            dts: 0,
            len: 0,
        };
        self.proxy.send(&codec::encode(header, &[])).await?;
        Ok(())
    }

    /// Normal operation: dispatch inbound frames and sender ticks to the
    /// pure state machine until the process is told to stop.
    pub async fn run(&mut self) -> Result<(), ReplicaError> {
        loop {
            tokio::select! {
                frame = self.relay.recv() => {
                    let frame = frame?;
                    self.last_lr_instant = Some(Instant::now());
                    self.on_relay_frame(frame).await?;
                }
                frame = self.proxy.recv() => {
                    let frame = frame?;
                    self.on_proxy_frame(frame).await?;
                }
                frame = self.recv_overlay(), if self.overlay.is_some() => {
                    if let Some((sender, frame)) = frame {
                        self.on_overlay_frame(sender, frame).await?;
                    }
                }
                _ = wait_sender(&self.sender) => {
                    self.on_sender_tick().await?;
                }
            }
        }
    }

    async fn recv_overlay(&self) -> Option<(crate::types::ReplicaId, crate::codec::Frame)> {
        match &self.overlay {
            Some(link) => link.recv().await.ok(),
            None => None,
        }
    }

    async fn on_relay_frame(&mut self, frame: codec::Frame) -> Result<(), ReplicaError> {
        let event = match frame.header.msg_type {
            MessageType::LrTrip => Event::LrTrip { dts: frame.header.dts },
            MessageType::LrClose => Event::LrClose { dts: frame.header.dts },
            _ => return Ok(()),
        };
        let actions = state_machine::handle(&mut self.sv, event)?;
        for action in actions {
            self.dispatch_action(action).await?;
        }
        Ok(())
    }

    async fn on_proxy_frame(&mut self, frame: codec::Frame) -> Result<(), ReplicaError> {
        let event = match frame.header.msg_type {
            MessageType::SignedTripAck => Event::TripAck { dts: frame.header.dts },
            MessageType::SignedCloseAck => Event::CloseAck { dts: frame.header.dts },
            _ => return Ok(()),
        };
        if !self.verify_ack_signature(&frame) {
            tracing::warn!(
                sender = frame.header.sender_id,
                dts = frame.header.dts,
                "dropping breaker ack with invalid signature"
            );
            return Ok(());
        }
        if let Some(start) = self.last_lr_instant.take() {
            self.histogram.record(start.elapsed());
        }
        let actions = state_machine::handle(&mut self.sv, event)?;
        for action in actions {
            self.dispatch_action(action).await?;
        }
        Ok(())
    }

    /// Check the breaker proxy's RSA signature over a `SIGNED_*_ACK`
    /// header before it is allowed anywhere near the state machine. The
    /// payload carries the 128-byte signature over the header with
    /// `len=0`, the same convention [`Self::send_relay`] uses when signing
    /// outbound `RELAY_*` frames.
    fn verify_ack_signature(&self, frame: &codec::Frame) -> bool {
        let sig: [u8; codec::SIG_SIZE] = match frame.payload.as_slice().try_into() {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        let header_bytes = codec::encode(
            Header {
                msg_type: frame.header.msg_type,
                sender_id: frame.header.sender_id,
                dts: frame.header.dts,
                len: 0,
            },
            &[],
        );
        self.rsa.verify_proxy_signature(&header_bytes, &sig)
    }

    async fn on_overlay_frame(
        &mut self,
        sender: crate::types::ReplicaId,
        frame: codec::Frame,
    ) -> Result<(), ReplicaError> {
        let threshold_crypto = match &self.threshold {
            Some(t) => t,
            None => return Ok(()),
        };
        let entries = match codec::decode_share_bundle(&frame) {
            Ok(entries) => entries,
            Err(_) => return Ok(()),
        };
        for (i, raw) in entries.iter().enumerate() {
            let slot_dts = frame.header.dts + (i as u64) * DTS_INTERVAL_MS;
            let contribution: Contribution<RistrettoPoint> = match Contribution::from_bytes(raw) {
                Ok(c) => c,
                Err(_) => continue,
            };
            self.aggregator.accept(threshold_crypto, sender, slot_dts, contribution);
        }

        if let Some((dts, state, contributions)) =
            self.aggregator.try_combine(threshold_crypto, self.config.threshold())
        {
            self.on_own_combined(dts, state, contributions).await?;
        }
        Ok(())
    }

    async fn on_own_combined(
        &mut self,
        dts: Dts,
        state: BreakerState,
        contributions: Vec<Contribution<RistrettoPoint>>,
    ) -> Result<(), ReplicaError> {
        let payload = crate::types::StampedState::new(state, dts).to_payload();
        let signature = tm_threshold::CombinedSignature::new(contributions, payload.to_vec());
        let actions = state_machine::handle(&mut self.sv, Event::OwnSigned)?;

        let msg_type = match state {
            BreakerState::Trip => MessageType::SignedTrip,
            BreakerState::Close => MessageType::SignedClose,
        };
        let bytes = signature.to_bytes();
        let header = Header {
            msg_type,
            sender_id: self.config.replica_id,
            dts,
            len: bytes.len() as u32,
        };
        let frame_bytes = codec::encode(header, &bytes);
        self.proxy.send(&frame_bytes).await?;
        self.cur_signed_frame = Some(frame_bytes);

        for action in actions {
            self.dispatch_action(action).await?;
        }
        Ok(())
    }

    async fn on_sender_tick(&mut self) -> Result<(), ReplicaError> {
        let kind = match &self.sender {
            Some(s) => s.kind(),
            None => return Ok(()),
        };
        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let next_dts = to_dts(now_ms, DTS_INTERVAL_MS).max(self.sv.cur_dts + DTS_INTERVAL_MS);

        match kind {
            SenderKind::ShareSender => self.send_share_bundle(next_dts).await?,
            SenderKind::RelaySender => self.send_relay(next_dts).await?,
            SenderKind::SignedSender => self.resend_signed().await?,
        }

        if let Some(sender) = &mut self.sender {
            sender.rearm(next_dts);
        }
        Ok(())
    }

    async fn send_share_bundle(&mut self, base_dts: Dts) -> Result<(), ReplicaError> {
        let threshold_crypto = match &self.threshold {
            Some(t) => t,
            None => return Ok(()),
        };
        self.aggregator.advance_self(base_dts, self.sv.r.state);

        let mut entries: Vec<[u8; SHARE_ENTRY_LEN]> = Vec::new();
        for i in 0..crate::config::SHARES_PER_MSG {
            let dts = base_dts + (i as u64) * DTS_INTERVAL_MS;
            let payload = crate::types::StampedState::new(self.sv.r.state, dts).to_payload();
            let contribution = threshold_crypto.sign_share(&payload);
            entries.push(contribution.to_bytes());
            self.aggregator.accept(threshold_crypto, self.config.replica_id, dts, contribution);
        }

        let bytes = codec::encode_share_bundle(
            share_msg_type(self.sv.r.state),
            self.config.replica_id,
            base_dts,
            &entries,
        );
        if let Some(overlay) = &self.overlay {
            overlay.broadcast(&bytes).await?;
        }

        if let Some((dts, state, contributions)) =
            self.aggregator.try_combine(threshold_crypto, self.config.threshold())
        {
            self.on_own_combined(dts, state, contributions).await?;
        }
        Ok(())
    }

    async fn send_relay(&self, dts: Dts) -> Result<(), ReplicaError> {
        let msg_type = match self.sv.r.state {
            BreakerState::Trip => MessageType::RelayTrip,
            BreakerState::Close => MessageType::RelayClose,
        };
        let header_bytes = codec::encode(
            Header {
                msg_type,
                sender_id: self.config.replica_id,
                dts,
                len: 0,
            },
            &[],
        );
        let sig = self.rsa.sign_header(&header_bytes[..codec::HEADER_LEN])?;
        let bytes = codec::encode_relay(msg_type, self.config.replica_id, dts, &sig);
        self.proxy.send(&bytes).await?;
        Ok(())
    }

    /// Unicast the stored combined threshold signature to the breaker
    /// proxy again. Resends the exact bytes from `on_own_combined`, since
    /// the whole point of a periodic resend is surviving packet loss of
    /// the original.
    async fn resend_signed(&self) -> Result<(), ReplicaError> {
        if let Some(frame_bytes) = &self.cur_signed_frame {
            self.proxy.send(frame_bytes).await?;
        }
        Ok(())
    }

    async fn dispatch_action(&mut self, action: Action) -> Result<(), ReplicaError> {
        match action {
            Action::StartAttemptSender => {
                let kind = match self.config.variant {
                    Variant::V1 => SenderKind::ShareSender,
                    Variant::V2 => SenderKind::RelaySender,
                };
                self.sender = Some(SchedulerHandle::start(
                    kind,
                    Duration::from_millis(DTS_INTERVAL_MS),
                    self.sv.cur_dts,
                    tokio::time::Instant::now(),
                ));
            }
            Action::StartSignedSender => {
                self.sender = Some(SchedulerHandle::start(
                    SenderKind::SignedSender,
                    Duration::from_millis(SIGNED_TIMEOUT_MS),
                    self.sv.b.dts,
                    tokio::time::Instant::now(),
                ));
            }
            Action::StopSender => {
                self.sender = None;
            }
            Action::ForwardAck(category) => {
                let ack_type = match category {
                    BreakerState::Trip => MessageType::SignedTripAck,
                    BreakerState::Close => MessageType::SignedCloseAck,
                };
                self.relay
                    .forward_ack(ack_type, self.config.replica_id, self.sv.b.dts)
                    .await?;
            }
        }
        Ok(())
    }
}

fn relay_event_state(msg_type: MessageType) -> Option<BreakerState> {
    match msg_type {
        MessageType::LrTrip => Some(BreakerState::Trip),
        MessageType::LrClose => Some(BreakerState::Close),
        _ => None,
    }
}

fn ack_state(msg_type: MessageType) -> Option<BreakerState> {
    match msg_type {
        MessageType::SignedTripAck => Some(BreakerState::Trip),
        MessageType::SignedCloseAck => Some(BreakerState::Close),
        _ => None,
    }
}

fn share_msg_type(state: BreakerState) -> MessageType {
    match state {
        BreakerState::Trip => MessageType::TripShare,
        BreakerState::Close => MessageType::CloseShare,
    }
}

/// Await the current sender's tick, or block forever if no sender is active
/// — `tokio::select!` treats a never-resolving branch as simply not firing.
async fn wait_sender(sender: &Option<SchedulerHandle>) {
    match sender {
        Some(s) => s.wait().await,
        None => std::future::pending().await,
    }
}
