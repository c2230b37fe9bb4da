//! The seven-state TM automaton: a pure function from (state vector,
//! event) to (new state vector, side-effect actions), kept separate from
//! sockets/timers so it is unit-testable on its own.

use crate::types::{AckCategory, BreakerState, Dts, StampedState, StateVector, TmState};

/// Inbound events the automaton reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    LrTrip { dts: Dts },
    LrClose { dts: Dts },
    TripAck { dts: Dts },
    CloseAck { dts: Dts },
    /// v1 only: this replica combined its own valid threshold signature.
    OwnSigned,
}

/// Side effects the caller (replica orchestrator) must perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Entering ATTEMPT_TRIP/ATTEMPT_CLOSE: start whichever sender the
    /// configured variant uses (v1 share sender, v2 relay sender) — the
    /// replica orchestrator maps this to a concrete [`crate::scheduler::SenderKind`].
    StartAttemptSender,
    /// v1 only: combine succeeded, start the signed-message resend loop.
    StartSignedSender,
    StopSender,
    ForwardAck(AckCategory),
}

/// Fatal: an event arrived in a state the transition table says is
/// unreachable for it — a bug, not an attack; there is no recoverable
/// path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImpossibleTransition {
    pub state: TmState,
    pub event: Event,
}

/// Apply one event to the state vector, returning the actions the caller
/// must perform. Implements the full transition table, including the
/// dts-based staleness filter and edge-triggered ack forwarding.
pub fn handle(sv: &mut StateVector, event: Event) -> Result<Vec<Action>, ImpossibleTransition> {
    match event {
        Event::LrTrip { dts } | Event::LrClose { dts } => {
            if dts < sv.r.dts {
                return Ok(vec![]); // stale, silent drop
            }
        }
        Event::TripAck { dts } | Event::CloseAck { dts } => {
            if dts < sv.b.dts {
                return Ok(vec![]); // stale, silent drop
            }
        }
        Event::OwnSigned => {}
    }

    let mut actions = Vec::new();

    match event {
        Event::LrTrip { dts } => {
            sv.r = StampedState::new(BreakerState::Trip, dts);
            match sv.tm_state {
                TmState::Closed => {
                    sv.tm_state = TmState::AttemptTrip;
                    actions.push(Action::StartAttemptSender);
                }
                TmState::WaitTrip => {
                    sv.tm_state = TmState::Tripped;
                }
                TmState::WaitClose => {
                    sv.tm_state = TmState::AttemptTrip;
                    actions.push(Action::StartAttemptSender);
                }
                TmState::Tripped | TmState::AttemptTrip => {
                    // no-op per table ("—")
                }
                TmState::AttemptClose => {
                    actions.push(Action::StopSender);
                    sv.tm_state = TmState::Tripped;
                }
                TmState::Recovery => {
                    return Err(ImpossibleTransition {
                        state: sv.tm_state,
                        event,
                    })
                }
            }
        }
        Event::LrClose { dts } => {
            sv.r = StampedState::new(BreakerState::Close, dts);
            match sv.tm_state {
                TmState::Tripped => {
                    sv.tm_state = TmState::AttemptClose;
                    actions.push(Action::StartAttemptSender);
                }
                TmState::AttemptTrip => {
                    actions.push(Action::StopSender);
                    sv.tm_state = TmState::Closed;
                }
                TmState::WaitTrip => {
                    sv.tm_state = TmState::AttemptClose;
                    actions.push(Action::StartAttemptSender);
                }
                TmState::WaitClose => {
                    sv.tm_state = TmState::Closed;
                }
                TmState::Closed | TmState::AttemptClose => {
                    // no-op per table ("—")
                }
                TmState::Recovery => {
                    return Err(ImpossibleTransition {
                        state: sv.tm_state,
                        event,
                    })
                }
            }
        }
        Event::TripAck { dts } => {
            let strictly_greater = dts > sv.r.dts; // a tie goes to ATTEMPT_*, not WAIT_*
            match sv.tm_state {
                TmState::Closed => {
                    sv.tm_state = if strictly_greater {
                        TmState::WaitTrip
                    } else {
                        TmState::AttemptClose
                    };
                }
                TmState::AttemptTrip => {
                    actions.push(Action::StopSender);
                    sv.tm_state = TmState::Tripped;
                }
                TmState::AttemptClose => {
                    if strictly_greater {
                        actions.push(Action::StopSender);
                        sv.tm_state = TmState::WaitTrip;
                    } else {
                        // Ignore entirely: don't update b, don't forward.
                        return Ok(actions);
                    }
                }
                TmState::WaitClose => {
                    sv.tm_state = TmState::Tripped;
                }
                TmState::Tripped | TmState::WaitTrip => {
                    // no-op per table ("—")
                }
                TmState::Recovery => {
                    return Err(ImpossibleTransition {
                        state: sv.tm_state,
                        event,
                    })
                }
            }
            let category = forward_category(sv, dts, BreakerState::Trip, &mut actions);
            sv.b = StampedState::new(BreakerState::Trip, dts);
            let _ = category;
        }
        Event::CloseAck { dts } => {
            let strictly_greater = dts > sv.r.dts;
            match sv.tm_state {
                TmState::Tripped => {
                    sv.tm_state = if strictly_greater {
                        TmState::WaitClose
                    } else {
                        TmState::AttemptTrip
                    };
                }
                TmState::AttemptClose => {
                    actions.push(Action::StopSender);
                    sv.tm_state = TmState::Closed;
                }
                TmState::AttemptTrip => {
                    if strictly_greater {
                        actions.push(Action::StopSender);
                        sv.tm_state = TmState::WaitClose;
                    } else {
                        // Ignore entirely: don't update b, don't forward.
                        return Ok(actions);
                    }
                }
                TmState::WaitTrip => {
                    sv.tm_state = TmState::Closed;
                }
                TmState::Closed | TmState::WaitClose => {
                    // no-op
                }
                TmState::Recovery => {
                    return Err(ImpossibleTransition {
                        state: sv.tm_state,
                        event,
                    })
                }
            }
            forward_category(sv, dts, BreakerState::Close, &mut actions);
            sv.b = StampedState::new(BreakerState::Close, dts);
        }
        Event::OwnSigned => match sv.tm_state {
            TmState::AttemptTrip => {
                sv.b = sv.r;
                sv.tm_state = TmState::Tripped;
                actions.push(Action::StartSignedSender);
            }
            TmState::AttemptClose => {
                sv.tm_state = TmState::Closed;
            }
            _ => {
                return Err(ImpossibleTransition {
                    state: sv.tm_state,
                    event,
                })
            }
        },
    }

    Ok(actions)
}

/// Edge-triggered ack forwarding: forward iff the ack's category differs
/// from the last category forwarded.
fn forward_category(
    sv: &mut StateVector,
    _dts: Dts,
    category: AckCategory,
    actions: &mut Vec<Action>,
) -> AckCategory {
    if sv.cb_prev_state != Some(category) {
        actions.push(Action::ForwardAck(category));
        sv.cb_prev_state = Some(category);
    }
    category
}
