//! Fixed-layout message framing: a 20-byte header followed by a
//! variant-dependent payload.

use crate::types::{Dts, ReplicaId};

pub const HEADER_LEN: usize = 20;

/// RSA signature length, used by the v2 `RELAY_*` payload.
pub const SIG_SIZE: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageType {
    LrTrip = 0,
    LrClose = 1,
    RelayTrip = 2,
    RelayClose = 3,
    TripShare = 4,
    CloseShare = 5,
    SignedTrip = 6,
    SignedClose = 7,
    SignedTripAck = 8,
    SignedCloseAck = 9,
    RecoveryQuery = 10,
}

impl MessageType {
    fn from_u32(v: u32) -> Option<Self> {
        use MessageType::*;
        Some(match v {
            0 => LrTrip,
            1 => LrClose,
            2 => RelayTrip,
            3 => RelayClose,
            4 => TripShare,
            5 => CloseShare,
            6 => SignedTrip,
            7 => SignedClose,
            8 => SignedTripAck,
            9 => SignedCloseAck,
            10 => RecoveryQuery,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub msg_type: MessageType,
    pub sender_id: ReplicaId,
    pub dts: Dts,
    pub len: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub payload: Vec<u8>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("frame shorter than the {HEADER_LEN}-byte header")]
    Truncated,
    #[error("unknown message type {0}")]
    UnknownType(u32),
    #[error("header declares len={declared} but buffer has {available} payload bytes")]
    LengthMismatch { declared: u32, available: usize },
    #[error("frame exceeds the maximum allowed size")]
    Oversized,
}

/// Upper bound on total frame size: a v1 TRIP_SHARE/CLOSE_SHARE with
/// SHARES_PER_MSG=2 shares of at most a few hundred bytes each, generously
/// bounded to reject garbage lengths before allocating.
pub const MAX_FRAME_LEN: usize = 8192;

pub fn encode(header: Header, payload: &[u8]) -> Vec<u8> {
    debug_assert_eq!(header.len as usize, payload.len());
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&(header.msg_type as u32).to_ne_bytes());
    buf.extend_from_slice(&header.sender_id.to_ne_bytes());
    buf.extend_from_slice(&header.dts.to_ne_bytes());
    buf.extend_from_slice(&header.len.to_ne_bytes());
    buf.extend_from_slice(payload);
    buf
}

pub fn decode(buf: &[u8]) -> Result<Frame, CodecError> {
    if buf.len() > MAX_FRAME_LEN {
        return Err(CodecError::Oversized);
    }
    if buf.len() < HEADER_LEN {
        return Err(CodecError::Truncated);
    }

    let msg_type_raw = u32::from_ne_bytes(buf[0..4].try_into().unwrap());
    let msg_type = MessageType::from_u32(msg_type_raw).ok_or(CodecError::UnknownType(msg_type_raw))?;
    let sender_id = u32::from_ne_bytes(buf[4..8].try_into().unwrap());
    let dts = u64::from_ne_bytes(buf[8..16].try_into().unwrap());
    let len = u32::from_ne_bytes(buf[16..20].try_into().unwrap());

    let available = buf.len() - HEADER_LEN;
    if len as usize != available {
        return Err(CodecError::LengthMismatch {
            declared: len,
            available,
        });
    }

    Ok(Frame {
        header: Header {
            msg_type,
            sender_id,
            dts,
            len,
        },
        payload: buf[HEADER_LEN..].to_vec(),
    })
}

/// A `RELAY_TRIP`/`RELAY_CLOSE` frame (v2): header plus a 128-byte RSA
/// signature over the header bytes.
pub fn encode_relay(msg_type: MessageType, sender_id: ReplicaId, dts: Dts, sig: &[u8; SIG_SIZE]) -> Vec<u8> {
    let header = Header {
        msg_type,
        sender_id,
        dts,
        len: SIG_SIZE as u32,
    };
    encode(header, sig)
}

/// `SHARES_PER_MSG * (SIG_SIZE + PROOF_SIZE)` bytes, one 68-byte
/// `tm_threshold::Contribution` encoding per share (v1). `PROOF_SIZE` folds
/// into the contribution encoding itself (commitment + response), so the
/// per-share width is just `tm_threshold`'s 68-byte contribution encoding.
pub const SHARE_ENTRY_LEN: usize = 68;

pub fn encode_share_bundle(
    msg_type: MessageType,
    sender_id: ReplicaId,
    base_dts: Dts,
    shares: &[[u8; SHARE_ENTRY_LEN]],
) -> Vec<u8> {
    let mut payload = Vec::with_capacity(shares.len() * SHARE_ENTRY_LEN);
    for s in shares {
        payload.extend_from_slice(s);
    }
    let header = Header {
        msg_type,
        sender_id,
        dts: base_dts,
        len: payload.len() as u32,
    };
    encode(header, &payload)
}

pub fn decode_share_bundle(frame: &Frame) -> Result<Vec<[u8; SHARE_ENTRY_LEN]>, CodecError> {
    if frame.payload.len() % SHARE_ENTRY_LEN != 0 {
        return Err(CodecError::LengthMismatch {
            declared: frame.header.len,
            available: frame.payload.len(),
        });
    }
    Ok(frame
        .payload
        .chunks_exact(SHARE_ENTRY_LEN)
        .map(|c| c.try_into().unwrap())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_empty_payload() {
        let header = Header {
            msg_type: MessageType::LrTrip,
            sender_id: 1,
            dts: 5000,
            len: 0,
        };
        let bytes = encode(header, &[]);
        assert_eq!(bytes.len(), HEADER_LEN);
        let frame = decode(&bytes).unwrap();
        assert_eq!(frame.header, header);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_round_trip_relay_signature() {
        let sig = [7u8; SIG_SIZE];
        let bytes = encode_relay(MessageType::RelayTrip, 2, 5100, &sig);
        let frame = decode(&bytes).unwrap();
        assert_eq!(frame.header.msg_type, MessageType::RelayTrip);
        assert_eq!(frame.header.sender_id, 2);
        assert_eq!(frame.header.dts, 5100);
        assert_eq!(frame.payload, sig.to_vec());
    }

    #[test]
    fn test_truncated_header_rejected() {
        let buf = [0u8; 10];
        assert_eq!(decode(&buf), Err(CodecError::Truncated));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let header = Header {
            msg_type: MessageType::LrTrip,
            sender_id: 1,
            dts: 0,
            len: 10,
        };
        let bytes = encode(header, &[]);
        assert!(matches!(decode(&bytes), Err(CodecError::LengthMismatch { .. })));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&999u32.to_ne_bytes());
        assert_eq!(decode(&bytes), Err(CodecError::UnknownType(999)));
    }

    #[test]
    fn test_oversized_rejected() {
        let buf = vec![0u8; MAX_FRAME_LEN + 1];
        assert_eq!(decode(&buf), Err(CodecError::Oversized));
    }

    #[test]
    fn test_share_bundle_round_trip() {
        let shares = vec![[1u8; SHARE_ENTRY_LEN], [2u8; SHARE_ENTRY_LEN]];
        let bytes = encode_share_bundle(MessageType::TripShare, 3, 5000, &shares);
        let frame = decode(&bytes).unwrap();
        let decoded = decode_share_bundle(&frame).unwrap();
        assert_eq!(decoded, shares);
    }
}
