//! Sockets: IPC to the local relay proxy, UDP to the breaker proxy, and
//! (v1 only) UDP to peer replicas for share broadcast.
//!
//! No peer-discovery or connection-management layer is needed here — the
//! deployment is a fixed, small replica set with addresses known up front
//! from config, so this is three thin socket wrappers rather than a p2p
//! stack.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use tokio::net::{UdpSocket, UnixDatagram};

use crate::codec::{self, Frame, Header, MessageType, MAX_FRAME_LEN};
use crate::types::{Dts, ReplicaId};

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("failed to bind {0}: {1}")]
    Bind(String, String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("recv failed: {0}")]
    Recv(String),
    #[error("unknown peer {0}")]
    UnknownPeer(ReplicaId),
}

/// The local relay proxy: `LR_TRIP`/`LR_CLOSE` arrive here, acks are
/// forwarded back the same way. A Unix domain datagram socket, per the
/// spec's "a local IPC channel (Unix domain socket in practice)".
pub struct RelayLink {
    socket: UnixDatagram,
    peer_path: std::path::PathBuf,
}

impl RelayLink {
    pub fn bind(local_path: &Path, peer_path: &Path) -> Result<Self, NetworkError> {
        let _ = std::fs::remove_file(local_path);
        let socket = UnixDatagram::bind(local_path)
            .map_err(|e| NetworkError::Bind(local_path.display().to_string(), e.to_string()))?;
        Ok(Self {
            socket,
            peer_path: peer_path.to_path_buf(),
        })
    }

    pub async fn recv(&self) -> Result<Frame, NetworkError> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = self
            .socket
            .recv(&mut buf)
            .await
            .map_err(|e| NetworkError::Recv(e.to_string()))?;
        codec::decode(&buf[..n]).map_err(|e| NetworkError::Recv(e.to_string()))
    }

    pub async fn send(&self, header: Header, payload: &[u8]) -> Result<(), NetworkError> {
        let bytes = codec::encode(header, payload);
        self.socket
            .send_to(&bytes, &self.peer_path)
            .await
            .map_err(|e| NetworkError::Send(e.to_string()))?;
        Ok(())
    }

    /// Forward an ack category to the local relay proxy.
    pub async fn forward_ack(
        &self,
        msg_type: MessageType,
        sender_id: ReplicaId,
        dts: Dts,
    ) -> Result<(), NetworkError> {
        let header = Header {
            msg_type,
            sender_id,
            dts,
            len: 0,
        };
        self.send(header, &[]).await
    }
}

/// The breaker proxy overlay: `SIGNED_TRIP`/`SIGNED_CLOSE`/`RECOVERY_QUERY`
/// go out, `SIGNED_*_ACK` comes back. Used by both variants.
pub struct ProxyLink {
    socket: UdpSocket,
    proxy_addr: SocketAddr,
}

impl ProxyLink {
    pub async fn bind(local_addr: SocketAddr, proxy_addr: SocketAddr) -> Result<Self, NetworkError> {
        let socket = UdpSocket::bind(local_addr)
            .await
            .map_err(|e| NetworkError::Bind(local_addr.to_string(), e.to_string()))?;
        Ok(Self { socket, proxy_addr })
    }

    pub async fn recv(&self) -> Result<Frame, NetworkError> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let (n, from) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| NetworkError::Recv(e.to_string()))?;
        if from != self.proxy_addr {
            return Err(NetworkError::Recv(format!(
                "datagram from unexpected address {from}"
            )));
        }
        codec::decode(&buf[..n]).map_err(|e| NetworkError::Recv(e.to_string()))
    }

    pub async fn send(&self, bytes: &[u8]) -> Result<(), NetworkError> {
        self.socket
            .send_to(bytes, self.proxy_addr)
            .await
            .map_err(|e| NetworkError::Send(e.to_string()))?;
        Ok(())
    }
}

/// Replica-to-replica overlay (v1 only): share bundles broadcast every
/// `DTS_INTERVAL`.
pub struct OverlayLink {
    socket: UdpSocket,
    peers: HashMap<ReplicaId, SocketAddr>,
}

impl OverlayLink {
    pub async fn bind(
        local_addr: SocketAddr,
        peers: HashMap<ReplicaId, SocketAddr>,
    ) -> Result<Self, NetworkError> {
        let socket = UdpSocket::bind(local_addr)
            .await
            .map_err(|e| NetworkError::Bind(local_addr.to_string(), e.to_string()))?;
        Ok(Self { socket, peers })
    }

    pub async fn recv(&self) -> Result<(ReplicaId, Frame), NetworkError> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let (n, from) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| NetworkError::Recv(e.to_string()))?;
        let frame = codec::decode(&buf[..n]).map_err(|e| NetworkError::Recv(e.to_string()))?;
        let sender = self
            .peers
            .iter()
            .find(|(_, addr)| **addr == from)
            .map(|(id, _)| *id)
            .unwrap_or(frame.header.sender_id);
        Ok((sender, frame))
    }

    pub async fn broadcast(&self, bytes: &[u8]) -> Result<(), NetworkError> {
        for addr in self.peers.values() {
            self.socket
                .send_to(bytes, addr)
                .await
                .map_err(|e| NetworkError::Send(e.to_string()))?;
        }
        Ok(())
    }

    pub async fn send_to(&self, peer: ReplicaId, bytes: &[u8]) -> Result<(), NetworkError> {
        let addr = self
            .peers
            .get(&peer)
            .ok_or(NetworkError::UnknownPeer(peer))?;
        self.socket
            .send_to(bytes, addr)
            .await
            .map_err(|e| NetworkError::Send(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_proxy_link_round_trip() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let client_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let link = ProxyLink::bind(client_addr, server_addr).await.unwrap();

        let header = Header {
            msg_type: MessageType::RecoveryQuery,
            sender_id: 1,
            dts: 0,
            len: 0,
        };
        link.send(&codec::encode(header, &[])).await.unwrap();

        let mut buf = [0u8; MAX_FRAME_LEN];
        let (n, from) = server.recv_from(&mut buf).await.unwrap();
        let frame = codec::decode(&buf[..n]).unwrap();
        assert_eq!(frame.header.msg_type, MessageType::RecoveryQuery);
        assert_eq!(from, link.socket.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_overlay_link_broadcast() {
        let a_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let a_addr = a_sock.local_addr().unwrap();
        let b_addr = b_sock.local_addr().unwrap();
        drop(a_sock);
        drop(b_sock);

        let mut peers = HashMap::new();
        peers.insert(2u32, b_addr);
        let overlay = OverlayLink::bind(a_addr, peers).await.unwrap();

        let receiver = UdpSocket::bind(b_addr).await.unwrap();
        let header = Header {
            msg_type: MessageType::TripShare,
            sender_id: 1,
            dts: 5000,
            len: 0,
        };
        overlay.broadcast(&codec::encode(header, &[])).await.unwrap();

        let mut buf = [0u8; MAX_FRAME_LEN];
        let (n, _) = receiver.recv_from(&mut buf).await.unwrap();
        let frame = codec::decode(&buf[..n]).unwrap();
        assert_eq!(frame.header.sender_id, 1);
    }
}
