// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Transport seam.
//!
//! Frames are transport-agnostic byte buffers; this trait is the boundary
//! the gateway routes through. UDP is implemented here; the WebSocket
//! transport lives in the server app (it needs the HTTP upgrade machinery)
//! and the audio "transport" is the DSP pipeline.

use async_trait::async_trait;

use tokio::net::UdpSocket;

use gibberlink_core::types::{Address, Protocol};

use crate::error::{GatewayError, Result};

/// Largest datagram accepted on receive.
const MAX_DATAGRAM: usize = 65_535;

/// Frame-oriented transport.
#[async_trait]
pub trait Transport: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Send each frame as one transport unit, in order.
    async fn send(&self, frames: &[Vec<u8>]) -> Result<()>;

    /// Receive one transport unit.
    async fn recv(&self) -> Result<Vec<u8>>;
}

/// Datagram transport; one frame per datagram.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind an ephemeral local port and connect to the peer address.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] for non-UDP addresses and
    /// propagates socket failures.
    pub async fn connect(peer: &Address) -> Result<Self> {
        if peer.protocol != Protocol::Udp {
            return Err(GatewayError::Transport(format!(
                "expected a udp:// address, got {peer}"
            )));
        }
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect((peer.host.as_str(), peer.port)).await?;
        Ok(Self { socket })
    }

    /// Bind a listening socket (server side).
    ///
    /// # Errors
    ///
    /// Propagates socket failures.
    pub async fn bind(host: &str, port: u16) -> Result<Self> {
        let socket = UdpSocket::bind((host, port)).await?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }

    async fn send(&self, frames: &[Vec<u8>]) -> Result<()> {
        for frame in frames {
            self.socket.send(frame).await?;
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let n = self.socket.recv(&mut buf).await?;
        buf.truncate(n);
        Ok(buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use gibberlink_core::framer::{FrameOptions, Framer};
    use gibberlink_core::types::MsgId;

    #[tokio::test]
    async fn test_udp_round_trip() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        let peer = Address::parse(&format!("udp://127.0.0.1:{port}")).unwrap();
        let client = UdpTransport::connect(&peer).await.unwrap();

        let frames = Framer
            .frame(MsgId::from_bytes(*b"udp1"), b"over the wire", &FrameOptions::default())
            .unwrap();
        client.send(&frames).await.unwrap();

        let mut buf = vec![0u8; 2048];
        let (n, _) = server.recv_from(&mut buf).await.unwrap();
        let frame = Framer.deframe(&buf[..n]).unwrap();
        assert_eq!(frame.payload, b"over the wire");
    }

    #[tokio::test]
    async fn test_connect_rejects_non_udp_address() {
        let peer = Address::parse("ws://host:1234").unwrap();
        assert!(UdpTransport::connect(&peer).await.is_err());
    }
}
