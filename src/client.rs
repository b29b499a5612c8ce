//! Client endpoint: a [`Transport`] fixed to a default peer, with support
//! for rebinding that peer after an application-layer handshake moves the
//! session off the server's well-known port (see the original's
//! `server.py` / `worker.py` port-rebinding pattern).

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::config::TransportConfig;
use crate::error::{Result, RudpError};
use crate::transport::{is_routable_peer, Transport};

/// Convenience wrapper over [`Transport`] for talking to one peer.
pub struct Client {
    transport: Arc<Transport>,
    target: Mutex<SocketAddr>,
}

impl Client {
    /// Open an ephemeral local socket and fix `target` as the default peer.
    pub async fn connect(target: SocketAddr, config: TransportConfig) -> Result<Self> {
        if !is_routable_peer(&target) {
            return Err(RudpError::InvalidAddress);
        }
        let unspecified: SocketAddr = match target {
            SocketAddr::V4(_) => ([0, 0, 0, 0], 0).into(),
            SocketAddr::V6(_) => ([0u16; 8], 0).into(),
        };
        let transport = Transport::bind(unspecified, config).await?;
        Ok(Self {
            transport,
            target: Mutex::new(target),
        })
    }

    /// Send `data` to the current target.
    pub async fn send(&self, data: Bytes) -> Result<()> {
        let target = *self.target.lock();
        self.transport.send_to(data, target).await
    }

    /// Block for the next record originating from the current target,
    /// silently discarding records from any other peer.
    pub async fn recv(&self) -> Result<Bytes> {
        loop {
            let (data, from) = self.transport.recv_from().await?;
            if from == *self.target.lock() {
                return Ok(data);
            }
            tracing::debug!(from = %from, "client dropping record from unexpected peer");
        }
    }

    /// Redirect subsequent `send`/`recv` traffic to `new_target`.
    ///
    /// Used after a server worker replies from a fresh ephemeral port: the
    /// client rebinds here, and a new stream for `new_target` is created
    /// lazily on the next send.
    pub fn set_target(&self, new_target: SocketAddr) {
        *self.target.lock() = new_target;
    }

    pub fn target(&self) -> SocketAddr {
        *self.target.lock()
    }

    /// Send `data` to an arbitrary peer, bypassing the default target.
    pub async fn send_to(&self, data: Bytes, peer: SocketAddr) -> Result<()> {
        self.transport.send_to(data, peer).await
    }

    /// Block for the next record from any peer, not just the current target.
    pub async fn recv_from(&self) -> Result<(Bytes, SocketAddr)> {
        self.transport.recv_from().await
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RudpError;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn connect_rejects_unspecified_target() {
        let unspecified: SocketAddr = (Ipv4Addr::UNSPECIFIED, 12345).into();
        match Client::connect(unspecified, TransportConfig::default()).await {
            Err(RudpError::InvalidAddress) => {}
            Err(other) => panic!("expected InvalidAddress, got {other:?}"),
            Ok(_) => panic!("expected InvalidAddress, connect succeeded"),
        }
    }

    #[tokio::test]
    async fn set_target_redirects_send_and_recv() {
        let server_a = crate::transport::Transport::bind(
            (Ipv4Addr::LOCALHOST, 0).into(),
            TransportConfig::default(),
        )
        .await
        .unwrap();
        let server_b = crate::transport::Transport::bind(
            (Ipv4Addr::LOCALHOST, 0).into(),
            TransportConfig::default(),
        )
        .await
        .unwrap();

        let client = Client::connect(server_a.local_addr().unwrap(), TransportConfig::default())
            .await
            .unwrap();

        client.send(Bytes::from_static(b"hello")).await.unwrap();
        let (greeting, client_addr) = server_a.recv_from().await.unwrap();
        assert_eq!(&greeting[..], b"hello");

        // Simulate the worker handoff: server_b now owns the session.
        client.set_target(server_b.local_addr().unwrap());
        assert_eq!(client.target(), server_b.local_addr().unwrap());

        client.send(Bytes::from_static(b"world")).await.unwrap();
        let (payload, from) = server_b.recv_from().await.unwrap();
        assert_eq!(&payload[..], b"world");
        assert_eq!(from, client_addr);
    }
}
