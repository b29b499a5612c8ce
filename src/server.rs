//! Server endpoint: a [`Transport`] bound to a fixed local address, serving
//! any number of peers concurrently via the shared stream map.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::TransportConfig;
use crate::error::Result;
use crate::stream::Delivery;
use crate::transport::Transport;

/// Convenience wrapper over [`Transport`] bound to a well-known address.
pub struct Server {
    transport: Arc<Transport>,
}

impl Server {
    pub async fn bind(addr: SocketAddr, config: TransportConfig) -> Result<Self> {
        let transport = Transport::bind(addr, config).await?;
        Ok(Self { transport })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub async fn send_to(&self, data: Bytes, peer: SocketAddr) -> Result<()> {
        self.transport.send_to(data, peer).await
    }

    pub async fn recv_from(&self) -> Result<Delivery> {
        self.transport.recv_from().await
    }

    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }
}
