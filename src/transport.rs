//! The reliable transport: owns the UDP socket, demultiplexes inbound
//! datagrams to per-peer [`ReliableStream`]s, and exposes a single delivery
//! queue to the application.
//!
//! Grounded on `strandstream`'s `Multiplexer` (get-or-insert-by-key dispatch)
//! combined with the reader-thread / `stream_for_address` pattern from the
//! original Python `transport.py`, reimplemented as a background tokio task.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::config::TransportConfig;
use crate::error::{Result, RudpError};
use crate::stream::{Delivery, ReliableStream};

/// A predicate used to simulate datagram loss in tests: returns `true` to
/// drop an inbound datagram from the given peer. Never used in production
/// call paths; set via [`Transport::set_loss_filter`].
type LossFilter = Box<dyn Fn(&SocketAddr) -> bool + Send + Sync>;

/// A peer a stream can actually be opened to: a concrete IP, and a concrete
/// port, since port 0 means "let the OS pick" on bind but is not a valid
/// destination to send to.
pub(crate) fn is_routable_peer(addr: &SocketAddr) -> bool {
    addr.port() != 0 && !addr.ip().is_unspecified()
}

/// Owns one UDP socket and every [`ReliableStream`] multiplexed over it.
pub struct Transport {
    socket: Arc<UdpSocket>,
    config: TransportConfig,
    streams: Mutex<HashMap<SocketAddr, Arc<ReliableStream>>>,
    delivery_tx: mpsc::UnboundedSender<Delivery>,
    delivery_rx: AsyncMutex<mpsc::UnboundedReceiver<Delivery>>,
    online: AtomicBool,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
    last_error: Mutex<Option<std::io::Error>>,
    loss_filter: Mutex<Option<LossFilter>>,
}

impl Transport {
    /// Bind a transport to `addr`. Pass `0.0.0.0:0` (or `[::]:0`) for an
    /// unbound client-style endpoint.
    pub async fn bind(addr: SocketAddr, config: TransportConfig) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::from_socket(socket, config))
    }

    fn from_socket(socket: UdpSocket, config: TransportConfig) -> Arc<Self> {
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            socket: Arc::new(socket),
            config,
            streams: Mutex::new(HashMap::new()),
            delivery_tx,
            delivery_rx: AsyncMutex::new(delivery_rx),
            online: AtomicBool::new(true),
            reader_handle: Mutex::new(None),
            last_error: Mutex::new(None),
            loss_filter: Mutex::new(None),
        });

        let reader = Arc::clone(&transport);
        let handle = tokio::spawn(async move { reader.reader_loop().await });
        *transport.reader_handle.lock() = Some(handle);
        transport
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Install a predicate that causes matching inbound datagrams to be
    /// silently discarded before dispatch. Test-only affordance; production
    /// code never sets this.
    pub fn set_loss_filter<F>(&self, filter: F)
    where
        F: Fn(&SocketAddr) -> bool + Send + Sync + 'static,
    {
        *self.loss_filter.lock() = Some(Box::new(filter));
    }

    /// Send `data` to `peer`, lazily creating that peer's stream.
    pub async fn send_to(self: &Arc<Self>, data: Bytes, peer: SocketAddr) -> Result<()> {
        if !is_routable_peer(&peer) {
            return Err(RudpError::InvalidAddress);
        }
        if data.is_empty() {
            return Err(RudpError::EmptyPayload);
        }
        let stream = self.get_or_create_stream(peer);
        stream.send(data).await
    }

    /// Block until the next in-order record is available from any peer.
    pub async fn recv_from(&self) -> Result<Delivery> {
        let mut rx = self.delivery_rx.lock().await;
        rx.recv().await.ok_or(RudpError::ConnectionClosed)
    }

    fn get_or_create_stream(self: &Arc<Self>, peer: SocketAddr) -> Arc<ReliableStream> {
        let mut streams = self.streams.lock();
        Arc::clone(streams.entry(peer).or_insert_with(|| {
            ReliableStream::new(
                peer,
                Arc::clone(&self.socket),
                self.config,
                self.delivery_tx.clone(),
            )
        }))
    }

    fn has_unacked_packets(&self) -> bool {
        self.streams
            .lock()
            .values()
            .any(|s| s.has_unacked_packets())
    }

    async fn reader_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; self.config.bufsize];
        loop {
            if !self.online.load(Ordering::Acquire) && !self.has_unacked_packets() {
                break;
            }

            let read = tokio::time::timeout(
                std::time::Duration::from_secs(1),
                self.socket.recv_from(&mut buf),
            )
            .await;

            match read {
                Ok(Ok((n, peer))) => {
                    let dropped = self
                        .loss_filter
                        .lock()
                        .as_ref()
                        .map(|f| f(&peer))
                        .unwrap_or(false);
                    if dropped {
                        tracing::debug!(peer = %peer, "loss filter dropped inbound datagram");
                        continue;
                    }
                    let stream = self.get_or_create_stream(peer);
                    stream.handle(&buf[..n]).await;
                }
                Ok(Err(err)) => {
                    tracing::error!(error = %err, "transport socket read error");
                    *self.last_error.lock() = Some(err);
                    break;
                }
                Err(_elapsed) => continue,
            }
        }
    }

    /// Initiate shutdown: stop accepting new reads once in-flight sends
    /// drain, then join the reader task.
    ///
    /// Returns the last socket I/O error observed by the reader, if any.
    pub async fn close(self: &Arc<Self>) -> Result<()> {
        self.online.store(false, Ordering::Release);
        for stream in self.streams.lock().values() {
            stream.close();
        }

        let handle = self.reader_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(join_err) = handle.await {
                tracing::error!(error = %join_err, "reader task panicked");
            }
        }

        match self.last_error.lock().take() {
            Some(err) => Err(RudpError::Io(err)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    async fn bind_loopback() -> Arc<Transport> {
        Transport::bind((Ipv4Addr::LOCALHOST, 0).into(), TransportConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn lossless_echo_roundtrip() {
        let a = bind_loopback().await;
        let b = bind_loopback().await;
        let b_addr = b.local_addr().unwrap();

        for i in 0..25u32 {
            a.send_to(Bytes::from(i.to_string()), b_addr).await.unwrap();
        }

        let mut received = Vec::new();
        for _ in 0..25 {
            let (data, _from) = b.recv_from().await.unwrap();
            received.push(String::from_utf8(data.to_vec()).unwrap());
        }
        let expected: Vec<String> = (0..25u32).map(|i| i.to_string()).collect();
        assert_eq!(received, expected);

        a.close().await.unwrap();
        b.close().await.unwrap();
    }

    #[tokio::test]
    async fn send_to_rejects_empty_payload() {
        let a = bind_loopback().await;
        let b_addr = "127.0.0.1:9".parse().unwrap();
        let err = a.send_to(Bytes::new(), b_addr).await.unwrap_err();
        assert!(matches!(err, RudpError::EmptyPayload));
    }

    #[tokio::test]
    async fn send_to_rejects_unspecified_address() {
        let a = bind_loopback().await;
        let unspecified: SocketAddr = (Ipv4Addr::UNSPECIFIED, 12345).into();
        let err = a.send_to(Bytes::from_static(b"x"), unspecified).await.unwrap_err();
        assert!(matches!(err, RudpError::InvalidAddress));
    }

    #[tokio::test]
    async fn send_to_rejects_port_zero() {
        let a = bind_loopback().await;
        let no_port: SocketAddr = (Ipv4Addr::LOCALHOST, 0).into();
        let err = a.send_to(Bytes::from_static(b"x"), no_port).await.unwrap_err();
        assert!(matches!(err, RudpError::InvalidAddress));
    }

    #[tokio::test]
    async fn loss_filter_drops_matching_datagrams() {
        let a = bind_loopback().await;
        let b = bind_loopback().await;
        let b_addr = b.local_addr().unwrap();

        // Drop everything arriving at b so a's sends never get delivered,
        // and never get ACKed either.
        b.set_loss_filter(|_peer| true);

        a.send_to(Bytes::from_static(b"x"), b_addr).await.unwrap();
        assert!(tokio::time::timeout(std::time::Duration::from_millis(50), b.recv_from())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_releases_socket() {
        let a = bind_loopback().await;
        a.close().await.unwrap();
        a.close().await.unwrap();
    }
}
