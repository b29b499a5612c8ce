//! Per-peer reliable stream: Selective Repeat, degenerating to Stop-and-Wait
//! when the configured window is 1.
//!
//! Mirrors the shape of `strandstream`'s `ReliableOrderedSender` /
//! `ReliableOrderedReceiver` pair, but collapsed into one struct that also
//! owns retransmission timers and actually talks to a socket, since here
//! there is no outer connection/mux layer driving a separate poll loop.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::config::TransportConfig;
use crate::packet::TransportPacket;
use crate::sequence::{is_ahead, SequenceNumber};

/// A delivered, in-order application record plus the peer it came from.
pub type Delivery = (Bytes, SocketAddr);

struct OutstandingSend {
    timer: JoinHandle<()>,
}

struct StreamState {
    next_seq: SequenceNumber,
    expected_seq: SequenceNumber,
    out_timers: BTreeMap<u16, OutstandingSend>,
    reorder_buffer: BTreeMap<u16, Bytes>,
    consecutive_interrupts: u32,
    closing: bool,
}

impl StreamState {
    fn new() -> Self {
        Self {
            next_seq: SequenceNumber::new(),
            expected_seq: SequenceNumber::new(),
            out_timers: BTreeMap::new(),
            reorder_buffer: BTreeMap::new(),
            consecutive_interrupts: 0,
            closing: false,
        }
    }
}

/// Reliable, ordered, at-most-once-delivery channel to a single peer.
///
/// Owned by a [`crate::transport::Transport`], one per remote address.
pub struct ReliableStream {
    target: SocketAddr,
    socket: Arc<UdpSocket>,
    config: TransportConfig,
    state: Mutex<StreamState>,
    window_slots: Arc<Semaphore>,
    delivery_tx: mpsc::UnboundedSender<Delivery>,
}

impl ReliableStream {
    pub fn new(
        target: SocketAddr,
        socket: Arc<UdpSocket>,
        config: TransportConfig,
        delivery_tx: mpsc::UnboundedSender<Delivery>,
    ) -> Arc<Self> {
        Arc::new(Self {
            target,
            socket,
            config,
            state: Mutex::new(StreamState::new()),
            window_slots: Arc::new(Semaphore::new(config.window_size)),
            delivery_tx,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send one record to this stream's peer. Blocks until a window slot is
    /// available (Selective Repeat) or the single permit is free
    /// (Stop-and-Wait when `window_size == 1`).
    pub async fn send(self: &Arc<Self>, payload: Bytes) -> crate::error::Result<()> {
        if payload.is_empty() {
            return Err(crate::error::RudpError::EmptyPayload);
        }

        let permit = Arc::clone(&self.window_slots)
            .acquire_owned()
            .await
            .expect("semaphore is never closed");

        let seq = {
            let mut state = self.state.lock();
            let seq = state.next_seq.value();
            state.next_seq.increase();
            seq
        };

        let packet = TransportPacket::Data {
            sequence: seq,
            length: payload.len() as u16,
            payload,
        };

        self.arm_timer(seq, &packet, permit);
        if let Err(err) = self.transmit(&packet).await {
            self.cancel_timer(seq);
            return Err(err);
        }
        Ok(())
    }

    async fn transmit(&self, packet: &TransportPacket) -> crate::error::Result<()> {
        let encoded = packet.encode();
        self.socket.send_to(&encoded, self.target).await?;
        Ok(())
    }

    /// Start (or restart) the one-shot retransmission timer for `seq`.
    ///
    /// Records the timer in `out_timers` before returning, so a caller must
    /// always arm the timer before the matching packet is transmitted --
    /// otherwise a fast peer's ACK could arrive and be handled before this
    /// stream considers `seq` outstanding, and `handle_ack` would discard it
    /// as unsolicited instead of cancelling the (not-yet-armed) timer.
    ///
    /// The semaphore permit for this DATA packet is moved into the timer
    /// task so it is only released once the packet is finally ACKed.
    fn arm_timer(
        self: &Arc<Self>,
        seq: u16,
        packet: &TransportPacket,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        let stream = Arc::clone(self);
        let timer_packet = packet.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(stream.config.timer).await;
            stream.on_timer_fire(seq, timer_packet, permit).await;
        });

        let mut state = self.state.lock();
        state.out_timers.insert(seq, OutstandingSend { timer: handle });
    }

    async fn on_timer_fire(
        self: Arc<Self>,
        seq: u16,
        packet: TransportPacket,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        let (should_abort, should_resend) = {
            let mut state = self.state.lock();
            if !state.out_timers.contains_key(&seq) {
                // Already ACKed and removed by handle(); nothing to do.
                return;
            }
            state.consecutive_interrupts += 1;
            let give_up =
                state.closing && state.consecutive_interrupts >= self.config.drop_threshold;
            if give_up {
                state.out_timers.remove(&seq);
            }
            (give_up, !give_up)
        };

        if should_abort {
            tracing::warn!(peer = %self.target, sequence = seq, "giving up on unacked packet during close");
            drop(permit);
            return;
        }

        if should_resend {
            tracing::debug!(peer = %self.target, sequence = seq, "retransmitting");
            // Re-arm before the actual socket write, same as the initial
            // send: this replaces the out_timers entry with the new timer
            // task's handle up front, so a concurrent ack that arrives
            // while the retransmit is in flight cancels the fresh timer
            // instead of racing against this now-finishing one.
            self.arm_timer(seq, &packet, permit);
            if self.transmit(&packet).await.is_err() {
                tracing::error!(peer = %self.target, sequence = seq, "retransmit send failed");
            }
        }
    }

    /// Handle one datagram already known to originate from `self.target`.
    pub async fn handle(self: &Arc<Self>, raw: &[u8]) {
        let packet = match TransportPacket::decode(raw) {
            Ok(p) => p,
            Err(err) => {
                tracing::debug!(peer = %self.target, error = %err, "dropping invalid packet");
                return;
            }
        };

        {
            let mut state = self.state.lock();
            state.consecutive_interrupts = 0;
        }

        match packet {
            TransportPacket::Ack { sequence } => self.handle_ack(sequence),
            TransportPacket::Data {
                sequence,
                length,
                payload,
            } => self.handle_data(sequence, length, payload).await,
        }
    }

    fn handle_ack(&self, sequence: u16) {
        let mut state = self.state.lock();
        if let Some(outstanding) = state.out_timers.remove(&sequence) {
            outstanding.timer.abort();
        } else {
            tracing::debug!(peer = %self.target, sequence, "ignoring unsolicited or duplicate ack");
        }
    }

    /// Undo a just-armed timer: used when the matching transmit never made
    /// it onto the wire, so `seq` was never really outstanding.
    fn cancel_timer(&self, seq: u16) {
        if let Some(outstanding) = self.state.lock().out_timers.remove(&seq) {
            outstanding.timer.abort();
        }
    }

    async fn handle_data(&self, sequence: u16, length: u16, payload: Bytes) {
        if length as usize != payload.len() {
            tracing::debug!(
                peer = %self.target,
                sequence,
                expected = length,
                actual = payload.len(),
                "dropping data with length mismatch"
            );
            return;
        }

        // Always ack, including duplicates, so the peer's retransmission
        // loop can terminate.
        let ack = TransportPacket::Ack { sequence };
        if self.transmit(&ack).await.is_err() {
            tracing::error!(peer = %self.target, sequence, "failed to send ack");
        }

        let mut ready = Vec::new();
        {
            let mut state = self.state.lock();
            let expected = state.expected_seq.value();

            if sequence == expected {
                ready.push(payload);
                state.expected_seq.increase();
                loop {
                    let next = state.expected_seq.value();
                    match state.reorder_buffer.remove(&next) {
                        Some(buffered) => {
                            ready.push(buffered);
                            state.expected_seq.increase();
                        }
                        None => break,
                    }
                }
            } else if is_ahead(sequence, expected, self.config.window_size) {
                state.reorder_buffer.insert(sequence, payload);
            } else {
                tracing::debug!(peer = %self.target, sequence, expected, "dropping duplicate of delivered record");
            }
        }

        for record in ready {
            if self.delivery_tx.send((record, self.target)).is_err() {
                tracing::debug!(peer = %self.target, "delivery queue closed, dropping record");
            }
        }
    }

    /// True if any DATA packet sent to this peer is still unacknowledged.
    pub fn has_unacked_packets(&self) -> bool {
        !self.state.lock().out_timers.is_empty()
    }

    /// Mark this stream as closing: outstanding retransmissions keep firing
    /// until `DROP_THRESHOLD` consecutive attempts go unanswered.
    pub fn close(&self) {
        self.state.lock().closing = true;
    }
}
