//! rudp -- reliable datagram transport core.
//!
//! A connectionless, per-peer, ordered, at-most-once-delivery transport
//! built on UDP, offering Selective Repeat (configurable window) and its
//! Stop-and-Wait degenerate case (window size 1). This crate implements
//! only the transport core: packet codec, sequence numbers, per-peer
//! reliable streams, the multiplexing transport, and thin client/server
//! endpoint wrappers. File segmentation, request framing, and application
//! protocol concerns live above this layer.

pub mod client;
pub mod config;
pub mod error;
pub mod packet;
pub mod sequence;
pub mod server;
pub mod stream;
pub mod transport;

pub use client::Client;
pub use config::TransportConfig;
pub use error::{Result, RudpError};
pub use packet::TransportPacket;
pub use sequence::SequenceNumber;
pub use server::Server;
pub use stream::ReliableStream;
pub use transport::Transport;
