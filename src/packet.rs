//! Wire codec for the two packet kinds exchanged by a reliable stream.
//!
//! Binary layout (all fields big-endian):
//!
//! ```text
//! ACK:  opcode(2) seq(2)                      -> 4 bytes
//! DATA: opcode(2) seq(2) length(2) payload(N) -> 6+N bytes
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, RudpError};

const OPCODE_ACK: u16 = 1;
const OPCODE_DATA: u16 = 2;

/// A decoded transport packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportPacket {
    /// Acknowledges the DATA packet carrying `sequence`.
    Ack { sequence: u16 },
    /// Carries a reliable-stream payload.
    ///
    /// `length` is the length the sender declared, which the caller must
    /// compare against `payload.len()` before trusting the packet.
    Data {
        sequence: u16,
        length: u16,
        payload: Bytes,
    },
}

impl TransportPacket {
    pub fn sequence(&self) -> u16 {
        match self {
            TransportPacket::Ack { sequence } => *sequence,
            TransportPacket::Data { sequence, .. } => *sequence,
        }
    }

    /// Encode this packet into a freshly allocated buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            TransportPacket::Ack { .. } => 4,
            TransportPacket::Data { payload, .. } => 6 + payload.len(),
        }
    }

    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            TransportPacket::Ack { sequence } => {
                buf.put_u16(OPCODE_ACK);
                buf.put_u16(*sequence);
            }
            TransportPacket::Data {
                sequence,
                payload,
                ..
            } => {
                buf.put_u16(OPCODE_DATA);
                buf.put_u16(*sequence);
                buf.put_u16(payload.len() as u16);
                buf.put_slice(payload);
            }
        }
    }

    /// Decode a packet from a raw datagram.
    ///
    /// Returns [`RudpError::PacketTooShort`] or [`RudpError::InvalidPacket`]
    /// on malformed input. Does NOT validate that `length == payload.len()`
    /// for DATA packets — that check belongs to the caller (the reliable
    /// stream), since the codec only knows how to parse the wire shape.
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        let total_len = data.len();
        if data.len() < 2 {
            return Err(RudpError::PacketTooShort {
                expected: 2,
                actual: data.len(),
            });
        }
        let opcode = data.get_u16();

        match opcode {
            OPCODE_ACK => {
                // ACK is fixed-width: exactly 4 bytes on the wire. Anything
                // shorter or longer is malformed, but the opcode itself is
                // recognized -- this is a length problem, not an unknown
                // opcode, so it gets its own error rather than InvalidPacket.
                if data.len() != 2 {
                    return Err(RudpError::InvalidAckLength { actual: total_len });
                }
                let sequence = data.get_u16();
                Ok(TransportPacket::Ack { sequence })
            }
            OPCODE_DATA => {
                if data.len() < 4 {
                    return Err(RudpError::PacketTooShort {
                        expected: 4,
                        actual: data.len(),
                    });
                }
                let sequence = data.get_u16();
                let length = data.get_u16();
                let payload = Bytes::copy_from_slice(data);
                Ok(TransportPacket::Data {
                    sequence,
                    length,
                    payload,
                })
            }
            other => Err(RudpError::InvalidPacket(other)),
        }
    }
}
