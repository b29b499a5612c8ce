use thiserror::Error;

/// All errors produced by the rudp transport core.
#[derive(Debug, Error)]
pub enum RudpError {
    #[error("invalid packet: unknown opcode 0x{0:04x}")]
    InvalidPacket(u16),

    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort { expected: usize, actual: usize },

    #[error("invalid ack packet: expected exactly 4 bytes, got {actual}")]
    InvalidAckLength { actual: usize },

    #[error("data length mismatch: header said {expected}, payload carried {actual}")]
    LengthMismatch { expected: u16, actual: usize },

    #[error("cannot send empty payload")]
    EmptyPayload,

    #[error("invalid peer address")]
    InvalidAddress,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RudpError>;
