use thiserror::Error;

/// Errors produced while encoding or decoding a datagram.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The datagram is shorter than the four-byte packet header.
    #[error("datagram of {len} bytes is shorter than the packet header")]
    Truncated {
        /// Observed datagram length.
        len: usize,
    },

    /// The leading opcode is outside the known range.
    #[error("unknown opcode {0}")]
    UnknownOpcode(u16),

    /// A request carried an empty or over-long filename.
    #[error("filename of {len} bytes is outside the accepted 1..=64 range")]
    FilenameLength {
        /// Observed filename length in bytes.
        len: usize,
    },

    /// A request filename was not valid UTF-8.
    #[error("filename is not valid UTF-8")]
    FilenameEncoding,

    /// A request body was missing one of its null terminators.
    #[error("request field is missing its null terminator")]
    MissingTerminator,

    /// A request named a transfer mode other than `octet`.
    #[error("unsupported transfer mode {0:?}")]
    UnsupportedMode(String),

    /// A DATA payload exceeded the 512-byte block capacity.
    #[error("data payload of {len} bytes exceeds the 512-byte block")]
    OversizedPayload {
        /// Observed payload length.
        len: usize,
    },

    /// A fixed-size packet arrived with the wrong length for its opcode.
    #[error("opcode {opcode} packet has invalid length {len}")]
    InvalidLength {
        /// Opcode of the malformed packet.
        opcode: u16,
        /// Observed datagram length.
        len: usize,
    },
}
