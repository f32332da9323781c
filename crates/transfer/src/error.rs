use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use bft_crypto::CryptoError;
use bft_protocol::{ErrorCode, ProtocolError};

/// Errors surfaced by a transfer session.
///
/// The variants follow the internal taxonomy both endpoints share: transport,
/// protocol, crypto, filesystem, and integrity failures, plus the case where
/// the peer ended the session with an ERROR packet of its own.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransferError {
    /// Socket-level send or receive failure.
    #[error("socket I/O failed: {0}")]
    Transport(io::Error),

    /// The peer never answered within the retry budget.
    #[error("no response from peer after {attempts} attempts")]
    RetryExhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// A datagram could not be encoded for transmission.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A data block could not be encrypted or decrypted.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// A local file could not be opened, read, written, or removed.
    #[error("failed to {action} '{}': {source}", .path.display())]
    File {
        /// Operation that failed, e.g. `open` or `write`.
        action: &'static str,
        /// Path the operation targeted.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The transferred bytes do not match the announced MD5 digest.
    #[error("digest mismatch for '{}'", .path.display())]
    Integrity {
        /// Path of the file that failed verification.
        path: PathBuf,
    },

    /// The peer aborted the session with an ERROR packet.
    #[error("peer reported: {message} ({code})")]
    Remote {
        /// Error-catalog entry carried by the packet.
        code: ErrorCode,
        /// Message carried by the packet.
        message: String,
    },
}

impl TransferError {
    /// Builds a [`TransferError::File`] with its path context.
    pub fn file(action: &'static str, path: &Path, source: io::Error) -> Self {
        Self::File {
            action,
            path: path.to_owned(),
            source,
        }
    }
}
