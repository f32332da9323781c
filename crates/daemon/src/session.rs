//! Server sides of the three session state machines.
//!
//! Each handler owns the daemon socket (through a [`Link`] pinned to the
//! requesting peer) from the first packet of a session until the session
//! terminates, mirroring the client machines in `bft_transfer::client`.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use bft_checksums::file_digest;
use bft_crypto::Keying;
use bft_protocol::{DIGEST_LEN, ErrorCode, Packet};
use bft_transfer::stream::{apply_data_block, send_stream};
use bft_transfer::{BlockSequencer, Link, MAX_RETRIES, TransferError};

use crate::store::{BackupStore, StoreError};

/// Failures that end a server-side session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The transfer machinery gave up or the peer sent an ERROR.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// The requested name was refused by the backup store.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Handles a WRQ session: receives an upload into the backup store.
///
/// The store path is created first and acknowledged with ACK(0); the data
/// loop then decrypts and appends each fresh block. On VERIFY the file is
/// closed, reopened, and digested from disk; a mismatch (or any earlier
/// failure) removes the partial file so uploads never leave partial state.
pub(crate) fn receive_file(
    link: &Link<'_>,
    store: &BackupStore,
    keying: &Keying,
    filename: &str,
) -> Result<(), SessionError> {
    link.set_session_timeout()?;
    let path = resolve_or_deny(link, store, filename)?;

    let file = match File::create(&path) {
        Ok(file) => file,
        Err(err) => {
            let _ = link.send(&Packet::Error {
                code: ErrorCode::AccessDenied,
                message: "Failed to open file for writing".to_owned(),
            });
            return Err(TransferError::file("create", &path, err).into());
        }
    };
    link.send(&Packet::Ack { block: 0 })?;
    info!(peer = %link.peer(), filename, "upload session started");

    let outcome = finish_upload(link, keying, file, &path);
    if outcome.is_err() {
        let _ = fs::remove_file(&path);
    }
    outcome
}

/// Handles an RRQ session: streams a stored file back to the client.
///
/// There is no ACK(0) handshake; the first DATA block is the reply. The
/// VERIFY digest is computed before the stream starts so the client can
/// check the bytes it wrote to disk.
pub(crate) fn send_file(
    link: &Link<'_>,
    store: &BackupStore,
    keying: &Keying,
    filename: &str,
) -> Result<(), SessionError> {
    link.set_session_timeout()?;
    let path = resolve_or_deny(link, store, filename)?;

    let mut file = match File::open(&path) {
        Ok(file) => file,
        Err(err) => {
            let _ = link.send(&Packet::Error {
                code: ErrorCode::FileNotFound,
                message: "File not found".to_owned(),
            });
            return Err(TransferError::file("open", &path, err).into());
        }
    };
    let digest = file_digest(&mut file)
        .map_err(|err| TransferError::file("digest", &path, err))?;

    info!(peer = %link.peer(), filename, "download session started");
    send_stream(link, &mut file, &path, keying, digest)?;
    info!(filename, "download session verified");
    Ok(())
}

/// Handles a DELETE session: one-shot removal from the backup store.
pub(crate) fn remove_file(
    link: &Link<'_>,
    store: &BackupStore,
    filename: &str,
) -> Result<(), SessionError> {
    let path = resolve_or_deny(link, store, filename)?;
    match fs::remove_file(&path) {
        Ok(()) => {
            link.send(&Packet::Ack { block: 0 })?;
            info!(peer = %link.peer(), filename, "deleted");
            Ok(())
        }
        Err(err) => {
            let _ = link.send(&Packet::Error {
                code: ErrorCode::AccessDenied,
                message: "Failed to delete file".to_owned(),
            });
            Err(TransferError::file("remove", &path, err).into())
        }
    }
}

/// Resolves a store name, answering a refusal with ERROR(access denied).
fn resolve_or_deny(
    link: &Link<'_>,
    store: &BackupStore,
    filename: &str,
) -> Result<PathBuf, SessionError> {
    match store.resolve(filename) {
        Ok(path) => Ok(path),
        Err(err) => {
            let _ = link.send(&Packet::Error {
                code: ErrorCode::AccessDenied,
                message: err.to_string(),
            });
            Err(err.into())
        }
    }
}

/// Runs the upload data loop and the on-disk verification that follows it.
fn finish_upload(
    link: &Link<'_>,
    keying: &Keying,
    mut file: File,
    path: &Path,
) -> Result<(), SessionError> {
    let announced = receive_stream(link, keying, &mut file, path)?;

    file.flush()
        .map_err(|err| TransferError::file("flush", path, err))?;
    drop(file);

    // Reopen so the digest reflects the bytes actually on disk.
    let mut written =
        File::open(path).map_err(|err| TransferError::file("reopen", path, err))?;
    let on_disk = file_digest(&mut written)
        .map_err(|err| TransferError::file("digest", path, err))?;
    drop(written);

    if on_disk == announced {
        link.send(&Packet::Ack { block: 0 })?;
        info!(path = %path.display(), "upload verified");
        Ok(())
    } else {
        let _ = link.send(&Packet::Error {
            code: ErrorCode::VerificationFailed,
            message: "MD5 digest mismatch".to_owned(),
        });
        Err(TransferError::Integrity {
            path: path.to_owned(),
        }
        .into())
    }
}

/// Receives DATA blocks until the peer announces its digest with VERIFY.
fn receive_stream(
    link: &Link<'_>,
    keying: &Keying,
    file: &mut File,
    path: &Path,
) -> Result<[u8; DIGEST_LEN], SessionError> {
    let mut sequencer = BlockSequencer::new();
    let mut timeouts = 0;
    loop {
        match link.recv()? {
            Some(Packet::Data { block, payload }) => {
                timeouts = 0;
                if let Err(err) =
                    apply_data_block(link, &mut sequencer, keying, file, path, block, &payload)
                {
                    report_data_failure(link, &err);
                    return Err(err.into());
                }
            }
            Some(Packet::Verify { digest }) => return Ok(digest),
            Some(Packet::Error { code, message }) => {
                return Err(TransferError::Remote { code, message }.into());
            }
            Some(other) => {
                debug!(label = other.label(), "unexpected packet in data loop");
            }
            None => {
                timeouts += 1;
                if timeouts >= MAX_RETRIES {
                    return Err(TransferError::RetryExhausted {
                        attempts: MAX_RETRIES,
                    }
                    .into());
                }
                warn!(timeouts, "timeout waiting for data, still listening");
            }
        }
    }
}

/// Tells the client why its block was refused, where a reply is feasible.
fn report_data_failure(link: &Link<'_>, err: &TransferError) {
    let (code, message) = match err {
        TransferError::Crypto(_) => (ErrorCode::Undefined, "Invalid data packet"),
        TransferError::File { .. } => (ErrorCode::AccessDenied, "Failed to write block"),
        _ => return,
    };
    let _ = link.send(&Packet::Error {
        code,
        message: message.to_owned(),
    });
}
