//! Client sides of the three session state machines.
//!
//! Each operation binds an ephemeral UDP socket, pins it to the server
//! address, and drives the session to completion or to the first fatal
//! error. The daemon implements the mirror images of these machines.

use std::fs::File;
use std::io::Write;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::path::Path;

use tracing::{debug, info, warn};

use bft_checksums::file_digest;
use bft_crypto::Keying;
use bft_protocol::{ErrorCode, Packet, validate_filename};

use crate::error::TransferError;
use crate::link::{BlockSequencer, Link, MAX_RETRIES};
use crate::stream::{apply_data_block, send_stream};

/// Uploads the local file at `path` to the server's backup store.
///
/// The file is stored remotely under its basename. The session is
/// `WRQ → ACK(0) → DATA/ACK lockstep → VERIFY → ACK(0)`; any ERROR from the
/// server or an exhausted retry budget aborts it.
pub fn upload(server: SocketAddr, path: &Path) -> Result<(), TransferError> {
    let filename = remote_name(path)?;
    let mut file =
        File::open(path).map_err(|err| TransferError::file("open", path, err))?;
    let digest = file_digest(&mut file)
        .map_err(|err| TransferError::file("digest", path, err))?;

    let socket = bind_for(server)?;
    let link = Link::new(&socket, server);
    link.set_session_timeout()?;
    let keying = Keying::new();

    info!(%server, %filename, "uploading");
    link.send_with_retry(
        &Packet::WriteRequest {
            filename: filename.clone(),
        },
        0,
    )?;

    send_stream(&link, &mut file, path, &keying, digest)?;
    info!(%filename, "upload verified");
    Ok(())
}

/// Downloads `filename` from the server's backup store into `dest`.
///
/// The RRQ is answered directly by the first DATA packet (or an ERROR), so
/// the output file is only created once data actually arrives; a failed
/// request leaves no file behind. After the terminal block the server sends
/// VERIFY, and the client recomputes the digest over the bytes it wrote to
/// disk before acknowledging. A mismatch is answered with ERROR(5); the
/// partial file is kept for inspection.
pub fn download(server: SocketAddr, filename: &str, dest: &Path) -> Result<(), TransferError> {
    validate_filename(filename)?;

    let socket = bind_for(server)?;
    let link = Link::new(&socket, server);
    link.set_session_timeout()?;
    let keying = Keying::new();

    info!(%server, filename, "downloading");
    let (block, payload) = request_first_block(&link, filename)?;

    let mut file =
        File::create(dest).map_err(|err| TransferError::file("create", dest, err))?;
    let mut sequencer = BlockSequencer::new();
    apply_data_block(&link, &mut sequencer, &keying, &mut file, dest, block, &payload)?;

    let mut timeouts = 0;
    loop {
        match link.recv()? {
            Some(Packet::Data { block, payload }) => {
                timeouts = 0;
                apply_data_block(
                    &link,
                    &mut sequencer,
                    &keying,
                    &mut file,
                    dest,
                    block,
                    &payload,
                )?;
            }
            Some(Packet::Verify { digest }) => {
                file.flush()
                    .map_err(|err| TransferError::file("flush", dest, err))?;
                drop(file);
                let mut written = File::open(dest)
                    .map_err(|err| TransferError::file("reopen", dest, err))?;
                let local = file_digest(&mut written)
                    .map_err(|err| TransferError::file("digest", dest, err))?;
                if local == digest {
                    link.send(&Packet::Ack { block: 0 })?;
                    info!(filename, "download verified");
                    return Ok(());
                }
                link.send(&Packet::Error {
                    code: ErrorCode::VerificationFailed,
                    message: "MD5 digest mismatch".to_owned(),
                })?;
                return Err(TransferError::Integrity {
                    path: dest.to_owned(),
                });
            }
            Some(Packet::Error { code, message }) => {
                return Err(TransferError::Remote { code, message });
            }
            Some(other) => {
                debug!(label = other.label(), "unexpected packet in data loop");
            }
            None => {
                timeouts += 1;
                if timeouts >= MAX_RETRIES {
                    return Err(TransferError::RetryExhausted {
                        attempts: MAX_RETRIES,
                    });
                }
                warn!(timeouts, "timeout waiting for data, still listening");
            }
        }
    }
}

/// Asks the server to remove `filename` from its backup store.
pub fn delete(server: SocketAddr, filename: &str) -> Result<(), TransferError> {
    validate_filename(filename)?;

    let socket = bind_for(server)?;
    let link = Link::new(&socket, server);
    link.set_session_timeout()?;

    info!(%server, filename, "requesting deletion");
    link.send_with_retry(
        &Packet::Delete {
            filename: filename.to_owned(),
        },
        0,
    )?;
    info!(filename, "deleted");
    Ok(())
}

/// Sends the RRQ until the first DATA block (or a fatal reply) arrives.
///
/// This is the one send-with-retry loop that awaits DATA rather than an ACK:
/// the server answers a read request directly with block 1.
fn request_first_block(
    link: &Link<'_>,
    filename: &str,
) -> Result<(u16, Vec<u8>), TransferError> {
    let request = Packet::ReadRequest {
        filename: filename.to_owned(),
    };
    for attempt in 1..=MAX_RETRIES {
        link.send(&request)?;
        loop {
            match link.recv()? {
                Some(Packet::Data { block, payload }) => return Ok((block, payload)),
                Some(Packet::Error { code, message }) => {
                    return Err(TransferError::Remote { code, message });
                }
                Some(other) => {
                    debug!(
                        label = other.label(),
                        "unexpected packet while awaiting first block"
                    );
                }
                None => {
                    if attempt < MAX_RETRIES {
                        warn!(attempt, max = MAX_RETRIES, "timeout on read request, retrying");
                    }
                    break;
                }
            }
        }
    }
    Err(TransferError::RetryExhausted {
        attempts: MAX_RETRIES,
    })
}

/// Derives the on-wire name for an upload: the basename of the local path.
fn remote_name(path: &Path) -> Result<String, TransferError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or(bft_protocol::ProtocolError::FilenameEncoding)?;
    validate_filename(name)?;
    Ok(name.to_owned())
}

/// Binds an ephemeral local socket of the same family as the server address.
fn bind_for(server: SocketAddr) -> Result<UdpSocket, TransferError> {
    let local: SocketAddr = match server {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    UdpSocket::bind(local).map_err(TransferError::Transport)
}
