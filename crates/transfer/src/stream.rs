//! The data plane shared by both stream directions.
//!
//! Upload (client sends) and download (daemon sends) move bytes through the
//! same pipeline; only the handshake around it differs. The sending half
//! reads, encrypts, and transmits blocks in lockstep and finishes with the
//! VERIFY digest; the receiving half applies one arriving block to the
//! output file under duplicate suppression.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tracing::{debug, warn};

use bft_crypto::Keying;
use bft_protocol::{BLOCK_SIZE, DIGEST_LEN, Packet};

use crate::error::TransferError;
use crate::link::{BlockDisposition, BlockSequencer, Link};

/// Streams `file` to the peer as encrypted DATA blocks, then sends VERIFY.
///
/// Blocks are numbered from 1 and each one is retransmitted until its ACK
/// arrives. The stream terminates with the first short read; a file whose
/// length is an exact multiple of the block size (including an empty file)
/// ends with a zero-plaintext block that decrypts to nothing. The VERIFY
/// packet carrying `digest` is acknowledged with ACK(0) by a peer whose
/// recomputed digest matches.
pub fn send_stream(
    link: &Link<'_>,
    file: &mut File,
    path: &Path,
    keying: &Keying,
    digest: [u8; DIGEST_LEN],
) -> Result<(), TransferError> {
    let mut block: u16 = 1;
    loop {
        let mut chunk = [0u8; BLOCK_SIZE];
        let read = read_block(file, &mut chunk)
            .map_err(|err| TransferError::file("read", path, err))?;
        let payload = keying.encrypt_block(&chunk[..read])?;
        link.send_with_retry(&Packet::Data { block, payload }, block)?;
        debug!(block, bytes = read, "block acknowledged");
        if read < BLOCK_SIZE {
            break;
        }
        block = block.wrapping_add(1);
    }
    link.send_with_retry(&Packet::Verify { digest }, 0)?;
    Ok(())
}

/// Applies one arriving DATA packet to the output file.
///
/// Fresh blocks are decrypted, appended, flushed, and acknowledged; already
/// processed blocks are re-acknowledged without touching the file; blocks
/// from ahead of the stream are dropped and answered with the last good ACK.
pub fn apply_data_block(
    link: &Link<'_>,
    sequencer: &mut BlockSequencer,
    keying: &Keying,
    file: &mut File,
    path: &Path,
    block: u16,
    payload: &[u8],
) -> Result<(), TransferError> {
    match sequencer.classify(block) {
        BlockDisposition::Fresh => {
            let plaintext = keying.decrypt_block(payload)?;
            file.write_all(&plaintext)
                .map_err(|err| TransferError::file("write", path, err))?;
            file.flush()
                .map_err(|err| TransferError::file("flush", path, err))?;
            link.send(&Packet::Ack { block })?;
            sequencer.advance();
        }
        BlockDisposition::Duplicate => {
            debug!(block, "re-acknowledging duplicate block");
            link.send(&Packet::Ack { block })?;
        }
        BlockDisposition::Ahead { resend_ack } => {
            warn!(
                block,
                expected = sequencer.expected(),
                "dropping block from ahead of stream"
            );
            link.send(&Packet::Ack { block: resend_ack })?;
        }
    }
    Ok(())
}

/// Reads up to one block, retrying short reads until EOF or a full chunk.
fn read_block(file: &mut File, chunk: &mut [u8; BLOCK_SIZE]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < BLOCK_SIZE {
        let read = file.read(&mut chunk[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}
