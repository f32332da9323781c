use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use tracing::{debug, trace, warn};

use bft_protocol::{DATAGRAM_LEN, Packet};

use crate::error::TransferError;

/// Attempts made for each packet that expects an acknowledgement.
pub const MAX_RETRIES: u32 = 5;

/// How long one receive waits before the attempt counts as lost.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(3);

/// One side of a session: a socket pinned to a single peer address.
///
/// Datagrams arriving from any other address are discarded without touching
/// the retry or timeout budget, which keeps a stray sender from corrupting an
/// in-flight session.
#[derive(Debug)]
pub struct Link<'a> {
    socket: &'a UdpSocket,
    peer: SocketAddr,
}

impl<'a> Link<'a> {
    /// Pins `socket` to `peer` for the duration of a session.
    pub fn new(socket: &'a UdpSocket, peer: SocketAddr) -> Self {
        Self { socket, peer }
    }

    /// Address of the session peer.
    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Installs the per-receive session timeout on the underlying socket.
    pub fn set_session_timeout(&self) -> Result<(), TransferError> {
        self.socket
            .set_read_timeout(Some(ACK_TIMEOUT))
            .map_err(TransferError::Transport)
    }

    /// Sends one packet to the peer without waiting for a reply.
    pub fn send(&self, packet: &Packet) -> Result<(), TransferError> {
        let bytes = packet.to_bytes()?;
        self.socket
            .send_to(&bytes, self.peer)
            .map_err(TransferError::Transport)?;
        trace!(label = packet.label(), len = bytes.len(), "sent");
        Ok(())
    }

    /// Receives the next packet from the session peer.
    ///
    /// Returns `Ok(None)` when the socket's read timeout elapses. Foreign
    /// and undecodable datagrams are skipped silently apart from a log line;
    /// the stop-and-wait loops treat only well-formed peer traffic as
    /// progress.
    pub fn recv(&self) -> Result<Option<Packet>, TransferError> {
        let mut buffer = [0u8; DATAGRAM_LEN];
        loop {
            match self.socket.recv_from(&mut buffer) {
                Ok((len, from)) => {
                    if from != self.peer {
                        trace!(%from, "dropping datagram from foreign peer");
                        continue;
                    }
                    match Packet::parse(&buffer[..len]) {
                        Ok(packet) => {
                            trace!(label = packet.label(), len, "received");
                            return Ok(Some(packet));
                        }
                        Err(err) => {
                            debug!(%err, "ignoring malformed datagram");
                        }
                    }
                }
                Err(err)
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    return Ok(None);
                }
                Err(err) => return Err(TransferError::Transport(err)),
            }
        }
    }

    /// Transmits `packet` until the peer acknowledges it with `expected_ack`.
    ///
    /// Per attempt, the link sends the datagram and waits one timeout for a
    /// reply. A matching ACK succeeds; an ACK for another block is logged and
    /// the wait continues within the same attempt; an ERROR packet is fatal
    /// immediately; anything else keeps waiting. A timeout consumes one of
    /// the five attempts. Exhaustion aborts the session without notifying
    /// the peer.
    pub fn send_with_retry(
        &self,
        packet: &Packet,
        expected_ack: u16,
    ) -> Result<(), TransferError> {
        let bytes = packet.to_bytes()?;
        for attempt in 1..=MAX_RETRIES {
            self.socket
                .send_to(&bytes, self.peer)
                .map_err(TransferError::Transport)?;
            trace!(
                label = packet.label(),
                attempt,
                expected_ack,
                "transmitted, awaiting ACK"
            );
            loop {
                match self.recv()? {
                    Some(Packet::Ack { block }) if block == expected_ack => {
                        return Ok(());
                    }
                    Some(Packet::Ack { block }) => {
                        warn!(
                            got = block,
                            expected = expected_ack,
                            "ACK for wrong block, still waiting"
                        );
                    }
                    Some(Packet::Error { code, message }) => {
                        return Err(TransferError::Remote { code, message });
                    }
                    Some(other) => {
                        debug!(label = other.label(), "unexpected packet while awaiting ACK");
                    }
                    None => {
                        if attempt < MAX_RETRIES {
                            warn!(
                                label = packet.label(),
                                attempt,
                                max = MAX_RETRIES,
                                "timeout waiting for ACK, retrying"
                            );
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
}

/// What a data-stream receiver should do with an arriving block number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockDisposition {
    /// The expected block: process the payload, ACK it, advance.
    Fresh,
    /// A retransmission of an already-processed block: re-ACK it unprocessed.
    Duplicate,
    /// A block from beyond the stream position: drop it and re-ACK the
    /// highest block processed so far.
    Ahead {
        /// Block number the re-sent ACK must carry.
        resend_ack: u16,
    },
}

/// Duplicate-suppressing cursor over the 1-origin block sequence.
#[derive(Clone, Debug)]
pub struct BlockSequencer {
    expected: u16,
}

impl Default for BlockSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockSequencer {
    /// Starts a sequence at block 1.
    #[must_use]
    pub fn new() -> Self {
        Self { expected: 1 }
    }

    /// Block number the stream position calls for next.
    #[must_use]
    pub fn expected(&self) -> u16 {
        self.expected
    }

    /// Classifies an arriving block number against the stream position.
    #[must_use]
    pub fn classify(&self, block: u16) -> BlockDisposition {
        if block == self.expected {
            BlockDisposition::Fresh
        } else if block < self.expected {
            BlockDisposition::Duplicate
        } else {
            BlockDisposition::Ahead {
                resend_ack: self.expected - 1,
            }
        }
    }

    /// Advances past a freshly processed block.
    pub fn advance(&mut self) {
        self.expected = self.expected.wrapping_add(1);
    }
}
