use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use bft_crypto::Keying;
use bft_protocol::{DATAGRAM_LEN, ErrorCode, Packet};
use bft_transfer::Link;

use crate::session;
use crate::store::{BackupStore, StoreError};

/// Errors that stop the daemon itself, as opposed to one session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DaemonError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address the daemon attempted to bind.
        addr: SocketAddr,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The backup store could not be opened at startup.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The listening socket failed outside any session.
    #[error("socket I/O failed: {0}")]
    Socket(io::Error),
}

/// The single-socket, single-session bft server.
///
/// One datagram at a time is pulled off the listening socket; its opcode
/// selects the session handler, which then owns the socket until the session
/// ends. Traffic from other peers during a session is discarded, which is
/// the documented behaviour of this single-session design.
#[derive(Debug)]
pub struct Daemon {
    socket: UdpSocket,
    store: BackupStore,
    keying: Keying,
}

impl Daemon {
    /// Binds the listening socket and opens the backup store.
    pub fn bind(addr: SocketAddr, backup_dir: &Path) -> Result<Self, DaemonError> {
        let store = BackupStore::open(backup_dir)?;
        let socket =
            UdpSocket::bind(addr).map_err(|source| DaemonError::Bind { addr, source })?;
        Ok(Self {
            socket,
            store,
            keying: Keying::new(),
        })
    }

    /// Address the daemon is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, DaemonError> {
        self.socket.local_addr().map_err(DaemonError::Socket)
    }

    /// Serves sessions until the listening socket fails.
    pub fn run(&self) -> Result<(), DaemonError> {
        info!(
            addr = %self.local_addr()?,
            store = %self.store.root().display(),
            "daemon listening"
        );
        loop {
            self.serve_next()?;
        }
    }

    /// Waits for one datagram and runs the session it opens, if any.
    ///
    /// Between sessions the socket blocks without a timeout; the handlers
    /// install the per-receive session timeout themselves and this method
    /// clears it again before the next wait.
    fn serve_next(&self) -> Result<(), DaemonError> {
        self.socket
            .set_read_timeout(None)
            .map_err(DaemonError::Socket)?;

        let mut buffer = [0u8; DATAGRAM_LEN];
        let (len, peer) = self
            .socket
            .recv_from(&mut buffer)
            .map_err(DaemonError::Socket)?;
        let link = Link::new(&self.socket, peer);

        let packet = match Packet::parse(&buffer[..len]) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(%peer, %err, "rejecting malformed datagram");
                reject_unknown(&link);
                return Ok(());
            }
        };

        let outcome = match packet {
            Packet::WriteRequest { filename } => {
                session::receive_file(&link, &self.store, &self.keying, &filename)
            }
            Packet::ReadRequest { filename } => {
                session::send_file(&link, &self.store, &self.keying, &filename)
            }
            Packet::Delete { filename } => session::remove_file(&link, &self.store, &filename),
            other => {
                warn!(%peer, label = other.label(), "packet cannot open a session");
                reject_unknown(&link);
                return Ok(());
            }
        };

        if let Err(err) = outcome {
            warn!(%peer, %err, "session failed");
        }
        Ok(())
    }
}

/// Answers a datagram that cannot open a session.
fn reject_unknown(link: &Link<'_>) {
    let reply = Packet::Error {
        code: ErrorCode::Undefined,
        message: "Unknown opcode".to_owned(),
    };
    if let Err(err) = link.send(&reply) {
        debug!(%err, "could not send rejection");
    }
}
