#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! # Overview
//!
//! `bft_daemon` is the server side of the bft protocol: a single UDP socket,
//! a dispatcher that classifies the first packet of each session, and the
//! backup store the sessions read and write. The daemon serves exactly one
//! session at a time and returns to its blocking receive loop when the
//! session ends.
//!
//! # Design
//!
//! - [`Daemon`] owns the socket, the [`store::BackupStore`], and the shared
//!   keying context. [`Daemon::run`] loops forever; each iteration handles
//!   one datagram, which either opens a WRQ/RRQ/DELETE session or is
//!   rejected with `ERROR(0, "Unknown opcode")`.
//! - Session handlers live in a private module and reuse the transfer
//!   crate's reliability primitives, so the daemon and the client stay
//!   behaviourally symmetric.
//! - [`run`] is the process entry point used by the `bftd` binary: it parses
//!   the command line, installs the tracing subscriber, and turns daemon
//!   failures into exit codes. It takes the standard output and error
//!   handles as parameters so help, version, and usage text can be captured
//!   by tests; operational diagnostics go through tracing.
//!
//! # Invariants
//!
//! - Uploads never leave a partial file in the store: every failure path of
//!   the WRQ handler removes what was written.
//! - The store only ever resolves plain basenames; traversal attempts are
//!   answered with ERROR(access denied).
//! - The listening socket has no read timeout between sessions and the
//!   3-second session timeout inside them.

mod dispatch;
mod session;

/// The on-disk backup store that sessions read and write.
pub mod store;

use std::ffi::OsString;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use tracing::error;

pub use dispatch::{Daemon, DaemonError};

use bft_protocol::DEFAULT_PORT;

/// Exit status used when the daemon cannot start or its socket fails.
const SOCKET_FAILURE: i32 = 10;

/// Exit status used for command-line errors.
const USAGE_FAILURE: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "bftd", version, about = "Encrypted UDP backup file transfer daemon")]
struct DaemonArgs {
    /// UDP port to listen on.
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Directory the stored files live in; created when absent.
    #[arg(long, value_name = "DIR", default_value = "backup")]
    backup_dir: PathBuf,

    /// Address to bind the listening socket to.
    #[arg(long, value_name = "ADDR", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    /// Increase log verbosity (-v: debug, -vv: trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Runs the daemon with the given command line and returns its exit status.
///
/// `stdout` receives help and version text, `stderr` receives usage errors;
/// everything the running daemon reports goes through tracing.
pub fn run<I, T, Out, Err>(args: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    Out: Write,
    Err: Write,
{
    let args = match DaemonArgs::try_parse_from(args) {
        Ok(args) => args,
        Err(err) => {
            // Help and version also arrive here as "errors".
            let rendered = err.render();
            return if err.use_stderr() {
                let _ = write!(stderr, "{rendered}");
                USAGE_FAILURE
            } else {
                let _ = write!(stdout, "{rendered}");
                0
            };
        }
    };
    bft_logging::init(args.verbose);

    let addr = SocketAddr::new(args.bind, args.port);
    let daemon = match Daemon::bind(addr, &args.backup_dir) {
        Ok(daemon) => daemon,
        Err(err) => {
            error!(%err, "daemon startup failed");
            return SOCKET_FAILURE;
        }
    };
    match daemon.run() {
        Ok(()) => 0,
        Err(err) => {
            error!(%err, "daemon terminated");
            SOCKET_FAILURE
        }
    }
}

/// Converts [`run`]'s status into a [`std::process::ExitCode`].
#[must_use]
pub fn exit_code_from(status: i32) -> ExitCode {
    u8::try_from(status).map_or(ExitCode::FAILURE, ExitCode::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_flag_writes_to_stdout_and_succeeds() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let status = run(["bftd", "--version"], &mut stdout, &mut stderr);
        assert_eq!(status, 0);
        assert!(!stdout.is_empty(), "version output belongs on stdout");
        assert!(stderr.is_empty(), "version output must not touch stderr");
    }

    #[test]
    fn unknown_flag_is_a_usage_error_on_stderr() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let status = run(["bftd", "--no-such-flag"], &mut stdout, &mut stderr);
        assert_eq!(status, USAGE_FAILURE);
        assert!(stdout.is_empty());
        assert!(!stderr.is_empty(), "usage text expected on stderr");
    }
}
