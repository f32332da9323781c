#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! # Overview
//!
//! `bft_cli` is the thin command-line front-end for the bft transfer client.
//! It recognises the three operations (`upload`, `download`, `delete`),
//! the server address and port options, and a verbosity flag; everything
//! else lives in [`bft_transfer::client`].
//!
//! # Design
//!
//! [`run`] accepts the argument iterator together with handles for standard
//! output and error, installs the tracing subscriber, and delegates to the
//! matching session function. Each invocation writes a single concise
//! outcome line: successes to the output handle, failures to the error
//! handle with the exit code chosen by [`ExitCode::from_error`]. Taking the
//! streams as parameters keeps the whole front-end testable against
//! in-memory buffers, binary shim included.
//!
//! # Invariants
//!
//! - `run` never panics; every failure surfaces as a non-zero exit status.
//! - The process exit status is 0 exactly when the requested session
//!   completed and verified.
//! - Help and version output go to the output handle, usage errors to the
//!   error handle.

mod exit_code;

use std::ffi::OsString;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use bft_protocol::DEFAULT_PORT;
use bft_transfer::client;

pub use exit_code::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "bft", version, about = "Encrypted UDP backup file transfer client")]
struct ClientArgs {
    /// Server address to contact.
    #[arg(short, long, value_name = "ADDR", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    server: IpAddr,

    /// Server UDP port.
    #[arg(short, long, value_name = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Increase log verbosity (-v: debug, -vv: trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a local file into the server's backup store.
    Upload {
        /// File to upload; stored remotely under its basename.
        file: PathBuf,
    },
    /// Download a stored file.
    Download {
        /// Basename of the stored file.
        file: String,
        /// Where to write the download; defaults to the stored name.
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Remove a stored file.
    Delete {
        /// Basename of the stored file.
        file: String,
    },
}

/// Runs the client with the given command line and returns its exit status.
///
/// `stdout` receives the outcome line (and help or version text); `stderr`
/// receives usage errors and session failures.
pub fn run<I, T, Out, Err>(args: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    Out: Write,
    Err: Write,
{
    let args = match ClientArgs::try_parse_from(args) {
        Ok(args) => args,
        Err(err) => {
            // Help and version also arrive here as "errors".
            let rendered = err.render();
            return if err.use_stderr() {
                let _ = write!(stderr, "{rendered}");
                ExitCode::Syntax.as_i32()
            } else {
                let _ = write!(stdout, "{rendered}");
                ExitCode::Ok.as_i32()
            };
        }
    };
    bft_logging::init(args.verbose);
    let server = SocketAddr::new(args.server, args.port);

    let (outcome, done) = match &args.command {
        Command::Upload { file } => (
            client::upload(server, file),
            format!("uploaded '{}' to {server}", file.display()),
        ),
        Command::Download { file, output } => {
            let dest = output.clone().unwrap_or_else(|| PathBuf::from(file));
            (
                client::download(server, file, &dest),
                format!("downloaded '{file}' to '{}'", dest.display()),
            )
        }
        Command::Delete { file } => (
            client::delete(server, file),
            format!("deleted '{file}' from {server}"),
        ),
    };

    match outcome {
        Ok(()) => {
            let _ = writeln!(stdout, "{done}");
            ExitCode::Ok.as_i32()
        }
        Err(err) => {
            let _ = writeln!(stderr, "bft: {err}");
            ExitCode::from_error(&err).as_i32()
        }
    }
}

/// Converts [`run`]'s status into a [`std::process::ExitCode`].
#[must_use]
pub fn exit_code_from(status: i32) -> std::process::ExitCode {
    u8::try_from(status).map_or(std::process::ExitCode::FAILURE, std::process::ExitCode::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_protocol() {
        let args = ClientArgs::try_parse_from(["bft", "upload", "notes.txt"]).expect("parse");
        assert_eq!(args.server, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(args.port, DEFAULT_PORT);
        assert!(matches!(args.command, Command::Upload { .. }));
    }

    #[test]
    fn download_accepts_an_output_override() {
        let args = ClientArgs::try_parse_from([
            "bft", "-s", "10.0.0.7", "-p", "6969", "download", "doc.bin", "-o", "out.bin",
        ])
        .expect("parse");
        assert_eq!(args.server.to_string(), "10.0.0.7");
        assert_eq!(args.port, 6969);
        match args.command {
            Command::Download { file, output } => {
                assert_eq!(file, "doc.bin");
                assert_eq!(output, Some(PathBuf::from("out.bin")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn missing_subcommand_is_a_usage_error() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let status = run(["bft"], &mut stdout, &mut stderr);
        assert_eq!(status, ExitCode::Syntax.as_i32());
        assert!(stdout.is_empty(), "usage errors must not touch stdout");
        assert!(!stderr.is_empty(), "usage errors must explain themselves");
    }

    #[test]
    fn version_flag_writes_to_stdout_and_succeeds() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let status = run(["bft", "--version"], &mut stdout, &mut stderr);
        assert_eq!(status, ExitCode::Ok.as_i32());
        assert!(!stdout.is_empty(), "version output belongs on stdout");
        assert!(stderr.is_empty(), "version output must not touch stderr");
    }
}
