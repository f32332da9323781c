#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! # Overview
//!
//! `bft_protocol` implements the wire codec for the bft file-transfer
//! protocol: a TFTP-style datagram exchange extended with a DELETE operation
//! and a VERIFY digest packet. The crate owns the packet shapes, the opcode
//! and error-code catalogs, and the size limits every endpoint enforces at
//! the datagram boundary. Higher layers ([`bft_transfer`], the daemon) only
//! ever see [`Packet`] values; raw byte handling stays here.
//!
//! # Design
//!
//! - [`Packet`] is a tagged union over the seven opcodes. Encoding writes the
//!   opcode and any block number in network byte order and appends the body;
//!   decoding reads the opcode first and dispatches to a length-checked
//!   per-type parser.
//! - Request packets (RRQ, WRQ, DELETE) use the classical null-terminated
//!   layout `opcode || filename || 0x00 || "octet" || 0x00`. Bytes after the
//!   second terminator are ignored so fixed-buffer senders interoperate.
//! - [`ErrorCode`] mirrors the on-wire error catalog; unknown codes decode to
//!   [`ErrorCode::Undefined`] rather than failing the parse.
//!
//! # Invariants
//!
//! - A serialized DATA packet is exactly `4 + payload.len()` bytes; receivers
//!   recover the payload length from the datagram length.
//! - Filenames are 1..=64 bytes of UTF-8 and are rejected, never truncated,
//!   when out of range.
//! - Every encoded packet fits the shared 1024-byte receive buffer; ERROR
//!   messages are truncated to guarantee this.
//! - `parse(encode(p)) == p` for every well-formed packet `p`.
//!
//! [`bft_transfer`]: https://docs.rs/bft-transfer

mod error;
mod packet;

pub use error::ProtocolError;
pub use packet::{ErrorCode, Packet, validate_filename};

/// Maximum accepted filename length in bytes.
pub const MAX_FILENAME_LEN: usize = 64;

/// Plaintext payload capacity of one DATA block.
pub const BLOCK_SIZE: usize = 512;

/// Size of the receive buffer both endpoints use for a single datagram.
pub const DATAGRAM_LEN: usize = 1024;

/// Width of the MD5 digest carried by a VERIFY packet.
pub const DIGEST_LEN: usize = 16;

/// Transfer mode string carried by every request packet.
pub const TRANSFER_MODE: &str = "octet";

/// Port the daemon binds when none is given on the command line.
pub const DEFAULT_PORT: u16 = 69;
