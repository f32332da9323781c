#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! # Overview
//!
//! `bft_transfer` is the reliability layer of the bft protocol and the home
//! of the client session machines. It turns the unreliable datagram socket
//! into a lockstep stream: every DATA packet is held by its sender until the
//! matching ACK arrives, retransmitted on timeout, and suppressed as a
//! duplicate on the receiving side.
//!
//! # Design
//!
//! - [`Link`] pins a socket to one peer and implements
//!   [`send_with_retry`](Link::send_with_retry), the five-attempt,
//!   three-second stop-and-wait loop both endpoints use for every packet
//!   that expects an acknowledgement.
//! - [`BlockSequencer`] is the receiving half: a pure cursor over the
//!   1-origin block sequence that classifies each arrival as fresh,
//!   duplicate, or ahead-of-stream, so session code never reprocesses a
//!   retransmitted block.
//! - [`client`] drives the three operations (upload, download, delete)
//!   against a daemon; the daemon crate builds the mirror-image handlers
//!   from the same two primitives.
//!
//! # Invariants
//!
//! - Block numbers within a session are `1, 2, …, K` with no gaps; a block
//!   is written to disk exactly once no matter how often it arrives.
//! - A sender never has more than one unacknowledged DATA packet in flight.
//! - Receipt of an ERROR packet is fatal and never answered.

pub mod client;
mod error;
mod link;
pub mod stream;

pub use error::TransferError;
pub use link::{ACK_TIMEOUT, BlockDisposition, BlockSequencer, Link, MAX_RETRIES};
