#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! # Overview
//!
//! `bft_checksums` provides the MD5 digest used for bft's end-of-transfer
//! integrity check. Both endpoints hash the plaintext file and compare the
//! results through the VERIFY packet, so the streaming behaviour here must be
//! identical on the client and the daemon.
//!
//! # Design
//!
//! Two free functions cover everything the protocol needs: [`digest`] for a
//! byte slice already in memory, and [`file_digest`] for an open file,
//! hashed in 1024-byte reads. The file cursor is rewound to offset zero
//! before hashing starts and again after it finishes, so callers can hand
//! over a handle mid-use and keep reading from the start afterwards.

mod md5;

pub use md5::{digest, file_digest};

/// Width of the MD5 digest in bytes.
pub const DIGEST_LEN: usize = 16;
