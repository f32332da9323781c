#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! # Overview
//!
//! `bft_crypto` encrypts and decrypts the payload of every DATA packet with
//! AES-128-CBC. Each block is a self-contained ciphertext: the cipher state
//! is rebuilt from the shared [`Keying`] context for every packet, so loss or
//! reordering of datagrams never corrupts neighbouring blocks.
//!
//! # Design
//!
//! - [`Keying`] holds the compiled-in 16-byte key and the all-zero IV. Both
//!   are protocol constants shared out of band; the context is built once per
//!   process and borrowed read-only by the session code, replacing the
//!   process-global key schedule the wire format originated with.
//! - A full 512-byte plaintext block travels unpadded (ciphertext length
//!   512); any shorter block is PKCS#7-padded, so its ciphertext is a
//!   multiple of 16 between 16 and 512 bytes. A file whose length is an
//!   exact multiple of 512 therefore terminates with a 16-byte pure-padding
//!   block.
//! - Decryption cannot tell a padded 496..=511-byte block from an unpadded
//!   full block by length alone, so it validates the PKCS#7 trailer on every
//!   block and keeps the full ciphertext length when the trailer is invalid.
//!   The fallback is the normal path for interior blocks and is logged at
//!   trace level only.
//!
//! # Invariants
//!
//! - `decrypt_block(encrypt_block(x)) == x` for every plaintext `x` with
//!   `x.len() <= 512`, except plaintexts of exactly 512 bytes whose tail
//!   happens to form a valid PKCS#7 pad (a known wire-format weakness that
//!   the end-of-transfer digest catches).
//! - Ciphertext lengths are always multiples of 16 in `16..=512`.

use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use thiserror::Error;
use tracing::trace;

use bft_protocol::BLOCK_SIZE;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// AES block width in bytes; also the smallest possible ciphertext.
pub const AES_BLOCK_LEN: usize = 16;

/// Key shared by both endpoints.
///
/// Compiled in for wire compatibility with existing peers; a keyed handshake
/// is a protocol revision away and would replace only this module.
const TRANSFER_KEY: [u8; 16] = *b"TFTPSecretKey123";

/// Constant IV, likewise fixed by the wire format.
const TRANSFER_IV: [u8; 16] = [0u8; 16];

/// Errors produced by the block cipher layer.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CryptoError {
    /// A plaintext block exceeded the 512-byte capacity.
    #[error("plaintext of {len} bytes exceeds the 512-byte block")]
    OversizedPlaintext {
        /// Observed plaintext length.
        len: usize,
    },

    /// A ciphertext length was not a non-empty multiple of the AES block.
    #[error("ciphertext of {len} bytes is not a whole number of AES blocks")]
    MisalignedCiphertext {
        /// Observed ciphertext length.
        len: usize,
    },
}

/// Process-wide keying context for the data-block cipher.
///
/// Construct one per process and share it read-only; building the per-packet
/// cipher state from it is cheap.
#[derive(Clone, Copy, Debug, Default)]
pub struct Keying {
    _private: (),
}

impl Keying {
    /// Returns the keying context for the compiled-in transfer key.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Encrypts one plaintext block read from the data stream.
    ///
    /// Full 512-byte blocks are encrypted without padding; shorter blocks
    /// (including empty ones) receive a PKCS#7 pad.
    pub fn encrypt_block(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if plaintext.len() > BLOCK_SIZE {
            return Err(CryptoError::OversizedPlaintext {
                len: plaintext.len(),
            });
        }
        let cipher = Aes128CbcEnc::new(&TRANSFER_KEY.into(), &TRANSFER_IV.into());
        let ciphertext = if plaintext.len() == BLOCK_SIZE {
            cipher.encrypt_padded_vec_mut::<NoPadding>(plaintext)
        } else {
            cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext)
        };
        Ok(ciphertext)
    }

    /// Decrypts one ciphertext block and strips its PKCS#7 pad when present.
    pub fn decrypt_block(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.is_empty()
            || ciphertext.len() % AES_BLOCK_LEN != 0
            || ciphertext.len() > BLOCK_SIZE
        {
            return Err(CryptoError::MisalignedCiphertext {
                len: ciphertext.len(),
            });
        }
        let cipher = Aes128CbcDec::new(&TRANSFER_KEY.into(), &TRANSFER_IV.into());
        let plaintext = cipher
            .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
            .map_err(|_| CryptoError::MisalignedCiphertext {
                len: ciphertext.len(),
            })?;
        Ok(strip_padding(plaintext))
    }
}

/// Removes a valid PKCS#7 trailer, keeping the full block otherwise.
fn strip_padding(mut plaintext: Vec<u8>) -> Vec<u8> {
    let len = plaintext.len();
    let Some(&last) = plaintext.last() else {
        return plaintext;
    };
    let pad = usize::from(last);
    if (1..=AES_BLOCK_LEN).contains(&pad)
        && plaintext[len - pad..].iter().all(|&byte| byte == last)
    {
        plaintext.truncate(len - pad);
    } else {
        trace!(len, "block carries no PKCS#7 trailer; keeping full length");
    }
    plaintext
}
