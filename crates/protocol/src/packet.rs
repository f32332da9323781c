use memchr::memchr;

use crate::error::ProtocolError;
use crate::{BLOCK_SIZE, DATAGRAM_LEN, DIGEST_LEN, MAX_FILENAME_LEN, TRANSFER_MODE};

const OP_RRQ: u16 = 1;
const OP_WRQ: u16 = 2;
const OP_DATA: u16 = 3;
const OP_ACK: u16 = 4;
const OP_ERROR: u16 = 5;
const OP_DELETE: u16 = 6;
const OP_VERIFY: u16 = 7;

/// Longest ERROR message that still fits the receive buffer together with
/// the four-byte header and the terminating null.
const ERROR_MESSAGE_MAX: usize = DATAGRAM_LEN - 5;

/// Error catalog transmitted inside ERROR packets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    /// No specific cause; the message carries the detail.
    Undefined = 0,
    /// The requested file does not exist in the backup store.
    FileNotFound = 1,
    /// The store refused to create, write, or remove the file.
    AccessDenied = 2,
    /// The receiving side ran out of disk space.
    DiskFull = 3,
    /// The transport gave up after exhausting its retries.
    Transmission = 4,
    /// The end-of-transfer digest did not match the received bytes.
    VerificationFailed = 5,
}

impl ErrorCode {
    /// Maps a wire value onto the catalog, folding unknown codes into
    /// [`ErrorCode::Undefined`].
    #[must_use]
    pub fn from_wire(code: u16) -> Self {
        match code {
            1 => Self::FileNotFound,
            2 => Self::AccessDenied,
            3 => Self::DiskFull,
            4 => Self::Transmission,
            5 => Self::VerificationFailed,
            _ => Self::Undefined,
        }
    }

    /// Returns the numeric value transmitted on the wire.
    #[must_use]
    pub const fn to_wire(self) -> u16 {
        self as u16
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Undefined => "not defined",
            Self::FileNotFound => "file not found",
            Self::AccessDenied => "access denied",
            Self::DiskFull => "disk full",
            Self::Transmission => "transmission failed",
            Self::VerificationFailed => "verification failed",
        };
        f.write_str(text)
    }
}

/// One protocol datagram, decoded.
///
/// The DATA payload is ciphertext: encryption happens before framing on the
/// sending side and after deframing on the receiving side, so the codec never
/// inspects it beyond the block-size cap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    /// Asks the server to stream `filename` back to the client.
    ReadRequest {
        /// Basename of the stored file.
        filename: String,
    },
    /// Announces an upload of `filename` to the server.
    WriteRequest {
        /// Basename under which the upload is stored.
        filename: String,
    },
    /// One block of the encrypted data stream.
    Data {
        /// 1-origin block number.
        block: u16,
        /// Ciphertext carried by this block, at most 512 bytes.
        payload: Vec<u8>,
    },
    /// Acknowledges the DATA, request, or VERIFY packet named by `block`.
    Ack {
        /// Block number being acknowledged; 0 for request and VERIFY ACKs.
        block: u16,
    },
    /// Fatal session diagnostic; receipt ends the session.
    Error {
        /// Catalog entry describing the failure class.
        code: ErrorCode,
        /// Human-readable detail.
        message: String,
    },
    /// Asks the server to remove `filename` from the backup store.
    Delete {
        /// Basename of the stored file.
        filename: String,
    },
    /// End-of-stream integrity check over the plaintext file.
    Verify {
        /// MD5 digest of the transferred plaintext.
        digest: [u8; DIGEST_LEN],
    },
}

impl Packet {
    /// Returns the wire opcode of this packet.
    #[must_use]
    pub const fn opcode(&self) -> u16 {
        match self {
            Self::ReadRequest { .. } => OP_RRQ,
            Self::WriteRequest { .. } => OP_WRQ,
            Self::Data { .. } => OP_DATA,
            Self::Ack { .. } => OP_ACK,
            Self::Error { .. } => OP_ERROR,
            Self::Delete { .. } => OP_DELETE,
            Self::Verify { .. } => OP_VERIFY,
        }
    }

    /// Short packet name used in diagnostics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::ReadRequest { .. } => "RRQ",
            Self::WriteRequest { .. } => "WRQ",
            Self::Data { .. } => "DATA",
            Self::Ack { .. } => "ACK",
            Self::Error { .. } => "ERROR",
            Self::Delete { .. } => "DELETE",
            Self::Verify { .. } => "VERIFY",
        }
    }

    /// Serializes the packet into a fresh datagram buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Self::ReadRequest { filename } => encode_request(OP_RRQ, filename),
            Self::WriteRequest { filename } => encode_request(OP_WRQ, filename),
            Self::Delete { filename } => encode_request(OP_DELETE, filename),
            Self::Data { block, payload } => {
                if payload.len() > BLOCK_SIZE {
                    return Err(ProtocolError::OversizedPayload {
                        len: payload.len(),
                    });
                }
                let mut out = Vec::with_capacity(4 + payload.len());
                out.extend_from_slice(&OP_DATA.to_be_bytes());
                out.extend_from_slice(&block.to_be_bytes());
                out.extend_from_slice(payload);
                Ok(out)
            }
            Self::Ack { block } => {
                let mut out = Vec::with_capacity(4);
                out.extend_from_slice(&OP_ACK.to_be_bytes());
                out.extend_from_slice(&block.to_be_bytes());
                Ok(out)
            }
            Self::Error { code, message } => {
                let text = truncate_message(message);
                let mut out = Vec::with_capacity(5 + text.len());
                out.extend_from_slice(&OP_ERROR.to_be_bytes());
                out.extend_from_slice(&code.to_wire().to_be_bytes());
                out.extend_from_slice(text.as_bytes());
                out.push(0);
                Ok(out)
            }
            Self::Verify { digest } => {
                let mut out = Vec::with_capacity(2 + DIGEST_LEN);
                out.extend_from_slice(&OP_VERIFY.to_be_bytes());
                out.extend_from_slice(digest);
                Ok(out)
            }
        }
    }

    /// Decodes one received datagram.
    pub fn parse(datagram: &[u8]) -> Result<Self, ProtocolError> {
        if datagram.len() < 4 {
            return Err(ProtocolError::Truncated {
                len: datagram.len(),
            });
        }
        let opcode = u16::from_be_bytes([datagram[0], datagram[1]]);
        match opcode {
            OP_RRQ | OP_WRQ | OP_DELETE => {
                let filename = parse_request(&datagram[2..])?;
                Ok(match opcode {
                    OP_RRQ => Self::ReadRequest { filename },
                    OP_WRQ => Self::WriteRequest { filename },
                    _ => Self::Delete { filename },
                })
            }
            OP_DATA => {
                let block = u16::from_be_bytes([datagram[2], datagram[3]]);
                let payload = datagram[4..].to_vec();
                if payload.len() > BLOCK_SIZE {
                    return Err(ProtocolError::OversizedPayload {
                        len: payload.len(),
                    });
                }
                Ok(Self::Data { block, payload })
            }
            OP_ACK => {
                if datagram.len() != 4 {
                    return Err(ProtocolError::InvalidLength {
                        opcode,
                        len: datagram.len(),
                    });
                }
                let block = u16::from_be_bytes([datagram[2], datagram[3]]);
                Ok(Self::Ack { block })
            }
            OP_ERROR => {
                let code = ErrorCode::from_wire(u16::from_be_bytes([datagram[2], datagram[3]]));
                let body = &datagram[4..];
                let end = memchr(0, body).unwrap_or(body.len());
                let message = String::from_utf8_lossy(&body[..end]).into_owned();
                Ok(Self::Error { code, message })
            }
            OP_VERIFY => {
                if datagram.len() != 2 + DIGEST_LEN {
                    return Err(ProtocolError::InvalidLength {
                        opcode,
                        len: datagram.len(),
                    });
                }
                let mut digest = [0u8; DIGEST_LEN];
                digest.copy_from_slice(&datagram[2..]);
                Ok(Self::Verify { digest })
            }
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }
}

/// Checks a filename against the wire limits shared by all request packets.
pub fn validate_filename(filename: &str) -> Result<(), ProtocolError> {
    let len = filename.len();
    if len == 0 || len > MAX_FILENAME_LEN {
        return Err(ProtocolError::FilenameLength { len });
    }
    Ok(())
}

fn encode_request(opcode: u16, filename: &str) -> Result<Vec<u8>, ProtocolError> {
    validate_filename(filename)?;
    let mut out = Vec::with_capacity(2 + filename.len() + 1 + TRANSFER_MODE.len() + 1);
    out.extend_from_slice(&opcode.to_be_bytes());
    out.extend_from_slice(filename.as_bytes());
    out.push(0);
    out.extend_from_slice(TRANSFER_MODE.as_bytes());
    out.push(0);
    Ok(out)
}

fn parse_request(body: &[u8]) -> Result<String, ProtocolError> {
    let name_end = memchr(0, body).ok_or(ProtocolError::MissingTerminator)?;
    let name = &body[..name_end];
    if name.is_empty() || name.len() > MAX_FILENAME_LEN {
        return Err(ProtocolError::FilenameLength { len: name.len() });
    }
    let rest = &body[name_end + 1..];
    let mode_end = memchr(0, rest).ok_or(ProtocolError::MissingTerminator)?;
    let mode = &rest[..mode_end];
    if !mode.eq_ignore_ascii_case(TRANSFER_MODE.as_bytes()) {
        return Err(ProtocolError::UnsupportedMode(
            String::from_utf8_lossy(mode).into_owned(),
        ));
    }
    // Bytes past the mode terminator are padding from fixed-buffer senders.
    let filename =
        std::str::from_utf8(name).map_err(|_| ProtocolError::FilenameEncoding)?;
    Ok(filename.to_owned())
}

fn truncate_message(message: &str) -> &str {
    if message.len() <= ERROR_MESSAGE_MAX {
        return message;
    }
    let mut end = ERROR_MESSAGE_MAX;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    &message[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_request_uses_null_terminated_layout() {
        let packet = Packet::WriteRequest {
            filename: "greet.txt".to_owned(),
        };
        let bytes = packet.to_bytes().expect("encode");
        assert_eq!(&bytes[..2], &[0, 2]);
        assert_eq!(&bytes[2..11], b"greet.txt");
        assert_eq!(bytes[11], 0);
        assert_eq!(&bytes[12..17], b"octet");
        assert_eq!(bytes[17], 0);
        assert_eq!(bytes.len(), 18);
    }

    #[test]
    fn request_round_trips_through_parse() {
        for packet in [
            Packet::ReadRequest {
                filename: "a".to_owned(),
            },
            Packet::WriteRequest {
                filename: "backup.tar".to_owned(),
            },
            Packet::Delete {
                filename: "old.bin".to_owned(),
            },
        ] {
            let bytes = packet.to_bytes().expect("encode");
            assert_eq!(Packet::parse(&bytes).expect("parse"), packet);
        }
    }

    #[test]
    fn data_length_is_header_plus_payload() {
        let packet = Packet::Data {
            block: 7,
            payload: vec![0xAA; 48],
        };
        let bytes = packet.to_bytes().expect("encode");
        assert_eq!(bytes.len(), 4 + 48);
        assert_eq!(Packet::parse(&bytes).expect("parse"), packet);
    }

    #[test]
    fn data_payload_above_block_size_is_rejected() {
        let packet = Packet::Data {
            block: 1,
            payload: vec![0; BLOCK_SIZE + 1],
        };
        assert!(matches!(
            packet.to_bytes(),
            Err(ProtocolError::OversizedPayload { len }) if len == BLOCK_SIZE + 1
        ));
    }

    #[test]
    fn ack_and_verify_round_trip() {
        let ack = Packet::Ack { block: 0 };
        assert_eq!(
            Packet::parse(&ack.to_bytes().expect("encode")).expect("parse"),
            ack
        );

        let verify = Packet::Verify {
            digest: [0x5A; DIGEST_LEN],
        };
        let bytes = verify.to_bytes().expect("encode");
        assert_eq!(bytes.len(), 18);
        assert_eq!(Packet::parse(&bytes).expect("parse"), verify);
    }

    #[test]
    fn error_round_trips_and_unknown_codes_fold_to_undefined() {
        let error = Packet::Error {
            code: ErrorCode::FileNotFound,
            message: "File not found".to_owned(),
        };
        let bytes = error.to_bytes().expect("encode");
        assert_eq!(*bytes.last().expect("terminator"), 0);
        assert_eq!(Packet::parse(&bytes).expect("parse"), error);

        let mut raw = vec![0, 5, 0, 99];
        raw.extend_from_slice(b"mystery\0");
        match Packet::parse(&raw).expect("parse") {
            Packet::Error { code, message } => {
                assert_eq!(code, ErrorCode::Undefined);
                assert_eq!(message, "mystery");
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn oversized_error_message_is_truncated_with_terminator() {
        let error = Packet::Error {
            code: ErrorCode::Undefined,
            message: "x".repeat(DATAGRAM_LEN * 2),
        };
        let bytes = error.to_bytes().expect("encode");
        assert_eq!(bytes.len(), DATAGRAM_LEN);
        assert_eq!(*bytes.last().expect("terminator"), 0);
    }

    #[test]
    fn short_datagrams_and_unknown_opcodes_are_rejected() {
        assert!(matches!(
            Packet::parse(&[0, 3, 0]),
            Err(ProtocolError::Truncated { len: 3 })
        ));
        assert!(matches!(
            Packet::parse(&[0, 8, 0, 0]),
            Err(ProtocolError::UnknownOpcode(8))
        ));
    }

    #[test]
    fn filename_at_limit_is_accepted_and_one_past_is_rejected() {
        let at_limit = "f".repeat(MAX_FILENAME_LEN);
        let packet = Packet::ReadRequest {
            filename: at_limit.clone(),
        };
        let bytes = packet.to_bytes().expect("encode");
        assert_eq!(
            Packet::parse(&bytes).expect("parse"),
            Packet::ReadRequest {
                filename: at_limit
            }
        );

        let past_limit = "f".repeat(MAX_FILENAME_LEN + 1);
        assert!(matches!(
            Packet::ReadRequest {
                filename: past_limit
            }
            .to_bytes(),
            Err(ProtocolError::FilenameLength { len }) if len == MAX_FILENAME_LEN + 1
        ));
    }

    #[test]
    fn request_mode_is_case_insensitive_and_others_are_refused() {
        let mut raw = vec![0, 1];
        raw.extend_from_slice(b"file\0OCTET\0");
        assert!(Packet::parse(&raw).is_ok());

        let mut raw = vec![0, 1];
        raw.extend_from_slice(b"file\0netascii\0");
        assert!(matches!(
            Packet::parse(&raw),
            Err(ProtocolError::UnsupportedMode(mode)) if mode == "netascii"
        ));
    }

    #[test]
    fn fixed_buffer_padding_after_mode_is_tolerated() {
        let mut raw = vec![0, 2];
        raw.extend_from_slice(b"file\0octet\0");
        raw.extend_from_slice(&[0u8; 32]);
        assert_eq!(
            Packet::parse(&raw).expect("parse"),
            Packet::WriteRequest {
                filename: "file".to_owned()
            }
        );
    }
}
