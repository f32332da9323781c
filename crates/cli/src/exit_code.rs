use bft_protocol::ErrorCode;
use bft_transfer::TransferError;

/// Process exit codes emitted by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful completion.
    Ok = 0,

    /// Syntax or usage error on the command line.
    Syntax = 1,

    /// The peer violated the protocol or a datagram could not be coded.
    Protocol = 2,

    /// The requested file could not be selected (missing, unreadable).
    FileSelect = 3,

    /// The server ended the session with an ERROR packet.
    Remote = 5,

    /// Socket-level I/O failed.
    SocketIo = 10,

    /// Local file I/O failed mid-transfer.
    FileIo = 11,

    /// The end-of-transfer digest check failed.
    Verification = 12,

    /// The peer stopped answering and the retry budget ran out.
    Timeout = 30,
}

impl ExitCode {
    /// Returns the numeric exit status.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Classifies a session failure into its exit code.
    #[must_use]
    pub fn from_error(error: &TransferError) -> Self {
        match error {
            TransferError::Transport(_) => Self::SocketIo,
            TransferError::RetryExhausted { .. } => Self::Timeout,
            TransferError::Protocol(_) | TransferError::Crypto(_) => Self::Protocol,
            TransferError::File { action, .. } => match *action {
                "open" | "create" => Self::FileSelect,
                _ => Self::FileIo,
            },
            TransferError::Integrity { .. } => Self::Verification,
            TransferError::Remote { code, .. } => match code {
                ErrorCode::FileNotFound => Self::FileSelect,
                ErrorCode::VerificationFailed => Self::Verification,
                _ => Self::Remote,
            },
            _ => Self::Remote,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn remote_errors_map_by_catalog_entry() {
        let not_found = TransferError::Remote {
            code: ErrorCode::FileNotFound,
            message: "File not found".to_owned(),
        };
        assert_eq!(ExitCode::from_error(&not_found), ExitCode::FileSelect);

        let corrupt = TransferError::Remote {
            code: ErrorCode::VerificationFailed,
            message: "MD5 digest mismatch".to_owned(),
        };
        assert_eq!(ExitCode::from_error(&corrupt), ExitCode::Verification);

        let denied = TransferError::Remote {
            code: ErrorCode::AccessDenied,
            message: "Failed to delete file".to_owned(),
        };
        assert_eq!(ExitCode::from_error(&denied), ExitCode::Remote);
    }

    #[test]
    fn local_failures_distinguish_selection_from_transfer_io() {
        let missing = TransferError::File {
            action: "open",
            path: PathBuf::from("gone.txt"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(ExitCode::from_error(&missing), ExitCode::FileSelect);

        let failed_write = TransferError::File {
            action: "write",
            path: PathBuf::from("dest.txt"),
            source: io::Error::other("write failed"),
        };
        assert_eq!(ExitCode::from_error(&failed_write), ExitCode::FileIo);
    }

    #[test]
    fn exhausted_retries_map_to_timeout() {
        let error = TransferError::RetryExhausted { attempts: 5 };
        assert_eq!(ExitCode::from_error(&error), ExitCode::Timeout);
        assert_eq!(ExitCode::Timeout.as_i32(), 30);
    }
}
