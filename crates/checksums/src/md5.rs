use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use digest::Digest;

use crate::DIGEST_LEN;

/// Read size for [`file_digest`], fixed by the wire protocol's peers.
const READ_LEN: usize = 1024;

/// MD5 of a byte slice in one call.
#[must_use]
pub fn digest(data: &[u8]) -> [u8; DIGEST_LEN] {
    md5::Md5::digest(data).into()
}

/// MD5 of an open file, hashed in 1024-byte reads.
///
/// The cursor is rewound to the start of the file before the first read and
/// again after the last one, so the handle keeps working for callers that
/// read the file next. Both endpoints rely on this when they digest a file
/// they are about to stream.
pub fn file_digest(file: &mut File) -> io::Result<[u8; DIGEST_LEN]> {
    file.seek(SeekFrom::Start(0))?;
    let mut state = md5::Md5::new();
    let mut buffer = [0u8; READ_LEN];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        state.update(&buffer[..read]);
    }
    file.seek(SeekFrom::Start(0))?;
    Ok(state.finalize().into())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // MD5("hello\n"), the digest a six-byte greeting travels with on the wire.
    const HELLO_DIGEST: [u8; DIGEST_LEN] = [
        0xb1, 0x94, 0x6a, 0xc9, 0x24, 0x92, 0xd2, 0x34, 0x7c, 0x62, 0x35, 0xb4, 0xd2, 0x61,
        0x11, 0x84,
    ];

    #[test]
    fn digest_matches_the_known_transfer_vector() {
        assert_eq!(digest(b"hello\n"), HELLO_DIGEST);
    }

    #[test]
    fn file_digest_agrees_with_the_one_shot_form() {
        let payload: Vec<u8> = (0..READ_LEN * 3 + 17).map(|i| (i % 193) as u8).collect();
        let mut file = tempfile::tempfile().expect("tempfile");
        file.write_all(&payload).expect("write");

        assert_eq!(file_digest(&mut file).expect("digest"), digest(&payload));
    }

    #[test]
    fn file_digest_rewinds_before_and_after_hashing() {
        let mut file = tempfile::tempfile().expect("tempfile");
        file.write_all(b"hello\n").expect("write");
        // The cursor sits at EOF here; hashing must not start from it.
        assert_eq!(file_digest(&mut file).expect("digest"), HELLO_DIGEST);

        // And afterwards the handle reads the file from the top again.
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).expect("read");
        assert_eq!(contents, b"hello\n");

        // A second pass over the same handle gives the same answer.
        assert_eq!(file_digest(&mut file).expect("digest"), HELLO_DIGEST);
    }
}
