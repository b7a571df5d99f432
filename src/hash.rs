//! Content addressing for input documents.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha1::{Digest, Sha1};

const BUF_SIZE: usize = 64 * 1024;

/// Compute the SHA-1 content hash of a file as a lowercase hex string.
///
/// The file is streamed in 64 KiB chunks so memory use stays constant
/// regardless of document size.
pub fn sha1_of_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; BUF_SIZE];

    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
