//! MD5 digests for end-to-end file verification.
//!
//! MD5 is used for integrity only (detecting truncation and corruption in
//! transit), never for authentication.

use std::io::Read;
use std::path::Path;

use md5::{Digest as _, Md5};

/// A 128-bit MD5 digest.
pub type Digest = [u8; 16];

/// MD5 of an in-memory buffer.
pub fn md5(data: &[u8]) -> Digest {
    Md5::digest(data).into()
}

/// MD5 of a file, read in fixed-size chunks so memory stays flat.
///
/// Blocking. Call from `spawn_blocking` inside async code.
pub fn md5_file(path: &Path) -> std::io::Result<Digest> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}

/// Incremental hasher fed chunk by chunk as data arrives.
#[derive(Default, Clone)]
pub struct StreamDigest(Md5);

impl StreamDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.0.update(chunk);
    }

    pub fn finish(self) -> Digest {
        self.0.finalize().into()
    }
}

/// Lowercase hex, as carried in the TCP header.
pub fn to_hex(digest: &Digest) -> String {
    hex::encode(digest)
}

/// Parse a hex digest. Accepts either case.
pub fn from_hex(s: &str) -> Option<Digest> {
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}
