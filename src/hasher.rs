//! Content hashing for single files.
//!
//! Reads the whole file in fixed-size blocks and feeds it to SHA-256.
//! The digest depends only on byte content, never on path or timestamps.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::ReadError;
use crate::models::ContentDigest;

const READ_BLOCK: usize = 64 * 1024;

/// Computes a digest over a file's full byte content.
pub trait ContentHasher: Send + Sync {
    fn hash_file(&self, path: &Path) -> Result<ContentDigest, ReadError>;
}

/// Streaming SHA-256 hasher.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn hash_file(&self, path: &Path) -> Result<ContentDigest, ReadError> {
        let read_err = |source: std::io::Error| ReadError {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(read_err)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; READ_BLOCK];
        loop {
            match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => hasher.update(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(read_err(e)),
            }
        }

        Ok(ContentDigest::from_bytes(hasher.finalize().into()))
    }
}

/// Digest of an in-memory buffer, identical to hashing a file with the same bytes.
pub fn digest_bytes(bytes: &[u8]) -> ContentDigest {
    ContentDigest::from_bytes(Sha256::digest(bytes).into())
}
