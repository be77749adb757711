//! Content-addressed integrity hashing and volume UUID resolution.
//!
//! Uses xxHash3-128 rather than the crate's 64-bit variant for a wider
//! collision margin, since this hash is the integrity check backing
//! orphan/modified detection across a whole library rather than a
//! per-document dedup key.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use xxhash_rust::xxh3::Xxh3;

/// Streaming buffer size for hashing large media files.
const HASH_BUFFER_SIZE: usize = 1024 * 1024;

/// Result of comparing a stored content hash against the file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityStatus {
    Missing,
    Valid,
    Modified,
    Error,
}

/// Stream-hash a file with xxHash3-128, returned as 32 lowercase hex chars.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Xxh3::new();
    let mut buf = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:032x}", hasher.digest128()))
}

/// Compare a previously recorded hash against the current file contents.
pub fn check_integrity(path: &Path, recorded_hash: &str) -> IntegrityStatus {
    if !path.exists() {
        return IntegrityStatus::Missing;
    }
    match hash_file(path) {
        Ok(current) if current == recorded_hash => IntegrityStatus::Valid,
        Ok(_) => IntegrityStatus::Modified,
        Err(_) => IntegrityStatus::Error,
    }
}
