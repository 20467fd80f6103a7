use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::StorageError;

const CHUNK_SIZE: usize = 4096;

/// Lowercase hex SHA-256 over the whole stream, read in 4096-byte chunks.
pub fn content_hash<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub fn hash_file(path: &Path) -> Result<String, StorageError> {
    let file = std::fs::File::open(path).map_err(|e| StorageError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    content_hash(std::io::BufReader::new(file)).map_err(|e| StorageError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })
}
