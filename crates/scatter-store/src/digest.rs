//! SHA-256 content addressing.
//!
//! A file's identity everywhere — catalogue keys, shard name prefixes, HTTP
//! query parameters, reconstructed filenames — is the lower-case hex SHA-256
//! of its bytes (64 characters).

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};

/// Hash `data` and render the digest as lower-case hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash a file on disk without loading it whole into memory.
pub async fn sha256_hex_file(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<String> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(|e| StoreError::Other(format!("digest task failed: {e}")))?
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn digest_is_deterministic_lower_hex() {
        let a = sha256_hex(b"scatter");
        let b = sha256_hex(b"scatter");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn known_vector_for_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn file_digest_matches_in_memory_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        let data = vec![0xCDu8; 300_000];
        {
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(&data).unwrap();
        }
        assert_eq!(sha256_hex_file(&path).await.unwrap(), sha256_hex(&data));
    }
}
