//! Streaming SHA-256 digests.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{NimbusError, Result};

/// Read buffer size; files are never loaded into memory whole.
const DIGEST_BUFFER_SIZE: usize = 64 * 1024;

/// Hash everything `reader` yields and return lowercase hex.
pub async fn digest_reader<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; DIGEST_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 of a file on disk, as lowercase hex.
pub async fn digest_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    digest_reader(&mut file).await
}

/// Compare a file's digest against an expected lowercase hex digest.
pub async fn verify(path: &Path, expected: &str) -> Result<()> {
    let actual = digest_file(path).await?;
    if actual != expected {
        return Err(NimbusError::DigestMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// True if `s` is exactly 64 hex characters.
pub fn is_valid_digest(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Validate a client-declared digest and lower-case it for storage.
pub fn normalize_digest(s: &str) -> Result<String> {
    let trimmed = s.trim();
    if !is_valid_digest(trimmed) {
        return Err(NimbusError::Validation(
            "sha256 must be 64 hexadecimal characters".to_string(),
        ));
    }
    Ok(trimmed.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[tokio::test]
    async fn test_digest_reader_known_values() {
        let mut empty: &[u8] = b"";
        assert_eq!(digest_reader(&mut empty).await.unwrap(), EMPTY_SHA256);

        let mut hello: &[u8] = b"hello";
        assert_eq!(digest_reader(&mut hello).await.unwrap(), HELLO_SHA256);
    }

    #[tokio::test]
    async fn test_digest_file_larger_than_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let content: Vec<u8> = (0..(DIGEST_BUFFER_SIZE * 3 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        std::fs::write(&path, &content).unwrap();

        let mut slice: &[u8] = &content;
        let expected = digest_reader(&mut slice).await.unwrap();
        assert_eq!(digest_file(&path).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_verify_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello").unwrap();

        assert!(verify(&path, HELLO_SHA256).await.is_ok());

        match verify(&path, EMPTY_SHA256).await {
            Err(NimbusError::DigestMismatch { expected, actual }) => {
                assert_eq!(expected, EMPTY_SHA256);
                assert_eq!(actual, HELLO_SHA256);
            }
            other => panic!("expected DigestMismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_digest_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = digest_file(&dir.path().join("missing")).await;
        assert!(matches!(result, Err(NimbusError::Io(_))));
    }

    #[test]
    fn test_normalize_digest() {
        let upper = HELLO_SHA256.to_ascii_uppercase();
        assert_eq!(normalize_digest(&upper).unwrap(), HELLO_SHA256);
        assert!(normalize_digest("abc").is_err());
        assert!(normalize_digest(&"g".repeat(64)).is_err());
        assert!(!is_valid_digest(&format!("{HELLO_SHA256}0")));
    }
}
