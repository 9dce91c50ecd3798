use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{AppError, Result};

/// Read buffer size used when streaming uploads
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Hex-encoded SHA-256 digest of a blob's bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub const HEX_LEN: usize = 64;

    /// Validate a stored fingerprint string
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != Self::HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AppError::Validation(format!("Invalid fingerprint: {}", s)));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for human-facing names
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental content hasher
#[derive(Default)]
pub struct ContentHasher {
    inner: Sha256,
    bytes: u64,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    pub fn bytes_hashed(&self) -> u64 {
        self.bytes
    }

    /// Read the next chunk of `reader` into `buf` and hash it. Returns 0 at end of stream.
    /// Read failures surface as `Transport` errors.
    pub async fn read_chunk<R>(&mut self, reader: &mut R, buf: &mut [u8]) -> Result<usize>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let n = reader.read(buf).await.map_err(AppError::Transport)?;
        self.update(&buf[..n]);
        Ok(n)
    }

    pub fn finalize(self) -> Fingerprint {
        Fingerprint(hex::encode(self.inner.finalize()))
    }
}

/// Fingerprint in-memory content
pub fn hash_bytes(data: &[u8]) -> Fingerprint {
    let mut hasher = ContentHasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Stream a reader to its end and fingerprint it
pub async fn hash_reader<R>(reader: &mut R) -> Result<(Fingerprint, u64)>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut hasher = ContentHasher::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    while hasher.read_chunk(reader, &mut buf).await? > 0 {}

    let bytes = hasher.bytes_hashed();
    Ok((hasher.finalize(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    struct BrokenReader;

    impl AsyncRead for BrokenReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away")))
        }
    }

    #[test]
    fn known_digest() {
        let fp = hash_bytes(b"hello");
        assert_eq!(
            fp.as_str(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(fp.short(), "2cf24dba5fb0");
    }

    #[test]
    fn parse_validates_shape() {
        let fp = hash_bytes(b"abc");
        assert_eq!(Fingerprint::parse(fp.as_str()).unwrap(), fp);
        assert_eq!(
            Fingerprint::parse(&fp.as_str().to_uppercase()).unwrap(),
            fp
        );
        assert!(Fingerprint::parse("abc").is_err());
        assert!(Fingerprint::parse(&"z".repeat(64)).is_err());
    }

    #[tokio::test]
    async fn streaming_matches_in_memory() {
        // Spans several read chunks
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let mut reader = &data[..];
        let (fp, len) = hash_reader(&mut reader).await.unwrap();
        assert_eq!(fp, hash_bytes(&data));
        assert_eq!(len, data.len() as u64);
    }

    #[tokio::test]
    async fn read_chunk_hashes_what_it_reads() {
        let mut reader: &[u8] = b"hello world";
        let mut hasher = ContentHasher::new();
        let mut buf = [0u8; 4];

        let mut seen = Vec::new();
        loop {
            let n = hasher.read_chunk(&mut reader, &mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            seen.extend_from_slice(&buf[..n]);
        }

        assert_eq!(seen, b"hello world");
        assert_eq!(hasher.bytes_hashed(), 11);
        assert_eq!(hasher.finalize(), hash_bytes(b"hello world"));
    }

    #[tokio::test]
    async fn empty_stream_has_a_fingerprint() {
        let mut reader: &[u8] = &[];
        let (fp, len) = hash_reader(&mut reader).await.unwrap();
        assert_eq!(len, 0);
        assert_eq!(
            fp.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn read_failures_are_transport_errors() {
        let mut reader = BrokenReader;
        let err = hash_reader(&mut reader).await.unwrap_err();
        assert!(matches!(err, AppError::Transport(_)));
    }
}
