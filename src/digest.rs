//! Single-pass content fingerprinting.
//!
//! Output keys are derived from a SHA-256 digest of the *unmodified* upload
//! bytes, not of the decoded pixels. The upload is read exactly once: the
//! decoder pulls bytes through a [`DigestReader`], which hands them on
//! unchanged while feeding the same bytes into the hasher.
//!
//! Decoders are free to stop before end-of-stream (trailing metadata, padding,
//! a container that records its own length). A digest taken at that point
//! would describe a prefix of the file, so [`DigestReader::finalize`] always
//! drains the remainder before finalizing.
//!
//! ```
//! use imgpress::digest::{ContentDigest, DigestReader};
//! use std::io::Read;
//!
//! let mut reader = DigestReader::new(&b"hello world"[..]);
//! let mut head = [0u8; 5];
//! reader.read_exact(&mut head).unwrap();
//! let (_, digest) = reader.finalize().unwrap();
//! assert_eq!(digest, ContentDigest::of_bytes(b"hello world"));
//! ```

use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};

/// Fixed-length fingerprint of a byte stream, rendered as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest(Vec<u8>);

impl ContentDigest {
    /// SHA-256 of an in-memory buffer.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).to_vec())
    }

    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Reader adapter that hashes everything read through it.
///
/// Composition rather than a new stream type: the inner reader keeps its own
/// semantics, and the hasher only ever sees bytes the caller also saw.
pub struct DigestReader<R, D = Sha256> {
    inner: R,
    hasher: D,
    bytes_read: u64,
}

impl<R: Read> DigestReader<R, Sha256> {
    pub fn new(inner: R) -> Self {
        Self::with_hasher(inner, Sha256::new())
    }
}

impl<R: Read, D: Digest> DigestReader<R, D> {
    pub fn with_hasher(inner: R, hasher: D) -> Self {
        Self {
            inner,
            hasher,
            bytes_read: 0,
        }
    }

    /// Total bytes forwarded so far, including drained bytes.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Consume the rest of the stream, hashing it. Returns the number of
    /// bytes that were still unread.
    pub fn drain(&mut self) -> io::Result<u64> {
        io::copy(self, &mut io::sink())
    }

    /// Drain to end-of-stream and return the inner reader with the digest.
    pub fn finalize(mut self) -> io::Result<(R, ContentDigest)> {
        self.drain()?;
        let digest = ContentDigest(self.hasher.finalize().to_vec());
        Ok((self.inner, digest))
    }
}

impl<R: Read, D: Digest> Read for DigestReader<R, D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes_read += n as u64;
        Ok(n)
    }
}
