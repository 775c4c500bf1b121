//! Signature hashing utilities.
//!
//! Every staleness decision in the engine compares [`Signature`] values
//! rather than timestamps. File nodes hash their bytes, alias nodes hash the
//! ordered concatenation of their children's signatures, and executors hash
//! the substituted contents of their action chain.
//!
//! # Examples
//!
//! ```
//! use settle::hasher::{ContentHasher, Signature};
//!
//! let sig = Signature::of_bytes(b"\\documentclass{article}");
//! assert_eq!(sig.as_str().len(), 64);
//!
//! let mut hasher = ContentHasher::new();
//! hasher.field(b"a");
//! hasher.field(b"bc");
//! assert_ne!(hasher.finish(), Signature::of_bytes(b"abc"));
//! ```

use std::fmt;
use std::fs::File;
use std::io::{self, Read};

use camino::Utf8Path;
use digest::Digest;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

/// Lowercase hexadecimal SHA-256 digest of some substantive content.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    /// Hash a byte slice in one step.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(encode_hex(&Sha256::digest(bytes)))
    }

    /// Borrow the hexadecimal digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental hasher that length-prefixes every field so adjacent fields
/// cannot alias (`"ab" + "c"` and `"a" + "bc"` hash differently).
#[derive(Clone, Default)]
pub struct ContentHasher {
    inner: Sha256,
}

impl fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentHasher").finish_non_exhaustive()
    }
}

impl ContentHasher {
    /// Start an empty hash.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one length-prefixed field.
    pub fn field(&mut self, bytes: &[u8]) {
        let len = bytes.len();
        self.inner.update(format!("{len}:").as_bytes());
        self.inner.update(bytes);
    }

    /// Append an optional field, distinguishing `None` from an empty value.
    pub fn optional_field(&mut self, value: Option<&[u8]>) {
        match value {
            Some(bytes) => {
                self.inner.update(b"1");
                self.field(bytes);
            }
            None => self.inner.update(b"0"),
        }
    }

    /// Consume the hasher and produce the signature.
    #[must_use]
    pub fn finish(self) -> Signature {
        Signature(encode_hex(&self.inner.finalize()))
    }
}

/// Stream a file through SHA-256.
///
/// Returns `Ok(None)` when the file does not exist so callers can treat
/// absence as its own state.
///
/// # Errors
///
/// Returns any I/O error other than `NotFound` raised while reading.
pub fn file_signature(path: &Utf8Path) -> io::Result<Option<Signature>> {
    let mut file = match File::open(path.as_std_path()) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        let chunk = buffer.get(..read).unwrap_or_else(|| {
            debug_assert!(false, "read beyond buffer capacity: {read} bytes");
            buffer.as_slice()
        });
        hasher.update(chunk);
    }
    Ok(Some(Signature(encode_hex(&hasher.finalize()))))
}

fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        if let Err(err) = write!(&mut out, "{byte:02x}") {
            debug_assert!(false, "format hex byte failed: {err}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b"", "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")]
    #[case(b"abc", "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")]
    fn of_bytes_matches_known_digests(#[case] input: &[u8], #[case] expected: &str) {
        assert_eq!(Signature::of_bytes(input).as_str(), expected);
    }

    #[test]
    fn fields_are_length_prefixed() {
        let mut left = ContentHasher::new();
        left.field(b"ab");
        left.field(b"c");
        let mut right = ContentHasher::new();
        right.field(b"a");
        right.field(b"bc");
        assert_ne!(left.finish(), right.finish());
    }

    #[test]
    fn optional_field_distinguishes_none_from_empty() {
        let mut none = ContentHasher::new();
        none.optional_field(None);
        let mut empty = ContentHasher::new();
        empty.optional_field(Some(b""));
        assert_ne!(none.finish(), empty.finish());
    }

    #[test]
    fn file_signature_reports_missing_as_none() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("absent.aux"))
            .expect("utf8 path");
        assert_eq!(file_signature(&path).expect("hash"), None);
    }

    #[test]
    fn file_signature_hashes_contents() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path =
            camino::Utf8PathBuf::from_path_buf(dir.path().join("doc.toc")).expect("utf8 path");
        std::fs::write(&path, "abc").expect("write");
        assert_eq!(
            file_signature(&path).expect("hash"),
            Some(Signature::of_bytes(b"abc"))
        );
    }
}
