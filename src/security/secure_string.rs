//! Secret buffers that zero their memory on drop
//!
//! Used for Slack's master key material, decrypted cookie plaintext and the
//! broker's record of already-validated credentials.

use std::fmt;
use std::ops::Deref;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A string that securely clears its memory when dropped
///
/// # Example
///
/// ```
/// use slack_session_lib::security::SecureString;
///
/// let secret = SecureString::new("master-key-material".to_string());
/// assert_eq!(secret.as_str(), "master-key-material");
/// assert!(!format!("{:?}", secret).contains("master"));
/// ```
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    /// Takes ownership of `s`
    pub fn new(s: String) -> Self {
        Self { inner: s }
    }

    /// Returns the secret as a slice
    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureString([REDACTED; {} bytes])", self.inner.len())
    }
}

/// Compares without short-circuiting on the first differing byte
impl PartialEq<&str> for SecureString {
    fn eq(&self, other: &&str) -> bool {
        constant_time_eq(self.inner.as_bytes(), other.as_bytes())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// A byte buffer that securely clears its memory when dropped
///
/// Decryption runs in place, so the ciphertext copy becomes the plaintext
/// without another allocation holding it.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecureBytes {
    inner: Vec<u8>,
}

impl SecureBytes {
    /// Copies `bytes` into a new buffer
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            inner: bytes.to_vec(),
        }
    }

    /// Returns the bytes as a slice
    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }

    /// Returns a mutable view for in-place decryption
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.inner
    }

    /// Shortens the buffer, zeroing the discarded tail first
    pub fn truncate(&mut self, len: usize) {
        if len < self.inner.len() {
            self.inner[len..].zeroize();
            self.inner.truncate(len);
        }
    }
}

impl Deref for SecureBytes {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl fmt::Debug for SecureBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureBytes([REDACTED; {} bytes])", self.inner.len())
    }
}
