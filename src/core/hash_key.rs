use crate::error::HashKeyError;
use md5::{Digest, Md5};
use std::fmt;

/// Length of a hex-encoded MD5 digest
pub const HASH_HEX_LEN: usize = 32;

/// 128-bit identity of a suppressed address: the MD5 digest of the
/// lower-cased, trimmed email address.
///
/// Ordering is lexicographic over the 16 bytes, which is what the exact
/// index sorts and binary-searches by.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HashKey([u8; 16]);

impl HashKey {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Normalize (trim, lower-case) and hash an email address
    pub fn from_email(address: &str) -> Self {
        let normalized = address.trim().to_lowercase();
        let digest = Md5::digest(normalized.as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Decode a pre-hashed 32-character hex digest
    pub fn from_hex(value: &str) -> Result<Self, HashKeyError> {
        let normalized = value.trim().to_ascii_lowercase();
        // length in characters, so multi-byte input is a length error
        let len = normalized.chars().count();
        if len != HASH_HEX_LEN {
            return Err(HashKeyError::InvalidHashLength { len });
        }
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(&normalized, &mut bytes)
            .map_err(|_| HashKeyError::InvalidHashEncoding)?;
        Ok(Self(bytes))
    }

    /// Resolve a caller-supplied value that is either a hex digest or an
    /// address. Never fails: anything that is not a valid digest is hashed
    /// as an address.
    pub fn from_address_or_hash(value: &str) -> Self {
        Self::from_hex(value).unwrap_or_else(|_| Self::from_email(value))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// High and low 64-bit halves (big-endian), the two seeds of the
    /// filter's double hashing
    #[inline]
    pub fn halves(&self) -> (u64, u64) {
        let mut high = [0u8; 8];
        let mut low = [0u8; 8];
        high.copy_from_slice(&self.0[..8]);
        low.copy_from_slice(&self.0[8..]);
        (u64::from_be_bytes(high), u64::from_be_bytes(low))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashKey({})", self.to_hex())
    }
}
