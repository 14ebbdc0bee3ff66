use std::fmt::{Debug, Display};
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};

use crate::error::DepGitError;

/// 160-bit git object id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct HashValue([u8; 20]);

impl HashValue {
    pub const LEN: usize = 20;
    pub const HEX_LEN: usize = 40;

    pub const fn zero() -> Self {
        HashValue([0; 20])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 20]
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 20] = bytes.try_into().ok()?;
        Some(HashValue(raw))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// SHA-1 over `data` as-is.
    pub fn digest(data: &[u8]) -> Self {
        let mut sha1 = Sha1::new();
        sha1.update(data);
        HashValue(<[u8; 20]>::from(sha1.finalize()))
    }

    /// Git object id: SHA-1 of `"<kind> <len>\0"` followed by the content.
    pub fn hash_object(kind: &str, content: &[u8]) -> Self {
        let mut sha1 = Sha1::new();
        sha1.update(format!("{} {}\0", kind, content.len()).as_bytes());
        sha1.update(content);
        HashValue(<[u8; 20]>::from(sha1.finalize()))
    }
}

impl From<[u8; 20]> for HashValue {
    fn from(raw: [u8; 20]) -> Self {
        HashValue(raw)
    }
}

impl FromStr for HashValue {
    type Err = DepGitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::HEX_LEN {
            return Err(DepGitError::InvalidHash(s.to_string()));
        }
        let mut raw = [0u8; 20];
        hex::decode_to_slice(s, &mut raw).map_err(|_| DepGitError::InvalidHash(s.to_string()))?;
        Ok(HashValue(raw))
    }
}

impl Display for HashValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Debug for HashValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HashValue({})", self)
    }
}

impl Serialize for HashValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HashValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
