use std::fmt;

use uuid::Uuid;

use super::error::StorageError;
use super::hash::Fingerprint;

/// Permanent location of a blob: `{2 hex}/{62 hex}`, derived from the
/// fingerprint of its content.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn for_fingerprint(fingerprint: &Fingerprint) -> Self {
        Self(format!(
            "{}/{}",
            fingerprint.shard_prefix(),
            fingerprint.shard_suffix()
        ))
    }

    /// Parse a persisted key. Only the sharded lowercase hex layout is
    /// accepted, so a key can never escape the store root.
    pub fn parse(s: &str) -> Result<Self, StorageError> {
        let Some((prefix, suffix)) = s.split_once('/') else {
            return Err(StorageError::InvalidKey(format!("missing shard separator: {s}")));
        };
        let is_lower_hex = |part: &str| {
            part.bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        };
        if prefix.len() != 2 || suffix.len() != 62 || !is_lower_hex(prefix) || !is_lower_hex(suffix)
        {
            return Err(StorageError::InvalidKey(format!("malformed key: {s}")));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into (shard directory, file name).
    pub fn shard(&self) -> (&str, &str) {
        (&self.0[..2], &self.0[3..])
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({})", self.0)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to a blob written under a temporary name, before its fingerprint
/// is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempKey(Uuid);

impl TempKey {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for TempKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
