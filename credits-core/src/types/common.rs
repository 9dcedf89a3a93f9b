//! Basic Types
//!
//! Naming conventions:
//! - `_id` suffix: primary key identifiers
//! - `_key` suffix: derived storage digests

use crate::constants::VISIBILITY_KEY_DOMAIN;
use serde::{Deserialize, Serialize};

/// Account address (20 bytes, zero means "null account")
pub type Address = ethereum_types::H160;

/// Visibility identifier: an opaque UTF-8 string naming a creator's
/// namespace, e.g. `x-VitalikButerin`. Credits are never fungible across
/// two different visibility ids.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisibilityId(pub String);

impl VisibilityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Domain-separated 32-byte digest of the id, for consumers that
    /// index visibilities by hash rather than by raw string.
    pub fn key(&self) -> VisibilityKey {
        let mut input = Vec::with_capacity(VISIBILITY_KEY_DOMAIN.len() + self.0.len());
        input.extend_from_slice(VISIBILITY_KEY_DOMAIN);
        input.extend_from_slice(self.0.as_bytes());
        VisibilityKey(*blake3::hash(&input).as_bytes())
    }
}

impl std::fmt::Display for VisibilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VisibilityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Storage key digest of a visibility id
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisibilityKey(pub [u8; 32]);

impl VisibilityKey {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for VisibilityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VisibilityKey({}...)", &self.to_hex()[..16])
    }
}

impl std::fmt::Display for VisibilityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
