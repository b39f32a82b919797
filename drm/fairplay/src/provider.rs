use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use md5::{Digest, Md5};

use crate::constants::BLOCK_SIZE;
use crate::error::ProviderError;

/**
    Content key and IV exactly as a backend stored them. Lengths are not
    validated here; the license engine refuses anything other than 16 bytes.
*/
#[derive(Clone, PartialEq, Eq)]
pub struct RawContentKey {
    pub key: Vec<u8>,
    pub iv: Vec<u8>,
}

impl RawContentKey {
    pub fn new(key: impl Into<Vec<u8>>, iv: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            iv: iv.into(),
        }
    }
}

impl fmt::Debug for RawContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawContentKey")
            .field("key", &"<redacted>")
            .field("iv", &hex::encode(&self.iv))
            .finish()
    }
}

/**
    Usage window granted with a content key, in seconds. Zero means the
    window does not apply.
*/
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurationPolicy {
    pub lease_seconds: u32,
    pub rental_seconds: u32,
}

impl DurationPolicy {
    pub const fn new(lease_seconds: u32, rental_seconds: u32) -> Self {
        Self {
            lease_seconds,
            rental_seconds,
        }
    }

    /// Wire form: lease (u32 BE) || rental (u32 BE).
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[..4].copy_from_slice(&self.lease_seconds.to_be_bytes());
        out[4..].copy_from_slice(&self.rental_seconds.to_be_bytes());
        out
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let bytes: [u8; 8] = data.try_into().ok()?;
        Some(Self {
            lease_seconds: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            rental_seconds: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}

/**
    Validated content key for one asset.
*/
#[derive(Clone, PartialEq, Eq)]
pub struct ContentKeyRecord {
    pub key: [u8; 16],
    pub iv: [u8; 16],
    pub duration: DurationPolicy,
}

impl ContentKeyRecord {
    /**
        Validate raw provider output. Key and IV must both be exactly one AES
        block; nothing is truncated or padded.
    */
    pub fn from_raw(raw: RawContentKey, duration: DurationPolicy) -> Result<Self, ProviderError> {
        let key: [u8; BLOCK_SIZE] = raw.key.as_slice().try_into().map_err(|_| {
            ProviderError::Malformed(format!("content key must be 16 bytes, got {}", raw.key.len()))
        })?;
        let iv: [u8; BLOCK_SIZE] = raw.iv.as_slice().try_into().map_err(|_| {
            ProviderError::Malformed(format!("content IV must be 16 bytes, got {}", raw.iv.len()))
        })?;
        Ok(Self { key, iv, duration })
    }
}

impl fmt::Debug for ContentKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentKeyRecord")
            .field("key", &"<redacted>")
            .field("iv", &hex::encode(self.iv))
            .field("duration", &self.duration)
            .finish()
    }
}

/**
    Source of per-asset content keys and duration policy.

    Implementations must be safe to call concurrently; the engine never
    retries and never caches.
*/
#[async_trait]
pub trait ContentKeyProvider: Send + Sync {
    /// Content key and IV for `asset_id`. `NotFound` when no key is stored.
    async fn fetch(&self, asset_id: &str) -> Result<RawContentKey, ProviderError>;

    /// Duration policy for `asset_id`. An asset without a stored policy gets 0/0.
    async fn fetch_duration(&self, asset_id: &str) -> Result<DurationPolicy, ProviderError>;
}

// ── In-memory ────────────────────────────────────────────────────────

#[derive(Clone)]
struct MemoryEntry {
    key: RawContentKey,
    duration: Option<DurationPolicy>,
}

/**
    Content keys held in a map, keyed by asset id.
*/
#[derive(Clone, Default)]
pub struct MemoryContentKeys {
    entries: HashMap<String, MemoryEntry>,
}

impl MemoryContentKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /**
        Store a key for `asset_id`, replacing any previous entry. A `None`
        duration behaves like an asset without a policy document.
    */
    pub fn insert(
        &mut self,
        asset_id: impl Into<String>,
        key: RawContentKey,
        duration: Option<DurationPolicy>,
    ) {
        self.entries
            .insert(asset_id.into(), MemoryEntry { key, duration });
    }

    pub fn with_key(
        mut self,
        asset_id: impl Into<String>,
        key: RawContentKey,
        duration: Option<DurationPolicy>,
    ) -> Self {
        self.insert(asset_id, key, duration);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for MemoryContentKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryContentKeys")
            .field("assets", &self.entries.len())
            .finish()
    }
}

#[async_trait]
impl ContentKeyProvider for MemoryContentKeys {
    async fn fetch(&self, asset_id: &str) -> Result<RawContentKey, ProviderError> {
        self.entries
            .get(asset_id)
            .map(|entry| entry.key.clone())
            .ok_or(ProviderError::NotFound)
    }

    async fn fetch_duration(&self, asset_id: &str) -> Result<DurationPolicy, ProviderError> {
        Ok(self
            .entries
            .get(asset_id)
            .and_then(|entry| entry.duration)
            .unwrap_or_default())
    }
}

// ── Derived ──────────────────────────────────────────────────────────

/**
    Deterministic keys for development and testing:
      key = MD5(asset_id)
      iv  = MD5(key || asset_id)

    Every asset resolves, and every asset gets the same duration policy.
*/
#[derive(Debug, Clone, Copy, Default)]
pub struct DerivedContentKeys {
    duration: DurationPolicy,
}

impl DerivedContentKeys {
    pub fn new(duration: DurationPolicy) -> Self {
        Self { duration }
    }

    pub fn derive(asset_id: &str) -> RawContentKey {
        let key = Md5::digest(asset_id.as_bytes());
        let mut hasher = Md5::new();
        hasher.update(key);
        hasher.update(asset_id.as_bytes());
        let iv = hasher.finalize();
        RawContentKey::new(key.to_vec(), iv.to_vec())
    }
}

#[async_trait]
impl ContentKeyProvider for DerivedContentKeys {
    async fn fetch(&self, asset_id: &str) -> Result<RawContentKey, ProviderError> {
        Ok(Self::derive(asset_id))
    }

    async fn fetch_duration(&self, _asset_id: &str) -> Result<DurationPolicy, ProviderError> {
        Ok(self.duration)
    }
}
