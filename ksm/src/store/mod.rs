//! Tenant key material and content-key backends.
//!
//! All tenants are loaded and validated once at startup; the registry is
//! read-only afterwards.

pub mod env;
pub mod file;
pub mod remote;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use drm_fairplay::{
    ContentKeyProvider, DerivedContentKeys, KeyMaterial, KeyMaterialError, MemoryContentKeys,
    ProviderError,
};
use thiserror::Error;

pub use env::load_env_tenant;
pub use file::{KeyStoreFile, load_key_store};
pub use remote::RemoteContentKeys;

/// Client id used for the single tenant configured from the environment.
pub const DEFAULT_TENANT_ID: &str = "default";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read key store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse key store: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("tenant '{tenant}': {source}")]
    KeyMaterial {
        tenant: String,
        #[source]
        source: KeyMaterialError,
    },
    #[error("tenant '{tenant}' asset '{asset}': {detail}")]
    Asset {
        tenant: String,
        asset: String,
        detail: String,
    },
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),
    #[error("no tenants configured")]
    NoTenants,
    #[error("invalid remote store URL: {0}")]
    RemoteUrl(String),
}

/**
    One license customer: its key material and where its content keys live.
*/
#[derive(Clone)]
pub struct Tenant {
    pub id: String,
    pub keys: Arc<KeyMaterial>,
    pub content_keys: Arc<dyn ContentKeyProvider>,
}

impl std::fmt::Debug for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tenant")
            .field("id", &self.id)
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

/**
    Immutable lookup from client id to tenant.
*/
#[derive(Debug, Clone, Default)]
pub struct TenantRegistry {
    tenants: BTreeMap<String, Arc<Tenant>>,
}

impl TenantRegistry {
    pub fn new(tenants: impl IntoIterator<Item = Tenant>) -> Self {
        Self {
            tenants: tenants
                .into_iter()
                .map(|tenant| (tenant.id.clone(), Arc::new(tenant)))
                .collect(),
        }
    }

    /**
        Find the tenant for a request. Without a client id the request is
        served only when exactly one tenant is configured.
    */
    pub fn resolve(&self, client_id: Option<&str>) -> Option<Arc<Tenant>> {
        match client_id.filter(|id| !id.is_empty()) {
            Some(id) => self.tenants.get(id).cloned(),
            None if self.tenants.len() == 1 => self.tenants.values().next().cloned(),
            None => None,
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.tenants.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

/**
    Where content keys come from, chosen on the command line.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKeySource {
    /// The `assets` section of each tenant's key-store entry.
    KeyStore,
    /// HTTP document store rooted at this URL.
    Remote(String),
    /// MD5-derived development keys.
    Derived,
}

/**
    Build the content-key backend for one tenant. `assets` is only consulted
    for the key-store source.
*/
pub(crate) fn provider_for(
    source: &ContentKeySource,
    tenant_id: &str,
    assets: MemoryContentKeys,
) -> Result<Arc<dyn ContentKeyProvider>, StoreError> {
    Ok(match source {
        ContentKeySource::KeyStore => Arc::new(assets),
        ContentKeySource::Remote(base_url) => {
            Arc::new(RemoteContentKeys::new(base_url, tenant_id)?)
        }
        ContentKeySource::Derived => Arc::new(DerivedContentKeys::default()),
    })
}

/**
    Decode a stored content key or IV. Hex is tried first, then standard
    base64.
*/
pub fn decode_key_field(value: &str) -> Result<Vec<u8>, ProviderError> {
    let value = value.trim();
    if let Ok(bytes) = hex::decode(value) {
        return Ok(bytes);
    }
    STANDARD
        .decode(value)
        .map_err(|_| ProviderError::Malformed("expected hex or base64".into()))
}

/**
    Interpret a stored duration in seconds. Anything other than a
    non-negative number that fits in a u32 counts as 0; fractions truncate.
*/
pub fn decode_duration(value: Option<&serde_json::Value>) -> u32 {
    let Some(value) = value else {
        return 0;
    };
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).unwrap_or(0);
    }
    match value.as_f64() {
        Some(n) if n >= 0.0 && n <= f64::from(u32::MAX) => n as u32,
        _ => 0,
    }
}
