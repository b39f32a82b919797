use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use drm_fairplay::{
    DEFAULT_APPLICATION_SECRET, DurationPolicy, KeyMaterial, KeyMaterialError, MemoryContentKeys,
    RawContentKey,
};
use serde::Deserialize;
use serde_json::Value;

use super::{
    ContentKeySource, StoreError, Tenant, TenantRegistry, decode_duration, decode_key_field,
    provider_for,
};

/**
    JSON key-store document:

    {"tenants": {"<client_id>": {
        "FAIRPLAY_CERTIFICATION": "<base64 PEM>",
        "FAIRPLAY_PRIVATE_KEY": "<base64 PEM>",
        "FAIRPLAY_PRIVATE_KEY_PASSPHRASE": "<optional>",
        "FAIRPLAY_APPLICATION_SERVICE_KEY": "<hex>",
        "assets": {"<asset id>": {"contentKey": "..", "iv": "..",
                                  "leaseDuration": 3600, "rentalDuration": 0}}}}}
*/
#[derive(Debug, Clone, Deserialize)]
pub struct KeyStoreFile {
    pub tenants: BTreeMap<String, TenantEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenantEntry {
    #[serde(rename = "FAIRPLAY_CERTIFICATION")]
    pub certification: String,
    #[serde(rename = "FAIRPLAY_PRIVATE_KEY")]
    pub private_key: String,
    #[serde(rename = "FAIRPLAY_PRIVATE_KEY_PASSPHRASE", default)]
    pub passphrase: Option<String>,
    #[serde(rename = "FAIRPLAY_APPLICATION_SERVICE_KEY", default)]
    pub application_secret: Option<String>,
    #[serde(default)]
    pub assets: BTreeMap<String, AssetEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetEntry {
    #[serde(rename = "contentKey")]
    pub content_key: String,
    pub iv: String,
    #[serde(rename = "leaseDuration", default)]
    pub lease_duration: Option<Value>,
    #[serde(rename = "rentalDuration", default)]
    pub rental_duration: Option<Value>,
}

impl KeyStoreFile {
    pub fn parse(text: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(text)?)
    }

    /**
        Build and validate every tenant. The first failing tenant aborts the
        whole load.
    */
    pub fn into_registry(
        self,
        source: &ContentKeySource,
        allow_default_ask: bool,
    ) -> Result<TenantRegistry, StoreError> {
        if self.tenants.is_empty() {
            return Err(StoreError::NoTenants);
        }

        let mut tenants = Vec::with_capacity(self.tenants.len());
        for (id, entry) in self.tenants {
            let tenant = entry.into_tenant(&id, source, allow_default_ask)?;
            tracing::info!(tenant = %id, key_bits = tenant.keys.key_bits(), "tenant loaded");
            tenants.push(tenant);
        }
        Ok(TenantRegistry::new(tenants))
    }
}

impl TenantEntry {
    fn into_tenant(
        self,
        id: &str,
        source: &ContentKeySource,
        allow_default_ask: bool,
    ) -> Result<Tenant, StoreError> {
        let key_error = |source: KeyMaterialError| StoreError::KeyMaterial {
            tenant: id.to_string(),
            source,
        };

        let secret = resolve_application_secret(self.application_secret, allow_default_ask)
            .map_err(key_error)?;
        let keys = KeyMaterial::from_base64(
            &self.certification,
            &self.private_key,
            self.passphrase.as_deref(),
            &secret,
        )
        .map_err(key_error)?;

        let mut assets = MemoryContentKeys::new();
        for (asset_id, asset) in self.assets {
            let asset_error = |detail: String| StoreError::Asset {
                tenant: id.to_string(),
                asset: asset_id.clone(),
                detail,
            };
            let key = decode_key_field(&asset.content_key)
                .map_err(|e| asset_error(format!("contentKey: {e}")))?;
            let iv = decode_key_field(&asset.iv).map_err(|e| asset_error(format!("iv: {e}")))?;
            let duration = DurationPolicy::new(
                decode_duration(asset.lease_duration.as_ref()),
                decode_duration(asset.rental_duration.as_ref()),
            );
            assets.insert(asset_id.clone(), RawContentKey::new(key, iv), Some(duration));
        }

        Ok(Tenant {
            id: id.to_string(),
            keys: Arc::new(keys),
            content_keys: provider_for(source, id, assets)?,
        })
    }
}

/**
    Use the configured ASk, or the published development ASk when none is
    configured and the operator opted in.
*/
pub(crate) fn resolve_application_secret(
    configured: Option<String>,
    allow_default_ask: bool,
) -> Result<String, KeyMaterialError> {
    match configured.filter(|s| !s.trim().is_empty()) {
        Some(secret) => Ok(secret),
        None if allow_default_ask => {
            tracing::warn!("no application secret configured, using the published development ASk");
            Ok(hex::encode(DEFAULT_APPLICATION_SECRET))
        }
        None => Err(KeyMaterialError::InvalidSecret(
            "no application secret configured".into(),
        )),
    }
}

/**
    Read a key-store file from disk and build the tenant registry.
*/
pub fn load_key_store(
    path: &Path,
    source: &ContentKeySource,
    allow_default_ask: bool,
) -> Result<TenantRegistry, StoreError> {
    let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    KeyStoreFile::parse(&text)?.into_registry(source, allow_default_ask)
}
