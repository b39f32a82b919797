use std::sync::Arc;

use drm_fairplay::{KeyMaterial, KeyMaterialError, MemoryContentKeys};

use super::file::resolve_application_secret;
use super::{ContentKeySource, DEFAULT_TENANT_ID, StoreError, Tenant, TenantRegistry, provider_for};

pub const ENV_CERTIFICATION: &str = "FAIRPLAY_CERTIFICATION";
pub const ENV_PRIVATE_KEY: &str = "FAIRPLAY_PRIVATE_KEY";
pub const ENV_PRIVATE_KEY_PASSPHRASE: &str = "FAIRPLAY_PRIVATE_KEY_PASSPHRASE";
pub const ENV_APPLICATION_SERVICE_KEY: &str = "FAIRPLAY_APPLICATION_SERVICE_KEY";

/**
    Build the single-tenant registry from environment-style variables.

    `lookup` is normally `|name| std::env::var(name).ok()`; tests pass a map.
    The tenant is registered under [`DEFAULT_TENANT_ID`] and also serves
    requests that carry no client id.
*/
pub fn load_env_tenant<F>(
    lookup: F,
    source: &ContentKeySource,
    allow_default_ask: bool,
) -> Result<TenantRegistry, StoreError>
where
    F: Fn(&str) -> Option<String>,
{
    let certification = lookup(ENV_CERTIFICATION).ok_or(StoreError::MissingVar(ENV_CERTIFICATION))?;
    let private_key = lookup(ENV_PRIVATE_KEY).ok_or(StoreError::MissingVar(ENV_PRIVATE_KEY))?;
    let passphrase = lookup(ENV_PRIVATE_KEY_PASSPHRASE);

    let key_error = |source: KeyMaterialError| StoreError::KeyMaterial {
        tenant: DEFAULT_TENANT_ID.to_string(),
        source,
    };
    let secret = resolve_application_secret(lookup(ENV_APPLICATION_SERVICE_KEY), allow_default_ask)
        .map_err(key_error)?;
    let keys =
        KeyMaterial::from_base64(&certification, &private_key, passphrase.as_deref(), &secret)
            .map_err(key_error)?;

    if *source == ContentKeySource::KeyStore {
        tracing::warn!("environment tenant has no asset list; every content key lookup will miss");
    }

    tracing::info!(
        tenant = DEFAULT_TENANT_ID,
        key_bits = keys.key_bits(),
        "tenant loaded from environment"
    );

    Ok(TenantRegistry::new([Tenant {
        id: DEFAULT_TENANT_ID.to_string(),
        keys: Arc::new(keys),
        content_keys: provider_for(source, DEFAULT_TENANT_ID, MemoryContentKeys::new())?,
    }]))
}
