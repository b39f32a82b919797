use async_trait::async_trait;
use drm_fairplay::{ContentKeyProvider, DurationPolicy, ProviderError, RawContentKey};
use reqwest::{StatusCode, Url};
use serde_json::Value;

use super::{StoreError, decode_duration, decode_key_field};

/**
    Content keys held in an HTTP document store.

      GET {base}/tenants/{tenant}/asset_keys/{asset}
          {"contentKey": .., "iv": ..}
      GET {base}/tenants/{tenant}/license_policy/{asset}
          {"leaseDuration": .., "rentalDuration": ..}

    A missing key document is `NotFound`; a missing policy document means 0/0.
*/
#[derive(Debug, Clone)]
pub struct RemoteContentKeys {
    client: reqwest::Client,
    base: Url,
    tenant: String,
}

impl RemoteContentKeys {
    pub fn new(base_url: &str, tenant: &str) -> Result<Self, StoreError> {
        let base = Url::parse(base_url).map_err(|e| StoreError::RemoteUrl(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::RemoteUrl(format!("{base_url} cannot be a base URL")));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base,
            tenant: tenant.to_string(),
        })
    }

    fn document_url(&self, collection: &str, asset_id: &str) -> Result<Url, ProviderError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Backend("remote store URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(["tenants", self.tenant.as_str(), collection, asset_id]);
        Ok(url)
    }

    /// `Ok(None)` when the store answers 404.
    async fn get_document(&self, url: Url) -> Result<Option<Value>, ProviderError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Backend(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<Value>()
                .await
                .map(Some)
                .map_err(|e| ProviderError::Malformed(e.to_string())),
            status => Err(ProviderError::Backend(format!("remote store returned {status}"))),
        }
    }
}

#[async_trait]
impl ContentKeyProvider for RemoteContentKeys {
    async fn fetch(&self, asset_id: &str) -> Result<RawContentKey, ProviderError> {
        let url = self.document_url("asset_keys", asset_id)?;
        let doc = self.get_document(url).await?.ok_or(ProviderError::NotFound)?;

        let field = |name: &str| -> Result<Vec<u8>, ProviderError> {
            let text = doc
                .get(name)
                .and_then(Value::as_str)
                .ok_or_else(|| ProviderError::Malformed(format!("{name} is missing")))?;
            decode_key_field(text)
                .map_err(|e| ProviderError::Malformed(format!("{name}: {e}")))
        };

        Ok(RawContentKey::new(field("contentKey")?, field("iv")?))
    }

    async fn fetch_duration(&self, asset_id: &str) -> Result<DurationPolicy, ProviderError> {
        let url = self.document_url("license_policy", asset_id)?;
        let Some(doc) = self.get_document(url).await? else {
            return Ok(DurationPolicy::default());
        };
        Ok(DurationPolicy::new(
            decode_duration(doc.get("leaseDuration")),
            decode_duration(doc.get("rentalDuration")),
        ))
    }
}
