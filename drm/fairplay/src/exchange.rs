use tracing::debug;

use crate::error::LicenseResult;
use crate::keys::KeyMaterial;
use crate::provider::{ContentKeyProvider, ContentKeyRecord};
use crate::request::{LicenseRequest, RequestPayload};
use crate::response::LicenseResponse;
use crate::session::SessionKey;

/**
    Turn one license request token into a license response.

    Steps:
      1. framing check
      2. RSA-OAEP unwrap of the key block, request tag check, CBC decrypt
      3. record decode, asset id and R1 extraction
      4. session key derivation from (ASk, R1)
      5. content key and duration lookup
      6. response records, integrity tag and assembly

    The provider calls are the only suspension points. Nothing is cached
    between calls and the output is a pure function of the inputs, so the same
    token always produces the same bytes.
*/
pub async fn issue_license<P>(
    keys: &KeyMaterial,
    provider: &P,
    token: &[u8],
) -> LicenseResult<LicenseResponse>
where
    P: ContentKeyProvider + ?Sized,
{
    let request = LicenseRequest::parse(token)?;
    let records = request.decrypt_records(keys)?;
    let payload = RequestPayload::from_records(records)?;
    let session_key = SessionKey::derive(keys.application_secret(), &payload.r1)?;

    debug!(
        asset_id = %payload.asset_id,
        passthrough = payload.passthrough.len(),
        "license request unwrapped"
    );

    let raw = provider.fetch(&payload.asset_id).await?;
    let duration = provider.fetch_duration(&payload.asset_id).await?;
    let content = ContentKeyRecord::from_raw(raw, duration)?;

    let response = LicenseResponse::build(&session_key, &content, &payload.passthrough)?;

    debug!(
        asset_id = %payload.asset_id,
        lease = duration.lease_seconds,
        rental = duration.rental_seconds,
        bytes = response.as_bytes().len(),
        "license issued"
    );

    Ok(response)
}
