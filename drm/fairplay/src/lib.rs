#![allow(clippy::doc_overindented_list_items)]

pub mod constants;
pub mod crypto;
mod error;
mod exchange;
mod keys;
mod provider;
mod record;
mod request;
mod response;
mod session;

pub use self::constants::DEFAULT_APPLICATION_SECRET;
pub use self::error::{
    CipherError, KeyMaterialError, KeyResult, LicenseError, LicenseResult, ProviderError,
    RecordError, ResponseError,
};
pub use self::exchange::issue_license;
pub use self::keys::{
    KeyMaterial, parse_application_secret, parse_private_key, parse_public_certificate,
};
pub use self::provider::{
    ContentKeyProvider, ContentKeyRecord, DerivedContentKeys, DurationPolicy, MemoryContentKeys,
    RawContentKey,
};
pub use self::record::{RecordSet, TaggedRecord};
pub use self::request::{LicenseRequest, LicenseRequestBuilder, RequestPayload};
pub use self::response::{LicenseResponse, OpenedLicense};
pub use self::session::SessionKey;
