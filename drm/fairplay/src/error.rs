use thiserror::Error;

/**
    Errors raised while loading a tenant's certificate, private key or
    application secret. Always fatal for the tenant, never retried.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyMaterialError {
    // ── Encoding ───────────────────────────────────────────────────────
    #[error("invalid base64: {0}")]
    InvalidBase64(String),
    #[error("invalid PEM: {0}")]
    InvalidPem(String),
    #[error("unsupported PEM type '{0}'")]
    UnsupportedPemType(String),

    // ── Certificates ──────────────────────────────────────────────────
    #[error("certificate decode failed: {0}")]
    CertificateParse(String),
    #[error("certificate request signature invalid: {0}")]
    CsrSignatureInvalid(String),

    // ── Private keys ──────────────────────────────────────────────────
    #[error("private key is encrypted but no passphrase was provided")]
    PassphraseRequired,
    #[error("private key decryption failed: {0}")]
    DecryptFailed(String),
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),
    #[error("RSA key parse failed: {0}")]
    KeyParse(String),
    #[error("private key does not match the certificate public key")]
    KeyPairMismatch,

    // ── Application secret ────────────────────────────────────────────
    #[error("invalid application secret: {0}")]
    InvalidSecret(String),
}

/**
    Errors from the AES primitives. Never crosses the license engine boundary
    unwrapped.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("invalid PKCS#7 padding")]
    BadPadding,
    #[error("invalid cipher input length: {0}")]
    InvalidLength(String),
}

/**
    Errors from the tagged record codec.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record set is truncated")]
    Truncated,
    #[error("invalid record tag {0:#010x}")]
    InvalidTag(u32),
    #[error("record value too large to encode ({0} bytes)")]
    ValueTooLarge(usize),
}

/**
    Errors reported by a [`ContentKeyProvider`](crate::ContentKeyProvider).
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("no content key stored for asset")]
    NotFound,
    #[error("stored content key is malformed: {0}")]
    Malformed(String),
    #[error("content key backend failed: {0}")]
    Backend(String),
}

/**
    Terminal failure of a single license exchange.

    Messages are intentionally coarse: nothing here distinguishes a wrong key
    from a corrupted padding block.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LicenseError {
    #[error("malformed license request: {0}")]
    MalformedRequest(String),
    #[error("license request could not be unwrapped")]
    UnwrapFailed,
    #[error("license request is missing {0}")]
    MissingField(&'static str),
    #[error("content key unavailable: {0}")]
    ContentKeyUnavailable(#[from] ProviderError),
}

/**
    Errors raised on the client side while opening a license response.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    #[error("license response is truncated")]
    Truncated,
    #[error("unsupported license response version {0}")]
    UnsupportedVersion(u32),
    #[error("license response integrity tag mismatch")]
    IntegrityMismatch,
    #[error("license response records: {0}")]
    Records(#[from] RecordError),
    #[error("license response is missing {0}")]
    MissingRecord(&'static str),
    #[error("content key decrypt failed: {0}")]
    Cipher(#[from] CipherError),
}

impl From<RecordError> for LicenseError {
    fn from(e: RecordError) -> Self {
        Self::MalformedRequest(e.to_string())
    }
}

/**
    Type alias for results that may return a [`KeyMaterialError`].
*/
pub type KeyResult<T> = std::result::Result<T, KeyMaterialError>;

/**
    Type alias for results that may return a [`LicenseError`].
*/
pub type LicenseResult<T> = std::result::Result<T, LicenseError>;
