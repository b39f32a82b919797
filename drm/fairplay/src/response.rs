use crate::constants::{
    BLOCK_SIZE, INTEGRITY_TAG_LEN, RESPONSE_PREFIX_LEN, RESPONSE_VERSION,
    TAG_CONTENT_KEY_DURATION, TAG_ENCRYPTED_CONTENT_KEY,
};
use crate::crypto::{aes_cbc_decrypt, aes_cbc_encrypt, aes_cmac};
use crate::error::{CipherError, LicenseResult, ResponseError};
use crate::provider::{ContentKeyRecord, DurationPolicy};
use crate::record::RecordSet;
use crate::session::SessionKey;

/**
    Outbound license response (CKC).

    Layout (big-endian):
      version (4) || reserved (4) || AES-CMAC(SK, records) (16) || records

    Records, in order:
      TAG_ENCRYPTED_CONTENT_KEY  content IV || AES-128-CBC(SK, content IV, key)
      TAG_CONTENT_KEY_DURATION   lease (4) || rental (4)
      pass-through records from the request, in request order
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseResponse {
    bytes: Vec<u8>,
}

/**
    Decoded contents of a response, as a client would see them.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedLicense {
    pub content_key: [u8; 16],
    pub content_iv: [u8; 16],
    pub duration: DurationPolicy,
    pub passthrough: RecordSet,
}

impl LicenseResponse {
    pub fn build(
        session_key: &SessionKey,
        content: &ContentKeyRecord,
        passthrough: &RecordSet,
    ) -> LicenseResult<Self> {
        let wrapped = aes_cbc_encrypt(session_key.as_bytes(), &content.iv, &content.key);
        let mut encrypted_key = Vec::with_capacity(BLOCK_SIZE + wrapped.len());
        encrypted_key.extend_from_slice(&content.iv);
        encrypted_key.extend_from_slice(&wrapped);

        let mut records = RecordSet::new();
        records.push(TAG_ENCRYPTED_CONTENT_KEY, encrypted_key);
        records.push(TAG_CONTENT_KEY_DURATION, content.duration.to_bytes());
        for record in passthrough {
            records.push(record.tag, record.value.clone());
        }
        let body = records.encode()?;

        let tag = aes_cmac(session_key.as_bytes(), &body);

        let mut bytes = Vec::with_capacity(RESPONSE_PREFIX_LEN + body.len());
        bytes.extend_from_slice(&RESPONSE_VERSION.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 4]);
        bytes.extend_from_slice(&tag);
        bytes.extend_from_slice(&body);

        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /**
        Verify and decode a response with the session key the client derived
        for its own request.
    */
    pub fn open(bytes: &[u8], session_key: &SessionKey) -> Result<OpenedLicense, ResponseError> {
        if bytes.len() < RESPONSE_PREFIX_LEN {
            return Err(ResponseError::Truncated);
        }
        let version = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if version != RESPONSE_VERSION {
            return Err(ResponseError::UnsupportedVersion(version));
        }

        let tag = &bytes[8..8 + INTEGRITY_TAG_LEN];
        let body = &bytes[RESPONSE_PREFIX_LEN..];
        let expected = aes_cmac(session_key.as_bytes(), body);
        let mismatch = expected
            .iter()
            .zip(tag)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if mismatch != 0 {
            return Err(ResponseError::IntegrityMismatch);
        }

        let records = RecordSet::decode(body)?;

        let encrypted_key = records
            .find(TAG_ENCRYPTED_CONTENT_KEY)
            .ok_or(ResponseError::MissingRecord("encrypted content key"))?;
        if encrypted_key.value.len() <= BLOCK_SIZE {
            return Err(ResponseError::Cipher(CipherError::InvalidLength(
                "encrypted content key record is too short".into(),
            )));
        }
        let (iv, wrapped) = encrypted_key.value.split_at(BLOCK_SIZE);
        let mut content_iv = [0u8; 16];
        content_iv.copy_from_slice(iv);
        let key = aes_cbc_decrypt(session_key.as_bytes(), &content_iv, wrapped)?;
        let content_key: [u8; 16] = key.try_into().map_err(|key: Vec<u8>| {
            ResponseError::Cipher(CipherError::InvalidLength(format!(
                "content key must be 16 bytes, got {}",
                key.len()
            )))
        })?;

        let duration = records
            .find(TAG_CONTENT_KEY_DURATION)
            .and_then(|r| DurationPolicy::from_bytes(&r.value))
            .ok_or(ResponseError::MissingRecord("content key duration"))?;

        let passthrough = records
            .into_iter()
            .filter(|r| r.tag != TAG_ENCRYPTED_CONTENT_KEY && r.tag != TAG_CONTENT_KEY_DURATION)
            .collect();

        Ok(OpenedLicense {
            content_key,
            content_iv,
            duration,
            passthrough,
        })
    }
}

impl AsRef<[u8]> for LicenseResponse {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}
