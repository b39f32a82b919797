use std::fmt;

use sha1::{Digest, Sha1};

use crate::constants::{BLOCK_SIZE, R1_LEN};
use crate::crypto::aes_ecb_encrypt;
use crate::error::{LicenseError, LicenseResult};

/**
    Per-request symmetric key. Never persisted and never logged.

    Derivation:
      SK = AES-128-ECB(key = ASk, block = SHA-1(R1)[0..16])

    Deterministic in (ASk, R1), so a retried request produces a
    byte-identical response.
*/
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; 16]);

impl SessionKey {
    pub fn derive(application_secret: &[u8; 16], r1: &[u8]) -> LicenseResult<Self> {
        if r1.len() != R1_LEN {
            return Err(LicenseError::MalformedRequest(format!(
                "R1 must be {R1_LEN} bytes, got {}",
                r1.len()
            )));
        }

        let digest = Sha1::digest(r1);
        let block = aes_ecb_encrypt(application_secret, &digest[..BLOCK_SIZE])
            .map_err(|e| LicenseError::MalformedRequest(e.to_string()))?;
        let key = block
            .try_into()
            .map_err(|_| LicenseError::MalformedRequest("session key derivation".into()))?;
        Ok(Self(key))
    }

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}
