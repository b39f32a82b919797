use rand::RngCore;
use rsa::RsaPublicKey;

use crate::constants::{
    BLOCK_SIZE, R1_LEN, REQUEST_KEY_BLOCK_LEN, REQUEST_PREFIX_LEN, REQUEST_TAG_LEN,
    REQUEST_VERSION, RESPONSE_ONLY_TAGS, TAG_ASSET_ID, TAG_R1,
};
use crate::crypto::{
    aes_cbc_decrypt, aes_cbc_encrypt, aes_cmac, aes_cmac_verify, rsa_oaep_sha1_decrypt,
    rsa_oaep_sha1_encrypt,
};
use crate::error::{LicenseError, LicenseResult};
use crate::keys::KeyMaterial;
use crate::record::RecordSet;

/// Prefix + wrapped-key length + one wrapped byte + payload length + one block + tag.
const REQUEST_MIN_LEN: usize = REQUEST_PREFIX_LEN + 4 + 1 + 4 + BLOCK_SIZE + REQUEST_TAG_LEN;

/**
    Inbound license request (SPC), split into its framing fields.

    Layout (big-endian):
      version (4) || reserved (4) || payload IV (16)
      || wrapped key length n (4) || RSA-OAEP(payload key || auth key) (n)
      || payload length m (4) || AES-128-CBC payload (m)
      || AES-CMAC(auth key, every preceding byte) (16)

    The tag is checked before the payload is decrypted, so a modified header,
    IV or payload never reaches the padding check.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseRequest {
    reserved: u32,
    payload_iv: [u8; 16],
    wrapped_key: Vec<u8>,
    payload: Vec<u8>,
    tag: [u8; REQUEST_TAG_LEN],
}

impl LicenseRequest {
    /**
        Check the framing of a request token. No key material is involved
        yet, so every failure here is `MalformedRequest`.
    */
    pub fn parse(token: &[u8]) -> LicenseResult<Self> {
        if token.len() < REQUEST_MIN_LEN {
            return Err(malformed(format!(
                "request is {} bytes, minimum is {REQUEST_MIN_LEN}",
                token.len()
            )));
        }

        let mut reader = Reader::new(token);
        let version = reader.read_u32()?;
        if version != REQUEST_VERSION {
            return Err(malformed(format!("unsupported request version {version}")));
        }
        let reserved = reader.read_u32()?;
        let payload_iv = reader.read_block()?;

        let wrapped_len = reader.read_u32()? as usize;
        if wrapped_len == 0 {
            return Err(malformed("wrapped key is empty"));
        }
        let wrapped_key = reader.take(wrapped_len)?.to_vec();

        let payload_len = reader.read_u32()? as usize;
        if payload_len == 0 || !payload_len.is_multiple_of(BLOCK_SIZE) {
            return Err(malformed(format!(
                "payload length {payload_len} is not a positive multiple of {BLOCK_SIZE}"
            )));
        }
        let payload = reader.take(payload_len)?.to_vec();
        let tag = reader.read_block()?;

        if reader.remaining() != 0 {
            return Err(malformed(format!(
                "{} trailing bytes after the request tag",
                reader.remaining()
            )));
        }

        Ok(Self {
            reserved,
            payload_iv,
            wrapped_key,
            payload,
            tag,
        })
    }

    /**
        Unwrap the key block with the tenant's RSA key, check the request tag,
        decrypt the payload and decode its record set.

        Every failure up to and including decryption is `UnwrapFailed`, so an
        OAEP failure, a bad tag and a bad padding trailer look the same. Only
        a payload that authenticates can reach record decoding.
    */
    pub fn decrypt_records(&self, keys: &KeyMaterial) -> LicenseResult<RecordSet> {
        let key_block = rsa_oaep_sha1_decrypt(keys.private_key(), &self.wrapped_key)
            .ok()
            .filter(|block| block.len() == REQUEST_KEY_BLOCK_LEN)
            .ok_or(LicenseError::UnwrapFailed)?;
        let (payload_key, auth_key) = key_block.split_at(BLOCK_SIZE);
        let payload_key: [u8; 16] =
            payload_key.try_into().map_err(|_| LicenseError::UnwrapFailed)?;
        let auth_key: [u8; 16] = auth_key.try_into().map_err(|_| LicenseError::UnwrapFailed)?;

        let signed = self.signed_bytes().map_err(|_| LicenseError::UnwrapFailed)?;
        if !aes_cmac_verify(&auth_key, &signed, &self.tag) {
            return Err(LicenseError::UnwrapFailed);
        }

        let plaintext = aes_cbc_decrypt(&payload_key, &self.payload_iv, &self.payload)
            .map_err(|_| LicenseError::UnwrapFailed)?;

        Ok(RecordSet::decode(&plaintext)?)
    }

    /// Everything the request tag covers: the token minus its last 16 bytes.
    fn signed_bytes(&self) -> LicenseResult<Vec<u8>> {
        let wrapped_len = u32::try_from(self.wrapped_key.len())
            .map_err(|_| malformed("wrapped key does not fit a u32 length"))?;
        let payload_len = u32::try_from(self.payload.len())
            .map_err(|_| malformed("payload does not fit a u32 length"))?;

        let mut out = Vec::with_capacity(
            REQUEST_PREFIX_LEN + 8 + self.wrapped_key.len() + self.payload.len() + REQUEST_TAG_LEN,
        );
        out.extend_from_slice(&REQUEST_VERSION.to_be_bytes());
        out.extend_from_slice(&self.reserved.to_be_bytes());
        out.extend_from_slice(&self.payload_iv);
        out.extend_from_slice(&wrapped_len.to_be_bytes());
        out.extend_from_slice(&self.wrapped_key);
        out.extend_from_slice(&payload_len.to_be_bytes());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    pub fn to_bytes(&self) -> LicenseResult<Vec<u8>> {
        let mut out = self.signed_bytes()?;
        out.extend_from_slice(&self.tag);
        Ok(out)
    }
}

/**
    The fields the server consumes from a decrypted request, plus the records
    it echoes back untouched.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPayload {
    pub asset_id: String,
    pub r1: [u8; R1_LEN],
    pub passthrough: RecordSet,
}

impl RequestPayload {
    pub fn from_records(records: RecordSet) -> LicenseResult<Self> {
        let mut asset_id: Option<Vec<u8>> = None;
        let mut r1: Option<Vec<u8>> = None;
        let mut passthrough = RecordSet::new();

        for record in records {
            match record.tag {
                TAG_ASSET_ID => {
                    if asset_id.replace(record.value).is_some() {
                        return Err(malformed("duplicate asset id record"));
                    }
                }
                TAG_R1 => {
                    if r1.replace(record.value).is_some() {
                        return Err(malformed("duplicate R1 record"));
                    }
                }
                tag if RESPONSE_ONLY_TAGS.contains(&tag) => {
                    return Err(malformed(format!("response-only tag {tag:#010x} in request")));
                }
                tag => passthrough.push(tag, record.value),
            }
        }

        let asset_id = asset_id.ok_or(LicenseError::MissingField("asset id"))?;
        let r1 = r1.ok_or(LicenseError::MissingField("R1"))?;

        if asset_id.is_empty() {
            return Err(malformed("asset id is empty"));
        }
        let asset_id =
            String::from_utf8(asset_id).map_err(|_| malformed("asset id is not valid UTF-8"))?;

        let r1_len = r1.len();
        let r1: [u8; R1_LEN] = r1
            .try_into()
            .map_err(|_| malformed(format!("R1 must be {R1_LEN} bytes, got {r1_len}")))?;

        Ok(Self {
            asset_id,
            r1,
            passthrough,
        })
    }
}

/**
    Client-side construction of a license request.

    `new` fills in the asset id and a random R1; `empty` starts with no
    records at all so malformed requests can be built on purpose.
*/
#[derive(Debug, Clone)]
pub struct LicenseRequestBuilder {
    asset_id: Option<Vec<u8>>,
    r1: Option<Vec<u8>>,
    records: RecordSet,
    payload_key: [u8; 16],
    auth_key: [u8; 16],
    payload_iv: [u8; 16],
}

impl LicenseRequestBuilder {
    pub fn new(asset_id: impl Into<Vec<u8>>) -> Self {
        let mut r1 = vec![0u8; R1_LEN];
        rand::rng().fill_bytes(&mut r1);
        Self {
            asset_id: Some(asset_id.into()),
            r1: Some(r1),
            ..Self::empty()
        }
    }

    pub fn empty() -> Self {
        let mut payload_key = [0u8; 16];
        let mut auth_key = [0u8; 16];
        let mut payload_iv = [0u8; 16];
        let mut rng = rand::rng();
        rng.fill_bytes(&mut payload_key);
        rng.fill_bytes(&mut auth_key);
        rng.fill_bytes(&mut payload_iv);
        Self {
            asset_id: None,
            r1: None,
            records: RecordSet::new(),
            payload_key,
            auth_key,
            payload_iv,
        }
    }

    pub fn r1(mut self, r1: impl Into<Vec<u8>>) -> Self {
        self.r1 = Some(r1.into());
        self
    }

    /// Append an extra record after the asset id and R1.
    pub fn record(mut self, tag: u32, value: impl Into<Vec<u8>>) -> Self {
        self.records.push(tag, value);
        self
    }

    pub fn payload_key(mut self, key: [u8; 16]) -> Self {
        self.payload_key = key;
        self
    }

    pub fn auth_key(mut self, key: [u8; 16]) -> Self {
        self.auth_key = key;
        self
    }

    pub fn payload_iv(mut self, iv: [u8; 16]) -> Self {
        self.payload_iv = iv;
        self
    }

    pub fn r1_bytes(&self) -> Option<&[u8]> {
        self.r1.as_deref()
    }

    /**
        Encrypt the record set, wrap the payload and auth keys for
        `public_key` and close the token with its CMAC tag. OAEP is
        randomized, so two builds never produce the same bytes.
    */
    pub fn build(&self, public_key: &RsaPublicKey) -> LicenseResult<Vec<u8>> {
        let mut records = RecordSet::new();
        if let Some(asset_id) = &self.asset_id {
            records.push(TAG_ASSET_ID, asset_id.clone());
        }
        if let Some(r1) = &self.r1 {
            records.push(TAG_R1, r1.clone());
        }
        for record in &self.records {
            records.push(record.tag, record.value.clone());
        }

        let plaintext = records.encode()?;
        let payload = aes_cbc_encrypt(&self.payload_key, &self.payload_iv, &plaintext);
        let mut key_block = [0u8; REQUEST_KEY_BLOCK_LEN];
        key_block[..BLOCK_SIZE].copy_from_slice(&self.payload_key);
        key_block[BLOCK_SIZE..].copy_from_slice(&self.auth_key);
        let wrapped_key = rsa_oaep_sha1_encrypt(public_key, &key_block)
            .map_err(|e| malformed(format!("cannot wrap request keys: {e}")))?;

        let mut request = LicenseRequest {
            reserved: 0,
            payload_iv: self.payload_iv,
            wrapped_key,
            payload,
            tag: [0u8; REQUEST_TAG_LEN],
        };
        request.tag = aes_cmac(&self.auth_key, &request.signed_bytes()?);
        request.to_bytes()
    }
}

fn malformed(detail: impl Into<String>) -> LicenseError {
    LicenseError::MalformedRequest(detail.into())
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take(&mut self, len: usize) -> LicenseResult<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| malformed(format!("request truncated at offset {}", self.offset)))?;
        let out = &self.data[self.offset..end];
        self.offset = end;
        Ok(out)
    }

    fn read_u32(&mut self) -> LicenseResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_block(&mut self) -> LicenseResult<[u8; 16]> {
        let b = self.take(BLOCK_SIZE)?;
        let mut out = [0u8; 16];
        out.copy_from_slice(b);
        Ok(out)
    }
}
