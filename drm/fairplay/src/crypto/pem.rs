/*!
    Legacy OpenSSL PEM encryption (`Proc-Type: 4,ENCRYPTED` + `DEK-Info`).

    The key is derived with EVP_BytesToKey (MD5, one iteration) using the first
    eight IV bytes as salt, then the DER body is decrypted in CBC mode.
*/

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::{
    BlockCipher, BlockDecryptMut, BlockSizeUser, KeyInit, KeyIvInit, block_padding::NoPadding,
};
use des::TdesEde3;
use md5::{Digest, Md5};

use super::padding::pkcs7_unpad;
use crate::error::{KeyMaterialError, KeyResult};

/**
    Ciphers OpenSSL writes into a legacy `DEK-Info` header that we accept.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LegacyCipher {
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
    DesEde3Cbc,
}

impl LegacyCipher {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "AES-128-CBC" => Some(Self::Aes128Cbc),
            "AES-192-CBC" => Some(Self::Aes192Cbc),
            "AES-256-CBC" => Some(Self::Aes256Cbc),
            "DES-EDE3-CBC" => Some(Self::DesEde3Cbc),
            _ => None,
        }
    }

    fn key_len(self) -> usize {
        match self {
            Self::Aes128Cbc => 16,
            Self::Aes192Cbc | Self::DesEde3Cbc => 24,
            Self::Aes256Cbc => 32,
        }
    }

    fn iv_len(self) -> usize {
        match self {
            Self::DesEde3Cbc => 8,
            _ => 16,
        }
    }
}

/**
    Parsed `DEK-Info: <cipher>,<hex iv>` header.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DekInfo {
    pub cipher: LegacyCipher,
    pub iv: Vec<u8>,
}

impl DekInfo {
    pub fn parse(value: &str) -> KeyResult<Self> {
        let (name, iv_hex) = value
            .split_once(',')
            .ok_or_else(|| KeyMaterialError::InvalidPem("malformed DEK-Info header".into()))?;

        let cipher = LegacyCipher::from_name(name.trim()).ok_or_else(|| {
            KeyMaterialError::DecryptFailed(format!("unsupported PEM cipher '{}'", name.trim()))
        })?;

        let iv = hex::decode(iv_hex.trim())
            .map_err(|e| KeyMaterialError::InvalidPem(format!("DEK-Info IV: {e}")))?;
        if iv.len() != cipher.iv_len() {
            return Err(KeyMaterialError::InvalidPem(format!(
                "DEK-Info IV must be {} bytes, got {}",
                cipher.iv_len(),
                iv.len()
            )));
        }

        Ok(Self { cipher, iv })
    }
}

/**
    Decrypt the body of a legacy encrypted PEM block.

    Returns the DER plaintext. A wrong passphrase usually surfaces as a padding
    failure here; the rare case where padding happens to validate is caught by
    the caller when the DER fails to parse.
*/
pub(crate) fn decrypt_legacy_pem(
    body: &[u8],
    dek: &DekInfo,
    passphrase: &[u8],
) -> KeyResult<Vec<u8>> {
    let key = evp_bytes_to_key(passphrase, &dek.iv[..8], dek.cipher.key_len());
    match dek.cipher {
        LegacyCipher::Aes128Cbc => cbc_decrypt::<Aes128>(&key, &dek.iv, body),
        LegacyCipher::Aes192Cbc => cbc_decrypt::<Aes192>(&key, &dek.iv, body),
        LegacyCipher::Aes256Cbc => cbc_decrypt::<Aes256>(&key, &dek.iv, body),
        LegacyCipher::DesEde3Cbc => cbc_decrypt::<TdesEde3>(&key, &dek.iv, body),
    }
}

/**
    OpenSSL EVP_BytesToKey with MD5 and a single iteration:
      D_0 = empty
      D_i = MD5(D_{i-1} || passphrase || salt)
      key = D_1 || D_2 || ... truncated to key_len
*/
fn evp_bytes_to_key(passphrase: &[u8], salt: &[u8], key_len: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(key_len + 16);
    let mut prev: Vec<u8> = Vec::new();
    while key.len() < key_len {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(passphrase);
        hasher.update(salt);
        prev = hasher.finalize().to_vec();
        key.extend_from_slice(&prev);
    }
    key.truncate(key_len);
    key
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], body: &[u8]) -> KeyResult<Vec<u8>>
where
    C: BlockCipher + BlockDecryptMut + KeyInit,
{
    let decryptor = cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|e| KeyMaterialError::DecryptFailed(e.to_string()))?;

    let mut buf = body.to_vec();
    let plaintext = decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| {
            KeyMaterialError::DecryptFailed("encrypted body is not block-aligned".into())
        })?;

    pkcs7_unpad(plaintext, C::block_size())
        .map(<[u8]>::to_vec)
        .map_err(|_| KeyMaterialError::DecryptFailed("wrong passphrase or corrupted key".into()))
}
