/*!
    AES-128 symmetric cipher operations.

    - AES-128-CBC with PKCS7 padding: request payload and content key wrapping
    - AES-128-ECB (no padding): session key derivation
    - AES-128-CMAC: request authentication and response integrity tag
*/

use aes::Aes128;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit, block_padding::NoPadding};
use cmac::{Cmac, Mac};

use super::padding::{pkcs7_pad, pkcs7_unpad};
use crate::constants::BLOCK_SIZE;
use crate::error::CipherError;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes128EcbEnc = ecb::Encryptor<Aes128>;
type Aes128EcbDec = ecb::Decryptor<Aes128>;

/**
    AES-128-CBC encryption with PKCS#7 padding.

    Output length is always `plaintext.len()` rounded up to the next full
    block, so empty input yields exactly one block.
*/
pub fn aes_cbc_encrypt(key: &[u8; 16], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let mut buf = pkcs7_pad(plaintext, BLOCK_SIZE);
    let len = buf.len();
    let encrypted = Aes128CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .map(|ct| ct.len());
    // Padded input is block-aligned, NoPadding cannot fail here
    debug_assert_eq!(encrypted.ok(), Some(len));
    buf
}

/**
    AES-128-CBC decryption followed by PKCS#7 validation.

    Ciphertext must be non-empty and block-aligned.
*/
pub fn aes_cbc_decrypt(
    key: &[u8; 16],
    iv: &[u8; 16],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CipherError> {
    if ciphertext.is_empty() || !ciphertext.len().is_multiple_of(BLOCK_SIZE) {
        return Err(CipherError::InvalidLength(format!(
            "CBC ciphertext must be non-empty and block-aligned, got {} bytes",
            ciphertext.len()
        )));
    }

    let mut buf = ciphertext.to_vec();
    let plaintext = Aes128CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| CipherError::InvalidLength("CBC block decrypt failed".into()))?;

    Ok(pkcs7_unpad(plaintext, BLOCK_SIZE)?.to_vec())
}

/**
    AES-128-ECB encryption without padding. Input must be a whole number of
    blocks (including zero blocks).
*/
pub fn aes_ecb_encrypt(key: &[u8; 16], data: &[u8]) -> Result<Vec<u8>, CipherError> {
    check_ecb_len(data)?;
    let mut buf = data.to_vec();
    let len = buf.len();
    Aes128EcbEnc::new(key.into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .map_err(|_| CipherError::InvalidLength("ECB block encrypt failed".into()))?;
    Ok(buf)
}

/**
    AES-128-ECB decryption without padding. Input must be a whole number of
    blocks (including zero blocks).
*/
pub fn aes_ecb_decrypt(key: &[u8; 16], data: &[u8]) -> Result<Vec<u8>, CipherError> {
    check_ecb_len(data)?;
    let mut buf = data.to_vec();
    Aes128EcbDec::new(key.into())
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| CipherError::InvalidLength("ECB block decrypt failed".into()))?;
    Ok(buf)
}

fn check_ecb_len(data: &[u8]) -> Result<(), CipherError> {
    if !data.len().is_multiple_of(BLOCK_SIZE) {
        return Err(CipherError::InvalidLength(format!(
            "ECB input must be a multiple of {BLOCK_SIZE} bytes, got {}",
            data.len()
        )));
    }
    Ok(())
}

/**
    Single AES-128-CMAC computation (RFC 4493).
    Key: 16-byte AES key (the session key).
    Message: arbitrary bytes.
    Output: 16 bytes (one AES block).
*/
pub fn aes_cmac(key: &[u8; 16], message: &[u8]) -> [u8; 16] {
    let mut mac = <Cmac<Aes128> as KeyInit>::new(key.into());
    mac.update(message);
    mac.finalize().into_bytes().into()
}

/**
    Constant-time check of an AES-128-CMAC tag. A tag of the wrong length
    never verifies.
*/
pub fn aes_cmac_verify(key: &[u8; 16], message: &[u8], tag: &[u8]) -> bool {
    let mut mac = <Cmac<Aes128> as KeyInit>::new(key.into());
    mac.update(message);
    mac.verify_slice(tag).is_ok()
}
