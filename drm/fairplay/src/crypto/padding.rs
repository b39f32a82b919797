use crate::error::CipherError;

/**
    Remove PKCS#7 padding from a decrypted CBC plaintext.

    The last byte indicates the number of padding bytes (1..=block_size).
    All padding bytes must have the same value as the last byte.
*/
pub fn pkcs7_unpad(data: &[u8], block_size: usize) -> Result<&[u8], CipherError> {
    if data.is_empty() || !data.len().is_multiple_of(block_size) {
        return Err(CipherError::BadPadding);
    }

    let pad = data[data.len() - 1] as usize;
    if pad == 0 || pad > block_size || pad > data.len() {
        return Err(CipherError::BadPadding);
    }

    // Fold over the whole region so a mismatch position is not observable
    let mismatch = data[data.len() - pad..]
        .iter()
        .fold(0u8, |acc, &byte| acc | (byte ^ pad as u8));
    if mismatch != 0 {
        return Err(CipherError::BadPadding);
    }

    Ok(&data[..data.len() - pad])
}

/**
    Apply PKCS#7 padding. Appends 1..=block_size bytes, each holding the
    padding length, so block-aligned input gains a full block.
*/
pub fn pkcs7_pad(data: &[u8], block_size: usize) -> Vec<u8> {
    let pad = block_size - (data.len() % block_size);
    let mut out = Vec::with_capacity(data.len() + pad);
    out.extend_from_slice(data);
    out.resize(data.len() + pad, pad as u8);
    out
}
