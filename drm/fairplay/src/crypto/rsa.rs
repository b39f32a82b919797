use rsa::{Oaep, RsaPrivateKey, RsaPublicKey, oaep, traits::RandomizedEncryptor};
use sha1::Sha1;

/**
    RSA-OAEP-SHA1 decryption of the wrapped request key block. Blinded, and
    works on the borrowed key without copying it.

    Parameters (protocol-mandated):
      Hash: SHA-1
      MGF: MGF1-SHA-1
      Label: empty (b"")

    The caller collapses every failure into a single opaque unwrap error, so
    the underlying `rsa::Error` is returned untouched and never displayed to
    a client.
*/
pub fn rsa_oaep_sha1_decrypt(
    private_key: &RsaPrivateKey,
    ciphertext: &[u8],
) -> Result<Vec<u8>, rsa::Error> {
    let mut rng = rsa::rand_core::OsRng;
    private_key.decrypt_blinded(&mut rng, Oaep::new::<Sha1>(), ciphertext)
}

/**
    RSA-OAEP-SHA1 encryption of a request payload key (client side).

    Output: ciphertext of exactly the modulus size.
*/
pub fn rsa_oaep_sha1_encrypt(
    public_key: &RsaPublicKey,
    plaintext: &[u8],
) -> Result<Vec<u8>, rsa::Error> {
    let encrypting_key = oaep::EncryptingKey::<Sha1>::new(public_key.clone());
    let mut rng = rsa::rand_core::OsRng;
    encrypting_key.encrypt_with_rng(&mut rng, plaintext)
}
