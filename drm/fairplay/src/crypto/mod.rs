/*!
    FairPlay-style cryptographic operations.

    Asymmetric crypto uses RSA:
    - RSA-OAEP (SHA-1, MGF1-SHA-1, empty label) wraps the request payload
      and authentication keys

    Symmetric crypto:
    - AES-128-CBC with PKCS7 padding for the request payload and the content key
    - AES-128-ECB (no padding) for session key derivation
    - AES-128-CMAC for the request authentication tag and the response
      integrity tag

    Key loading additionally needs the legacy OpenSSL PEM cipher suite
    (AES-CBC and DES-EDE3-CBC keyed through EVP_BytesToKey).
*/

pub(crate) mod aes;
pub(crate) mod padding;
pub(crate) mod pem;
pub(crate) mod rsa;

pub use self::aes::{
    aes_cbc_decrypt, aes_cbc_encrypt, aes_cmac, aes_cmac_verify, aes_ecb_decrypt, aes_ecb_encrypt,
};
pub use self::padding::{pkcs7_pad, pkcs7_unpad};
pub use self::rsa::{rsa_oaep_sha1_decrypt, rsa_oaep_sha1_encrypt};
