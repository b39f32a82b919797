use std::fmt;

use data_encoding::BASE64;
use rsa::{
    Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey,
    pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey},
    traits::PublicKeyParts,
};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use x509_cert::{
    Certificate,
    der::{Decode, Encode},
    request::CertReq,
    spki::SubjectPublicKeyInfoOwned,
};

use crate::constants::{
    OID_RSA_ENCRYPTION, OID_SHA1_WITH_RSA, OID_SHA256_WITH_RSA, OID_SHA384_WITH_RSA,
    OID_SHA512_WITH_RSA,
};
use crate::crypto::pem::{DekInfo, decrypt_legacy_pem};
use crate::error::{KeyMaterialError, KeyResult};

/**
    Long-term identity of the key server for one tenant.

    Holds the RSA keypair that unwraps inbound requests and the 16-byte
    application secret (ASk) used for session key derivation. Immutable once
    built; share it behind an `Arc`.
*/
#[derive(Clone)]
pub struct KeyMaterial {
    public_key: RsaPublicKey,
    private_key: RsaPrivateKey,
    application_secret: [u8; 16],
}

impl KeyMaterial {
    /**
        Assemble key material from already-decoded parts.

        Fails with `KeyPairMismatch` unless the private key's public half is
        exactly `public_key`.
    */
    pub fn new(
        public_key: RsaPublicKey,
        private_key: RsaPrivateKey,
        application_secret: [u8; 16],
    ) -> KeyResult<Self> {
        if private_key.to_public_key() != public_key {
            return Err(KeyMaterialError::KeyPairMismatch);
        }
        Ok(Self {
            public_key,
            private_key,
            application_secret,
        })
    }

    /**
        Load key material from PEM text.

        - `certificate`: PEM "CERTIFICATE" or "CERTIFICATE REQUEST"
        - `private_key`: PEM "RSA PRIVATE KEY", "PRIVATE KEY" or "ENCRYPTED PRIVATE KEY"
        - `passphrase`: required only for encrypted private keys
        - `application_secret`: 32 hex characters
    */
    pub fn from_pem(
        certificate: &[u8],
        private_key: &[u8],
        passphrase: Option<&str>,
        application_secret: &str,
    ) -> KeyResult<Self> {
        let public_key = parse_public_certificate(certificate)?;
        let private_key = parse_private_key(private_key, passphrase)?;
        let application_secret = parse_application_secret(application_secret)?;
        Self::new(public_key, private_key, application_secret)
    }

    /**
        Load key material where the certificate and private key PEM documents
        are themselves base64-encoded, as stored by the key-store and the
        environment.
    */
    pub fn from_base64(
        certificate: &str,
        private_key: &str,
        passphrase: Option<&str>,
        application_secret: &str,
    ) -> KeyResult<Self> {
        let certificate = decode_base64(certificate)?;
        let private_key = decode_base64(private_key)?;
        Self::from_pem(&certificate, &private_key, passphrase, application_secret)
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub(crate) fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    pub(crate) fn application_secret(&self) -> &[u8; 16] {
        &self.application_secret
    }

    /// RSA modulus size in bits.
    pub fn key_bits(&self) -> usize {
        self.public_key.size() * 8
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key_bits", &self.key_bits())
            .field("private_key", &"<redacted>")
            .field("application_secret", &"<redacted>")
            .finish()
    }
}

fn decode_base64(input: &str) -> KeyResult<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| KeyMaterialError::InvalidBase64(e.to_string()))
}

fn parse_pem_block(input: &[u8]) -> KeyResult<pem::Pem> {
    pem::parse(input).map_err(|e| KeyMaterialError::InvalidPem(e.to_string()))
}

// ── Public key ───────────────────────────────────────────────────────

/**
    Extract the RSA public key from a PEM certificate or certificate request.

    For a certificate request the self-signature is verified against its own
    embedded key before the key is accepted.
*/
pub fn parse_public_certificate(input: &[u8]) -> KeyResult<RsaPublicKey> {
    let block = parse_pem_block(input)?;
    match block.tag() {
        "CERTIFICATE" => {
            let cert = Certificate::from_der(block.contents())
                .map_err(|e| KeyMaterialError::CertificateParse(e.to_string()))?;
            rsa_public_key_from_spki(&cert.tbs_certificate.subject_public_key_info)
        }
        "CERTIFICATE REQUEST" | "NEW CERTIFICATE REQUEST" => {
            let req = CertReq::from_der(block.contents())
                .map_err(|e| KeyMaterialError::CertificateParse(e.to_string()))?;
            let public_key = rsa_public_key_from_spki(&req.info.public_key)?;
            verify_csr_signature(&req, &public_key)?;
            Ok(public_key)
        }
        other => Err(KeyMaterialError::UnsupportedPemType(other.to_string())),
    }
}

fn rsa_public_key_from_spki(spki: &SubjectPublicKeyInfoOwned) -> KeyResult<RsaPublicKey> {
    if spki.algorithm.oid != OID_RSA_ENCRYPTION {
        return Err(KeyMaterialError::UnsupportedKeyType(format!(
            "public key algorithm {}",
            spki.algorithm.oid
        )));
    }
    RsaPublicKey::from_pkcs1_der(spki.subject_public_key.raw_bytes())
        .map_err(|e| KeyMaterialError::KeyParse(e.to_string()))
}

fn verify_csr_signature(req: &CertReq, public_key: &RsaPublicKey) -> KeyResult<()> {
    let info = req
        .info
        .to_der()
        .map_err(|e| KeyMaterialError::CertificateParse(e.to_string()))?;
    let signature = req.signature.as_bytes().ok_or_else(|| {
        KeyMaterialError::CsrSignatureInvalid("signature has unused bits".into())
    })?;

    let oid = req.algorithm.oid;
    let (scheme, hashed) = if oid == OID_SHA1_WITH_RSA {
        (Pkcs1v15Sign::new::<Sha1>(), Sha1::digest(&info).to_vec())
    } else if oid == OID_SHA256_WITH_RSA {
        (Pkcs1v15Sign::new::<Sha256>(), Sha256::digest(&info).to_vec())
    } else if oid == OID_SHA384_WITH_RSA {
        (Pkcs1v15Sign::new::<Sha384>(), Sha384::digest(&info).to_vec())
    } else if oid == OID_SHA512_WITH_RSA {
        (Pkcs1v15Sign::new::<Sha512>(), Sha512::digest(&info).to_vec())
    } else {
        return Err(KeyMaterialError::CsrSignatureInvalid(format!(
            "unsupported signature algorithm {oid}"
        )));
    };

    public_key
        .verify(scheme, &hashed, signature)
        .map_err(|e| KeyMaterialError::CsrSignatureInvalid(e.to_string()))
}

// ── Private key ──────────────────────────────────────────────────────

/**
    Decode an RSA private key from PEM.

    Accepts PKCS#1 (plain or legacy `Proc-Type: 4,ENCRYPTED`), PKCS#8 and
    encrypted PKCS#8. An empty passphrase counts as no passphrase.
*/
pub fn parse_private_key(input: &[u8], passphrase: Option<&str>) -> KeyResult<RsaPrivateKey> {
    let block = parse_pem_block(input)?;
    let passphrase = passphrase.filter(|p| !p.is_empty());

    let key = match block.tag() {
        "RSA PRIVATE KEY" => {
            let encrypted = block
                .headers()
                .get("Proc-Type")
                .is_some_and(|v| v.contains("ENCRYPTED"));
            if encrypted {
                let passphrase = passphrase.ok_or(KeyMaterialError::PassphraseRequired)?;
                let dek_info = block.headers().get("DEK-Info").ok_or_else(|| {
                    KeyMaterialError::InvalidPem("encrypted key without DEK-Info".into())
                })?;
                let dek = DekInfo::parse(dek_info)?;
                let der = decrypt_legacy_pem(block.contents(), &dek, passphrase.as_bytes())?;
                RsaPrivateKey::from_pkcs1_der(&der).map_err(|_| wrong_passphrase())?
            } else {
                RsaPrivateKey::from_pkcs1_der(block.contents())
                    .map_err(|e| KeyMaterialError::KeyParse(e.to_string()))?
            }
        }
        "PRIVATE KEY" => rsa_private_key_from_pkcs8(block.contents())?,
        "ENCRYPTED PRIVATE KEY" => {
            let passphrase = passphrase.ok_or(KeyMaterialError::PassphraseRequired)?;
            let info = pkcs8::EncryptedPrivateKeyInfo::try_from(block.contents())
                .map_err(|e| KeyMaterialError::KeyParse(e.to_string()))?;
            let document = info.decrypt(passphrase).map_err(|_| wrong_passphrase())?;
            rsa_private_key_from_pkcs8(document.as_bytes()).map_err(|e| match e {
                KeyMaterialError::KeyParse(_) => wrong_passphrase(),
                other => other,
            })?
        }
        tag @ ("EC PRIVATE KEY" | "DSA PRIVATE KEY") => {
            return Err(KeyMaterialError::UnsupportedKeyType(tag.to_string()));
        }
        other => return Err(KeyMaterialError::UnsupportedPemType(other.to_string())),
    };

    key.validate()
        .map_err(|e| KeyMaterialError::KeyParse(e.to_string()))?;
    Ok(key)
}

fn rsa_private_key_from_pkcs8(der: &[u8]) -> KeyResult<RsaPrivateKey> {
    let info = pkcs8::PrivateKeyInfo::try_from(der)
        .map_err(|e| KeyMaterialError::KeyParse(e.to_string()))?;
    if info.algorithm.oid != OID_RSA_ENCRYPTION {
        return Err(KeyMaterialError::UnsupportedKeyType(format!(
            "private key algorithm {}",
            info.algorithm.oid
        )));
    }
    RsaPrivateKey::try_from(info).map_err(|e| KeyMaterialError::KeyParse(e.to_string()))
}

fn wrong_passphrase() -> KeyMaterialError {
    KeyMaterialError::DecryptFailed("wrong passphrase or corrupted key".into())
}

// ── Application secret ───────────────────────────────────────────────

/**
    Decode the application secret (ASk): exactly 16 bytes as hex.
*/
pub fn parse_application_secret(input: &str) -> KeyResult<[u8; 16]> {
    let bytes =
        hex::decode(input.trim()).map_err(|e| KeyMaterialError::InvalidSecret(e.to_string()))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| KeyMaterialError::InvalidSecret(format!("expected 16 bytes, got {len}")))
}
