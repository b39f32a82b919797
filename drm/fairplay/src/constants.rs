use hex_literal::hex;
use x509_cert::der::asn1::ObjectIdentifier;

/**
    Format marker carried in the first four bytes of a license request (SPC).
*/
pub const REQUEST_VERSION: u32 = 1;

/**
    Format marker carried in the first four bytes of a license response (CKC).
*/
pub const RESPONSE_VERSION: u32 = 1;

/**
    AES-128 block, key and IV size in bytes.
*/
pub const BLOCK_SIZE: usize = 16;

/**
    Length of the random nonce R1 the client places in the request.
*/
pub const R1_LEN: usize = 21;

/**
    Length of the AES-CMAC integrity tag prepended to the response records.
*/
pub const INTEGRITY_TAG_LEN: usize = 16;

/**
    Fixed request prefix: version (4) + reserved (4) + payload IV (16).
*/
pub const REQUEST_PREFIX_LEN: usize = 8 + BLOCK_SIZE;

/**
    Plaintext of the RSA-wrapped request block: payload key (16) followed by
    the request authentication key (16).
*/
pub const REQUEST_KEY_BLOCK_LEN: usize = 2 * BLOCK_SIZE;

/**
    Length of the AES-CMAC tag that closes a license request.
*/
pub const REQUEST_TAG_LEN: usize = 16;

/**
    Fixed response prefix: version (4) + reserved (4) + integrity tag (16).
*/
pub const RESPONSE_PREFIX_LEN: usize = 8 + INTEGRITY_TAG_LEN;

/**
    Application secret (ASk) published with Apple's FairPlay Streaming SDK sample
    server. Only usable for development and only when the operator opts in.
*/
pub const DEFAULT_APPLICATION_SECRET: [u8; 16] = hex!("d87ce7a26081de2e8eb8acef3a6dc179");

// ── Record tags ──────────────────────────────────────────────────────

/// Asset identifier, consumed by the server.
pub const TAG_ASSET_ID: u32 = 0x1bf7_f53f;
/// 21-byte client nonce used for session key derivation, consumed by the server.
pub const TAG_R1: u32 = 0x71b5_595a;
/// Anti-replay seed, echoed back to the client.
pub const TAG_ANTI_REPLAY: u32 = 0x89c9_0f12;
/// Transaction identifier, echoed back to the client.
pub const TAG_TRANSACTION_ID: u32 = 0x47aa_7ad3;
/// Media playback state, echoed back to the client.
pub const TAG_MEDIA_PLAYBACK: u32 = 0xeb8e_fdf2;
/// Content IV followed by the content key encrypted under the session key.
pub const TAG_ENCRYPTED_CONTENT_KEY: u32 = 0x58b3_8165;
/// Lease and rental durations, two big-endian u32 seconds counts.
pub const TAG_CONTENT_KEY_DURATION: u32 = 0x47ac_f6a4;

/**
    Tags the server emits itself. A request carrying one of these is rejected.
*/
pub const RESPONSE_ONLY_TAGS: [u32; 2] = [TAG_ENCRYPTED_CONTENT_KEY, TAG_CONTENT_KEY_DURATION];

// ── ASN.1 object identifiers ─────────────────────────────────────────

pub const OID_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
pub const OID_SHA1_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
pub const OID_SHA256_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
pub const OID_SHA384_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
pub const OID_SHA512_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");
