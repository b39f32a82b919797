use std::sync::Arc;

use drm_fairplay::constants::{TAG_ANTI_REPLAY, TAG_MEDIA_PLAYBACK, TAG_TRANSACTION_ID};
use drm_fairplay::{
    ContentKeyProvider, DerivedContentKeys, DurationPolicy, KeyMaterial, LicenseError,
    LicenseRequestBuilder, LicenseResponse, MemoryContentKeys, ProviderError, RawContentKey,
    SessionKey, issue_license, parse_application_secret,
};
use hex_literal::hex;

const CERT: &[u8] = include_bytes!("../testfiles/server.crt");
const KEY: &[u8] = include_bytes!("../testfiles/server.key");
const SECRET: &str = "d87ce7a26081de2e8eb8acef3a6dc179";
const ZERO_SECRET: &str = "00000000000000000000000000000000";

fn keys_with(secret: &str) -> KeyMaterial {
    KeyMaterial::from_pem(CERT, KEY, None, secret).unwrap()
}

fn provider() -> MemoryContentKeys {
    MemoryContentKeys::new()
        .with_key(
            "movie-1",
            RawContentKey::new(
                hex!("3c3b5a1f9f8b6a52d0e0b7a0c1d2e3f4"),
                hex!("0102030405060708090a0b0c0d0e0f10"),
            ),
            Some(DurationPolicy::new(86400, 172800)),
        )
        .with_key(
            "golden",
            RawContentKey::new([0x11u8; 16], [0x22u8; 16]),
            Some(DurationPolicy::new(3600, 0)),
        )
}

fn session_key(secret: &str, builder: &LicenseRequestBuilder) -> SessionKey {
    let ask = parse_application_secret(secret).unwrap();
    SessionKey::derive(&ask, builder.r1_bytes().unwrap()).unwrap()
}

#[tokio::test]
async fn round_trip_recovers_content_key_and_durations() {
    let keys = keys_with(SECRET);
    let builder = LicenseRequestBuilder::new("movie-1")
        .record(TAG_ANTI_REPLAY, [0xa5u8; 16])
        .record(TAG_TRANSACTION_ID, [1, 2, 3, 4, 5, 6, 7, 8])
        .record(TAG_MEDIA_PLAYBACK, [0u8; 8])
        .record(0x0bad_cafe, b"opaque".to_vec());
    let token = builder.build(keys.public_key()).unwrap();

    let response = issue_license(&keys, &provider(), &token).await.unwrap();
    let opened =
        LicenseResponse::open(response.as_bytes(), &session_key(SECRET, &builder)).unwrap();

    assert_eq!(opened.content_key, hex!("3c3b5a1f9f8b6a52d0e0b7a0c1d2e3f4"));
    assert_eq!(opened.content_iv, hex!("0102030405060708090a0b0c0d0e0f10"));
    assert_eq!(opened.duration, DurationPolicy::new(86400, 172800));

    let echoed: Vec<u32> = opened.passthrough.iter().map(|r| r.tag).collect();
    assert_eq!(echoed, [TAG_ANTI_REPLAY, TAG_TRANSACTION_ID, TAG_MEDIA_PLAYBACK, 0x0bad_cafe]);
    assert_eq!(opened.passthrough.find(0x0bad_cafe).unwrap().value, b"opaque");
}

#[tokio::test]
async fn response_does_not_contain_clear_content_key() {
    let keys = keys_with(SECRET);
    let token = LicenseRequestBuilder::new("movie-1")
        .build(keys.public_key())
        .unwrap();
    let response = issue_license(&keys, &provider(), &token).await.unwrap();
    let clear = hex!("3c3b5a1f9f8b6a52d0e0b7a0c1d2e3f4");
    assert!(!response.as_bytes().windows(16).any(|w| w == clear));
}

#[tokio::test]
async fn same_token_gives_identical_response() {
    let keys = keys_with(SECRET);
    let token = LicenseRequestBuilder::new("movie-1")
        .record(TAG_ANTI_REPLAY, [7u8; 16])
        .build(keys.public_key())
        .unwrap();

    let first = issue_license(&keys, &provider(), &token).await.unwrap();
    let second = issue_license(&keys, &provider(), &token).await.unwrap();
    assert_eq!(first.as_bytes(), second.as_bytes());
}

#[tokio::test]
async fn engine_reproduces_golden_response() {
    let keys = keys_with(ZERO_SECRET);
    let token = LicenseRequestBuilder::new("golden")
        .r1([0u8; 21])
        .build(keys.public_key())
        .unwrap();

    let response = issue_license(&keys, &provider(), &token).await.unwrap();
    assert_eq!(
        response.into_bytes(),
        hex!(
            "0000000100000000e1add348bf02ff4c03011fddafbb9aad"
            "58b3816500000030222222222222222222222222222222223aa0a7e20b58e9e8c4e415c841e01d75"
            "9b25e67b59f0fd299060a8aa955aa19147acf6a40000000800000e1000000000"
        )
    );
}

#[tokio::test]
async fn tampered_wrapped_key_is_rejected() {
    let keys = keys_with(SECRET);
    let token = LicenseRequestBuilder::new("movie-1")
        .build(keys.public_key())
        .unwrap();
    let wrapped_len = u32::from_be_bytes([token[24], token[25], token[26], token[27]]) as usize;
    assert_eq!(wrapped_len, keys.key_bits() / 8);

    let provider = provider();
    for index in 28..28 + wrapped_len {
        let mut tampered = token.clone();
        tampered[index] ^= 0x01;
        let err = issue_license(&keys, &provider, &tampered).await.unwrap_err();
        assert_eq!(err, LicenseError::UnwrapFailed, "byte {index}");
    }
}

#[tokio::test]
async fn tampered_iv_payload_or_tag_is_rejected() {
    let keys = keys_with(SECRET);
    let token = LicenseRequestBuilder::new("movie-1")
        .build(keys.public_key())
        .unwrap();
    let wrapped_len = u32::from_be_bytes([token[24], token[25], token[26], token[27]]) as usize;
    let payload_start = 28 + wrapped_len + 4;

    // reserved field and IV, then payload and request tag
    let indices = (4..24).chain(payload_start..token.len());
    let provider = provider();
    for index in indices {
        let mut tampered = token.clone();
        tampered[index] ^= 0x01;
        let err = issue_license(&keys, &provider, &tampered).await.unwrap_err();
        assert_eq!(err, LicenseError::UnwrapFailed, "byte {index}");
    }
}

#[tokio::test]
async fn padding_trailer_is_not_observable() {
    let keys = keys_with(SECRET);
    let token = LicenseRequestBuilder::new("movie-1")
        .build(keys.public_key())
        .unwrap();
    // last byte of the penultimate payload block, ahead of the 16-byte tag
    let index = token.len() - 16 - 17;

    let provider = provider();
    for delta in 1..=255u8 {
        let mut tampered = token.clone();
        tampered[index] ^= delta;
        let err = issue_license(&keys, &provider, &tampered).await.unwrap_err();
        assert_eq!(err, LicenseError::UnwrapFailed, "xor {delta:#04x}");
    }
}

#[tokio::test]
async fn tampered_framing_is_rejected() {
    let keys = keys_with(SECRET);
    let token = LicenseRequestBuilder::new("movie-1")
        .build(keys.public_key())
        .unwrap();

    for index in [0usize, 3, 24, 27] {
        let mut tampered = token.clone();
        tampered[index] ^= 0x40;
        let err = issue_license(&keys, &provider(), &tampered).await.unwrap_err();
        assert!(matches!(err, LicenseError::MalformedRequest(_)), "byte {index}: {err:?}");
    }

    let mut truncated = token.clone();
    truncated.pop();
    let err = issue_license(&keys, &provider(), &truncated).await.unwrap_err();
    assert!(matches!(err, LicenseError::MalformedRequest(_)));
}

#[tokio::test]
async fn wrong_length_content_keys_are_unavailable() {
    let keys = keys_with(SECRET);
    let cases = [(15usize, 16usize), (17, 16), (16, 15), (16, 17), (32, 16), (0, 16)];

    for (key_len, iv_len) in cases {
        let provider = MemoryContentKeys::new().with_key(
            "bad",
            RawContentKey::new(vec![0x33u8; key_len], vec![0x44u8; iv_len]),
            None,
        );
        let token = LicenseRequestBuilder::new("bad")
            .build(keys.public_key())
            .unwrap();
        let err = issue_license(&keys, &provider, &token).await.unwrap_err();
        assert!(
            matches!(err, LicenseError::ContentKeyUnavailable(ProviderError::Malformed(_))),
            "{key_len}/{iv_len}: {err:?}"
        );
    }
}

#[tokio::test]
async fn derived_keys_round_trip() {
    let keys = keys_with(SECRET);
    let provider = DerivedContentKeys::new(DurationPolicy::new(600, 0));
    let builder = LicenseRequestBuilder::new("abc");
    let token = builder.build(keys.public_key()).unwrap();

    let response = issue_license(&keys, &provider, &token).await.unwrap();
    let opened =
        LicenseResponse::open(response.as_bytes(), &session_key(SECRET, &builder)).unwrap();
    assert_eq!(opened.content_key, hex!("900150983cd24fb0d6963f7d28e17f72"));
    assert_eq!(opened.duration, DurationPolicy::new(600, 0));
}

#[tokio::test]
async fn concurrent_exchanges_are_independent() {
    let keys = Arc::new(keys_with(SECRET));
    let provider: Arc<dyn ContentKeyProvider> = Arc::new(provider());

    let mut handles = Vec::new();
    for i in 0..16u8 {
        let keys = Arc::clone(&keys);
        let provider = Arc::clone(&provider);
        handles.push(tokio::spawn(async move {
            let builder = LicenseRequestBuilder::new("movie-1").record(TAG_ANTI_REPLAY, [i; 16]);
            let token = builder.build(keys.public_key()).unwrap();
            let response = issue_license(keys.as_ref(), provider.as_ref(), &token)
                .await
                .unwrap();
            let opened =
                LicenseResponse::open(response.as_bytes(), &session_key(SECRET, &builder)).unwrap();
            assert_eq!(opened.passthrough.find(TAG_ANTI_REPLAY).unwrap().value, [i; 16]);
            opened.content_key
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), hex!("3c3b5a1f9f8b6a52d0e0b7a0c1d2e3f4"));
    }
}
