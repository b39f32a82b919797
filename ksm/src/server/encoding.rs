use axum::{
    Json,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use base64::{
    DecodeError, Engine as _,
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
};

/**
    Base64 alphabet a client used for its SPC. The CKC goes back in the same
    alphabet.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base64Variant {
    Standard,
    UrlSafe,
}

/**
    Decode a client SPC.

    Any `-` or `_` selects the URL-safe alphabet. Otherwise the standard
    alphabet is used after turning spaces back into `+`, which form
    transports decode `+` into. Unpadded input is accepted for both.
*/
pub fn decode_spc(input: &str) -> Result<(Vec<u8>, Base64Variant), DecodeError> {
    // spaces are significant here, they stand for '+'
    let input = input.trim_matches(['\r', '\n', '\t']);
    if input.contains(['-', '_']) {
        let bytes = URL_SAFE
            .decode(input)
            .or_else(|_| URL_SAFE_NO_PAD.decode(input))?;
        return Ok((bytes, Base64Variant::UrlSafe));
    }

    let repaired = input.replace(' ', "+");
    let bytes = STANDARD
        .decode(&repaired)
        .or_else(|_| STANDARD_NO_PAD.decode(&repaired))?;
    Ok((bytes, Base64Variant::Standard))
}

pub fn encode_ckc(ckc: &[u8], variant: Base64Variant) -> String {
    match variant {
        Base64Variant::Standard => STANDARD.encode(ckc),
        Base64Variant::UrlSafe => URL_SAFE.encode(ckc),
    }
}

/// True when the request body (and so the response) is JSON.
pub fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

/**
    JSON clients get `{"ckc": ".."}`; everyone else gets `<ckc>..</ckc>` as
    `application/x-www-form-urlencoded`, which is what Apple's players expect.
*/
pub fn render_ckc(ckc: String, json: bool) -> Response {
    if json {
        Json(serde_json::json!({ "ckc": ckc })).into_response()
    } else {
        (
            [(header::CONTENT_TYPE, "application/x-www-form-urlencoded")],
            format!("<ckc>{ckc}</ckc>"),
        )
            .into_response()
    }
}
