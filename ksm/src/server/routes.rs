use axum::{
    Form, Json,
    extract::{FromRequest, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use drm_fairplay::{LicenseError, ProviderError, issue_license};
use serde::Deserialize;

use super::AppState;
use super::encoding::{decode_spc, encode_ckc, is_json, render_ckc};

/// Liveness check.
pub async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
pub struct LicenseQuery {
    pub client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LicenseBody {
    #[serde(default)]
    pub spc: String,
    /// Informational only; the asset id the engine uses comes from inside the SPC.
    #[serde(rename = "assetID", default)]
    pub asset_id: Option<String>,
}

/**
    Error body sent to clients. Messages are fixed strings so nothing about
    keys or internal state leaks.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: &'static str,
}

impl ApiError {
    const fn new(status: StatusCode, message: &'static str) -> Self {
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "status": self.status.as_u16(),
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

/// Shared by every request-side failure so clients cannot tell them apart.
const INVALID_REQUEST: &str = "invalid license request";

impl From<&LicenseError> for ApiError {
    fn from(err: &LicenseError) -> Self {
        match err {
            LicenseError::MalformedRequest(_)
            | LicenseError::MissingField(_)
            | LicenseError::UnwrapFailed => Self::new(StatusCode::BAD_REQUEST, INVALID_REQUEST),
            LicenseError::ContentKeyUnavailable(ProviderError::NotFound) => {
                Self::new(StatusCode::NOT_FOUND, "content key not found")
            }
            LicenseError::ContentKeyUnavailable(_) => {
                Self::new(StatusCode::BAD_GATEWAY, "content key unavailable")
            }
        }
    }
}

fn invalid_body<E>(_rejection: E) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "invalid request body")
}

async fn read_body(request: Request, json: bool) -> Result<LicenseBody, ApiError> {
    if json {
        let Json(body) = Json::<LicenseBody>::from_request(request, &())
            .await
            .map_err(invalid_body)?;
        Ok(body)
    } else {
        let Form(body) = Form::<LicenseBody>::from_request(request, &())
            .await
            .map_err(invalid_body)?;
        Ok(body)
    }
}

/// `POST /license` and `POST /fps/license`.
pub async fn license(
    State(state): State<AppState>,
    Query(query): Query<LicenseQuery>,
    request: Request,
) -> Result<Response, ApiError> {
    let json = is_json(request.headers());

    let tenant = state
        .tenants
        .resolve(query.client_id.as_deref())
        .ok_or_else(|| {
            tracing::warn!(client_id = ?query.client_id, "unknown client");
            ApiError::new(StatusCode::NOT_FOUND, "unknown client")
        })?;

    let body = read_body(request, json).await?;
    if body.spc.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "spc is required"));
    }
    let (token, variant) = decode_spc(&body.spc)
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "spc is not valid base64"))?;

    match issue_license(&tenant.keys, tenant.content_keys.as_ref(), &token).await {
        Ok(ckc) => {
            tracing::info!(
                tenant = %tenant.id,
                asset_hint = body.asset_id.as_deref().unwrap_or(""),
                ckc_len = ckc.as_bytes().len(),
                "license issued"
            );
            Ok(render_ckc(encode_ckc(ckc.as_bytes(), variant), json))
        }
        Err(err) => {
            let api = ApiError::from(&err);
            tracing::warn!(
                tenant = %tenant.id,
                status = api.status.as_u16(),
                error = %err,
                "license refused"
            );
            Err(api)
        }
    }
}
