use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router, extract::Path, http::StatusCode, routing::get};
use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD, URL_SAFE},
};
use drm_fairplay::{
    ContentKeyProvider, DerivedContentKeys, DurationPolicy, KeyMaterial, LicenseRequestBuilder,
    LicenseResponse, MemoryContentKeys, ProviderError, RawContentKey, SessionKey,
    parse_application_secret,
};
use ksm::server::{cors_layer, run_server};
use ksm::store::{RemoteContentKeys, Tenant, TenantRegistry};
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::watch};

const CERT: &[u8] = include_bytes!("../../drm/fairplay/testfiles/server.crt");
const KEY: &[u8] = include_bytes!("../../drm/fairplay/testfiles/server.key");
const SECRET: &str = "000102030405060708090a0b0c0d0e0f";
const CONTENT_KEY: [u8; 16] = [0x3c; 16];
const CONTENT_IV: [u8; 16] = [0x5a; 16];

fn keys() -> Arc<KeyMaterial> {
    Arc::new(KeyMaterial::from_pem(CERT, KEY, None, SECRET).unwrap())
}

fn tenant(id: &str, content_keys: Arc<dyn ContentKeyProvider>) -> Tenant {
    Tenant {
        id: id.to_string(),
        keys: keys(),
        content_keys,
    }
}

fn assets() -> Arc<dyn ContentKeyProvider> {
    Arc::new(MemoryContentKeys::new().with_key(
        "movie-1",
        RawContentKey::new(CONTENT_KEY, CONTENT_IV),
        Some(DurationPolicy::new(3600, 7200)),
    ))
}

struct TestServer {
    addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start(tenants: TenantRegistry) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            run_server(listener, Arc::new(tenants), cors_layer(&["*".to_string()]), shutdown_rx)
                .await
                .unwrap();
        });
        Self { addr, shutdown_tx, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(self) {
        self.shutdown_tx.send(true).unwrap();
        self.handle.await.unwrap();
    }
}

fn request_for(asset: &str) -> (Vec<u8>, SessionKey) {
    let keys = keys();
    let builder = LicenseRequestBuilder::new(asset);
    let token = builder.build(keys.public_key()).unwrap();
    let ask = parse_application_secret(SECRET).unwrap();
    let session_key = SessionKey::derive(&ask, builder.r1_bytes().unwrap()).unwrap();
    (token, session_key)
}

fn form_escape(value: &str) -> String {
    value.replace('+', "%2B").replace('/', "%2F").replace('=', "%3D")
}

#[tokio::test]
async fn health_endpoints() {
    let server = TestServer::start(TenantRegistry::new([tenant("acme", assets())])).await;
    let client = reqwest::Client::new();

    for path in ["/", "/healthy"] {
        let response = client.get(server.url(path)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "OK");
    }

    server.stop().await;
}

#[tokio::test]
async fn json_request_gets_json_ckc() {
    let server = TestServer::start(TenantRegistry::new([tenant("acme", assets())])).await;
    let (token, session_key) = request_for("movie-1");

    let response = reqwest::Client::new()
        .post(server.url("/license?client_id=acme"))
        .json(&json!({ "spc": STANDARD.encode(&token), "assetID": "movie-1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("application/json")
    );

    let body: Value = response.json().await.unwrap();
    let ckc = STANDARD.decode(body["ckc"].as_str().unwrap()).unwrap();
    let opened = LicenseResponse::open(&ckc, &session_key).unwrap();
    assert_eq!(opened.content_key, CONTENT_KEY);
    assert_eq!(opened.content_iv, CONTENT_IV);
    assert_eq!(opened.duration, DurationPolicy::new(3600, 7200));

    server.stop().await;
}

#[tokio::test]
async fn form_request_gets_ckc_element() {
    let server = TestServer::start(TenantRegistry::new([tenant("acme", assets())])).await;
    let (token, session_key) = request_for("movie-1");

    let response = reqwest::Client::new()
        .post(server.url("/fps/license"))
        .header("content-type", "application/x-www-form-urlencoded")
        .body(format!("spc={}", form_escape(&STANDARD.encode(&token))))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "application/x-www-form-urlencoded"
    );

    let text = response.text().await.unwrap();
    let inner = text
        .strip_prefix("<ckc>")
        .and_then(|t| t.strip_suffix("</ckc>"))
        .unwrap();
    let opened = LicenseResponse::open(&STANDARD.decode(inner).unwrap(), &session_key).unwrap();
    assert_eq!(opened.content_key, CONTENT_KEY);

    server.stop().await;
}

#[tokio::test]
async fn unescaped_plus_in_form_body_is_repaired() {
    let server = TestServer::start(TenantRegistry::new([tenant("acme", assets())])).await;

    // retry until the encoding actually contains a '+' that the form decoder turns into a space
    let (token, session_key) = loop {
        let (token, session_key) = request_for("movie-1");
        if STANDARD.encode(&token).contains('+') {
            break (token, session_key);
        }
    };
    let raw = STANDARD.encode(&token).replace('/', "%2F").replace('=', "%3D");

    let response = reqwest::Client::new()
        .post(server.url("/license"))
        .header("content-type", "application/x-www-form-urlencoded")
        .body(format!("spc={raw}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = response.text().await.unwrap();
    let inner = &text["<ckc>".len()..text.len() - "</ckc>".len()];
    assert!(LicenseResponse::open(&STANDARD.decode(inner).unwrap(), &session_key).is_ok());

    server.stop().await;
}

#[tokio::test]
async fn url_safe_spc_gets_url_safe_ckc() {
    let server = TestServer::start(TenantRegistry::new([tenant("acme", assets())])).await;

    // the URL-safe alphabet is only detectable when '-' or '_' shows up
    let (token, session_key) = loop {
        let (token, session_key) = request_for("movie-1");
        if URL_SAFE.encode(&token).contains(['-', '_']) {
            break (token, session_key);
        }
    };

    let response = reqwest::Client::new()
        .post(server.url("/license"))
        .json(&json!({ "spc": URL_SAFE.encode(&token) }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    let ckc_text = body["ckc"].as_str().unwrap();
    assert!(!ckc_text.contains(['+', '/']));
    let ckc = URL_SAFE.decode(ckc_text).unwrap();
    assert!(LicenseResponse::open(&ckc, &session_key).is_ok());

    server.stop().await;
}

#[tokio::test]
async fn error_statuses() {
    let tenants = TenantRegistry::new([tenant("acme", assets()), tenant("dev", assets())]);
    let server = TestServer::start(tenants).await;
    let client = reqwest::Client::new();

    let post = |path: &str, body: Value| client.post(server.url(path)).json(&body).send();

    // multi-tenant without a client id
    let (token, _) = request_for("movie-1");
    let spc = STANDARD.encode(&token);
    let response = post("/license", json!({ "spc": spc })).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = post("/license?client_id=nobody", json!({ "spc": spc })).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = post("/license?client_id=acme", json!({})).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], 400);

    let response = post("/license?client_id=acme", json!({ "spc": "!!!!" })).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post("/license?client_id=acme", json!({ "spc": STANDARD.encode([0u8; 64]) }))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (token, _) = request_for("movie-unknown");
    let response = post("/license?client_id=acme", json!({ "spc": STANDARD.encode(&token) }))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "status": 404, "message": "content key not found" }));

    let response = post("/license?client_id=dev", json!({ "spc": spc })).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn cors_preflight_allows_any_origin() {
    let server = TestServer::start(TenantRegistry::new([tenant("acme", assets())])).await;

    let response = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, server.url("/license"))
        .header("origin", "https://player.example")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    server.stop().await;
}

// ── Remote content-key store ─────────────────────────────────────────

async fn asset_key(
    Path((tenant, asset)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    match (tenant.as_str(), asset.as_str()) {
        ("acme", "movie-1") => Ok(Json(json!({
            "contentKey": hex::encode(CONTENT_KEY),
            "iv": STANDARD.encode(CONTENT_IV),
        }))),
        ("acme", "short-key") => Ok(Json(json!({ "contentKey": "0011", "iv": "0011" }))),
        ("acme", "broken") => Err(StatusCode::INTERNAL_SERVER_ERROR),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

async fn license_policy(
    Path((_, asset)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    match asset.as_str() {
        "movie-1" => Ok(Json(json!({ "leaseDuration": 600, "rentalDuration": -1 }))),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

async fn start_document_store() -> SocketAddr {
    let app = Router::new()
        .route("/v1/tenants/{tenant}/asset_keys/{asset}", get(asset_key))
        .route("/v1/tenants/{tenant}/license_policy/{asset}", get(license_policy));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn remote_store_semantics() {
    let addr = start_document_store().await;
    let store = RemoteContentKeys::new(&format!("http://{addr}/v1"), "acme").unwrap();

    let raw = store.fetch("movie-1").await.unwrap();
    assert_eq!(raw.key, CONTENT_KEY);
    assert_eq!(raw.iv, CONTENT_IV);
    assert_eq!(store.fetch_duration("movie-1").await.unwrap(), DurationPolicy::new(600, 0));

    assert_eq!(store.fetch("missing").await.unwrap_err(), ProviderError::NotFound);
    assert_eq!(store.fetch_duration("missing").await.unwrap(), DurationPolicy::default());
    assert!(matches!(store.fetch("broken").await.unwrap_err(), ProviderError::Backend(_)));
}

#[tokio::test]
async fn remote_store_through_http() {
    let store_addr = start_document_store().await;
    let remote = RemoteContentKeys::new(&format!("http://{store_addr}/v1"), "acme").unwrap();
    let server = TestServer::start(TenantRegistry::new([tenant("acme", Arc::new(remote))])).await;
    let client = reqwest::Client::new();

    let (token, session_key) = request_for("movie-1");
    let response = client
        .post(server.url("/license"))
        .json(&json!({ "spc": STANDARD.encode(&token) }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    let opened = LicenseResponse::open(
        &STANDARD.decode(body["ckc"].as_str().unwrap()).unwrap(),
        &session_key,
    )
    .unwrap();
    assert_eq!(opened.duration, DurationPolicy::new(600, 0));

    for (asset, status) in [
        ("short-key", StatusCode::BAD_GATEWAY),
        ("broken", StatusCode::BAD_GATEWAY),
        ("missing", StatusCode::NOT_FOUND),
    ] {
        let (token, _) = request_for(asset);
        let response = client
            .post(server.url("/license"))
            .json(&json!({ "spc": STANDARD.encode(&token) }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), status, "{asset}");
    }

    server.stop().await;
}

#[tokio::test]
async fn derived_keys_serve_any_asset() {
    let derived: Arc<dyn ContentKeyProvider> = Arc::new(DerivedContentKeys::default());
    let server = TestServer::start(TenantRegistry::new([tenant("dev", derived)])).await;
    let (token, session_key) = request_for("anything/at all");

    let response = reqwest::Client::new()
        .post(server.url("/license"))
        .json(&json!({ "spc": STANDARD.encode(&token) }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    let opened = LicenseResponse::open(
        &STANDARD.decode(body["ckc"].as_str().unwrap()).unwrap(),
        &session_key,
    )
    .unwrap();
    let expected = DerivedContentKeys::derive("anything/at all");
    assert_eq!(opened.content_key.to_vec(), expected.key);

    server.stop().await;
}
