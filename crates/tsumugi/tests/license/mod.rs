use reqwest::Url;
use serde_json::json;
use tsumugi::{
    error::LicenseError,
    license::{KeyType, LicenseExchange, LicenseServer, SessionContext},
    mpd::ProtectionHeader,
};
use wiremock::{
    matchers::{body_bytes, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::{
    common::{content_key, MockCdm, CHALLENGE},
    AssertWrapper,
};

fn context() -> SessionContext {
    SessionContext {
        bearer: "access-token".to_string(),
        content_id: "G4VUQ1ZKW".to_string(),
        video_token: "priv-token".to_string(),
    }
}

fn protection_header() -> ProtectionHeader {
    ProtectionHeader::new(b"\0\0\0\x20pssh".to_vec())
}

async fn license_server(response: ResponseTemplate) -> (MockServer, LicenseServer) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/license/v1/license/widevine"))
        .respond_with(response)
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/license/v1/license/widevine", server.uri())).unwrap();
    (server, LicenseServer::new(reqwest::Client::new(), url))
}

#[tokio::test]
async fn test_acquire_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/license"))
        .and(header("authorization", "Bearer access-token"))
        .and(header("x-cr-content-id", "G4VUQ1ZKW"))
        .and(header("x-cr-video-token", "priv-token"))
        .and(body_bytes(CHALLENGE.to_vec()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "license": "bGljZW5zZQ==" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/license", server.uri())).unwrap();
    let exchange = LicenseExchange::new(
        MockCdm::with_content_key(),
        LicenseServer::new(reqwest::Client::new(), url),
    );

    let key = exchange
        .acquire_key(&protection_header(), &context())
        .await
        .assert_success();
    assert_eq!(key.key_type, KeyType::Content);
    assert_eq!(key.key, content_key().key);
    assert_eq!(key.to_hex(), "42".repeat(16));

    let cdm = exchange.cdm();
    assert_eq!(cdm.opened(), 1);
    assert_eq!(cdm.closed(), 1);
    assert_eq!(cdm.licenses.lock().unwrap().as_slice(), [b"license".to_vec()]);
}

#[tokio::test]
async fn test_denied() {
    let (_server, license_server) = license_server(
        ResponseTemplate::new(403).set_body_json(json!({ "error": "NOT_ENTITLED" })),
    )
    .await;
    let exchange = LicenseExchange::new(MockCdm::with_content_key(), license_server);

    let result = exchange.acquire_key(&protection_header(), &context()).await;
    assert!(matches!(result, Err(LicenseError::Denied(reason)) if reason == "NOT_ENTITLED"));
    assert_eq!(exchange.cdm().opened(), 1);
    assert_eq!(exchange.cdm().closed(), 1);
}

#[tokio::test]
async fn test_error_field_wins_over_status() {
    let (_server, license_server) = license_server(
        ResponseTemplate::new(200)
            .set_body_json(json!({ "error": { "code": "TOO_MANY_ACTIVE_STREAMS" } })),
    )
    .await;
    let exchange = LicenseExchange::new(MockCdm::with_content_key(), license_server);

    let result = exchange.acquire_key(&protection_header(), &context()).await;
    assert!(
        matches!(result, Err(LicenseError::Denied(reason)) if reason.contains("TOO_MANY_ACTIVE_STREAMS"))
    );
    assert_eq!(exchange.cdm().closed(), 1);
}

#[tokio::test]
async fn test_server_error() {
    let (_server, license_server) =
        license_server(ResponseTemplate::new(502).set_body_string("Bad Gateway")).await;
    let exchange = LicenseExchange::new(MockCdm::with_content_key(), license_server);

    let result = exchange.acquire_key(&protection_header(), &context()).await;
    assert!(matches!(result, Err(LicenseError::ServerError(_))));
    assert_eq!(exchange.cdm().opened(), 1);
    assert_eq!(exchange.cdm().closed(), 1);
}

#[tokio::test]
async fn test_unreachable_server() {
    // nothing listens on the discard port
    let url = Url::parse("http://127.0.0.1:9/license").unwrap();
    let exchange = LicenseExchange::new(
        MockCdm::with_content_key(),
        LicenseServer::new(reqwest::Client::new(), url),
    );

    let result = exchange.acquire_key(&protection_header(), &context()).await;
    assert!(matches!(result, Err(LicenseError::ServerError(_))));
    assert_eq!(exchange.cdm().closed(), 1);
}

#[tokio::test]
async fn test_missing_license_field() {
    let (_server, license_server) =
        license_server(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" }))).await;
    let exchange = LicenseExchange::new(MockCdm::with_content_key(), license_server);

    let result = exchange.acquire_key(&protection_header(), &context()).await;
    assert!(matches!(result, Err(LicenseError::ServerError(_))));
    assert_eq!(exchange.cdm().closed(), 1);
}

#[tokio::test]
async fn test_no_content_key() {
    let (_server, license_server) = license_server(
        ResponseTemplate::new(200).set_body_json(json!({ "license": "bGljZW5zZQ" })),
    )
    .await;
    let mut cdm = MockCdm::with_content_key();
    cdm.keys.retain(|key| key.r#type != KeyType::Content);
    let exchange = LicenseExchange::new(cdm, license_server);

    let result = exchange.acquire_key(&protection_header(), &context()).await;
    assert!(matches!(result, Err(LicenseError::NoContentKey)));
    assert_eq!(exchange.cdm().opened(), 1);
    assert_eq!(exchange.cdm().closed(), 1);
}

#[tokio::test]
async fn test_cdm_failure_closes_session() {
    let (server, license_server) = license_server(
        ResponseTemplate::new(200).set_body_json(json!({ "license": "bGljZW5zZQ==" })),
    )
    .await;
    let mut cdm = MockCdm::with_content_key();
    cdm.fail_challenge = true;
    let exchange = LicenseExchange::new(cdm, license_server);

    let result = exchange.acquire_key(&protection_header(), &context()).await;
    assert!(matches!(result, Err(LicenseError::Cdm(_))));
    assert_eq!(exchange.cdm().closed(), 1);
    // the license server is never asked
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}
