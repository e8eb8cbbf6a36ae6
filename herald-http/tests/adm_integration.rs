//! ADM client against a mock provider.

use std::time::Duration;

use herald_common::{Outcome, Provider, config::HttpTimeouts};
use herald_http::{AdmClient, AdmMessage, HttpError};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path},
};

const REGISTRATION: &str = "amzn1.adm-registration.v2.device";
const MESSAGE_PATH: &str = "/messaging/registrations/amzn1.adm-registration.v2.device/messages";

fn client(server: &MockServer) -> AdmClient {
    AdmClient::new(&server.uri(), "access-token", &HttpTimeouts::default()).unwrap()
}

fn message() -> AdmMessage {
    let mut message = AdmMessage::new(REGISTRATION).with_expires_after(3600);
    message.set_data("msg", "hello");
    message
}

async fn reply(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(MESSAGE_PATH))
        .respond_with(template)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MESSAGE_PATH))
        .and(header("Authorization", "Bearer access-token"))
        .and(header("Accept", "application/json"))
        .and(header("Content-Type", "application/json"))
        .and(header(
            "X-Amzn-Type-Version",
            "com.amazon.device.messaging.ADMMessage@1.0",
        ))
        .and(header(
            "X-Amzn-Accept-Type",
            "com.amazon.device.messaging.ADMSendResult@1.0",
        ))
        .and(body_json(json!({
            "data": {"msg": "hello"},
            "expiresAfter": 3600,
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Amzn-RequestId", "req-42")
                .set_body_json(json!({"registrationID": REGISTRATION})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server).send(&message()).await.unwrap();

    assert_eq!(response.provider, Provider::Adm);
    assert_eq!(response.outcome, Outcome::Success);
    assert_eq!(response.identifier.as_deref(), Some("req-42"));
}

#[tokio::test]
async fn test_changed_registration_is_update_token() {
    let server = MockServer::start().await;
    reply(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"registrationID": "amzn1.new"})),
    )
    .await;

    let response = client(&server).send(&message()).await.unwrap();

    assert_eq!(response.replacement_token(), Some("amzn1.new"));
    assert!(response.update_token());
}

#[tokio::test]
async fn test_unregistered_removes_token() {
    let server = MockServer::start().await;
    reply(
        &server,
        ResponseTemplate::new(400).set_body_json(json!({"reason": "Unregistered"})),
    )
    .await;

    let response = client(&server).send(&message()).await.unwrap();
    assert!(response.should_remove_token());
}

#[tokio::test]
async fn test_invalid_data_is_opaque_error() {
    let server = MockServer::start().await;
    reply(
        &server,
        ResponseTemplate::new(400).set_body_json(json!({"reason": "InvalidData"})),
    )
    .await;

    let response = client(&server).send(&message()).await.unwrap();
    assert_eq!(response.outcome, Outcome::Error("InvalidData".to_string()));
}

#[tokio::test]
async fn test_expired_access_token() {
    let server = MockServer::start().await;
    reply(
        &server,
        ResponseTemplate::new(401).set_body_json(json!({"reason": "AccessTokenExpired"})),
    )
    .await;

    let response = client(&server).send(&message()).await.unwrap();
    assert_eq!(response.outcome, Outcome::TokenExpired);
}

#[tokio::test]
async fn test_message_too_large() {
    let server = MockServer::start().await;
    reply(
        &server,
        ResponseTemplate::new(413).set_body_json(json!({"reason": "MessageTooLarge"})),
    )
    .await;

    let response = client(&server).send(&message()).await.unwrap();
    assert_eq!(
        response.outcome,
        Outcome::Error("MessageTooLarge".to_string())
    );
}

#[tokio::test]
async fn test_rate_limited_retry_in_seconds() {
    let server = MockServer::start().await;
    reply(
        &server,
        ResponseTemplate::new(429)
            .insert_header("Retry-After", "60")
            .set_body_json(json!({"reason": "MaxRateExceeded"})),
    )
    .await;

    let response = client(&server).send(&message()).await.unwrap();
    assert_eq!(response.retry_after(), Some(Duration::from_secs(60)));
}

#[tokio::test]
async fn test_unavailable_retry_at_date() {
    let server = MockServer::start().await;
    reply(
        &server,
        ResponseTemplate::new(503).insert_header("Retry-After", "Fri, 31 Dec 2100 23:59:59 GMT"),
    )
    .await;

    let response = client(&server).send(&message()).await.unwrap();

    let after = response.retry_after().unwrap();
    assert!(after > Duration::from_secs(60 * 60 * 24 * 365));
}

#[tokio::test]
async fn test_undocumented_status_is_error() {
    let server = MockServer::start().await;
    reply(&server, ResponseTemplate::new(418).set_body_string("teapot")).await;

    let err = client(&server).send(&message()).await.unwrap_err();
    assert!(matches!(err, HttpError::UnexpectedStatus { status: 418, .. }));
}

#[tokio::test]
async fn test_missing_registration_is_rejected_before_io() {
    let server = MockServer::start().await;

    let err = client(&server)
        .send(&AdmMessage::new(""))
        .await
        .unwrap_err();

    assert!(matches!(err, HttpError::MissingRegistrationId));
    assert!(server.received_requests().await.unwrap().is_empty());
}
