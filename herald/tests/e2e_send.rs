//! End-to-end tests: configuration file to provider request and classified response.
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::Write;

use herald::{Herald, SendCommand, describe, send};
use herald_common::Outcome;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, body_string, header, method, path},
};

fn write_config(server: &MockServer) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create config file");
    write!(
        file,
        r#"#![enable(implicit_some)]
(
    environment: testing,
    gcm: (
        api_key: "gcm-key",
        url: "{uri}/gcm/send",
    ),
    adm: (
        access_token: "adm-token",
        url: "{uri}",
    ),
    c2dm: (
        auth_token: "c2dm-token",
        url: "{uri}/c2dm/send",
    ),
)
"#,
        uri = server.uri()
    )
    .expect("Failed to write config file");
    file
}

fn pair(key: &str, value: &str) -> (String, String) {
    (key.to_string(), value.to_string())
}

#[tokio::test]
async fn test_gcm_send_from_config_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gcm/send"))
        .and(header("Authorization", "key=gcm-key"))
        .and(body_json(json!({
            "registration_ids": ["device-a", "device-b"],
            "collapse_key": "news",
            "data": {"msg": "hi"},
            "delay_while_idle": true,
            "time_to_live": 2_419_200,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "multicast_id": 9,
            "results": [{"message_id": "1:1"}, {"error": "InvalidRegistration"}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = write_config(&server);
    let herald = Herald::load(config.path()).expect("Failed to load config");

    let response = send(
        &herald,
        SendCommand::Gcm {
            tokens: vec!["device-a".to_string(), "device-b".to_string()],
            data: vec![pair("msg", "hi")],
            collapse_key: Some("news".to_string()),
            dry_run: false,
        },
    )
    .await
    .expect("Send failed");

    assert_eq!(response.outcome, Outcome::RemoveToken);
    assert_eq!(response.error_indexes(), vec![1]);
    assert!(describe(&response).contains("[1] remove token"));
}

#[tokio::test]
async fn test_adm_send_from_config_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messaging/registrations/kindle/messages"))
        .and(header("Authorization", "Bearer adm-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Amzn-RequestId", "req-1")
                .set_body_json(json!({"registrationID": "kindle"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = write_config(&server);
    let herald = Herald::load(config.path()).expect("Failed to load config");

    let response = send(
        &herald,
        SendCommand::Adm {
            token: "kindle".to_string(),
            data: vec![pair("msg", "hi")],
            consolidation_key: None,
            expires_after: Some(60),
        },
    )
    .await
    .expect("Send failed");

    assert!(response.is_success());
    assert_eq!(describe(&response), "ADM 200: success (id req-1)");
}

#[tokio::test]
async fn test_c2dm_send_from_config_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/c2dm/send"))
        .and(body_string("registration_id=droid&data.msg=hi"))
        .respond_with(ResponseTemplate::new(200).set_body_string("id=0:77"))
        .expect(1)
        .mount(&server)
        .await;

    let config = write_config(&server);
    let herald = Herald::load(config.path()).expect("Failed to load config");

    let response = send(
        &herald,
        SendCommand::C2dm {
            token: "droid".to_string(),
            data: vec![pair("msg", "hi")],
            collapse_key: None,
        },
    )
    .await
    .expect("Send failed");

    assert_eq!(response.identifier.as_deref(), Some("0:77"));
}

#[tokio::test]
async fn test_apns_without_section_is_reported() {
    let server = MockServer::start().await;
    let config = write_config(&server);
    let herald = Herald::load(config.path()).expect("Failed to load config");

    let err = send(
        &herald,
        SendCommand::Apns {
            token: "ab".repeat(32),
            alert: "hi".to_string(),
            badge: None,
            sound: None,
            expiry: 0,
            data: Vec::new(),
        },
    )
    .await
    .unwrap_err();

    assert_eq!(err.to_string(), "No apns section in the configuration");
}
