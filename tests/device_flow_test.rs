//! Device authorization flow integration tests using wiremock
//!
//! Drives `src/auth/device_flow.rs` against a scripted token endpoint and
//! checks the poll loop's transitions and sleeps.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

use tenzir_platform::auth::device_flow::{DeviceFlow, DeviceFlowState, TokioSleeper};
use tenzir_platform::error::PlatformError;

use common::{
    device_authorization, token_error, FakeProvider, RecordingSleeper, DEVICE_PATH, TOKEN_PATH,
};

async fn mount_device_code(provider: &FakeProvider, interval: u64) {
    Mock::given(method("POST"))
        .and(path(DEVICE_PATH))
        .and(body_string_contains("client_id=test-client"))
        .and(body_string_contains("scope=openid+email"))
        .respond_with(device_authorization(interval))
        .expect(1)
        .mount(&provider.server)
        .await;
}

fn flow(provider: &FakeProvider, sleeper: Arc<RecordingSleeper>) -> DeviceFlow {
    DeviceFlow::new(reqwest::Client::new(), provider.metadata(), &provider.config())
        .with_sleeper(sleeper)
}

// ---------------------------------------------------------------------------
// Successful polling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_authorize_awaits_user_action() {
    let provider = FakeProvider::start().await;
    mount_device_code(&provider, 5).await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_error("authorization_pending"))
        .expect(0)
        .mount(&provider.server)
        .await;

    let mut device_flow = flow(&provider, RecordingSleeper::new());
    assert_eq!(device_flow.state(), DeviceFlowState::Init);

    let authorization = device_flow.authorize().await.expect("device code issued");
    assert_eq!(authorization.user_code, "ABCD-EFGH");
    assert_eq!(
        authorization.verification_url(),
        Some("https://auth.example.com/activate?user_code=ABCD-EFGH")
    );
    assert_eq!(device_flow.state(), DeviceFlowState::AwaitingUserAction);
}

#[tokio::test]
async fn test_pending_twice_then_success_sleeps_twice() {
    let provider = FakeProvider::start().await;
    mount_device_code(&provider, 5).await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("device_code=dev-123"))
        .respond_with(token_error("authorization_pending"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&provider.server)
        .await;

    let token = provider.token("auth0|alice");
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id_token": token,
            "token_type": "Bearer",
        })))
        .expect(1)
        .mount(&provider.server)
        .await;

    let sleeper = RecordingSleeper::new();
    let mut device_flow = flow(&provider, Arc::clone(&sleeper));
    let response = device_flow.run().await.expect("flow succeeds");

    assert_eq!(response.id_token.as_deref(), Some(token.as_str()));
    assert_eq!(device_flow.state(), DeviceFlowState::Authenticated);
    assert_eq!(
        sleeper.sleeps(),
        vec![Duration::from_secs(5), Duration::from_secs(5)]
    );
}

#[tokio::test]
async fn test_slow_down_increases_interval() {
    let provider = FakeProvider::start().await;
    mount_device_code(&provider, 2).await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_error("slow_down"))
        .up_to_n_times(1)
        .mount(&provider.server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_error("authorization_pending"))
        .up_to_n_times(1)
        .mount(&provider.server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"id_token": "x.y.z"})),
        )
        .mount(&provider.server)
        .await;

    let sleeper = RecordingSleeper::new();
    flow(&provider, Arc::clone(&sleeper))
        .run()
        .await
        .expect("flow succeeds");

    assert_eq!(
        sleeper.sleeps(),
        vec![Duration::from_secs(7), Duration::from_secs(7)]
    );
}

#[tokio::test]
async fn test_client_secret_is_sent_when_configured() {
    let provider = FakeProvider::start().await;
    mount_device_code(&provider, 5).await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("client_secret=s3cret"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"id_token": "x.y.z"})),
        )
        .expect(1)
        .mount(&provider.server)
        .await;

    let mut config = provider.config();
    config.client_secret = Some("s3cret".to_string());
    let mut device_flow = DeviceFlow::new(reqwest::Client::new(), provider.metadata(), &config)
        .with_sleeper(RecordingSleeper::new());

    device_flow.run().await.expect("flow succeeds");
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_access_denied_stops_polling() {
    let provider = FakeProvider::start().await;
    mount_device_code(&provider, 5).await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_error("authorization_pending"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&provider.server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_error("access_denied"))
        .expect(1)
        .mount(&provider.server)
        .await;

    let sleeper = RecordingSleeper::new();
    let mut device_flow = flow(&provider, Arc::clone(&sleeper));
    let err = device_flow.run().await.unwrap_err();

    match err {
        PlatformError::AuthFlow(message) => {
            assert!(message.contains("access_denied description"), "{message}")
        }
        other => panic!("expected AuthFlow, got {other:?}"),
    }
    assert_eq!(device_flow.state(), DeviceFlowState::Failed);
    assert_eq!(sleeper.sleeps().len(), 1);
}

#[tokio::test]
async fn test_error_body_with_success_status_fails() {
    let provider = FakeProvider::start().await;
    mount_device_code(&provider, 5).await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "error": "invalid_grant",
        })))
        .expect(1)
        .mount(&provider.server)
        .await;

    let mut device_flow = flow(&provider, RecordingSleeper::new());
    let err = device_flow.run().await.unwrap_err();
    assert!(matches!(err, PlatformError::AuthFlow(_)));
    assert_eq!(device_flow.state(), DeviceFlowState::Failed);
}

#[tokio::test]
async fn test_expired_token_ends_in_expired_state() {
    let provider = FakeProvider::start().await;
    mount_device_code(&provider, 5).await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_error("expired_token"))
        .expect(1)
        .mount(&provider.server)
        .await;

    let mut device_flow = flow(&provider, RecordingSleeper::new());
    assert!(device_flow.run().await.is_err());
    assert_eq!(device_flow.state(), DeviceFlowState::Expired);
}

#[tokio::test]
async fn test_device_code_rejection_carries_body() {
    let provider = FakeProvider::start().await;

    Mock::given(method("POST"))
        .and(path(DEVICE_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("unauthorized_client"))
        .expect(1)
        .mount(&provider.server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_error("authorization_pending"))
        .expect(0)
        .mount(&provider.server)
        .await;

    let mut device_flow = flow(&provider, RecordingSleeper::new());
    let err = device_flow.run().await.unwrap_err();

    match err {
        PlatformError::AuthFlow(message) => {
            assert!(message.contains("unauthorized_client"), "{message}")
        }
        other => panic!("expected AuthFlow, got {other:?}"),
    }
    assert_eq!(device_flow.state(), DeviceFlowState::Failed);
}

#[tokio::test]
async fn test_missing_verification_url_fails() {
    let provider = FakeProvider::start().await;

    Mock::given(method("POST"))
        .and(path(DEVICE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "device_code": "dev-123",
            "user_code": "ABCD-EFGH",
            "interval": 5,
        })))
        .mount(&provider.server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_error("authorization_pending"))
        .expect(0)
        .mount(&provider.server)
        .await;

    let mut device_flow = flow(&provider, RecordingSleeper::new());
    assert!(matches!(
        device_flow.run().await,
        Err(PlatformError::AuthFlow(_))
    ));
    assert_eq!(device_flow.state(), DeviceFlowState::Failed);
}

// ---------------------------------------------------------------------------
// Abandoning the flow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cancellation_abandons_polling() {
    let provider = FakeProvider::start().await;
    mount_device_code(&provider, 5).await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_error("authorization_pending"))
        .expect(1)
        .mount(&provider.server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut device_flow = flow(&provider, RecordingSleeper::new()).with_cancellation(cancel);
    assert!(matches!(
        device_flow.run().await,
        Err(PlatformError::AuthFlow(_))
    ));
    assert_eq!(device_flow.state(), DeviceFlowState::Expired);
}

#[tokio::test]
async fn test_deadline_abandons_polling() {
    let provider = FakeProvider::start().await;
    mount_device_code(&provider, 5).await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_error("authorization_pending"))
        .expect(1)
        .mount(&provider.server)
        .await;

    let sleeper = RecordingSleeper::new();
    let mut device_flow =
        flow(&provider, Arc::clone(&sleeper)).with_deadline(tokio::time::Instant::now());
    assert!(device_flow.run().await.is_err());
    assert_eq!(device_flow.state(), DeviceFlowState::Expired);
    assert!(sleeper.sleeps().is_empty());
}

#[tokio::test]
async fn test_deadline_interrupts_a_long_sleep() {
    let provider = FakeProvider::start().await;
    mount_device_code(&provider, 30).await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_error("authorization_pending"))
        .expect(1)
        .mount(&provider.server)
        .await;

    let started = tokio::time::Instant::now();
    let mut device_flow =
        DeviceFlow::new(reqwest::Client::new(), provider.metadata(), &provider.config())
            .with_sleeper(Arc::new(TokioSleeper))
            .with_deadline(started + Duration::from_millis(50));

    assert!(matches!(
        device_flow.run().await,
        Err(PlatformError::AuthFlow(_))
    ));
    assert_eq!(device_flow.state(), DeviceFlowState::Expired);
    assert!(started.elapsed() < Duration::from_secs(5));
}
