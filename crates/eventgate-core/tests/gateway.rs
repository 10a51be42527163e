use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use bytes::Bytes;
use http::{Request, StatusCode};
use serde_json::{Value as JsonValue, json};
use tokio::sync::mpsc;
use tower::util::ServiceExt;
use uuid::Uuid;

use eventgate_common::{Settings, SettingsPatch};
use eventgate_protocol::chat::ChatCompletionsResponse;
use eventgate_core::upstream::UpstreamByteStream;
use eventgate_core::{BackendExecutor, Gateway, GatewayError};
use eventgate_storage::{
    AuthorizedRow, DeploymentInput, DeploymentRow, EventInput, Storage, StorageResult, UsageRow,
};

const KEY: &str = "11111111-1111-1111-1111-111111111111";

// -- store double ----------------------------------------------------------

#[derive(Clone, Copy, PartialEq)]
enum AuthBehavior {
    Authorized,
    Rejected,
    Throttled,
}

struct TestStorage {
    auth: AuthBehavior,
    deployments: Vec<DeploymentRow>,
    auth_calls: AtomicU32,
    usage_rows: Mutex<Vec<UsageRow>>,
}

impl TestStorage {
    fn new(auth: AuthBehavior, deployments: Vec<DeploymentRow>) -> Arc<Self> {
        Arc::new(Self {
            auth,
            deployments,
            auth_calls: AtomicU32::new(0),
            usage_rows: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Storage for TestStorage {
    async fn sync(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn attendee_authorized(
        &self,
        event_code: &str,
        api_key: Uuid,
    ) -> StorageResult<Option<AuthorizedRow>> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if self.auth == AuthBehavior::Rejected || event_code != "eventabc" {
            return Ok(None);
        }
        Ok(Some(AuthorizedRow {
            attendee_key: api_key,
            event_id: 1,
            event_code: event_code.to_string(),
            event_name: "Example Hack Night".to_string(),
            max_token_cap: 1024,
            daily_request_cap: 256,
            rate_limit_exceed: self.auth == AuthBehavior::Throttled,
            organizer_name: "Organizer".to_string(),
            organizer_email: "organizer@example.com".to_string(),
            event_url: None,
            event_url_text: None,
        }))
    }

    async fn deployments_for_event(
        &self,
        event_id: i64,
        model_class: Option<&str>,
        deployment_name: Option<&str>,
    ) -> StorageResult<Vec<DeploymentRow>> {
        Ok(self
            .deployments
            .iter()
            .filter(|d| d.event_id == event_id)
            .filter(|d| model_class.is_none_or(|mc| d.model_class == mc))
            .filter(|d| deployment_name.is_none_or(|dn| d.deployment_name == dn))
            .cloned()
            .collect())
    }

    async fn record_usage(&self, row: UsageRow) -> StorageResult<()> {
        self.usage_rows.lock().expect("usage lock").push(row);
        Ok(())
    }

    async fn upsert_event(&self, _input: EventInput) -> StorageResult<i64> {
        Ok(0)
    }

    async fn upsert_attendee(
        &self,
        _event_id: i64,
        _api_key: Uuid,
        _active: bool,
    ) -> StorageResult<()> {
        Ok(())
    }

    async fn upsert_deployment(&self, _input: DeploymentInput) -> StorageResult<i64> {
        Ok(0)
    }
}

// -- backend double --------------------------------------------------------

struct TestExecutor {
    requests: Mutex<Vec<(String, JsonValue)>>,
    stream_chunks: Vec<&'static str>,
}

impl TestExecutor {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            stream_chunks: vec![
                "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n",
                "data: [DONE]\n\n",
            ],
        })
    }

    fn recorded(&self) -> Vec<(String, JsonValue)> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl BackendExecutor for TestExecutor {
    async fn post(
        &self,
        url: &str,
        _api_key: &str,
        body: &JsonValue,
    ) -> Result<(JsonValue, StatusCode), GatewayError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push((url.to_string(), body.clone()));
        Ok((
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "created": 1700000000,
                "model": "gpt-35-turbo",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "hi"}}],
                "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
            }),
            StatusCode::OK,
        ))
    }

    async fn post_streaming(
        &self,
        url: &str,
        _api_key: &str,
        body: &JsonValue,
    ) -> Result<UpstreamByteStream, GatewayError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push((url.to_string(), body.clone()));
        let (tx, rx) = mpsc::channel(4);
        for chunk in &self.stream_chunks {
            tx.send(Bytes::from_static(chunk.as_bytes()))
                .await
                .expect("test channel");
        }
        drop(tx);
        Ok(UpstreamByteStream {
            status: StatusCode::OK,
            content_type: Some("text/event-stream".to_string()),
            receiver: rx,
        })
    }

    async fn get(
        &self,
        _url: &str,
        _api_key: &str,
    ) -> Result<(JsonValue, StatusCode), GatewayError> {
        Ok((json!({}), StatusCode::OK))
    }
}

/// Upstream that always answers with a passed-through error envelope.
struct ErrorExecutor;

#[async_trait]
impl BackendExecutor for ErrorExecutor {
    async fn post(
        &self,
        _url: &str,
        _api_key: &str,
        _body: &JsonValue,
    ) -> Result<(JsonValue, StatusCode), GatewayError> {
        Err(GatewayError::Upstream {
            status: 429,
            message: "Requests to the deployment have exceeded the call rate limit.".to_string(),
        })
    }

    async fn post_streaming(
        &self,
        _url: &str,
        _api_key: &str,
        _body: &JsonValue,
    ) -> Result<UpstreamByteStream, GatewayError> {
        Err(GatewayError::UpstreamTimeout)
    }

    async fn get(
        &self,
        _url: &str,
        _api_key: &str,
    ) -> Result<(JsonValue, StatusCode), GatewayError> {
        Err(GatewayError::UpstreamUnavailable)
    }
}

// -- harness ---------------------------------------------------------------

fn chat_deployment() -> DeploymentRow {
    DeploymentRow {
        catalog_id: 42,
        event_id: 1,
        deployment_name: "gpt-35-turbo".to_string(),
        model_class: "openai-chat".to_string(),
        endpoint_url: "https://backend.example.com".to_string(),
        endpoint_key: "secret".to_string(),
        location: "swedencentral".to_string(),
    }
}

fn settings() -> Settings {
    SettingsPatch {
        dsn: Some("sqlite::memory:".to_string()),
        ..SettingsPatch::default()
    }
    .into_settings()
    .expect("settings")
}

fn router(storage: Arc<TestStorage>, executor: Arc<TestExecutor>) -> Router {
    Gateway::new(&settings(), storage, executor).router()
}

fn post_json(path: &str, token: Option<&str>, body: &JsonValue) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("api-key", token);
    }
    builder
        .body(Body::from(serde_json::to_vec(body).expect("body")))
        .expect("request")
}

async fn body_json(response: axum::response::Response) -> JsonValue {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("body json")
}

fn token() -> String {
    format!("eventabc/{KEY}")
}

// -- scenarios -------------------------------------------------------------

#[tokio::test]
async fn chat_completion_round_trip_suffixes_model_and_logs_usage() {
    let storage = TestStorage::new(AuthBehavior::Authorized, vec![chat_deployment()]);
    let executor = TestExecutor::new();
    let app = router(storage.clone(), executor.clone());

    let response = app
        .oneshot(post_json(
            "/v1/chat/completions",
            Some(&token()),
            &json!({"messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let typed: ChatCompletionsResponse =
        serde_json::from_value(body.clone()).expect("typed chat response");
    assert_eq!(typed.model, "gpt-35-turbo:swedencentral");
    assert_eq!(typed.usage.and_then(|usage| usage.total_tokens), Some(12));
    assert_eq!(typed.choices.len(), 1);

    let rows = storage.usage_rows.lock().expect("usage lock");
    assert_eq!(rows.len(), 1, "exactly one usage record");
    assert_eq!(rows[0].catalog_id, Some(42));
    assert_eq!(rows[0].usage["total_tokens"], 12);

    let recorded = executor.recorded();
    assert_eq!(recorded.len(), 1);
    assert!(
        recorded[0].0.starts_with(
            "https://backend.example.com/openai/deployments/gpt-35-turbo/chat/completions"
        )
    );
}

#[tokio::test]
async fn unknown_or_expired_event_gets_the_401_envelope() {
    let storage = TestStorage::new(AuthBehavior::Rejected, vec![chat_deployment()]);
    let executor = TestExecutor::new();
    let app = router(storage, executor.clone());

    let response = app
        .oneshot(post_json(
            "/v1/chat/completions",
            Some(&token()),
            &json!({"messages": []}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body, json!({"error": {"code": 401, "message": "Authentication failed."}}));
    assert!(executor.recorded().is_empty(), "no upstream call on auth failure");
}

#[tokio::test]
async fn store_reported_daily_cap_maps_to_429_naming_the_cap() {
    let storage = TestStorage::new(AuthBehavior::Throttled, vec![chat_deployment()]);
    let app = router(storage, TestExecutor::new());

    let response = app
        .oneshot(post_json(
            "/v1/chat/completions",
            Some(&token()),
            &json!({"messages": []}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert!(
        body["error"]["message"]
            .as_str()
            .expect("message")
            .contains("256"),
        "429 message names the daily cap: {body}"
    );
}

#[tokio::test]
async fn max_tokens_is_clamped_before_the_upstream_call() {
    let storage = TestStorage::new(AuthBehavior::Authorized, vec![chat_deployment()]);
    let executor = TestExecutor::new();
    let app = router(storage, executor.clone());

    let response = app
        .oneshot(post_json(
            "/v1/chat/completions",
            Some(&token()),
            &json!({"messages": [], "max_tokens": 9000}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let recorded = executor.recorded();
    assert_eq!(recorded[0].1["max_tokens"], 1024);
}

#[tokio::test]
async fn validation_failures_stop_before_authorization() {
    let storage = TestStorage::new(AuthBehavior::Authorized, vec![chat_deployment()]);
    let executor = TestExecutor::new();
    let app = router(storage.clone(), executor.clone());

    let response = app
        .oneshot(post_json(
            "/v1/chat/completions",
            Some(&token()),
            &json!({"messages": [], "temperature": 3.0}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(
        body["error"]["message"],
        "Oops, temperature must be between 0 and 1."
    );
    assert_eq!(storage.auth_calls.load(Ordering::SeqCst), 0);
    assert!(executor.recorded().is_empty());
}

#[tokio::test]
async fn missing_deployment_class_reports_alternatives() {
    let mut embeddings_only = chat_deployment();
    embeddings_only.deployment_name = "ada-002".to_string();
    embeddings_only.model_class = "openai-embeddings".to_string();
    let storage = TestStorage::new(AuthBehavior::Authorized, vec![embeddings_only]);
    let app = router(storage, TestExecutor::new());

    let response = app
        .oneshot(post_json(
            "/v1/chat/completions",
            Some(&token()),
            &json!({"messages": []}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    let body = body_json(response).await;
    let message = body["error"]["message"].as_str().expect("message");
    assert!(message.contains("openai-embeddings"));
    assert!(message.contains("ada-002"));
}

#[tokio::test]
async fn streamed_chat_passes_chunks_through_and_marks_usage() {
    let storage = TestStorage::new(AuthBehavior::Authorized, vec![chat_deployment()]);
    let executor = TestExecutor::new();
    let app = router(storage.clone(), executor.clone());

    let response = app
        .oneshot(post_json(
            "/v1/chat/completions",
            Some(&token()),
            &json!({"messages": [], "stream": true}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok()),
        Some("text/event-stream")
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("stream body");
    let text = String::from_utf8(bytes.to_vec()).expect("utf8");
    assert!(text.contains("\"content\":\"hi\""));
    assert!(text.ends_with("data: [DONE]\n\n"), "done marker forwarded: {text:?}");

    let rows = storage.usage_rows.lock().expect("usage lock");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].usage, json!({"stream": true}));
}

#[tokio::test]
async fn api_version_query_overrides_the_default() {
    let storage = TestStorage::new(AuthBehavior::Authorized, vec![chat_deployment()]);
    let executor = TestExecutor::new();
    let app = router(storage, executor.clone());

    let response = app
        .oneshot(post_json(
            "/v1/chat/completions?api-version=2024-02-01",
            Some(&token()),
            &json!({"messages": []}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let recorded = executor.recorded();
    assert!(recorded[0].0.ends_with("api-version=2024-02-01"));
}

#[tokio::test]
async fn azure_style_deployment_path_narrows_the_catalog() {
    let mut second = chat_deployment();
    second.catalog_id = 43;
    second.deployment_name = "gpt-4".to_string();
    let storage = TestStorage::new(AuthBehavior::Authorized, vec![chat_deployment(), second]);
    let executor = TestExecutor::new();
    let app = router(storage, executor.clone());

    let response = app
        .oneshot(post_json(
            "/v1/openai/deployments/gpt-4/chat/completions",
            Some(&token()),
            &json!({"messages": []}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let recorded = executor.recorded();
    assert!(recorded[0].0.contains("/openai/deployments/gpt-4/chat/completions"));
}

#[tokio::test]
async fn event_info_reports_capabilities() {
    let mut embeddings = chat_deployment();
    embeddings.catalog_id = 7;
    embeddings.deployment_name = "ada-002".to_string();
    embeddings.model_class = "openai-embeddings".to_string();
    let storage = TestStorage::new(AuthBehavior::Authorized, vec![chat_deployment(), embeddings]);
    let app = router(storage, TestExecutor::new());

    let response = app
        .oneshot(post_json("/v1/eventinfo", Some(&token()), &json!({})))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["is_authorized"], true);
    assert_eq!(body["max_token_cap"], 1024);
    assert_eq!(body["capabilities"]["openai-chat"], json!(["gpt-35-turbo"]));
    assert_eq!(body["capabilities"]["openai-embeddings"], json!(["ada-002"]));
}

#[tokio::test]
async fn upstream_errors_keep_their_status_and_still_get_metered() {
    let storage = TestStorage::new(AuthBehavior::Authorized, vec![chat_deployment()]);
    let app = Gateway::new(&settings(), storage.clone(), Arc::new(ErrorExecutor)).router();

    let response = app
        .oneshot(post_json(
            "/v1/chat/completions",
            Some(&token()),
            &json!({"messages": []}),
        ))
        .await
        .expect("response");

    // Upstream 429 passes through verbatim, message intact.
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert!(
        body["error"]["message"]
            .as_str()
            .expect("message")
            .contains("call rate limit"),
    );

    // The authorized-but-failed call is still metered, with empty usage.
    let rows = storage.usage_rows.lock().expect("usage lock");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].usage, json!({}));
}

#[tokio::test]
async fn missing_credential_header_is_rejected_with_the_envelope() {
    let storage = TestStorage::new(AuthBehavior::Authorized, vec![chat_deployment()]);
    let app = router(storage, TestExecutor::new());

    let response = app
        .oneshot(post_json(
            "/v1/chat/completions",
            None,
            &json!({"messages": []}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], 401);
}
