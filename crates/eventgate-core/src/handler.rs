use std::io;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::StreamExt;
use http::HeaderValue;
use http::header::CONTENT_TYPE;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_stream::wrappers::ReceiverStream;

use eventgate_common::{
    DEFAULT_CHAT_API_VERSION, DEFAULT_COMPLETIONS_API_VERSION, DEFAULT_EMBEDDINGS_API_VERSION,
    DEFAULT_IMAGES_API_VERSION,
};
use eventgate_protocol::chat::ChatCompletionsRequestBody;
use eventgate_protocol::completions::CompletionsRequestBody;
use eventgate_protocol::embeddings::EmbeddingsRequestBody;
use eventgate_protocol::event_info::EventInfoResponse;
use eventgate_protocol::images::ImagesGenerationsRequestBody;
use eventgate_storage::DeploymentRow;

use crate::core::GatewayState;
use crate::error::GatewayError;
use crate::pipeline::{self, Capability, PipelineResponse};
use crate::upstream::UpstreamByteStream;

#[derive(Debug, Deserialize)]
pub struct ApiVersionQuery {
    #[serde(rename = "api-version")]
    pub api_version: Option<String>,
}

// Capability strategies. One value per capability; everything
// request-shape-specific lives here, the stage ordering lives in
// `pipeline::process`.

pub struct ChatCapability {
    /// Routes the Azure "extensions" variant used for retrieval-augmented
    /// chat with `dataSources`.
    pub extensions: bool,
}

impl Capability for ChatCapability {
    type Request = ChatCompletionsRequestBody;

    fn model_class(&self) -> &'static str {
        "openai-chat"
    }

    fn default_api_version(&self) -> &'static str {
        DEFAULT_CHAT_API_VERSION
    }

    fn validate(&self, request: &Self::Request) -> Result<(), GatewayError> {
        if let Some(n) = request.n
            && !(1..=10).contains(&n)
        {
            return Err(GatewayError::Validation(
                "Oops, n must be between 1 and 10.".to_string(),
            ));
        }
        ensure_unit_range("temperature", request.temperature)?;
        ensure_unit_range("top_p", request.top_p)?;
        ensure_unit_range("frequency_penalty", request.frequency_penalty)?;
        ensure_unit_range("presence_penalty", request.presence_penalty)?;
        Ok(())
    }

    fn clamp_max_tokens(&self, request: &mut Self::Request, cap: i64) {
        if let Some(max_tokens) = request.max_tokens
            && cap > 0
            && max_tokens > cap
        {
            request.max_tokens = Some(cap);
        }
    }

    fn upstream_path(&self, deployment: &DeploymentRow) -> String {
        if self.extensions {
            format!(
                "openai/deployments/{}/extensions/chat/completions",
                deployment.deployment_name
            )
        } else {
            format!(
                "openai/deployments/{}/chat/completions",
                deployment.deployment_name
            )
        }
    }

    fn wants_stream(&self, request: &Self::Request) -> bool {
        request.stream
    }
}

pub struct CompletionsCapability;

impl Capability for CompletionsCapability {
    type Request = CompletionsRequestBody;

    fn model_class(&self) -> &'static str {
        "openai-completions"
    }

    fn default_api_version(&self) -> &'static str {
        DEFAULT_COMPLETIONS_API_VERSION
    }

    fn validate(&self, request: &Self::Request) -> Result<(), GatewayError> {
        if request.prompt.is_empty() {
            return Err(GatewayError::Validation("Oops, no prompt.".to_string()));
        }
        Ok(())
    }

    fn clamp_max_tokens(&self, request: &mut Self::Request, cap: i64) {
        if let Some(max_tokens) = request.max_tokens
            && cap > 0
            && max_tokens > cap
        {
            request.max_tokens = Some(cap);
        }
    }

    fn upstream_path(&self, deployment: &DeploymentRow) -> String {
        format!(
            "openai/deployments/{}/completions",
            deployment.deployment_name
        )
    }
}

pub struct EmbeddingsCapability;

impl Capability for EmbeddingsCapability {
    type Request = EmbeddingsRequestBody;

    fn model_class(&self) -> &'static str {
        "openai-embeddings"
    }

    fn default_api_version(&self) -> &'static str {
        DEFAULT_EMBEDDINGS_API_VERSION
    }

    fn validate(&self, request: &Self::Request) -> Result<(), GatewayError> {
        if request.input.is_empty() {
            return Err(GatewayError::Validation("Oops, no input.".to_string()));
        }
        Ok(())
    }

    fn upstream_path(&self, deployment: &DeploymentRow) -> String {
        format!(
            "openai/deployments/{}/embeddings",
            deployment.deployment_name
        )
    }
}

pub struct ImagesCapability;

impl Capability for ImagesCapability {
    type Request = ImagesGenerationsRequestBody;

    fn model_class(&self) -> &'static str {
        "openai-images-generations"
    }

    fn default_api_version(&self) -> &'static str {
        DEFAULT_IMAGES_API_VERSION
    }

    fn validate(&self, request: &Self::Request) -> Result<(), GatewayError> {
        if request.prompt.is_empty() {
            return Err(GatewayError::Validation("Oops, no prompt.".to_string()));
        }
        if let Some(n) = request.n
            && !(1..=10).contains(&n)
        {
            return Err(GatewayError::Validation(
                "Oops, n must be between 1 and 10.".to_string(),
            ));
        }
        Ok(())
    }

    fn upstream_path(&self, deployment: &DeploymentRow) -> String {
        format!(
            "openai/deployments/{}/images/generations",
            deployment.deployment_name
        )
    }
}

fn ensure_unit_range(name: &str, value: Option<f64>) -> Result<(), GatewayError> {
    if let Some(value) = value
        && !(0.0..=1.0).contains(&value)
    {
        return Err(GatewayError::Validation(format!(
            "Oops, {name} must be between 0 and 1."
        )));
    }
    Ok(())
}

// Route handlers. The OpenAI-style, Azure deployment-scoped, and legacy
// engine-scoped variants share the capability implementations above.

pub async fn chat_completions(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ApiVersionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run(&state, &ChatCapability { extensions: false }, headers, None, query, body).await
}

pub async fn chat_completions_deployment(
    State(state): State<Arc<GatewayState>>,
    Path(deployment): Path<String>,
    Query(query): Query<ApiVersionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run(
        &state,
        &ChatCapability { extensions: false },
        headers,
        Some(deployment),
        query,
        body,
    )
    .await
}

pub async fn chat_extensions_deployment(
    State(state): State<Arc<GatewayState>>,
    Path(deployment): Path<String>,
    Query(query): Query<ApiVersionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run(
        &state,
        &ChatCapability { extensions: true },
        headers,
        Some(deployment),
        query,
        body,
    )
    .await
}

pub async fn completions(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ApiVersionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run(&state, &CompletionsCapability, headers, None, query, body).await
}

pub async fn completions_deployment(
    State(state): State<Arc<GatewayState>>,
    Path(deployment): Path<String>,
    Query(query): Query<ApiVersionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run(
        &state,
        &CompletionsCapability,
        headers,
        Some(deployment),
        query,
        body,
    )
    .await
}

pub async fn embeddings(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ApiVersionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run(&state, &EmbeddingsCapability, headers, None, query, body).await
}

pub async fn embeddings_deployment(
    State(state): State<Arc<GatewayState>>,
    Path(deployment): Path<String>,
    Query(query): Query<ApiVersionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run(
        &state,
        &EmbeddingsCapability,
        headers,
        Some(deployment),
        query,
        body,
    )
    .await
}

pub async fn images_generations(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ApiVersionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run(&state, &ImagesCapability, headers, None, query, body).await
}

pub async fn images_generations_deployment(
    State(state): State<Arc<GatewayState>>,
    Path(deployment): Path<String>,
    Query(query): Query<ApiVersionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run(
        &state,
        &ImagesCapability,
        headers,
        Some(deployment),
        query,
        body,
    )
    .await
}

/// Authorization snapshot plus the capability map, used by playground
/// clients to probe what an event can do. No rate check, no usage log.
pub async fn event_info(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Response {
    let call = match state.authorizer.authorize(&headers, Some("event_info")).await {
        Ok(call) => call,
        Err(err) => return err.into_response(),
    };
    let capabilities = match state.catalog.event_capabilities(&call).await {
        Ok(capabilities) => capabilities,
        Err(err) => return err.into_response(),
    };

    Json(EventInfoResponse {
        is_authorized: true,
        max_token_cap: call.max_token_cap,
        daily_request_cap: call.daily_request_cap,
        event_code: call.event_code,
        event_url: call.event_url,
        event_url_text: call.event_url_text,
        organizer_name: call.organizer_name,
        organizer_email: call.organizer_email,
        capabilities,
    })
    .into_response()
}

async fn run<C: Capability>(
    state: &GatewayState,
    capability: &C,
    headers: HeaderMap,
    deployment: Option<String>,
    query: ApiVersionQuery,
    body: Bytes,
) -> Response
where
    C::Request: DeserializeOwned,
{
    let request = match parse_body::<C::Request>(&body) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };

    let result = pipeline::process(
        state,
        capability,
        &headers,
        deployment.as_deref(),
        query.api_version.as_deref(),
        request,
    )
    .await;

    match result {
        Ok(PipelineResponse::Buffered { status, body }) => (status, Json(body)).into_response(),
        Ok(PipelineResponse::Stream(stream)) => stream_response(stream),
        Err(err) => err.into_response(),
    }
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, GatewayError> {
    serde_json::from_slice(body)
        .map_err(|err| GatewayError::Validation(format!("Invalid request body: {err}.")))
}

/// Forward upstream chunks exactly as they arrived, chunked transfer,
/// without buffering the body.
fn stream_response(stream: UpstreamByteStream) -> Response {
    let UpstreamByteStream {
        status,
        content_type,
        receiver,
    } = stream;

    let body = Body::from_stream(ReceiverStream::new(receiver).map(Ok::<_, io::Error>));
    let mut response = Response::new(body);
    *response.status_mut() = status;
    let content_type = content_type
        .as_deref()
        .and_then(|value| HeaderValue::from_str(value).ok())
        .unwrap_or_else(|| HeaderValue::from_static("text/event-stream"));
    response.headers_mut().insert(CONTENT_TYPE, content_type);
    response
}
