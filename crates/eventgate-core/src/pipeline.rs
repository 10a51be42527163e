use http::{HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::info;
use uuid::Uuid;

use eventgate_protocol::usage::stream_usage_marker;
use eventgate_storage::DeploymentRow;

use crate::core::GatewayState;
use crate::error::GatewayError;
use crate::upstream::UpstreamByteStream;

/// The per-capability strategy the shared pipeline is parameterized by.
/// Everything request-shape-specific lives behind this trait; the stage
/// sequencing lives in `process` exactly once.
pub trait Capability: Send + Sync {
    type Request: Serialize + Send + Sync;

    /// Model class this capability routes to.
    fn model_class(&self) -> &'static str;

    fn default_api_version(&self) -> &'static str;

    /// Pure field-range checks on the inbound request; no I/O.
    fn validate(&self, _request: &Self::Request) -> Result<(), GatewayError> {
        Ok(())
    }

    /// Clamp the request's token ask to the event cap, where the
    /// capability has one.
    fn clamp_max_tokens(&self, _request: &mut Self::Request, _cap: i64) {}

    /// Path under the deployment endpoint, e.g.
    /// `openai/deployments/<name>/chat/completions`.
    fn upstream_path(&self, deployment: &DeploymentRow) -> String;

    fn wants_stream(&self, _request: &Self::Request) -> bool {
        false
    }
}

pub enum PipelineResponse {
    Buffered { status: StatusCode, body: JsonValue },
    Stream(UpstreamByteStream),
}

/// One request through every stage, in strict order:
/// validate -> authorize -> rate-check -> select deployment -> execute ->
/// log usage -> respond. Any stage short-circuits with its taxonomy
/// error; nothing reaches the backend before authorization passes.
pub async fn process<C: Capability>(
    state: &GatewayState,
    capability: &C,
    headers: &HeaderMap,
    deployment_name: Option<&str>,
    api_version: Option<&str>,
    mut request: C::Request,
) -> Result<PipelineResponse, GatewayError> {
    let trace_id = Uuid::new_v4().to_string();

    capability.validate(&request)?;

    let mut call = state.authorizer.authorize(headers, deployment_name).await?;
    info!(
        event = "request_authorized",
        trace_id = %trace_id,
        event_code = %call.event_code,
        model_class = capability.model_class(),
    );

    if state
        .rate_limiter
        .is_rate_exceeded(&call.attendee_key.to_string())
    {
        return Err(GatewayError::RateLimited);
    }

    capability.clamp_max_tokens(&mut request, call.max_token_cap);

    let deployment = state
        .catalog
        .select_for(&mut call, capability.model_class())
        .await?;

    let api_version = api_version.unwrap_or_else(|| capability.default_api_version());
    let url = format!(
        "{}/{}?api-version={}",
        deployment.endpoint_url.trim_end_matches('/'),
        capability.upstream_path(&deployment),
        api_version,
    );
    let body = serde_json::to_value(&request)?;

    if capability.wants_stream(&request) {
        let stream = match state
            .executor
            .post_streaming(&url, &deployment.endpoint_key, &body)
            .await
        {
            Ok(stream) => stream,
            Err(err) => return Err(log_failed_call(state, &mut call, err).await),
        };
        call.usage = Some(stream_usage_marker());
        state.monitor.log_call(&call).await?;
        info!(
            event = "request_completed",
            trace_id = %trace_id,
            deployment = %deployment.deployment_name,
            status = stream.status.as_u16(),
            is_stream = true,
        );
        return Ok(PipelineResponse::Stream(stream));
    }

    let (mut response_body, status) = match state
        .executor
        .post(&url, &deployment.endpoint_key, &body)
        .await
    {
        Ok(response) => response,
        Err(err) => return Err(log_failed_call(state, &mut call, err).await),
    };
    rewrite_model(&mut response_body, &deployment);
    call.usage = Some(
        response_body
            .get("usage")
            .cloned()
            .unwrap_or_else(|| JsonValue::Object(serde_json::Map::new())),
    );
    state.monitor.log_call(&call).await?;
    info!(
        event = "request_completed",
        trace_id = %trace_id,
        deployment = %deployment.deployment_name,
        status = status.as_u16(),
        is_stream = false,
    );

    Ok(PipelineResponse::Buffered {
        status,
        body: response_body,
    })
}

/// Record an authorized-but-failed call with empty usage, keeping the
/// original upstream error. A logging failure is already reported by the
/// monitor and must not mask the upstream error here.
async fn log_failed_call(
    state: &GatewayState,
    call: &mut crate::authorize::AuthorizedCall,
    err: GatewayError,
) -> GatewayError {
    call.usage = Some(JsonValue::Object(serde_json::Map::new()));
    let _ = state.monitor.log_call(call).await;
    err
}

/// Suffix the response's `model` with the deployment's location so
/// callers can tell apart regions serving the same logical model.
fn rewrite_model(body: &mut JsonValue, deployment: &DeploymentRow) {
    if let Some(model) = body.get("model").and_then(JsonValue::as_str) {
        let rewritten = format!("{model}:{}", deployment.location.to_lowercase());
        body["model"] = JsonValue::String(rewritten);
    }
}
