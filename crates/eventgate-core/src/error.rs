use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use tracing::warn;

use eventgate_protocol::error::ErrorEnvelope;
use eventgate_storage::StorageError;

/// Everything a pipeline stage can fail with, mapped one-to-one onto the
/// wire envelope at the HTTP edge. Cloneable so authorization failures
/// can flow through the shared cache layer unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// 400: caller input out of range; never retryable as-is.
    #[error("{0}")]
    Validation(String),
    /// 401: missing, malformed, expired, or unknown credential.
    #[error("Authentication failed.")]
    Unauthorized,
    /// 429: the store-authoritative daily cap was crossed.
    #[error(
        "The event daily request rate of {cap} calls has been exceeded. \
         Requests are disabled until UTC midnight."
    )]
    DailyCapExceeded { cap: i64 },
    /// 429: the process-local call-rate guard tripped.
    #[error("Call rate limit exceeded, slow down and retry.")]
    RateLimited,
    /// 501: the event has no deployment for the requested model class.
    #[error("No active deployments found. {available}")]
    NoDeploymentAvailable { available: String },
    /// 503: pool/connection failure talking to the store.
    #[error("Error reading model catalog.")]
    StoreUnavailable,
    /// 502: usage write failed under the fail-request policy.
    #[error("Usage logging failed.")]
    UsageLogFailed,
    /// Upstream returned an error envelope; its status passes through.
    #[error("{message}")]
    Upstream { status: u16, message: String },
    /// 504: transport-level connect failure reaching the deployment.
    #[error("Service connection error.")]
    UpstreamUnavailable,
    /// 504: transport-level timeout reaching the deployment.
    #[error("Service connection timeout error.")]
    UpstreamTimeout,
    /// 500: anything that should not happen.
    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::DailyCapExceeded { .. } | GatewayError::RateLimited => {
                StatusCode::TOO_MANY_REQUESTS
            }
            GatewayError::NoDeploymentAvailable { .. } => StatusCode::NOT_IMPLEMENTED,
            GatewayError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UsageLogFailed => StatusCode::BAD_GATEWAY,
            GatewayError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::UpstreamUnavailable | GatewayError::UpstreamTimeout => {
                StatusCode::GATEWAY_TIMEOUT
            }
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StorageError> for GatewayError {
    fn from(err: StorageError) -> Self {
        warn!(error = %err, "store call failed");
        GatewayError::StoreUnavailable
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Internal(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let envelope = ErrorEnvelope::new(status.as_u16(), self.to_string());
        (status, Json(envelope)).into_response()
    }
}
