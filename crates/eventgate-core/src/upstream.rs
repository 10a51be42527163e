use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use http::StatusCode;
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use wreq::{Client, Method};

use eventgate_protocol::error::ErrorEnvelope;

use crate::error::GatewayError;

#[derive(Debug, Clone)]
pub struct BackendExecutorConfig {
    pub connect_timeout: Duration,
    /// Whole-request timeout for buffered calls.
    pub request_timeout: Duration,
    /// Per-chunk idle timeout for streamed calls.
    pub stream_idle_timeout: Duration,
}

impl Default for BackendExecutorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(60),
            stream_idle_timeout: Duration::from_secs(10),
        }
    }
}

/// A streamed upstream body. Chunks arrive exactly as the backend framed
/// them; the forwarding task stops pulling once the receiver is dropped,
/// releasing the backend connection when the client goes away.
pub struct UpstreamByteStream {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub receiver: mpsc::Receiver<Bytes>,
}

/// Executes calls against backend deployments. Buffered and streamed
/// modes share credential handling and the error taxonomy: upstream
/// error envelopes keep their status verbatim, transport failures map
/// to 504.
#[async_trait]
pub trait BackendExecutor: Send + Sync {
    async fn post(
        &self,
        url: &str,
        api_key: &str,
        body: &JsonValue,
    ) -> Result<(JsonValue, StatusCode), GatewayError>;

    async fn post_streaming(
        &self,
        url: &str,
        api_key: &str,
        body: &JsonValue,
    ) -> Result<UpstreamByteStream, GatewayError>;

    async fn get(&self, url: &str, api_key: &str)
    -> Result<(JsonValue, StatusCode), GatewayError>;
}

pub struct WreqBackendExecutor {
    /// Whole-request timeout; used for buffered calls.
    buffered: Client,
    /// No whole-request deadline, per-read timeout instead, so long
    /// streams survive while a stalled one still gets cut.
    streaming: Client,
    config: BackendExecutorConfig,
}

impl WreqBackendExecutor {
    pub fn new(config: BackendExecutorConfig) -> Result<Self, wreq::Error> {
        let buffered = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        let streaming = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.stream_idle_timeout)
            .build()?;
        Ok(Self {
            buffered,
            streaming,
            config,
        })
    }

    async fn send_json(
        &self,
        builder: wreq::RequestBuilder,
        api_key: &str,
        body: Option<&JsonValue>,
    ) -> Result<wreq::Response, GatewayError> {
        let mut builder = builder
            .header("api-key", api_key)
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            builder = builder.body(serde_json::to_vec(body)?);
        }
        builder.send().await.map_err(map_transport_error)
    }
}

#[async_trait]
impl BackendExecutor for WreqBackendExecutor {
    async fn post(
        &self,
        url: &str,
        api_key: &str,
        body: &JsonValue,
    ) -> Result<(JsonValue, StatusCode), GatewayError> {
        let response = self
            .send_json(self.buffered.request(Method::POST, url), api_key, Some(body))
            .await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(map_transport_error)?;
        buffered_response(status, &bytes)
    }

    async fn get(
        &self,
        url: &str,
        api_key: &str,
    ) -> Result<(JsonValue, StatusCode), GatewayError> {
        let response = self
            .send_json(self.buffered.request(Method::GET, url), api_key, None)
            .await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(map_transport_error)?;
        buffered_response(status, &bytes)
    }

    async fn post_streaming(
        &self,
        url: &str,
        api_key: &str,
        body: &JsonValue,
    ) -> Result<UpstreamByteStream, GatewayError> {
        let response = self
            .send_json(
                self.streaming.request(Method::POST, url),
                api_key,
                Some(body),
            )
            .await?;
        let status = response.status().as_u16();

        if !(200..300).contains(&status) {
            let bytes = response.bytes().await.map_err(map_transport_error)?;
            return Err(upstream_error(status, &bytes));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let (tx, rx) = mpsc::channel::<Bytes>(16);
        let idle_timeout = self.config.stream_idle_timeout;
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            loop {
                let next = tokio::time::timeout(idle_timeout, stream.next()).await;
                let item = match next {
                    Ok(item) => item,
                    Err(_) => break,
                };
                let Some(item) = item else {
                    break;
                };
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(_) => break,
                };
                if tx.send(chunk).await.is_err() {
                    // Receiver dropped: the client disconnected mid-stream.
                    break;
                }
            }
        });

        Ok(UpstreamByteStream {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::OK),
            content_type,
            receiver: rx,
        })
    }
}

fn buffered_response(status: u16, bytes: &[u8]) -> Result<(JsonValue, StatusCode), GatewayError> {
    if !(200..300).contains(&status) {
        return Err(upstream_error(status, bytes));
    }
    let value: JsonValue = serde_json::from_slice(bytes)?;
    Ok((
        value,
        StatusCode::from_u16(status).unwrap_or(StatusCode::OK),
    ))
}

fn upstream_error(status: u16, body: &[u8]) -> GatewayError {
    let message = ErrorEnvelope::upstream_message(body)
        .unwrap_or_else(|| "OpenAI Error".to_string());
    GatewayError::Upstream { status, message }
}

fn map_transport_error(err: wreq::Error) -> GatewayError {
    if err.is_timeout() {
        return GatewayError::UpstreamTimeout;
    }
    if err.is_connect() {
        return GatewayError::UpstreamUnavailable;
    }
    GatewayError::Internal(format!("backend call failed: {err}"))
}
