use serde::{Deserialize, Serialize};

/// Wire shape of every error the gateway emits, and the shape it expects
/// back from upstream deployments on non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: u16,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code,
                message: message.into(),
            },
        }
    }

    /// Best-effort extraction of the `message` field from an upstream
    /// error body. Upstream envelopes are not uniform: `code` may be a
    /// string, a number, or absent, so only `message` is relied upon.
    pub fn upstream_message(body: &[u8]) -> Option<String> {
        let value: serde_json::Value = serde_json::from_slice(body).ok()?;
        value
            .get("error")?
            .get("message")?
            .as_str()
            .map(|message| message.to_string())
    }
}
