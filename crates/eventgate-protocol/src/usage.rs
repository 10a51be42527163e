use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Token accounting block returned by buffered upstream calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TokenUsage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<i64>,
}

/// Usage blob recorded for streamed calls, where exact token counts are
/// not known at response time.
pub fn stream_usage_marker() -> JsonValue {
    serde_json::json!({"stream": true})
}
