use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::usage::TokenUsage;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChatCompletionsResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    /// Rewritten by the gateway to `<model>:<location>` so callers can
    /// tell apart regions serving the same logical model.
    pub model: String,
    pub choices: Vec<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}
