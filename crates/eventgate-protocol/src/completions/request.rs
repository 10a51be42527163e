use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CompletionsRequestBody {
    /// Must be non-empty (enforced at validation).
    pub prompt: PromptInput,
    /// Clamped to the event's max-token cap before forwarding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub frequency_penalty: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub presence_penalty: f64,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptInput {
    Single(String),
    Many(Vec<String>),
}

impl PromptInput {
    pub fn is_empty(&self) -> bool {
        match self {
            PromptInput::Single(prompt) => prompt.is_empty(),
            PromptInput::Many(prompts) => prompts.is_empty(),
        }
    }
}

fn is_zero(value: &f64) -> bool {
    *value == 0.0
}
