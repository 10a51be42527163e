use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EmbeddingsRequestBody {
    /// Must be non-empty (enforced at validation).
    pub input: EmbeddingInput,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Many(Vec<String>),
}

impl EmbeddingInput {
    pub fn is_empty(&self) -> bool {
        match self {
            EmbeddingInput::Single(input) => input.is_empty(),
            EmbeddingInput::Many(inputs) => inputs.is_empty(),
        }
    }
}
