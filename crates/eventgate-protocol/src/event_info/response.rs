use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Authorization snapshot plus the capability map for the caller's event,
/// served to playground-style clients probing what an event can do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EventInfoResponse {
    pub is_authorized: bool,
    pub max_token_cap: i64,
    pub daily_request_cap: i64,
    pub event_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_url_text: Option<String>,
    pub organizer_name: String,
    pub organizer_email: String,
    /// model class -> deployment names registered for the event.
    pub capabilities: BTreeMap<String, Vec<String>>,
}
