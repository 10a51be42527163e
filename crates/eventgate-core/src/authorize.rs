use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use serde_json::Value as JsonValue;
use tracing::warn;
use uuid::Uuid;

use eventgate_storage::Storage;

use crate::cache::ExpiringCache;
use crate::error::GatewayError;

const MIN_EVENT_CODE_LENGTH: usize = 6;
const MAX_EVENT_CODE_LENGTH: usize = 40;
/// Characters excluded from event codes; they collide with path and
/// key-encoding syntax elsewhere in the system.
const RESERVED_EVENT_CODE_CHARS: [char; 7] = ['\\', '/', '#', '?', '\t', '\n', '\r'];

/// Token cap applied when an event row carries no usable cap of its own.
const FALLBACK_MAX_TOKEN_CAP: i64 = 512;

/// The authorization context for one request. Produced by `Authorizer`,
/// then enriched in place along the pipeline: catalog selection attaches
/// the deployment identity, execution attaches usage, and the monitor
/// consumes the finished value.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizedCall {
    pub attendee_key: Uuid,
    pub event_id: i64,
    pub event_code: String,
    pub event_name: String,
    pub max_token_cap: i64,
    pub daily_request_cap: i64,
    pub organizer_name: String,
    pub organizer_email: String,
    pub event_url: Option<String>,
    pub event_url_text: Option<String>,
    /// Deployment name the caller asked for, when the route carries one.
    pub deployment_name: Option<String>,
    /// Catalog identity of the selected deployment, once selected.
    pub catalog_id: Option<i64>,
    /// Deployment name actually selected, once selected.
    pub selected_deployment: Option<String>,
    /// Usage figures attached after the backend call completes.
    pub usage: Option<JsonValue>,
}

type AuthCacheKey = (String, Option<String>);

/// Validates caller credentials against the store, behind the expiring
/// cache so repeat calls inside the TTL cost no store round-trip. The
/// TTL is therefore also the upper bound on daily-quota staleness; cap
/// crossings are detected at the next cache miss. Quota rejections are
/// errors and never cached, so a throttled caller is re-checked every
/// time.
pub struct Authorizer {
    storage: Arc<dyn Storage>,
    cache: ExpiringCache<AuthCacheKey, AuthorizedCall>,
}

impl Authorizer {
    pub fn new(storage: Arc<dyn Storage>, capacity: u64, ttl: Duration) -> Self {
        Self {
            storage,
            cache: ExpiringCache::new(capacity, ttl),
        }
    }

    pub async fn authorize(
        &self,
        headers: &HeaderMap,
        deployment_name: Option<&str>,
    ) -> Result<AuthorizedCall, GatewayError> {
        let access_token = extract_access_token(headers)?;
        let key = (access_token.clone(), deployment_name.map(str::to_string));
        self.cache
            .get_or_compute(key, self.check_access(access_token, deployment_name))
            .await
    }

    async fn check_access(
        &self,
        access_token: String,
        deployment_name: Option<&str>,
    ) -> Result<AuthorizedCall, GatewayError> {
        let (event_code, api_key) = parse_access_token(&access_token)?;

        let row = self
            .storage
            .attendee_authorized(&event_code, api_key)
            .await
            .map_err(|err| {
                warn!(error = %err, "authorization store round-trip failed");
                GatewayError::StoreUnavailable
            })?
            .ok_or(GatewayError::Unauthorized)?;

        if row.rate_limit_exceed {
            return Err(GatewayError::DailyCapExceeded {
                cap: row.daily_request_cap,
            });
        }

        let max_token_cap = if row.max_token_cap > 0 {
            row.max_token_cap
        } else {
            FALLBACK_MAX_TOKEN_CAP
        };

        Ok(AuthorizedCall {
            attendee_key: row.attendee_key,
            event_id: row.event_id,
            event_code: row.event_code,
            event_name: row.event_name,
            max_token_cap,
            daily_request_cap: row.daily_request_cap,
            organizer_name: row.organizer_name,
            organizer_email: row.organizer_email,
            event_url: row.event_url,
            event_url_text: row.event_url_text,
            deployment_name: deployment_name.map(str::to_string),
            catalog_id: None,
            selected_deployment: None,
            usage: None,
        })
    }
}

/// Pull the access token from `api-key` (Azure-style SDKs) or
/// `Authorization: Bearer` (OpenAI-style SDKs).
fn extract_access_token(headers: &HeaderMap) -> Result<String, GatewayError> {
    if let Some(value) = headers.get("api-key")
        && let Ok(token) = value.to_str()
        && !token.trim().is_empty()
    {
        return Ok(token.trim().to_string());
    }

    let auth = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .ok_or(GatewayError::Unauthorized)?;
    let mut parts = auth.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => {
            Ok(token.to_string())
        }
        _ => Err(GatewayError::Unauthorized),
    }
}

/// Split and validate the `event_code/attendee_key` token purely
/// syntactically. Anything rejected here never reaches the store.
fn parse_access_token(access_token: &str) -> Result<(String, Uuid), GatewayError> {
    let mut parts = access_token.split('/');
    let (Some(event_code), Some(key_part), None) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(GatewayError::Unauthorized);
    };

    let event_code = event_code.trim();
    if event_code.len() < MIN_EVENT_CODE_LENGTH || event_code.len() > MAX_EVENT_CODE_LENGTH {
        return Err(GatewayError::Unauthorized);
    }
    if event_code
        .chars()
        .any(|c| RESERVED_EVENT_CODE_CHARS.contains(&c) || !(c.is_ascii_graphic() || c == ' '))
    {
        return Err(GatewayError::Unauthorized);
    }

    let api_key = Uuid::parse_str(key_part.trim()).map_err(|_| GatewayError::Unauthorized)?;

    Ok((event_code.to_string(), api_key))
}
