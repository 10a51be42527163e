use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("db error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("database unavailable: {0}")]
    Unavailable(String),
    #[error("serde json error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Row returned by the single authorization round-trip. `None` from the
/// store means no active, in-window attendee matched; the caller cannot
/// distinguish a missing key from an expired event, by design.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizedRow {
    pub attendee_key: Uuid,
    pub event_id: i64,
    pub event_code: String,
    pub event_name: String,
    pub max_token_cap: i64,
    pub daily_request_cap: i64,
    /// Set when the attendee's daily counter has passed the cap. The
    /// counter is still rolled, so repeat offenders keep this set.
    pub rate_limit_exceed: bool,
    pub organizer_name: String,
    pub organizer_email: String,
    pub event_url: Option<String>,
    pub event_url_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRow {
    /// Catalog identity used for usage attribution.
    pub catalog_id: i64,
    pub event_id: i64,
    pub deployment_name: String,
    pub model_class: String,
    pub endpoint_url: String,
    pub endpoint_key: String,
    pub location: String,
}

#[derive(Debug, Clone)]
pub struct UsageRow {
    pub attendee_key: Uuid,
    pub event_id: i64,
    pub catalog_id: Option<i64>,
    pub deployment_name: String,
    pub usage: serde_json::Value,
    pub at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct EventInput {
    pub event_code: String,
    pub event_name: String,
    pub active: bool,
    pub start_utc: OffsetDateTime,
    pub end_utc: OffsetDateTime,
    pub max_token_cap: i64,
    pub daily_request_cap: i64,
    pub organizer_name: String,
    pub organizer_email: String,
    pub event_url: Option<String>,
    pub event_url_text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeploymentInput {
    pub event_id: i64,
    pub deployment_name: String,
    pub model_class: String,
    pub endpoint_url: String,
    pub endpoint_key: String,
    pub location: String,
    pub active: bool,
}

/// The only store surface the core depends on:
/// - one authorization round-trip (event window + quota + identity),
/// - deployment listing for catalog/caching,
/// - usage metric appends,
/// - management upserts (admin tooling and tests; rows are
///   soft-deactivated, never hard-deleted).
#[async_trait]
pub trait Storage: Send + Sync {
    /// Entity-first schema sync. Enabled by default at bootstrap.
    async fn sync(&self) -> StorageResult<()>;

    /// Resolve an attendee's authorization in one atomic step: match
    /// (event_code, api_key) against an active attendee of an active,
    /// in-window event, roll the daily counter, and report whether the
    /// daily cap is exceeded.
    async fn attendee_authorized(
        &self,
        event_code: &str,
        api_key: Uuid,
    ) -> StorageResult<Option<AuthorizedRow>>;

    /// Active deployments for an event, optionally narrowed by model
    /// class and/or the caller-requested deployment name.
    async fn deployments_for_event(
        &self,
        event_id: i64,
        model_class: Option<&str>,
        deployment_name: Option<&str>,
    ) -> StorageResult<Vec<DeploymentRow>>;

    async fn record_usage(&self, row: UsageRow) -> StorageResult<()>;

    async fn upsert_event(&self, input: EventInput) -> StorageResult<i64>;
    async fn upsert_attendee(
        &self,
        event_id: i64,
        api_key: Uuid,
        active: bool,
    ) -> StorageResult<()>;
    async fn upsert_deployment(&self, input: DeploymentInput) -> StorageResult<i64>;
}
