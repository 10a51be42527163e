use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("missing required setting: {0}")]
    MissingField(&'static str),
}

/// Default upstream API versions, one per capability. A caller-supplied
/// `api-version` query parameter overrides these per request.
pub const DEFAULT_CHAT_API_VERSION: &str = "2023-09-01-preview";
pub const DEFAULT_COMPLETIONS_API_VERSION: &str = "2023-09-01-preview";
pub const DEFAULT_EMBEDDINGS_API_VERSION: &str = "2023-08-01-preview";
pub const DEFAULT_IMAGES_API_VERSION: &str = "2023-06-01-preview";

/// What to do when writing a usage record fails after a successful call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageFailurePolicy {
    /// Log the failure and return the upstream response anyway.
    #[default]
    LogAndContinue,
    /// Fail the request with 502 so no call goes unmetered.
    FailRequest,
}

/// Final, merged process configuration.
///
/// Merge order: CLI > ENV > defaults (see `SettingsPatch::overlay`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Database DSN used for this process.
    pub dsn: String,
    /// Authorization cache TTL. Also the upper bound on daily-quota
    /// staleness: a caller crossing its cap store-side may keep passing
    /// until this expires.
    pub auth_cache_ttl_secs: u64,
    /// Deployment catalog cache TTL.
    pub catalog_cache_ttl_secs: u64,
    /// Max entries per in-process cache.
    pub cache_capacity: u64,
    /// Local limiter budget; the enforced window is this divided by 6
    /// per 10 seconds, per caller, per process instance.
    pub calls_per_minute: u32,
    pub usage_failure_policy: UsageFailurePolicy,
    pub pool: PoolSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    /// Pool age after which connections are recycled wholesale, so
    /// credentials minted at connect time do not outlive their tokens.
    pub recycle_after_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 200,
            acquire_timeout_secs: 30,
            recycle_after_secs: 4 * 60 * 60,
        }
    }
}

impl PoolSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn recycle_after(&self) -> Duration {
        Duration::from_secs(self.recycle_after_secs)
    }
}

impl Settings {
    pub fn auth_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.auth_cache_ttl_secs)
    }

    pub fn catalog_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_cache_ttl_secs)
    }
}

/// Optional layer used when merging settings from several sources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dsn: Option<String>,
    pub auth_cache_ttl_secs: Option<u64>,
    pub catalog_cache_ttl_secs: Option<u64>,
    pub cache_capacity: Option<u64>,
    pub calls_per_minute: Option<u32>,
    pub usage_failure_policy: Option<UsageFailurePolicy>,
    pub pool: Option<PoolSettings>,
}

impl SettingsPatch {
    pub fn overlay(&mut self, other: SettingsPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.dsn.is_some() {
            self.dsn = other.dsn;
        }
        if other.auth_cache_ttl_secs.is_some() {
            self.auth_cache_ttl_secs = other.auth_cache_ttl_secs;
        }
        if other.catalog_cache_ttl_secs.is_some() {
            self.catalog_cache_ttl_secs = other.catalog_cache_ttl_secs;
        }
        if other.cache_capacity.is_some() {
            self.cache_capacity = other.cache_capacity;
        }
        if other.calls_per_minute.is_some() {
            self.calls_per_minute = other.calls_per_minute;
        }
        if other.usage_failure_policy.is_some() {
            self.usage_failure_policy = other.usage_failure_policy;
        }
        if other.pool.is_some() {
            self.pool = other.pool;
        }
    }

    pub fn into_settings(self) -> Result<Settings, SettingsError> {
        Ok(Settings {
            host: self.host.unwrap_or_else(|| "0.0.0.0".to_string()),
            port: self.port.unwrap_or(5500),
            dsn: self.dsn.ok_or(SettingsError::MissingField("dsn"))?,
            auth_cache_ttl_secs: self.auth_cache_ttl_secs.unwrap_or(180),
            catalog_cache_ttl_secs: self.catalog_cache_ttl_secs.unwrap_or(300),
            cache_capacity: self.cache_capacity.unwrap_or(128),
            calls_per_minute: self.calls_per_minute.unwrap_or(1440),
            usage_failure_policy: self.usage_failure_policy.unwrap_or_default(),
            pool: self.pool.unwrap_or_default(),
        })
    }
}

impl From<Settings> for SettingsPatch {
    fn from(value: Settings) -> Self {
        Self {
            host: Some(value.host),
            port: Some(value.port),
            dsn: Some(value.dsn),
            auth_cache_ttl_secs: Some(value.auth_cache_ttl_secs),
            catalog_cache_ttl_secs: Some(value.catalog_cache_ttl_secs),
            cache_capacity: Some(value.cache_capacity),
            calls_per_minute: Some(value.calls_per_minute),
            usage_failure_policy: Some(value.usage_failure_policy),
            pool: Some(value.pool),
        }
    }
}
