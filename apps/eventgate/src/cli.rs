use clap::Parser;

use eventgate_common::{PoolSettings, SettingsPatch, UsageFailurePolicy};

#[derive(Parser)]
#[command(name = "eventgate")]
pub(crate) struct Cli {
    /// Database DSN, e.g. postgres://... or sqlite://eventgate.db
    #[arg(long)]
    pub(crate) dsn: Option<String>,
    #[arg(long)]
    pub(crate) host: Option<String>,
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Authorization cache TTL in seconds.
    #[arg(long)]
    pub(crate) auth_cache_ttl: Option<u64>,
    /// Deployment catalog cache TTL in seconds.
    #[arg(long)]
    pub(crate) catalog_cache_ttl: Option<u64>,
    /// Local limiter budget per caller per minute.
    #[arg(long)]
    pub(crate) calls_per_minute: Option<u32>,
    /// Fail requests with 502 when the usage write fails.
    #[arg(long, default_value_t = false)]
    pub(crate) strict_usage_logging: bool,
    /// Recycle database connections after this many seconds.
    #[arg(long)]
    pub(crate) pool_recycle_secs: Option<u64>,
}

impl Cli {
    pub(crate) fn patch(&self) -> SettingsPatch {
        SettingsPatch {
            host: self.host.clone(),
            port: self.port,
            dsn: self.dsn.clone(),
            auth_cache_ttl_secs: self.auth_cache_ttl,
            catalog_cache_ttl_secs: self.catalog_cache_ttl,
            cache_capacity: None,
            calls_per_minute: self.calls_per_minute,
            usage_failure_policy: self
                .strict_usage_logging
                .then_some(UsageFailurePolicy::FailRequest),
            pool: self.pool_recycle_secs.map(|secs| PoolSettings {
                recycle_after_secs: secs,
                ..PoolSettings::default()
            }),
        }
    }
}

/// Settings sourced from the environment; overridden by CLI flags.
pub(crate) fn env_patch() -> SettingsPatch {
    SettingsPatch {
        host: std::env::var("EVENTGATE_HOST").ok(),
        port: std::env::var("EVENTGATE_PORT")
            .ok()
            .and_then(|value| value.parse().ok()),
        dsn: std::env::var("EVENTGATE_DSN").ok(),
        ..SettingsPatch::default()
    }
}
