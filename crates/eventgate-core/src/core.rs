use std::sync::Arc;

use axum::Router;
use axum::routing::post;

use eventgate_common::Settings;
use eventgate_storage::Storage;

use crate::authorize::Authorizer;
use crate::catalog::Catalog;
use crate::handler;
use crate::monitor::UsageMonitor;
use crate::rate_limit::RateLimiter;
use crate::upstream::BackendExecutor;

/// Everything a request handler needs, built once at startup and passed
/// by reference into every pipeline invocation. No ambient globals.
pub struct GatewayState {
    pub authorizer: Authorizer,
    pub catalog: Catalog,
    pub rate_limiter: RateLimiter,
    pub monitor: UsageMonitor,
    pub executor: Arc<dyn BackendExecutor>,
}

pub struct Gateway {
    state: Arc<GatewayState>,
}

impl Gateway {
    pub fn new(
        settings: &Settings,
        storage: Arc<dyn Storage>,
        executor: Arc<dyn BackendExecutor>,
    ) -> Self {
        let state = GatewayState {
            authorizer: Authorizer::new(
                storage.clone(),
                settings.cache_capacity,
                settings.auth_cache_ttl(),
            ),
            catalog: Catalog::new(
                storage.clone(),
                settings.cache_capacity,
                settings.catalog_cache_ttl(),
            ),
            rate_limiter: RateLimiter::new(settings.calls_per_minute),
            monitor: UsageMonitor::new(storage, settings.usage_failure_policy),
            executor,
        };
        Self {
            state: Arc::new(state),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            // OpenAI-style SDKs.
            .route("/v1/chat/completions", post(handler::chat_completions))
            .route("/v1/completions", post(handler::completions))
            .route("/v1/embeddings", post(handler::embeddings))
            .route("/v1/images/generations", post(handler::images_generations))
            // Azure-style SDKs, deployment-scoped.
            .route(
                "/v1/openai/deployments/{deployment}/chat/completions",
                post(handler::chat_completions_deployment),
            )
            .route(
                "/v1/openai/deployments/{deployment}/extensions/chat/completions",
                post(handler::chat_extensions_deployment),
            )
            .route(
                "/v1/openai/deployments/{deployment}/completions",
                post(handler::completions_deployment),
            )
            .route(
                "/v1/openai/deployments/{deployment}/embeddings",
                post(handler::embeddings_deployment),
            )
            .route(
                "/v1/openai/deployments/{deployment}/images/generations",
                post(handler::images_generations_deployment),
            )
            // Legacy engine-scoped SDK shim.
            .route(
                "/v1/engines/{engine}/completions",
                post(handler::completions_deployment),
            )
            .route(
                "/v1/engines/{engine}/embeddings",
                post(handler::embeddings_deployment),
            )
            // Playground introspection.
            .route("/v1/eventinfo", post(handler::event_info))
            .with_state(self.state.clone())
    }

    pub fn state(&self) -> Arc<GatewayState> {
        self.state.clone()
    }
}
