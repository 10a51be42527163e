use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use eventgate_storage::{DeploymentRow, Storage};

use crate::authorize::AuthorizedCall;
use crate::cache::ExpiringCache;
use crate::error::GatewayError;

type CatalogKey = (i64, Option<String>, Option<String>);

/// Maps an authorized event to a concrete backend deployment. Listings
/// are cached with a TTL; selection among matches is uniformly random,
/// a deliberate simplicity tradeoff over health- or load-weighted
/// balancing.
pub struct Catalog {
    storage: Arc<dyn Storage>,
    cache: ExpiringCache<CatalogKey, Arc<Vec<DeploymentRow>>>,
}

impl Catalog {
    pub fn new(storage: Arc<dyn Storage>, capacity: u64, ttl: Duration) -> Self {
        Self {
            storage,
            cache: ExpiringCache::new(capacity, ttl),
        }
    }

    /// Pick a deployment for the call's event and the given model class,
    /// honoring an explicit deployment name when the route carried one.
    /// On success the selection is attached to the call for usage
    /// attribution.
    pub async fn select_for(
        &self,
        call: &mut AuthorizedCall,
        model_class: &str,
    ) -> Result<DeploymentRow, GatewayError> {
        let deployments = self
            .event_catalog(
                call.event_id,
                Some(model_class.to_string()),
                call.deployment_name.clone(),
            )
            .await?;

        if deployments.is_empty() {
            warn!(
                event_code = %call.event_code,
                model_class,
                "no active deployments for event"
            );
            let available = match self.event_capabilities(call).await {
                Ok(capabilities) => format_capabilities(&capabilities),
                Err(_) => String::new(),
            };
            return Err(GatewayError::NoDeploymentAvailable { available });
        }

        let index = rand::rng().random_range(0..deployments.len());
        let deployment = deployments[index].clone();
        call.catalog_id = Some(deployment.catalog_id);
        call.selected_deployment = Some(deployment.deployment_name.clone());
        Ok(deployment)
    }

    /// Model class -> deployment names registered for the call's event.
    pub async fn event_capabilities(
        &self,
        call: &AuthorizedCall,
    ) -> Result<BTreeMap<String, Vec<String>>, GatewayError> {
        let deployments = self.event_catalog(call.event_id, None, None).await?;

        let mut capabilities: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for deployment in deployments.iter() {
            capabilities
                .entry(deployment.model_class.clone())
                .or_default()
                .push(deployment.deployment_name.clone());
        }
        Ok(capabilities)
    }

    async fn event_catalog(
        &self,
        event_id: i64,
        model_class: Option<String>,
        deployment_name: Option<String>,
    ) -> Result<Arc<Vec<DeploymentRow>>, GatewayError> {
        let key = (event_id, model_class.clone(), deployment_name.clone());
        self.cache
            .get_or_compute(key, async {
                self.storage
                    .deployments_for_event(
                        event_id,
                        model_class.as_deref(),
                        deployment_name.as_deref(),
                    )
                    .await
                    .map(Arc::new)
                    .map_err(GatewayError::from)
            })
            .await
    }
}

fn format_capabilities(capabilities: &BTreeMap<String, Vec<String>>) -> String {
    if capabilities.is_empty() {
        return "This event has no deployments registered.".to_string();
    }
    let listing = capabilities
        .iter()
        .map(|(model_class, names)| format!("{model_class}: {}", names.join(", ")))
        .collect::<Vec<_>>()
        .join("; ");
    format!("Available for this event -> {listing}")
}
