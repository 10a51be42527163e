use std::sync::Arc;

use time::OffsetDateTime;
use tracing::warn;

use eventgate_common::UsageFailurePolicy;
use eventgate_storage::{Storage, UsageRow};

use crate::authorize::AuthorizedCall;
use crate::error::GatewayError;

/// Persists one usage record per completed call. The write is awaited by
/// the pipeline so its ordering relative to the response is fixed, but a
/// store failure is never silent: it is logged, and under the
/// fail-request policy it also fails the call with 502.
pub struct UsageMonitor {
    storage: Arc<dyn Storage>,
    policy: UsageFailurePolicy,
}

impl UsageMonitor {
    pub fn new(storage: Arc<dyn Storage>, policy: UsageFailurePolicy) -> Self {
        Self { storage, policy }
    }

    pub async fn log_call(&self, call: &AuthorizedCall) -> Result<(), GatewayError> {
        let row = UsageRow {
            attendee_key: call.attendee_key,
            event_id: call.event_id,
            catalog_id: call.catalog_id,
            deployment_name: call
                .selected_deployment
                .clone()
                .or_else(|| call.deployment_name.clone())
                .unwrap_or_default(),
            usage: call
                .usage
                .clone()
                .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())),
            at: OffsetDateTime::now_utc(),
        };

        match self.storage.record_usage(row).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(
                    event_code = %call.event_code,
                    catalog_id = ?call.catalog_id,
                    error = %err,
                    "usage record write failed"
                );
                match self.policy {
                    UsageFailurePolicy::LogAndContinue => Ok(()),
                    UsageFailurePolicy::FailRequest => Err(GatewayError::UsageLogFailed),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use eventgate_storage::{
        AuthorizedRow, DeploymentInput, DeploymentRow, EventInput, StorageError, StorageResult,
    };
    use uuid::Uuid;

    use super::*;

    struct RecordingStorage {
        fail: bool,
        rows: Mutex<Vec<UsageRow>>,
    }

    impl RecordingStorage {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                rows: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Storage for RecordingStorage {
        async fn sync(&self) -> StorageResult<()> {
            Ok(())
        }

        async fn attendee_authorized(
            &self,
            _event_code: &str,
            _api_key: Uuid,
        ) -> StorageResult<Option<AuthorizedRow>> {
            Ok(None)
        }

        async fn deployments_for_event(
            &self,
            _event_id: i64,
            _model_class: Option<&str>,
            _deployment_name: Option<&str>,
        ) -> StorageResult<Vec<DeploymentRow>> {
            Ok(Vec::new())
        }

        async fn record_usage(&self, row: UsageRow) -> StorageResult<()> {
            if self.fail {
                return Err(StorageError::Unavailable("queue full".to_string()));
            }
            self.rows.lock().expect("rows lock").push(row);
            Ok(())
        }

        async fn upsert_event(&self, _input: EventInput) -> StorageResult<i64> {
            Ok(0)
        }

        async fn upsert_attendee(
            &self,
            _event_id: i64,
            _api_key: Uuid,
            _active: bool,
        ) -> StorageResult<()> {
            Ok(())
        }

        async fn upsert_deployment(&self, _input: DeploymentInput) -> StorageResult<i64> {
            Ok(0)
        }
    }

    fn finished_call() -> AuthorizedCall {
        AuthorizedCall {
            attendee_key: Uuid::new_v4(),
            event_id: 3,
            event_code: "eventabc".to_string(),
            event_name: "Example".to_string(),
            max_token_cap: 1024,
            daily_request_cap: 256,
            organizer_name: "Org".to_string(),
            organizer_email: "org@example.com".to_string(),
            event_url: None,
            event_url_text: None,
            deployment_name: Some("gpt-4".to_string()),
            catalog_id: Some(11),
            selected_deployment: Some("gpt-4".to_string()),
            usage: Some(serde_json::json!({"total_tokens": 17})),
        }
    }

    #[tokio::test]
    async fn usage_is_recorded_with_attribution() {
        let storage = RecordingStorage::new(false);
        let monitor = UsageMonitor::new(storage.clone(), UsageFailurePolicy::LogAndContinue);

        monitor.log_call(&finished_call()).await.expect("logged");

        let rows = storage.rows.lock().expect("rows lock");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].catalog_id, Some(11));
        assert_eq!(rows[0].deployment_name, "gpt-4");
        assert_eq!(rows[0].usage["total_tokens"], 17);
    }

    #[tokio::test]
    async fn log_and_continue_swallows_store_failures() {
        let monitor =
            UsageMonitor::new(RecordingStorage::new(true), UsageFailurePolicy::LogAndContinue);
        monitor
            .log_call(&finished_call())
            .await
            .expect("failure swallowed under log-and-continue");
    }

    #[tokio::test]
    async fn fail_request_surfaces_store_failures() {
        let monitor =
            UsageMonitor::new(RecordingStorage::new(true), UsageFailurePolicy::FailRequest);
        let err = monitor.log_call(&finished_call()).await.unwrap_err();
        assert_eq!(err, GatewayError::UsageLogFailed);
    }
}
