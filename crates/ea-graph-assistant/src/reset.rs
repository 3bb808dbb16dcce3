//! Batched Reset Controller
//!
//! Empties the workspace datastore in bounded delete batches:
//! `Start → verify workspace → loop[delete batch → count] → Done | Aborted`.
//! Batches run strictly one after another.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{AssistantError, AssistantResult};
use crate::graph_session::{ConnectionManager, Params, Row};
use crate::metrics;
use crate::target::DatastoreTarget;

const DELETE_BATCH: &str = "MATCH (n) WITH n LIMIT $batch DETACH DELETE n RETURN count(n) AS deleted";
const DELETE_BATCH_PRESERVING: &str = "MATCH (n) WHERE none(l IN labels(n) WHERE l IN $preserve) \
     WITH n LIMIT $batch DETACH DELETE n RETURN count(n) AS deleted";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetConfig {
    pub batch_size: u32,
    pub max_batches: u32,
    /// Nodes carrying any of these labels survive a reset. Empty deletes
    /// everything.
    pub preserve_labels: Vec<String>,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_batches: 10_000,
            preserve_labels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    pub deleted: u64,
    /// Batches that deleted at least one node.
    pub batches: u32,
}

pub struct BatchedResetController {
    manager: Arc<ConnectionManager>,
    config: ResetConfig,
}

impl BatchedResetController {
    pub fn new(manager: Arc<ConnectionManager>, config: ResetConfig) -> Self {
        Self { manager, config }
    }

    /// Deletes workspace nodes until a batch comes back short. Refuses to
    /// touch anything unless the workspace target is already active.
    ///
    /// Every batch goes to the workspace session that was live when the reset
    /// started. A concurrent switch closes that session, so the remaining
    /// batches fail rather than reach the primary dataset.
    pub async fn reset(&self) -> AssistantResult<ResetReport> {
        let session = self
            .manager
            .session_for(DatastoreTarget::Workspace)
            .map_err(|e| {
                warn!("Refusing reset: {}", e);
                e
            })?;

        let (query, params) = self.delete_batch();
        let cap = u64::from(self.config.batch_size);
        let mut report = ResetReport { deleted: 0, batches: 0 };

        info!(
            "Resetting workspace in batches of {} (preserving {:?})",
            self.config.batch_size, self.config.preserve_labels
        );

        for _ in 0..self.config.max_batches {
            let rows = session.write(query, &params).await?;
            metrics::inc_reset_batch();
            let deleted = deleted_count(&rows)?;
            if deleted == 0 {
                break;
            }

            report.deleted += deleted;
            report.batches += 1;
            debug!("Reset batch {} deleted {} nodes", report.batches, deleted);

            if deleted < cap {
                info!("Workspace reset complete: {} nodes in {} batches", report.deleted, report.batches);
                return Ok(report);
            }
        }

        if report.deleted > 0 && report.batches == self.config.max_batches {
            warn!("Reset hit the batch limit after deleting {} nodes", report.deleted);
            return Err(AssistantError::BatchLimitExceeded {
                deleted: report.deleted,
                batches: report.batches,
            });
        }

        info!("Workspace reset complete: {} nodes in {} batches", report.deleted, report.batches);
        Ok(report)
    }

    fn delete_batch(&self) -> (&'static str, Params) {
        let mut params = Params::new();
        params.insert("batch".to_string(), Value::from(self.config.batch_size));
        if self.config.preserve_labels.is_empty() {
            (DELETE_BATCH, params)
        } else {
            params.insert(
                "preserve".to_string(),
                Value::from(self.config.preserve_labels.clone()),
            );
            (DELETE_BATCH_PRESERVING, params)
        }
    }
}

fn deleted_count(rows: &[Row]) -> AssistantResult<u64> {
    rows.first()
        .and_then(|row| row.get("deleted"))
        .and_then(Value::as_u64)
        .ok_or_else(|| AssistantError::Protocol("delete batch did not report a 'deleted' count".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{row, sample_targets, FakeSessionFactory};
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    /// Fake backend holding `nodes` deletable nodes.
    async fn workspace_with(nodes: u64) -> (Arc<FakeSessionFactory>, Arc<ConnectionManager>, Arc<AtomicU64>) {
        let factory = FakeSessionFactory::new();
        let remaining = Arc::new(AtomicU64::new(nodes));
        let counter = remaining.clone();
        factory.respond(move |call| {
            let batch = call.params["batch"].as_u64().unwrap_or(0);
            let current = counter.load(Ordering::SeqCst);
            let deleted = current.min(batch);
            counter.store(current - deleted, Ordering::SeqCst);
            Ok(vec![row(json!({ "deleted": deleted }))])
        });
        let manager = Arc::new(ConnectionManager::new(factory.clone(), sample_targets()));
        manager.ensure_active(DatastoreTarget::Workspace).await.unwrap();
        (factory, manager, remaining)
    }

    fn config(batch_size: u32, max_batches: u32) -> ResetConfig {
        ResetConfig { batch_size, max_batches, preserve_labels: Vec::new() }
    }

    #[tokio::test]
    async fn test_reset_deletes_everything_in_ceil_batches() {
        let (factory, manager, remaining) = workspace_with(2500).await;
        let controller = BatchedResetController::new(manager, config(1000, 100));

        let report = controller.reset().await.unwrap();
        assert_eq!(report, ResetReport { deleted: 2500, batches: 3 });
        assert_eq!(remaining.load(Ordering::SeqCst), 0);
        assert_eq!(factory.writes().len(), 3);
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_one_confirming_batch() {
        let (factory, manager, _) = workspace_with(2000).await;
        let controller = BatchedResetController::new(manager, config(1000, 100));

        let report = controller.reset().await.unwrap();
        assert_eq!(report, ResetReport { deleted: 2000, batches: 2 });
        // The third write observes zero deletions and ends the loop.
        assert_eq!(factory.writes().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_workspace() {
        let (_, manager, _) = workspace_with(0).await;
        let controller = BatchedResetController::new(manager, config(1000, 100));

        assert_eq!(controller.reset().await.unwrap(), ResetReport { deleted: 0, batches: 0 });
    }

    #[tokio::test]
    async fn test_batch_limit_reports_partial_count() {
        let (_, manager, remaining) = workspace_with(10_000).await;
        let controller = BatchedResetController::new(manager, config(100, 5));

        let err = controller.reset().await.unwrap_err();
        assert!(matches!(
            err,
            AssistantError::BatchLimitExceeded { deleted: 500, batches: 5 }
        ));
        assert_eq!(remaining.load(Ordering::SeqCst), 9_500);
    }

    #[tokio::test]
    async fn test_refuses_on_primary_with_zero_writes() {
        let (factory, manager, remaining) = workspace_with(50).await;
        manager.ensure_active(DatastoreTarget::Primary).await.unwrap();
        let controller = BatchedResetController::new(manager, config(10, 100));

        let err = controller.reset().await.unwrap_err();
        assert!(matches!(
            err,
            AssistantError::WrongTarget {
                active: Some(DatastoreTarget::Primary),
                required: DatastoreTarget::Workspace
            }
        ));
        assert!(factory.writes().is_empty());
        assert_eq!(remaining.load(Ordering::SeqCst), 50);
    }

    #[tokio::test]
    async fn test_refuses_when_disconnected() {
        let factory = FakeSessionFactory::new();
        let manager = Arc::new(ConnectionManager::new(factory.clone(), sample_targets()));
        let controller = BatchedResetController::new(manager, ResetConfig::default());

        let err = controller.reset().await.unwrap_err();
        assert!(matches!(err, AssistantError::WrongTarget { active: None, .. }));
        assert_eq!(factory.connect_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_switch_mid_reset_never_deletes_on_primary() {
        let (factory, manager, _) = workspace_with(10_000).await;
        factory.set_call_delay(Duration::from_millis(2));
        let controller = BatchedResetController::new(manager.clone(), config(1, 200));

        let reset = tokio::spawn(async move { controller.reset().await });
        tokio::time::sleep(Duration::from_millis(40)).await;
        manager.ensure_active(DatastoreTarget::Primary).await.unwrap();

        let result = reset.await.unwrap();
        assert!(matches!(result, Err(AssistantError::Backend(_))), "got {:?}", result);
        assert_eq!(manager.current_target(), Some(DatastoreTarget::Primary));

        let writes = factory.writes();
        assert!(!writes.is_empty());
        assert!(writes.iter().all(|w| w.target == DatastoreTarget::Workspace));
    }

    #[tokio::test]
    async fn test_preserve_labels_use_filtered_delete() {
        let (factory, manager, _) = workspace_with(5).await;
        let controller = BatchedResetController::new(
            manager,
            ResetConfig {
                preserve_labels: vec!["Viewpoint".into(), "Metadata".into()],
                ..config(10, 10)
            },
        );

        controller.reset().await.unwrap();
        let writes = factory.writes();
        assert!(writes[0].query.contains("none(l IN labels(n) WHERE l IN $preserve)"));
        assert_eq!(writes[0].params["preserve"], json!(["Viewpoint", "Metadata"]));
        assert_eq!(writes[0].params["batch"], json!(10));
    }

    #[tokio::test]
    async fn test_missing_deleted_column_is_protocol_error() {
        let factory = FakeSessionFactory::new();
        factory.respond(|_| Ok(vec![row(json!({ "count": 3 }))]));
        let manager = Arc::new(ConnectionManager::new(factory, sample_targets()));
        manager.ensure_active(DatastoreTarget::Workspace).await.unwrap();

        let err = BatchedResetController::new(manager, ResetConfig::default()).reset().await.unwrap_err();
        assert!(matches!(err, AssistantError::Protocol(_)));
    }
}
