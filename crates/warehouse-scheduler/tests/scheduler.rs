use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use warehouse_model::{StorageFormat, Transformation, View, ViewId};
use warehouse_scheduler::{
    ActionRunner, CoordinatorHandle, MaterializeReply, RuntimeError, SchedulerConfig,
    SchemaService, ToCoordinator, UserIdentity, ViewManager, VersionCheck,
};

/// An in-memory `ActionRunner`. Every submission succeeds immediately
/// unless `fail_next` has armed a number of synthetic failures for that
/// view, in which case it reports `ActionFailure` that many times before
/// succeeding.
#[derive(Default)]
struct FakeActionRunner {
    markers: Mutex<HashSet<String>>,
    pending_failures: Mutex<HashMap<ViewId, u32>>,
    submissions: Mutex<Vec<(ViewId, u64)>>,
}

impl FakeActionRunner {
    fn fail_next(&self, view: ViewId, times: u32) {
        self.pending_failures.lock().unwrap().insert(view, times);
    }

    fn plant_marker(&self, path: &str) {
        self.markers.lock().unwrap().insert(path.to_string());
    }

    fn submission_count(&self, view: ViewId) -> usize {
        self.submissions.lock().unwrap().iter().filter(|(v, _)| *v == view).count()
    }
}

#[async_trait::async_trait]
impl ActionRunner for FakeActionRunner {
    async fn submit_transformation(&self, view: Arc<View>, reply_to: CoordinatorHandle, round: u64) {
        self.submissions.lock().unwrap().push((view.id, round));

        let remaining = {
            let mut pending = self.pending_failures.lock().unwrap();
            let slot = pending.entry(view.id).or_insert(0);
            if *slot > 0 {
                *slot -= 1;
                true
            } else {
                false
            }
        };

        tokio::spawn(async move {
            if remaining {
                reply_to.send(ToCoordinator::ActionFailure {
                    round,
                    reason: "synthetic failure".to_string(),
                });
            } else {
                reply_to.send(ToCoordinator::ActionSuccess { round });
            }
        });
    }

    async fn touch(&self, path: &str, _user: &UserIdentity) -> Result<(), RuntimeError> {
        self.markers.lock().unwrap().insert(path.to_string());
        Ok(())
    }

    async fn delete(&self, path: &str, _recursive: bool, _user: &UserIdentity) -> Result<(), RuntimeError> {
        self.markers.lock().unwrap().remove(path);
        Ok(())
    }

    async fn marker_exists(&self, path: &str, _user: &UserIdentity) -> Result<bool, RuntimeError> {
        Ok(self.markers.lock().unwrap().contains(path))
    }
}

/// An in-memory `SchemaService`. Timestamps are a monotonic counter
/// rather than a wall clock, matching the coordinator's own reliance on
/// `getTransformationTimestamp` only for *ordering*, never absolute time.
#[derive(Default)]
struct FakeSchemaService {
    clock: Mutex<u64>,
    timestamps: Mutex<HashMap<ViewId, u64>>,
    versions: Mutex<HashMap<ViewId, String>>,
}

#[async_trait::async_trait]
impl SchemaService for FakeSchemaService {
    async fn add_partition(&self, _view: &View) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn set_view_version(&self, view: &View) -> Result<(), RuntimeError> {
        self.versions
            .lock()
            .unwrap()
            .insert(view.id, view.version_digest().as_str().to_string());
        Ok(())
    }

    async fn check_view_version(&self, view: &View) -> Result<VersionCheck, RuntimeError> {
        let versions = self.versions.lock().unwrap();
        match versions.get(&view.id) {
            Some(stored) if stored.as_str() == view.version_digest().as_str() => Ok(VersionCheck::Ok),
            Some(stored) => Ok(VersionCheck::Mismatch { stored: stored.clone() }),
            None => Ok(VersionCheck::Mismatch { stored: String::new() }),
        }
    }

    async fn log_transformation_timestamp(&self, view: &View) -> Result<(), RuntimeError> {
        let mut clock = self.clock.lock().unwrap();
        *clock += 1;
        self.timestamps.lock().unwrap().insert(view.id, *clock);
        Ok(())
    }

    async fn get_transformation_timestamp(&self, view: &View) -> Result<u64, RuntimeError> {
        Ok(*self.timestamps.lock().unwrap().get(&view.id).unwrap_or(&0))
    }
}

fn leaf_view(name: &str) -> View {
    View {
        id: ViewId::derive("warehouse", name),
        name: name.to_string(),
        dependencies: Vec::new(),
        transformation: Transformation::Compute { descriptor: serde_json::json!({"sql": "select 1"}) },
        storage_format: StorageFormat::Parquet,
        full_path: format!("/warehouse/{name}"),
        resource_hashes: vec!["abc123".to_string()],
    }
}

fn noop_view(name: &str) -> View {
    View {
        id: ViewId::derive("warehouse", name),
        name: name.to_string(),
        dependencies: Vec::new(),
        transformation: Transformation::NoOp,
        storage_format: StorageFormat::Parquet,
        full_path: format!("/warehouse/{name}"),
        resource_hashes: Vec::new(),
    }
}

fn dependent_view(name: &str, dependencies: Vec<ViewId>) -> View {
    View {
        id: ViewId::derive("warehouse", name),
        name: name.to_string(),
        dependencies,
        transformation: Transformation::Compute { descriptor: serde_json::json!({"sql": "select * from dep"}) },
        storage_format: StorageFormat::Parquet,
        full_path: format!("/warehouse/{name}"),
        resource_hashes: vec!["def456".to_string()],
    }
}

fn test_manager(
    action_runner: Arc<FakeActionRunner>,
    schema_service: Arc<FakeSchemaService>,
    max_retries: u32,
) -> ViewManager<FakeActionRunner, FakeSchemaService> {
    let config = SchedulerConfig {
        max_retries,
        ..SchedulerConfig::default()
    };
    ViewManager::new(action_runner, schema_service, config)
}

#[tokio::test]
async fn leaf_view_materializes_and_is_memoized() {
    let runner = Arc::new(FakeActionRunner::default());
    let schema = Arc::new(FakeSchemaService::default());
    let manager = test_manager(runner.clone(), schema.clone(), 3);

    let view = leaf_view("clicks");
    let id = view.id;
    manager.register_view(view).await;

    let first = manager.materialize(id).await.unwrap();
    let MaterializeReply::ViewMaterialized { incomplete, with_errors, ts, .. } = first else {
        panic!("expected ViewMaterialized, got {first:?}");
    };
    assert!(!incomplete);
    assert!(!with_errors);
    assert!(ts > 0);

    // A second Materialize while already Materialized must not resubmit.
    let second = manager.materialize(id).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(runner.submission_count(id), 1);
}

#[tokio::test]
async fn noop_view_without_marker_reports_no_data() {
    let runner = Arc::new(FakeActionRunner::default());
    let schema = Arc::new(FakeSchemaService::default());
    let manager = test_manager(runner, schema, 3);

    let view = noop_view("raw_import");
    let id = view.id;
    manager.register_view(view).await;

    let reply = manager.materialize(id).await.unwrap();
    assert_eq!(reply, MaterializeReply::NoDataAvailable { view: id });

    let status = manager.status(id).await.unwrap();
    assert_eq!(status.state, "initial");
}

#[tokio::test]
async fn noop_view_with_marker_materializes() {
    let runner = Arc::new(FakeActionRunner::default());
    let schema = Arc::new(FakeSchemaService::default());
    let manager = test_manager(runner.clone(), schema, 3);

    let view = noop_view("raw_import");
    let id = view.id;
    runner.plant_marker(&view.success_marker_path());
    manager.register_view(view).await;

    let reply = manager.materialize(id).await.unwrap();
    assert!(matches!(reply, MaterializeReply::ViewMaterialized { incomplete: false, with_errors: false, .. }));
}

#[tokio::test(start_paused = true)]
async fn retries_with_backoff_before_succeeding() {
    let runner = Arc::new(FakeActionRunner::default());
    let schema = Arc::new(FakeSchemaService::default());
    let manager = test_manager(runner.clone(), schema, 3);

    let view = leaf_view("flaky");
    let id = view.id;
    runner.fail_next(id, 2);
    manager.register_view(view).await;

    let reply = manager.materialize(id).await.unwrap();
    assert!(matches!(reply, MaterializeReply::ViewMaterialized { .. }));
    assert_eq!(runner.submission_count(id), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausting_retries_reports_failed() {
    let runner = Arc::new(FakeActionRunner::default());
    let schema = Arc::new(FakeSchemaService::default());
    let manager = test_manager(runner.clone(), schema, 1);

    let view = leaf_view("always_broken");
    let id = view.id;
    runner.fail_next(id, 10);
    manager.register_view(view).await;

    let reply = manager.materialize(id).await.unwrap();
    assert_eq!(reply, MaterializeReply::Failed { view: id });

    let status = manager.status(id).await.unwrap();
    assert_eq!(status.state, "failed");
}

#[tokio::test]
async fn one_dependency_with_data_and_one_without_marks_downstream_incomplete() {
    let runner = Arc::new(FakeActionRunner::default());
    let schema = Arc::new(FakeSchemaService::default());
    let manager = test_manager(runner, schema, 3);

    // One dependency will actually produce data, the other never will;
    // per S6 the downstream view still transforms (since *some*
    // dependency had data) but carries incomplete=true forward.
    let has_data = leaf_view("has_data");
    let has_data_id = has_data.id;
    let missing = noop_view("missing_upstream");
    let missing_id = missing.id;
    let downstream = dependent_view("rollup", vec![has_data_id, missing_id]);
    let downstream_id = downstream.id;

    manager.register_view(has_data).await;
    manager.register_view(missing).await;
    manager.register_view(downstream).await;

    let reply = manager.materialize(downstream_id).await.unwrap();
    match reply {
        MaterializeReply::ViewMaterialized { incomplete, .. } => assert!(incomplete),
        other => panic!("expected ViewMaterialized(incomplete=true), got {other:?}"),
    }
}

#[tokio::test]
async fn no_dependency_with_data_reports_no_data_and_reverts_to_initial() {
    let runner = Arc::new(FakeActionRunner::default());
    let schema = Arc::new(FakeSchemaService::default());
    let manager = test_manager(runner, schema, 3);

    let upstream = noop_view("missing_upstream");
    let upstream_id = upstream.id;
    let downstream = dependent_view("rollup", vec![upstream_id]);
    let downstream_id = downstream.id;

    manager.register_view(upstream).await;
    manager.register_view(downstream).await;

    let reply = manager.materialize(downstream_id).await.unwrap();
    assert_eq!(reply, MaterializeReply::NoDataAvailable { view: downstream_id });

    let status = manager.status(downstream_id).await.unwrap();
    assert_eq!(status.state, "initial");
}

#[tokio::test]
async fn invalidate_resets_to_initial_and_a_later_materialize_recomputes() {
    let runner = Arc::new(FakeActionRunner::default());
    let schema = Arc::new(FakeSchemaService::default());
    let manager = test_manager(runner.clone(), schema, 3);

    let view = leaf_view("sessions");
    let id = view.id;
    manager.register_view(view).await;

    manager.materialize(id).await.unwrap();
    assert_eq!(runner.submission_count(id), 1);

    manager.invalidate(id).await.unwrap();
    let status = manager.status(id).await.unwrap();
    assert_eq!(status.state, "initial");

    manager.materialize(id).await.unwrap();
    assert_eq!(runner.submission_count(id), 2);
}

#[tokio::test]
async fn new_data_available_reloads_only_interested_dependents() {
    let runner = Arc::new(FakeActionRunner::default());
    let schema = Arc::new(FakeSchemaService::default());
    let manager = test_manager(runner.clone(), schema, 3);

    let upstream = leaf_view("orders");
    let upstream_id = upstream.id;
    let downstream = dependent_view("orders_rollup", vec![upstream_id]);
    let downstream_id = downstream.id;
    let unrelated = leaf_view("unrelated");
    let unrelated_id = unrelated.id;

    manager.register_view(upstream).await;
    manager.register_view(downstream).await;
    manager.register_view(unrelated).await;

    manager.materialize(downstream_id).await.unwrap();
    manager.materialize(unrelated_id).await.unwrap();
    assert_eq!(runner.submission_count(downstream_id), 1);
    assert_eq!(runner.submission_count(unrelated_id), 1);

    // NewDataAvailable is how an external notification (e.g. a completed
    // ingestion job) tells the manager that `upstream` has fresher data;
    // it is broadcast to every live coordinator, and only the one that
    // actually depends on `upstream` should reload.
    manager.broadcast_new_data(upstream_id).await;

    // A coordinator's mailbox is FIFO, so a Materialize sent right after
    // the broadcast is only answered once the reload it triggered (if
    // any) has already run to completion.
    manager.materialize(downstream_id).await.unwrap();
    manager.materialize(unrelated_id).await.unwrap();

    assert_eq!(runner.submission_count(unrelated_id), 1);
    assert_eq!(runner.submission_count(downstream_id), 2);
}
