use crate::{
    contracts::{ActionRunner, RuntimeError, SchemaService, VersionCheck},
    fsm::State,
    manager::ViewManager,
    messages::{DepOutcome, MaterializeReply, Requester, ToCoordinator},
    timers::schedule_retry,
    CoordinatorHandle, SchedulerConfig,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use warehouse_model::{View, ViewId};

/// CoordinatorInner is the mutable, single-owner state of one
/// `ViewCoordinator`. It is never shared: the only way to reach it
/// is by sending a `ToCoordinator` message to the `CoordinatorHandle`
/// returned at construction, which `run()` drains one message at a time.
pub struct CoordinatorInner<AR, SS> {
    view: Arc<View>,
    handle: CoordinatorHandle,
    manager: ViewManager<AR, SS>,
    action_runner: Arc<AR>,
    schema_service: Arc<SS>,
    config: SchedulerConfig,

    state: State,
    waiters: Vec<Requester>,
    pending_deps: HashSet<ViewId>,
    deps_freshness: u64,
    last_transformation_ts: u64,
    one_dependency_returned_data: bool,
    incomplete: bool,
    with_errors: bool,
    round: u64,
}

impl<AR, SS> CoordinatorInner<AR, SS>
where
    AR: ActionRunner,
    SS: SchemaService,
{
    pub(crate) fn new(
        view: Arc<View>,
        handle: CoordinatorHandle,
        manager: ViewManager<AR, SS>,
        action_runner: Arc<AR>,
        schema_service: Arc<SS>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            view,
            handle,
            manager,
            action_runner,
            schema_service,
            config,
            state: State::Initial,
            waiters: Vec::new(),
            pending_deps: HashSet::new(),
            deps_freshness: 0,
            last_transformation_ts: 0,
            one_dependency_returned_data: false,
            incomplete: false,
            with_errors: false,
            round: 0,
        }
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ToCoordinator>) {
        while let Some(msg) = rx.recv().await {
            self.handle(msg).await;
        }
    }

    #[tracing::instrument(skip_all, fields(view = %self.view.id, state = self.state.name()))]
    async fn handle(&mut self, msg: ToCoordinator) {
        match msg {
            ToCoordinator::GetStatus(tx) => {
                let _ = tx.send(crate::messages::StatusReport {
                    view: self.view.id,
                    state: self.state.name(),
                });
            }
            other => match self.state {
                State::Initial => self.on_initial(other).await,
                State::Waiting => self.on_waiting(other).await,
                State::Transforming { r } => self.on_transforming(r, other).await,
                State::Retrying { r } => self.on_retrying(r, other).await,
                State::Materialized => self.on_materialized(other).await,
                State::Failed => self.on_failed(other).await,
            },
        }
    }

    // ---- Initial ----------------------------------------------------

    async fn on_initial(&mut self, msg: ToCoordinator) {
        match msg {
            ToCoordinator::Materialize(req) => self.on_materialize_initial(req).await,
            // Invalidate while already Initial, and NewDataAvailable with
            // no prior materialization to reload, are both no-ops.
            ToCoordinator::Invalidate | ToCoordinator::NewDataAvailable(_) => {}
            _ => tracing::debug!(view = %self.view.id, ?msg, "dropping stale message while Initial"),
        }
    }

    async fn on_materialize_initial(&mut self, req: Requester) {
        if self.view.transformation.is_noop() {
            self.on_materialize_initial_noop(req).await;
        } else if self.view.dependencies.is_empty() {
            self.waiters.push(req);
            self.begin_round();
            self.transform(0).await;
        } else {
            self.waiters.push(req);
            self.begin_round();
            self.dispatch_to_dependencies().await;
        }
    }

    async fn on_materialize_initial_noop(&mut self, req: Requester) {
        let marker = self.view.success_marker_path();
        match self.marker_exists(&marker).await {
            Ok(true) => match self.materialize_noop_from_marker().await {
                Ok(ts) => {
                    self.last_transformation_ts = ts;
                    self.reply_one(
                        req,
                        MaterializeReply::ViewMaterialized {
                            view: self.view.id,
                            incomplete: false,
                            ts,
                            with_errors: false,
                        },
                    );
                    self.state = State::Materialized;
                }
                Err(err) => {
                    tracing::warn!(?err, view = %self.view.id, "failed to register NoOp view's partition");
                    self.reply_one(req, MaterializeReply::NoDataAvailable { view: self.view.id });
                }
            },
            Ok(false) => {
                self.reply_one(req, MaterializeReply::NoDataAvailable { view: self.view.id });
            }
            Err(err) => {
                tracing::warn!(?err, view = %self.view.id, "failed to check NoOp view's success marker");
                self.reply_one(req, MaterializeReply::NoDataAvailable { view: self.view.id });
            }
        }
    }

    async fn materialize_noop_from_marker(&mut self) -> Result<u64, RuntimeError> {
        self.add_partition().await?;
        self.set_view_version().await?;
        self.get_or_log_ts().await
    }

    async fn dispatch_to_dependencies(&mut self) {
        self.pending_deps = self.view.dependencies.iter().copied().collect();
        let dependencies = self.view.dependencies.clone();
        for dep in dependencies {
            match self.manager.coordinator_for(dep).await {
                Ok(dep_handle) => {
                    dep_handle.send(ToCoordinator::Materialize(Requester::View {
                        handle: self.handle.clone(),
                        round: self.round,
                    }));
                }
                Err(err) => {
                    // A ViewManager dependency-lookup timeout is treated
                    // as that dependency answering Failed, so
                    // dependency_answered remains total.
                    tracing::warn!(?err, view = %self.view.id, %dep, "dependency lookup failed; treating as Failed");
                    self.apply_dep_outcome(&DepOutcome::Failed);
                    self.dependency_answered(dep).await;
                }
            }
        }
        self.state = State::Waiting;
    }

    // ---- Waiting ------------------------------------------------------

    async fn on_waiting(&mut self, msg: ToCoordinator) {
        match msg {
            ToCoordinator::Materialize(req) => self.waiters.push(req),
            ToCoordinator::DependencyAnswer { round, dep, outcome } if round == self.round => {
                self.apply_dep_outcome(&outcome);
                self.dependency_answered(dep).await;
            }
            ToCoordinator::DependencyAnswer { .. } => {
                tracing::debug!(view = %self.view.id, "dropping dependency answer from a superseded round");
            }
            // Not acted upon while a round is in flight.
            ToCoordinator::NewDataAvailable(_) | ToCoordinator::Invalidate => {}
            _ => tracing::debug!(view = %self.view.id, ?msg, "dropping stale message while Waiting"),
        }
    }

    fn apply_dep_outcome(&mut self, outcome: &DepOutcome) {
        match outcome {
            DepOutcome::Materialized { incomplete, ts, with_errors } => {
                self.one_dependency_returned_data = true;
                self.incomplete |= incomplete;
                self.with_errors |= with_errors;
                self.deps_freshness = self.deps_freshness.max(*ts);
            }
            DepOutcome::NoData => self.incomplete = true,
            DepOutcome::Failed => {
                self.incomplete = true;
                self.with_errors = true;
            }
        }
    }

    async fn dependency_answered(&mut self, dep: ViewId) {
        self.pending_deps.remove(&dep);
        if !self.pending_deps.is_empty() {
            return;
        }

        if self.one_dependency_returned_data {
            let mismatch = self.has_version_mismatch().await;
            if self.last_transformation_ts <= self.deps_freshness || mismatch {
                self.transform(0).await;
            } else {
                let reply = MaterializeReply::ViewMaterialized {
                    view: self.view.id,
                    incomplete: self.incomplete,
                    ts: self.last_transformation_ts,
                    with_errors: self.with_errors,
                };
                self.reply_all(reply);
                self.clear_pending_round_bookkeeping();
                self.state = State::Materialized;
            }
        } else {
            self.reply_all(MaterializeReply::NoDataAvailable { view: self.view.id });
            // incomplete/with_errors are meaningful here but are not
            // threaded into NoDataAvailable, which carries no such
            // fields; they are cleared along with the rest of the
            // round's bookkeeping.
            self.clear_round_state_full();
            self.state = State::Initial;
        }
    }

    // ---- Transforming ---------------------------------------------------

    async fn transform(&mut self, r: u32) {
        if let Err(err) = self.transform_preconditions().await {
            tracing::warn!(?err, view = %self.view.id, r, "transform preconditions failed; treated as an action failure");
            self.retry(r);
            return;
        }

        self.state = State::Transforming { r };
        let view = self.view.clone();
        let handle = self.handle.clone();
        let round = self.round;
        self.action_runner.submit_transformation(view, handle, round).await;
    }

    async fn transform_preconditions(&mut self) -> Result<(), RuntimeError> {
        self.add_partition().await?;
        self.set_view_version().await?;
        if !self.view.transformation.is_filesystem() {
            self.delete(&self.view.full_path, true).await?;
        }
        Ok(())
    }

    async fn on_transforming(&mut self, r: u32, msg: ToCoordinator) {
        match msg {
            ToCoordinator::Materialize(req) => self.waiters.push(req),
            ToCoordinator::ActionSuccess { round } if round == self.round => {
                self.on_action_success(r).await
            }
            ToCoordinator::ActionFailure { round, reason } if round == self.round => {
                tracing::warn!(view = %self.view.id, r, reason, "transformation failed");
                self.retry(r);
            }
            ToCoordinator::ActionSuccess { .. } | ToCoordinator::ActionFailure { .. } => {
                tracing::debug!(view = %self.view.id, "dropping action reply from a superseded round");
            }
            // Invalidate is only accepted in Materialized/Failed;
            // NewDataAvailable is not acted on mid-round.
            ToCoordinator::Invalidate | ToCoordinator::NewDataAvailable(_) => {}
            _ => tracing::debug!(view = %self.view.id, ?msg, "dropping stale message while Transforming"),
        }
    }

    async fn on_action_success(&mut self, r: u32) {
        let marker = self.view.success_marker_path();
        if let Err(err) = self.touch(&marker).await {
            tracing::warn!(?err, view = %self.view.id, "failed to write success marker");
            self.retry(r);
            return;
        }
        if let Err(err) = self.log_transformation_timestamp().await {
            tracing::warn!(?err, view = %self.view.id, "failed to log transformation timestamp");
            self.retry(r);
            return;
        }
        let ts = match self.get_transformation_timestamp().await {
            Ok(ts) => ts,
            Err(err) => {
                tracing::warn!(?err, view = %self.view.id, "failed to read back transformation timestamp");
                self.retry(r);
                return;
            }
        };
        // last_transformation_ts never decreases outside Invalidate.
        self.last_transformation_ts = self.last_transformation_ts.max(ts);

        let reply = MaterializeReply::ViewMaterialized {
            view: self.view.id,
            incomplete: self.incomplete,
            ts: self.last_transformation_ts,
            with_errors: self.with_errors,
        };
        self.reply_all(reply);
        self.state = State::Materialized;
    }

    fn retry(&mut self, r: u32) {
        schedule_retry(self.handle.clone(), self.round, r + 1);
        self.state = State::Retrying { r };
    }

    // ---- Retrying -----------------------------------------------------

    async fn on_retrying(&mut self, r: u32, msg: ToCoordinator) {
        match msg {
            ToCoordinator::Materialize(req) => self.waiters.push(req),
            ToCoordinator::Retry { round } if round == self.round => {
                if r <= self.config.max_retries {
                    self.transform(r + 1).await;
                } else {
                    self.reply_all(MaterializeReply::Failed { view: self.view.id });
                    self.state = State::Failed;
                }
            }
            ToCoordinator::Retry { .. } => {
                tracing::debug!(view = %self.view.id, "dropping retry timer from a superseded round");
            }
            ToCoordinator::Invalidate | ToCoordinator::NewDataAvailable(_) => {}
            _ => tracing::debug!(view = %self.view.id, ?msg, "dropping stale message while Retrying"),
        }
    }

    // ---- Materialized / Failed -----------------------------------------

    async fn on_materialized(&mut self, msg: ToCoordinator) {
        match msg {
            ToCoordinator::Materialize(req) => {
                self.reply_one(
                    req,
                    MaterializeReply::ViewMaterialized {
                        view: self.view.id,
                        incomplete: self.incomplete,
                        ts: self.last_transformation_ts,
                        with_errors: self.with_errors,
                    },
                );
            }
            ToCoordinator::Invalidate => self.invalidate(),
            ToCoordinator::NewDataAvailable(v) => {
                if self.view.dependencies.contains(&v) {
                    self.reload().await;
                }
            }
            _ => tracing::debug!(view = %self.view.id, ?msg, "dropping stale message while Materialized"),
        }
    }

    async fn on_failed(&mut self, msg: ToCoordinator) {
        match msg {
            ToCoordinator::Materialize(req) => {
                self.reply_one(req, MaterializeReply::Failed { view: self.view.id });
            }
            ToCoordinator::Invalidate => self.invalidate(),
            ToCoordinator::NewDataAvailable(v) => {
                if self.view.dependencies.contains(&v) {
                    self.reload().await;
                }
            }
            // "Any other message" with no requester to answer: logged
            // and dropped rather than raising a FatalError with nowhere
            // to send it.
            _ => tracing::debug!(view = %self.view.id, ?msg, "dropping unexpected message while Failed"),
        }
    }

    fn invalidate(&mut self) {
        self.last_transformation_ts = 0;
        self.deps_freshness = 0;
        // incomplete/with_errors do not persist across Invalidate either,
        // even though they're tracked separately from the timestamp
        // fields above.
        self.incomplete = false;
        self.with_errors = false;
        self.state = State::Initial;
    }

    async fn reload(&mut self) {
        self.begin_round();
        self.state = State::Waiting;

        let marker = self.view.success_marker_path();
        if let Err(err) = self.delete(&marker, false).await {
            tracing::warn!(?err, view = %self.view.id, "failed to delete success marker during reload");
        }

        // Charges the reload as if one retry has already occurred;
        // preserved as-is even though it slightly reduces the retry
        // budget available to the reload's own transformation.
        self.transform(1).await;

        self.manager.broadcast_new_data(self.view.id).await;
    }

    // ---- Round bookkeeping ---------------------------------------------

    fn begin_round(&mut self) {
        self.round += 1;
        self.pending_deps.clear();
        self.deps_freshness = 0;
        self.one_dependency_returned_data = false;
        self.incomplete = false;
        self.with_errors = false;
    }

    fn clear_pending_round_bookkeeping(&mut self) {
        self.pending_deps.clear();
        self.deps_freshness = 0;
        self.one_dependency_returned_data = false;
        // incomplete/with_errors are intentionally retained: they are
        // sticky for as long as this round's Materialized answer stands.
    }

    fn clear_round_state_full(&mut self) {
        self.clear_pending_round_bookkeeping();
        self.incomplete = false;
        self.with_errors = false;
    }

    fn reply_all(&mut self, reply: MaterializeReply) {
        let dep_id = self.view.id;
        for waiter in self.waiters.drain(..) {
            Self::deliver(dep_id, waiter, reply.clone());
        }
    }

    fn reply_one(&self, req: Requester, reply: MaterializeReply) {
        Self::deliver(self.view.id, req, reply);
    }

    fn deliver(dep_id: ViewId, req: Requester, reply: MaterializeReply) {
        match req {
            Requester::Client(tx) => {
                let _ = tx.send(reply);
            }
            Requester::View { handle, round } => {
                let outcome = match reply {
                    MaterializeReply::ViewMaterialized { incomplete, ts, with_errors, .. } => {
                        DepOutcome::Materialized { incomplete, ts, with_errors }
                    }
                    MaterializeReply::NoDataAvailable { .. } => DepOutcome::NoData,
                    // A dependency's FatalError is, from the requester's
                    // perspective, indistinguishable from Failed.
                    MaterializeReply::Failed { .. } | MaterializeReply::FatalError { .. } => {
                        DepOutcome::Failed
                    }
                };
                handle.send(ToCoordinator::DependencyAnswer { round, dep: dep_id, outcome });
            }
        }
    }

    // ---- Collaborator calls, each bounded by its configured timeout ----

    async fn add_partition(&self) -> Result<(), RuntimeError> {
        self.with_schema_timeout(self.schema_service.add_partition(&self.view)).await
    }

    async fn set_view_version(&self) -> Result<(), RuntimeError> {
        self.with_schema_timeout(self.schema_service.set_view_version(&self.view)).await
    }

    async fn check_view_version(&self) -> Result<VersionCheck, RuntimeError> {
        self.with_schema_timeout(self.schema_service.check_view_version(&self.view)).await
    }

    async fn log_transformation_timestamp(&self) -> Result<(), RuntimeError> {
        self.with_schema_timeout(self.schema_service.log_transformation_timestamp(&self.view))
            .await
    }

    async fn get_transformation_timestamp(&self) -> Result<u64, RuntimeError> {
        self.with_schema_timeout(self.schema_service.get_transformation_timestamp(&self.view))
            .await
    }

    async fn has_version_mismatch(&self) -> bool {
        // A timeout or failure is conservatively treated as a mismatch,
        // forcing retransformation.
        !matches!(self.check_view_version().await, Ok(VersionCheck::Ok))
    }

    async fn get_or_log_ts(&mut self) -> Result<u64, RuntimeError> {
        if self.last_transformation_ts > 0 {
            return Ok(self.last_transformation_ts);
        }
        self.log_transformation_timestamp().await?;
        let ts = self.get_transformation_timestamp().await?;
        self.last_transformation_ts = ts;
        Ok(ts)
    }

    async fn touch(&self, path: &str) -> Result<(), RuntimeError> {
        self.with_file_timeout(self.action_runner.touch(path, &self.config.user_identity)).await
    }

    async fn delete(&self, path: &str, recursive: bool) -> Result<(), RuntimeError> {
        self.with_file_timeout(self.action_runner.delete(path, recursive, &self.config.user_identity))
            .await
    }

    async fn marker_exists(&self, path: &str) -> Result<bool, RuntimeError> {
        self.with_file_timeout(self.action_runner.marker_exists(path, &self.config.user_identity))
            .await
    }

    async fn with_schema_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, RuntimeError>>,
    ) -> Result<T, RuntimeError> {
        match tokio::time::timeout(self.config.schema_action_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RuntimeError::Timeout),
        }
    }

    async fn with_file_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, RuntimeError>>,
    ) -> Result<T, RuntimeError> {
        match tokio::time::timeout(self.config.file_action_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RuntimeError::Timeout),
        }
    }
}
