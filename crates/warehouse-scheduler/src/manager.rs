use crate::{
    coordinator::CoordinatorInner,
    contracts::{ActionRunner, SchemaService},
    messages::{MaterializeReply, Requester, StatusReport, ToCoordinator},
    CoordinatorHandle, SchedulerConfig,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use warehouse_model::{View, ViewId};

struct Registered {
    handle: CoordinatorHandle,
}

struct Inner<AR, SS> {
    /// Views known to the manager, seeded out-of-band (view DSL parsing
    /// happens upstream of this crate). A coordinator looks up its
    /// dependencies' descriptors here when it needs to address them.
    catalog: Mutex<HashMap<ViewId, Arc<View>>>,
    /// Live coordinators, created lazily on first reference.
    registry: Mutex<HashMap<ViewId, Registered>>,
    action_runner: Arc<AR>,
    schema_service: Arc<SS>,
    config: SchedulerConfig,
}

/// ViewManager is the thread-safe registry mapping view identity to its
/// `ViewCoordinator`. It is the sole arbiter of "exactly one coordinator
/// per view identity": lookups that miss create the coordinator
/// atomically under the registry lock.
pub struct ViewManager<AR, SS> {
    inner: Arc<Inner<AR, SS>>,
}

impl<AR, SS> Clone for ViewManager<AR, SS> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<AR, SS> ViewManager<AR, SS>
where
    AR: ActionRunner,
    SS: SchemaService,
{
    pub fn new(action_runner: Arc<AR>, schema_service: Arc<SS>, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                catalog: Mutex::new(HashMap::new()),
                registry: Mutex::new(HashMap::new()),
                action_runner,
                schema_service,
                config,
            }),
        }
    }

    /// Seed the catalog with a parsed view descriptor. Idempotent:
    /// re-registering the same identity with a changed descriptor
    /// updates the catalog entry used for future coordinator creation
    /// and dependency lookups, but does not affect an already-running
    /// coordinator (views are immutable once a coordinator exists for
    /// them).
    pub async fn register_view(&self, view: View) {
        self.inner.catalog.lock().await.insert(view.id, Arc::new(view));
    }

    /// Resolve `id`'s coordinator, creating it (and spawning its task) if
    /// this is the first reference. Bounded by `dependency_timeout`; a
    /// timeout here is treated by the caller as if the dependency had
    /// answered `Failed`.
    pub async fn coordinator_for(&self, id: ViewId) -> anyhow::Result<CoordinatorHandle> {
        tokio::time::timeout(self.inner.config.dependency_timeout, self.get_or_create(id))
            .await
            .map_err(|_| anyhow::anyhow!("dependency lookup for {id} timed out"))?
    }

    async fn get_or_create(&self, id: ViewId) -> anyhow::Result<CoordinatorHandle> {
        let mut registry = self.inner.registry.lock().await;
        if let Some(existing) = registry.get(&id) {
            return Ok(existing.handle.clone());
        }

        let view = self
            .inner
            .catalog
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no view registered with id {id}"))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = CoordinatorHandle::new(id, tx);

        let coordinator = CoordinatorInner::new(
            view,
            handle.clone(),
            self.clone(),
            self.inner.action_runner.clone(),
            self.inner.schema_service.clone(),
            self.inner.config.clone(),
        );
        tokio::spawn(coordinator.run(rx));

        registry.insert(id, Registered { handle: handle.clone() });
        Ok(handle)
    }

    /// Broadcast `NewDataAvailable(origin)` to every currently-live
    /// coordinator; each filters by whether `origin` is a dependency it
    /// actually cares about.
    pub async fn broadcast_new_data(&self, origin: ViewId) {
        let registry = self.inner.registry.lock().await;
        for registered in registry.values() {
            registered.handle.send(ToCoordinator::NewDataAvailable(origin));
        }
    }

    /// Convenience used by clients (and the daemon CLI): materialize
    /// `id` and await the single reply it owes.
    pub async fn materialize(&self, id: ViewId) -> anyhow::Result<MaterializeReply> {
        let handle = self.coordinator_for(id).await?;
        let (tx, rx) = oneshot::channel();
        handle.send(ToCoordinator::Materialize(Requester::Client(tx)));
        rx.await
            .map_err(|_| anyhow::anyhow!("coordinator for {id} dropped its reply channel"))
    }

    pub async fn invalidate(&self, id: ViewId) -> anyhow::Result<()> {
        let handle = self.coordinator_for(id).await?;
        handle.send(ToCoordinator::Invalidate);
        Ok(())
    }

    pub async fn status(&self, id: ViewId) -> anyhow::Result<StatusReport> {
        let handle = self.coordinator_for(id).await?;
        let (tx, rx) = oneshot::channel();
        handle.send(ToCoordinator::GetStatus(tx));
        rx.await
            .map_err(|_| anyhow::anyhow!("coordinator for {id} dropped its reply channel"))
    }
}
