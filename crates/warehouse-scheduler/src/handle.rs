use crate::messages::ToCoordinator;
use tokio::sync::mpsc;
use warehouse_model::ViewId;

/// CoordinatorHandle is the cloneable address of a running
/// `ViewCoordinator`: an unbounded mailbox sender plus the view identity
/// it belongs to. It is the only way anything outside the coordinator's
/// own task touches its state, and doing so is always by sending a
/// message, never by direct mutation.
#[derive(Clone)]
pub struct CoordinatorHandle {
    view: ViewId,
    tx: mpsc::UnboundedSender<ToCoordinator>,
}

impl CoordinatorHandle {
    pub(crate) fn new(view: ViewId, tx: mpsc::UnboundedSender<ToCoordinator>) -> Self {
        Self { view, tx }
    }

    pub fn view_id(&self) -> ViewId {
        self.view
    }

    /// Enqueue `msg` into this coordinator's mailbox. Silently dropped if
    /// the coordinator's task has already exited (which only happens on
    /// process shutdown, since coordinators are never destroyed).
    pub fn send(&self, msg: ToCoordinator) {
        let _ = self.tx.send(msg);
    }
}

impl std::fmt::Debug for CoordinatorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CoordinatorHandle({})", self.view)
    }
}
