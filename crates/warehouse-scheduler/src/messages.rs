use crate::CoordinatorHandle;
use tokio::sync::oneshot;
use warehouse_model::ViewId;

/// The reply a coordinator ultimately owes every `Materialize` requester.
/// Exactly one of these is emitted per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializeReply {
    ViewMaterialized {
        view: ViewId,
        incomplete: bool,
        ts: u64,
        with_errors: bool,
    },
    NoDataAvailable {
        view: ViewId,
    },
    Failed {
        view: ViewId,
    },
    /// Reserved for an unexpected message arriving in `Failed` while a
    /// `Requester` is actually addressable. In practice every message a
    /// `Failed` coordinator can still receive without a `Materialize`
    /// requester attached (a late `ActionSuccess`/`ActionFailure`/`Retry`/
    /// `DependencyAnswer` from a superseded round) has no sender to reply
    /// to, so those are logged and dropped instead (see `on_failed`); the
    /// variant is kept in the contract for the addressable case and so
    /// `deliver()`'s match stays exhaustive.
    FatalError {
        view: ViewId,
        reason: String,
    },
}

/// DepOutcome is how a dependency's answer is represented once it has
/// been translated into the vocabulary the *requester* reasons about
/// (the dependency's own `ViewId` is carried alongside, in
/// `ToCoordinator::DependencyAnswer`, rather than embedded here).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepOutcome {
    Materialized {
        incomplete: bool,
        ts: u64,
        with_errors: bool,
    },
    NoData,
    Failed,
}

/// Requester identifies who is owed a reply to a `Materialize` request:
/// either an external client awaiting a one-shot reply, or a peer
/// `ViewCoordinator` that is itself waiting on us as a dependency (in
/// which case the reply is redelivered as a `DependencyAnswer` tagged
/// with the round the peer was in when it asked).
pub enum Requester {
    Client(oneshot::Sender<MaterializeReply>),
    View {
        handle: CoordinatorHandle,
        round: u64,
    },
}

impl std::fmt::Debug for Requester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Requester::Client(_) => write!(f, "Requester::Client"),
            Requester::View { handle, round } => {
                write!(f, "Requester::View({}, round={round})", handle.view_id())
            }
        }
    }
}

/// Diagnostic snapshot returned by `GetStatus`. Never mutates
/// coordinator state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub view: ViewId,
    pub state: &'static str,
}

/// The full incoming message contract of a `ViewCoordinator`.
pub enum ToCoordinator {
    Materialize(Requester),
    Invalidate,
    NewDataAvailable(ViewId),
    GetStatus(oneshot::Sender<StatusReport>),
    /// From the `ActionRunner`, tagged with the `round` the submission
    /// was issued under so a superseded attempt is discarded rather than
    /// acted on.
    ActionSuccess { round: u64 },
    ActionFailure { round: u64, reason: String },
    /// Self-delivered after backoff expires.
    Retry { round: u64 },
    /// From a dependency's coordinator, answering a `Materialize` we
    /// sent it earlier in `round`.
    DependencyAnswer {
        round: u64,
        dep: ViewId,
        outcome: DepOutcome,
    },
}

impl std::fmt::Debug for ToCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToCoordinator::Materialize(r) => write!(f, "Materialize({r:?})"),
            ToCoordinator::Invalidate => write!(f, "Invalidate"),
            ToCoordinator::NewDataAvailable(v) => write!(f, "NewDataAvailable({v})"),
            ToCoordinator::GetStatus(_) => write!(f, "GetStatus"),
            ToCoordinator::ActionSuccess { round } => write!(f, "ActionSuccess(round={round})"),
            ToCoordinator::ActionFailure { round, reason } => {
                write!(f, "ActionFailure(round={round}, reason={reason})")
            }
            ToCoordinator::Retry { round } => write!(f, "Retry(round={round})"),
            ToCoordinator::DependencyAnswer { round, dep, outcome } => {
                write!(f, "DependencyAnswer(round={round}, dep={dep}, {outcome:?})")
            }
        }
    }
}
