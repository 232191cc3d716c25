//! The `ActionRunner` and `SchemaService` contracts. Both are external
//! collaborators whose implementations (SQL/filesystem/morphline
//! executors, the metastore's actual schema) are deliberately out of
//! this crate's scope; this module only fixes the boundary the
//! coordinator talks across, and the error taxonomy that boundary
//! surfaces.

use std::sync::Arc;
use warehouse_model::View;

/// RuntimeError is the error taxonomy surfaced across the `ActionRunner`
/// and `SchemaService` boundary. The coordinator never treats these as
/// fatal to the process: every variant is folded into the state
/// machine's own error handling.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("collaborator call timed out")]
    Timeout,
    #[error("{0} not found")]
    NotFound(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// The identity under which filesystem and action calls run. Constructed
/// once at daemon startup from configuration and threaded explicitly
/// into every collaborator, rather than relying on ambient/thread-local
/// state.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UserIdentity(pub String);

impl std::fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of `SchemaService::check_view_version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    Ok,
    Mismatch { stored: String },
}

/// ActionRunner executes transformations and the filesystem side-effects
/// that accompany them. Submitting a transformation is the scheduler's
/// one genuinely asynchronous collaborator call: it must return
/// immediately, with the terminal outcome delivered later to
/// `reply_to`'s mailbox as an ordinary `ToCoordinator` message. The
/// filesystem operations, by contrast, are synchronous request/reply
/// bounded by a caller-supplied timeout.
#[async_trait::async_trait]
pub trait ActionRunner: Send + Sync + 'static {
    /// Submit `view`'s transformation for execution. Must not block: the
    /// implementation is responsible for eventually delivering exactly
    /// one of `ActionSuccess { round }` or `ActionFailure { round, .. }`
    /// to `reply_to`, tagged with `round` so a superseded attempt can be
    /// told apart from the current one.
    async fn submit_transformation(
        &self,
        view: Arc<View>,
        reply_to: crate::CoordinatorHandle,
        round: u64,
    );

    /// Create a zero-byte success marker at `path`.
    async fn touch(&self, path: &str, user: &UserIdentity) -> Result<(), RuntimeError>;

    /// Delete `path`, optionally recursively.
    async fn delete(&self, path: &str, recursive: bool, user: &UserIdentity)
        -> Result<(), RuntimeError>;

    /// True if a success marker exists at `path`.
    async fn marker_exists(&self, path: &str, user: &UserIdentity) -> Result<bool, RuntimeError>;
}

/// SchemaService records transformation timestamps and manages partition
/// and version metadata in the metastore. Every call is
/// synchronous request/reply, bounded by the coordinator's configured
/// `schema_action_timeout`.
#[async_trait::async_trait]
pub trait SchemaService: Send + Sync + 'static {
    /// Idempotently register `view`'s partition in the metastore.
    async fn add_partition(&self, view: &View) -> Result<(), RuntimeError>;

    /// Write `view`'s current version digest.
    async fn set_view_version(&self, view: &View) -> Result<(), RuntimeError>;

    /// Compare `view`'s version digest against what is stored.
    async fn check_view_version(&self, view: &View) -> Result<VersionCheck, RuntimeError>;

    /// Record "transformed at now()" for `view`.
    async fn log_transformation_timestamp(&self, view: &View) -> Result<(), RuntimeError>;

    /// The last recorded transformation timestamp for `view`, or `0` if
    /// none has ever been logged.
    async fn get_transformation_timestamp(&self, view: &View) -> Result<u64, RuntimeError>;
}
