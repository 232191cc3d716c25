//! Per-view materialization scheduling: one actor per [`warehouse_model::View`],
//! driven by dependency freshness and retried with exponential backoff.
//!
//! A [`ViewManager`] is the entry point: it lazily spawns one
//! `ViewCoordinator` task per view identity the first time anything
//! addresses it, and every interaction after that is a message sent to
//! that coordinator's mailbox. There is no shared mutable state between
//! coordinators; they only ever talk to each other as `Materialize`
//! requester and `DependencyAnswer` replier.

mod config;
mod contracts;
mod coordinator;
mod fsm;
mod handle;
mod manager;
mod messages;
mod timers;

pub use config::SchedulerConfig;
pub use contracts::{ActionRunner, RuntimeError, SchemaService, UserIdentity, VersionCheck};
pub use fsm::State;
pub use handle::CoordinatorHandle;
pub use manager::ViewManager;
pub use messages::{DepOutcome, MaterializeReply, Requester, StatusReport, ToCoordinator};
