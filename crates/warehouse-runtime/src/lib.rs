//! Reference `ActionRunner`/`SchemaService` drivers: a filesystem-rooted
//! action runner and an in-memory metastore stand-in. These are the
//! pieces every real deployment is expected to swap out;
//! they exist so `warehouse-daemon` has something runnable out of the
//! box.

mod action_runner;
mod schema_service;

pub use action_runner::LocalActionRunner;
pub use schema_service::InMemorySchemaService;
