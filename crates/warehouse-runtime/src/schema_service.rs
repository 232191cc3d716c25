use std::collections::HashMap;

use tokio::sync::Mutex;
use warehouse_model::{View, ViewId};
use warehouse_scheduler::{RuntimeError, SchemaService, VersionCheck};

#[derive(Debug, Default)]
struct Record {
    partitioned: bool,
    stored_version: Option<String>,
    last_transformation_ts: Option<i64>,
}

/// An in-memory metastore stand-in. A real `SchemaService` talks to the
/// warehouse's actual metastore (Hive, Glue, or similar); partition
/// registration and version bookkeeping are deliberately out of scope, so
/// this is the reference implementation a deployment is expected to
/// replace with one backed by its own schema service.
#[derive(Debug, Default)]
pub struct InMemorySchemaService {
    records: Mutex<HashMap<ViewId, Record>>,
}

impl InMemorySchemaService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SchemaService for InMemorySchemaService {
    async fn add_partition(&self, view: &View) -> Result<(), RuntimeError> {
        let mut records = self.records.lock().await;
        records.entry(view.id).or_default().partitioned = true;
        Ok(())
    }

    async fn set_view_version(&self, view: &View) -> Result<(), RuntimeError> {
        let digest = view.version_digest().as_str().to_string();
        let mut records = self.records.lock().await;
        records.entry(view.id).or_default().stored_version = Some(digest);
        Ok(())
    }

    async fn check_view_version(&self, view: &View) -> Result<VersionCheck, RuntimeError> {
        let records = self.records.lock().await;
        let current = view.version_digest();
        match records.get(&view.id).and_then(|r| r.stored_version.as_deref()) {
            Some(stored) if stored == current.as_str() => Ok(VersionCheck::Ok),
            Some(stored) => Ok(VersionCheck::Mismatch { stored: stored.to_string() }),
            None => Ok(VersionCheck::Mismatch { stored: String::new() }),
        }
    }

    async fn log_transformation_timestamp(&self, view: &View) -> Result<(), RuntimeError> {
        let mut records = self.records.lock().await;
        records.entry(view.id).or_default().last_transformation_ts = Some(chrono::Utc::now().timestamp_millis());
        Ok(())
    }

    async fn get_transformation_timestamp(&self, view: &View) -> Result<u64, RuntimeError> {
        let records = self.records.lock().await;
        let ts = records
            .get(&view.id)
            .and_then(|r| r.last_transformation_ts)
            .unwrap_or(0);
        Ok(ts.max(0) as u64)
    }
}
