/// Transformation is the computation that produces a view from its
/// dependencies. The scheduler never interprets the payload of a
/// `Compute` transformation: it is an opaque descriptor handed verbatim
/// to the `ActionRunner`, whose job it is to know how to run it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transformation {
    /// The view has no transformation of its own; its data, if any, is
    /// produced entirely out-of-band (e.g. by an upstream ingestion job)
    /// and the scheduler only ever checks for a success marker.
    NoOp,
    /// A transformation whose side effects are confined to the
    /// filesystem (e.g. a copy, a partition move). Existing partition
    /// data is *not* deleted before a filesystem transformation runs,
    /// since the transformation itself owns that data in place.
    Filesystem { descriptor: serde_json::Value },
    /// A general compute transformation (SQL, a morphline pipeline, a
    /// custom job) dispatched to the `ActionRunner` as an opaque blob.
    Compute { descriptor: serde_json::Value },
}

impl Transformation {
    pub fn is_noop(&self) -> bool {
        matches!(self, Transformation::NoOp)
    }

    /// True if this transformation's side effects are confined to the
    /// filesystem, in which case `transform()` must not delete existing
    /// partition data before submitting it.
    pub fn is_filesystem(&self) -> bool {
        matches!(self, Transformation::Filesystem { .. })
    }
}

/// StorageFormat describes the physical encoding of a view's materialized
/// data. The scheduler treats it as opaque metadata; it exists so that
/// downstream readers (out of scope here) know how to decode a view's
/// partitions.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageFormat {
    Parquet,
    Avro,
    Json,
    Csv,
    Other(String),
}
