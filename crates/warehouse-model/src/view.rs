use crate::{Transformation, ViewId};

/// View is an immutable descriptor of a logical table in the warehouse.
/// Views are produced out-of-band by parsing the view DSL (not this
/// crate's concern) and handed to the `ViewManager` as a catalog; the
/// scheduler never mutates one.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct View {
    pub id: ViewId,
    /// Human-readable label, used only for logging and diagnostics.
    pub name: String,
    pub dependencies: Vec<ViewId>,
    pub transformation: Transformation,
    pub storage_format: crate::StorageFormat,
    /// Location of the view's materialized data on the underlying
    /// distributed filesystem.
    pub full_path: String,
    /// Hashes of the resources (schemas, source files, connector images)
    /// this view's definition draws upon; combined with the
    /// transformation's own representation to derive `version_digest()`.
    pub resource_hashes: Vec<String>,
}

impl View {
    /// Path of the success marker used to signal "data for this view is
    /// complete".
    pub fn success_marker_path(&self) -> String {
        format!("{}/_SUCCESS", self.full_path.trim_end_matches('/'))
    }

    /// The view's version digest, derived from its resource hashes
    /// and its transformation's own definition. Compared against what the
    /// schema service has stored to detect schema/logic drift.
    pub fn version_digest(&self) -> crate::VersionDigest {
        let definition = serde_json::to_string(&self.transformation)
            .expect("Transformation serializes infallibly");
        crate::VersionDigest::compute(&self.resource_hashes, &definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageFormat;

    fn sample() -> View {
        View {
            id: ViewId::derive("schema", "/warehouse/v"),
            name: "v".to_string(),
            dependencies: vec![],
            transformation: Transformation::NoOp,
            storage_format: StorageFormat::Parquet,
            full_path: "/warehouse/v".to_string(),
            resource_hashes: vec!["abc".to_string()],
        }
    }

    #[test]
    fn success_marker_path_is_joined_cleanly() {
        let mut v = sample();
        v.full_path = "/warehouse/v/".to_string();
        assert_eq!(v.success_marker_path(), "/warehouse/v/_SUCCESS");
    }

    #[test]
    fn version_digest_changes_with_resources() {
        let mut a = sample();
        let b_digest = {
            a.resource_hashes.push("def".to_string());
            a.version_digest()
        };
        let a_digest = sample().version_digest();
        assert_ne!(a_digest, b_digest);
    }
}
