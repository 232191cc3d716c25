use anyhow::Context;
use std::path::Path;

use warehouse_model::View;

/// Loads a JSON array of [`View`] descriptors. Parsing the view DSL
/// itself is out of scope; this is the compiled-down form the DSL's
/// own tooling is expected to produce.
pub fn load(path: &Path) -> anyhow::Result<Vec<View>> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading catalog {}", path.display()))?;
    let views: Vec<View> =
        serde_json::from_str(&contents).with_context(|| format!("parsing catalog {}", path.display()))?;
    Ok(views)
}
