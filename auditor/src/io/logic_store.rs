//! Logic map load/save helpers with schema + lint validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;
use tracing::warn;

use crate::core::invariants::lint_logic;
use crate::graph::{LogicGraph, LogicMap};

/// JSON Schema every logic map must satisfy, shipped with the binary.
pub const LOGIC_MAP_SCHEMA: &str = include_str!("../../schemas/logic_map.schema.json");

/// Validate a parsed JSON document against [`LOGIC_MAP_SCHEMA`].
pub fn validate_logic_value(value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(LOGIC_MAP_SCHEMA).context("parse logic map schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "logic map schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

/// Parse a logic map document, enforcing the schema before deserializing.
pub fn parse_logic_map(raw: &str) -> Result<LogicMap> {
    let value: Value = serde_json::from_str(raw).context("parse logic map json")?;
    validate_logic_value(&value)?;
    serde_json::from_value(value).context("deserialize logic map")
}

/// Load a logic map from disk (schema only, no lints).
pub fn load_logic(path: &Path) -> Result<LogicMap> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read logic {}", path.display()))?;
    parse_logic_map(&contents).with_context(|| format!("load logic {}", path.display()))
}

/// Load a logic map and build its graph.
///
/// Lint errors fail the load; lint warnings are logged and tolerated.
pub fn load_graph(path: &Path) -> Result<LogicGraph> {
    let map = load_logic(path)?;
    let lint = lint_logic(&map);
    for warning in &lint.warnings {
        warn!(logic = %path.display(), "{warning}");
    }
    if !lint.errors.is_empty() {
        return Err(anyhow!(
            "logic map {} is invalid: {}",
            path.display(),
            lint.errors.join("; ")
        ));
    }
    LogicGraph::from_map(map).with_context(|| format!("build graph from {}", path.display()))
}

/// Write a logic map as pretty JSON (temp file + rename).
pub fn write_logic(path: &Path, map: &LogicMap) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(map).context("serialize logic map")?;
    buf.push('\n');
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write temp logic {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace logic {}", path.display()))?;
    Ok(())
}
