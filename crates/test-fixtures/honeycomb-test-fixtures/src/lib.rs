use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    telemetry: HashMap<String, TelemetryEntry>,
}

/// Source format of a telemetry fixture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Rksml,
    Csv,
}

#[derive(Debug, Deserialize)]
struct TelemetryEntry {
    path: String,
    format: Format,
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

pub mod telemetry {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.telemetry.keys().cloned().collect()
    }

    /// Raw fixture text, ready for a loader's `parse`.
    pub fn text(name: &str) -> Result<String> {
        let entry = lookup(&MANIFEST.telemetry, "telemetry", name)?;
        read_to_string(&entry.path)
    }

    pub fn format(name: &str) -> Result<Format> {
        Ok(lookup(&MANIFEST.telemetry, "telemetry", name)?.format)
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let entry = lookup(&MANIFEST.telemetry, "telemetry", name)?;
        Ok(resolve_path(&entry.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_manifest_entry_is_readable() {
        for key in telemetry::keys() {
            let text = telemetry::text(&key).unwrap();
            assert!(!text.is_empty(), "{key} is empty");
        }
        assert_eq!(telemetry::format("rksml-backfill").unwrap(), Format::Rksml);
        assert!(telemetry::text("missing").is_err());
    }
}
