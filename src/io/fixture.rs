use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument};

use crate::error::{Result, SyncError};
use crate::io::memory::{MemoryBackend, Row};
use crate::model::Origin;
use crate::partition::{Backend, Connector};

const FILE_SCHEME: &str = "file://";

/// Parses a fixture document of the form `{"<table>": [{row}, ...], ...}`
/// into a memory backend.
pub fn parse_fixture(origin: Origin, document: &Value) -> Result<MemoryBackend> {
    let tables = document
        .as_object()
        .ok_or_else(|| SyncError::InvalidFixture("top level must be an object".to_string()))?;

    let mut backend = MemoryBackend::for_origin(origin);
    for (table, rows) in tables {
        let rows = rows.as_array().ok_or_else(|| {
            SyncError::InvalidFixture(format!("table '{table}' must be an array of rows"))
        })?;
        let rows: Vec<Row> = rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                row.as_object().cloned().ok_or_else(|| {
                    SyncError::InvalidFixture(format!("row {index} of table '{table}' is not an object"))
                })
            })
            .collect::<Result<_>>()?;
        backend = backend.with_rows(table, rows);
    }
    Ok(backend)
}

/// Loads a fixture file from disk.
#[instrument(level = "info", skip_all, fields(%origin, path = %path.display()))]
pub fn load_fixture(origin: Origin, path: &Path) -> Result<MemoryBackend> {
    if !path.exists() {
        return Err(SyncError::MissingInput(path.to_path_buf()));
    }
    let source = fs::read_to_string(path)?;
    let document: Value = serde_json::from_str(&source)?;
    let backend = parse_fixture(origin, &document)?;
    info!("fixture loaded");
    Ok(backend)
}

/// Connector that treats endpoints as paths to fixture files, optionally
/// prefixed with `file://`. The key is required but not checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureConnector;

impl FixtureConnector {
    fn endpoint_path(endpoint: &str) -> Result<PathBuf> {
        if let Some(path) = endpoint.strip_prefix(FILE_SCHEME) {
            return Ok(PathBuf::from(path));
        }
        if endpoint.contains("://") {
            return Err(SyncError::UnsupportedEndpoint(endpoint.to_string()));
        }
        Ok(PathBuf::from(endpoint))
    }
}

impl Connector for FixtureConnector {
    fn connect(&self, origin: Origin, endpoint: &str, _key: &str) -> Result<Arc<dyn Backend>> {
        let path = Self::endpoint_path(endpoint)?;
        let backend = load_fixture(origin, &path)?;
        Ok(Arc::new(backend))
    }
}
