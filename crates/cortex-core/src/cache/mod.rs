//! Surface cache and telemetry snapshot
//!
//! The cache is a JSON file under `.memory/surface-cache/` holding the last
//! rendered surface plus generation metadata. Telemetry is a read-only
//! aggregate over both scope DBs plus the cache directory; it never mutates
//! state.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::model::{MemoryType, Scope};
use crate::storage::Store;
use crate::workspace::WorkspacePaths;

/// File name of the single cache entry
const CACHE_FILE: &str = "surface.json";

// ============================================================================
// SURFACE CACHE
// ============================================================================

/// Persisted cache entry for a generated surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceCache {
    /// The rendered markdown
    pub surface: String,
    pub branch: String,
    pub cwd: String,
    pub generated_at: DateTime<Utc>,
}

/// Cache age relative to the caller's "now"
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Staleness {
    pub stale: bool,
    pub age_hours: f64,
}

/// Compute staleness: at or past the configured age the cache is stale.
pub fn compute_staleness(
    generated_at: DateTime<Utc>,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Staleness {
    let age_hours = (now - generated_at).num_seconds().max(0) as f64 / 3600.0;
    Staleness {
        stale: age_hours >= config.stale_cache_hours as f64,
        age_hours,
    }
}

/// Persist the cache entry, creating the cache directory if needed.
pub fn save_surface_cache(paths: &WorkspacePaths, cache: &SurfaceCache) -> Result<()> {
    let dir = paths.surface_cache_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(cache)
        .map_err(|e| crate::error::CortexError::Internal(format!("cache serialize: {e}")))?;
    std::fs::write(dir.join(CACHE_FILE), json)?;
    Ok(())
}

/// Load the cached surface with its staleness, or None when the cache
/// directory or file is absent or malformed.
pub fn load_cached_surface(
    paths: &WorkspacePaths,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Option<(SurfaceCache, Staleness)> {
    let file = paths.surface_cache_dir().join(CACHE_FILE);
    let raw = std::fs::read_to_string(file).ok()?;
    let cache: SurfaceCache = serde_json::from_str(&raw).ok()?;
    let staleness = compute_staleness(cache.generated_at, now, config);
    Some((cache, staleness))
}

/// Remove every entry from the cache directory. A missing directory
/// succeeds silently.
pub fn invalidate_surface_cache(paths: &WorkspacePaths) -> Result<()> {
    let dir = paths.surface_cache_dir();
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        std::fs::remove_file(entry.path())?;
    }
    Ok(())
}

// ============================================================================
// TELEMETRY
// ============================================================================

/// Outcome of the most recent extraction run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastExtraction {
    /// "success" or "failure"; anything else invalidates the record
    pub status: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-type and per-scope memory counts, every key pre-populated to zero
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryCounts {
    pub total: i64,
    pub by_type: BTreeMap<String, i64>,
    pub by_scope: BTreeMap<String, i64>,
}

/// Cache directory observation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStaleness {
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_hours: Option<f64>,
}

/// The full telemetry payload written to the status file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_extraction: Option<LastExtraction>,
    pub memory_counts: MemoryCounts,
    pub edge_count: i64,
    /// Memories where both embedding slots are still null
    pub embedding_queue_size: i64,
    pub cache_staleness: CacheStaleness,
}

/// Parse the last-extraction record from the status file, validating its
/// status field. Missing or malformed files yield None.
pub fn read_last_extraction(paths: &WorkspacePaths) -> Option<LastExtraction> {
    let raw = std::fs::read_to_string(paths.status_file()).ok()?;
    let snapshot: serde_json::Value = serde_json::from_str(&raw).ok()?;
    let record: LastExtraction =
        serde_json::from_value(snapshot.get("lastExtraction")?.clone()).ok()?;
    if record.status != "success" && record.status != "failure" {
        return None;
    }
    Some(record)
}

/// Most recent modification age (hours) across cache-directory files.
fn cache_age_hours(dir: &Path, now: DateTime<Utc>) -> Option<f64> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut newest: Option<std::time::SystemTime> = None;
    for entry in entries.flatten() {
        if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                newest = Some(match newest {
                    Some(current) if current >= modified => current,
                    _ => modified,
                });
            }
        }
    }
    let newest: DateTime<Utc> = newest?.into();
    Some((now - newest).num_seconds().max(0) as f64 / 3600.0)
}

/// Aggregate a read-only snapshot over both scope DBs.
pub fn collect_telemetry(
    project: &Store,
    global: &Store,
    paths: &WorkspacePaths,
    now: DateTime<Utc>,
) -> Result<TelemetrySnapshot> {
    let mut by_type: BTreeMap<String, i64> = MemoryType::ALL
        .iter()
        .map(|t| (t.as_str().to_string(), 0))
        .collect();
    let mut by_scope: BTreeMap<String, i64> = [Scope::Project, Scope::Global]
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();

    let mut total = 0;
    for store in [project, global] {
        let count = store.count_memories()?;
        total += count;
        *by_scope.entry(store.scope().as_str().to_string()).or_insert(0) += count;
        for (memory_type, count) in store.type_counts()? {
            *by_type.entry(memory_type.as_str().to_string()).or_insert(0) += count;
        }
    }

    let edge_count = project.edge_count()? + global.edge_count()?;
    let embedding_queue_size =
        project.embedding_queue_size()? + global.embedding_queue_size()?;

    let cache_dir = paths.surface_cache_dir();
    let age_hours = cache_age_hours(&cache_dir, now);
    let cache_staleness = CacheStaleness {
        exists: age_hours.is_some(),
        age_hours,
    };

    Ok(TelemetrySnapshot {
        last_extraction: read_last_extraction(paths),
        memory_counts: MemoryCounts {
            total,
            by_type,
            by_scope,
        },
        edge_count,
        embedding_queue_size,
        cache_staleness,
    })
}

/// Write the telemetry snapshot to the status file.
pub fn write_status_file(paths: &WorkspacePaths, snapshot: &TelemetrySnapshot) -> Result<()> {
    std::fs::create_dir_all(paths.memory_dir())?;
    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| crate::error::CortexError::Internal(format!("telemetry serialize: {e}")))?;
    std::fs::write(paths.status_file(), json)?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
