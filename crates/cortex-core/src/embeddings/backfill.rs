//! Embedding backfill
//!
//! Fills empty embedding slots on active memories. With a provider key the
//! remote path batches up to 100 texts per call; without one the local
//! model embeds one-by-one. Partial failures are counted and reported, not
//! propagated.

use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::model::Memory;
use crate::storage::Store;

use super::memory_embedding_text;
use super::remote::RemoteEmbeddingClient;

/// Outcome of one backfill run over one store
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub processed: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    /// "remote" or "local"
    pub method: String,
}

/// Backfill missing embeddings in one store. Catastrophic failures (the
/// initial candidate query) propagate; everything per-row or per-batch is
/// absorbed into the report.
pub fn run_backfill(
    store: &Store,
    remote: Option<&RemoteEmbeddingClient>,
    project_name: &str,
    config: &EngineConfig,
) -> Result<BackfillReport> {
    match remote {
        Some(client) => run_remote(store, client, project_name, config),
        None => run_local(store, project_name),
    }
}

fn embedding_text(memory: &Memory, project_name: &str) -> String {
    memory_embedding_text(memory.memory_type.as_str(), project_name, &memory.summary)
}

fn run_remote(
    store: &Store,
    client: &RemoteEmbeddingClient,
    project_name: &str,
    config: &EngineConfig,
) -> Result<BackfillReport> {
    let pending = store.missing_remote_embedding()?;
    let mut report = BackfillReport {
        method: "remote".into(),
        ..Default::default()
    };

    for batch in pending.chunks(config.remote_batch_size.min(super::remote::MAX_BATCH)) {
        let texts: Vec<String> = batch
            .iter()
            .map(|m| embedding_text(m, project_name))
            .collect();

        match client.embed_texts(&texts) {
            Ok(vectors) => {
                for (memory, vector) in batch.iter().zip(vectors.iter()) {
                    match store.set_remote_embedding(&memory.id, vector) {
                        Ok(()) => report.processed += 1,
                        Err(e) => {
                            report.failed += 1;
                            report.errors.push(format!("{}: {e}", memory.id));
                            tracing::warn!(id = %memory.id, error = %e, "embedding write failed");
                        }
                    }
                }
            }
            Err(e) => {
                // The whole batch failed; one message covers it
                report.failed += batch.len();
                report.errors.push(format!("batch of {}: {e}", batch.len()));
                tracing::warn!(batch = batch.len(), error = %e, "remote embed batch failed");
            }
        }
    }

    Ok(report)
}

#[cfg(feature = "local-embeddings")]
fn run_local(store: &Store, project_name: &str) -> Result<BackfillReport> {
    use super::local::{embed_local, ensure_model_loaded};

    let pending = store.missing_local_embedding()?;
    let mut report = BackfillReport {
        method: "local".into(),
        ..Default::default()
    };

    if let Err(e) = ensure_model_loaded() {
        report.failed = pending.len();
        report
            .errors
            .push(format!("local embedding model failed to load: {e}"));
        return Ok(report);
    }

    for memory in &pending {
        let text = embedding_text(memory, project_name);
        match embed_local(&text).and_then(|v| store.set_local_embedding(&memory.id, &v)) {
            Ok(()) => report.processed += 1,
            Err(e) => {
                report.failed += 1;
                report.errors.push(format!("{}: {e}", memory.id));
                tracing::warn!(id = %memory.id, error = %e, "local embed failed");
            }
        }
    }

    Ok(report)
}

#[cfg(not(feature = "local-embeddings"))]
fn run_local(store: &Store, _project_name: &str) -> Result<BackfillReport> {
    let pending = store.missing_local_embedding()?;
    let mut report = BackfillReport {
        method: "local".into(),
        ..Default::default()
    };
    report.failed = pending.len();
    if !pending.is_empty() {
        report
            .errors
            .push("local embedding model failed to load: built without local-embeddings".into());
    }
    Ok(report)
}
