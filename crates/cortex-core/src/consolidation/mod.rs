//! Consolidation
//!
//! Duplicate-pair detection over active memories and a human-gated merge
//! that supersedes the predecessors. `execute_consolidate` runs detection
//! under a checkpoint/restore safety envelope; the current release never
//! auto-merges, so every detected pair is reported as skipped.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::{CortexError, Result};
use crate::model::{
    Edge, EdgeStatus, Memory, NewEdge, NewMemory, RelationType, SourceContext, SourceType,
};
use crate::similarity::{self, PrefilterBand};
use crate::storage::{create_checkpoint, restore_checkpoint, Store};

// ============================================================================
// DETECTION
// ============================================================================

/// A detected duplicate pair, similarity attached
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicatePair {
    pub first_id: String,
    pub second_id: String,
    pub similarity: f64,
}

/// Similarity for one pair: Jaccard decides the band; inside the maybe
/// band, cosine over same-shape embeddings is preferred (remote over local
/// when both sides carry both), with Jaccard as the fallback.
fn pair_similarity(a: &Memory, b: &Memory) -> Option<f64> {
    let jaccard = similarity::text_jaccard(&a.summary, &b.summary);
    match similarity::prefilter(jaccard) {
        PrefilterBand::DefinitelyDifferent => None,
        PrefilterBand::DefinitelySimilar => Some(jaccard),
        PrefilterBand::Maybe => {
            if let (Some(left), Some(right)) = (&a.remote_embedding, &b.remote_embedding) {
                if let Ok(score) = similarity::cosine(left, right) {
                    return Some(score);
                }
            }
            if let (Some(left), Some(right)) = (&a.local_embedding, &b.local_embedding) {
                if let Ok(score) = similarity::cosine_f32(left, right) {
                    return Some(score);
                }
            }
            Some(jaccard)
        }
    }
}

/// Find all i<j pairs of active memories whose similarity clears the
/// threshold, sorted by similarity descending. Read-only.
pub fn detect_duplicates(store: &Store, threshold: f64) -> Result<Vec<DuplicatePair>> {
    let active = store.active_memories()?;
    let mut pairs = Vec::new();

    for i in 0..active.len() {
        for j in (i + 1)..active.len() {
            let Some(score) = pair_similarity(&active[i], &active[j]) else {
                continue;
            };
            if score >= threshold {
                pairs.push(DuplicatePair {
                    first_id: active[i].id.clone(),
                    second_id: active[j].id.clone(),
                    similarity: score,
                });
            }
        }
    }

    pairs.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(pairs)
}

// ============================================================================
// MERGE
// ============================================================================

/// Merge a detected pair into one memory (human-initiated).
///
/// The merged memory takes the stronger confidence and priority of its
/// predecessors, the union of their tags, and a source context recording
/// what it superseded. Two supersedes edges (strength 1.0) and both status
/// transitions land in the same transaction as the insert.
pub fn merge_pair(
    store: &Store,
    pair: &DuplicatePair,
    merged_summary: &str,
    merged_content: &str,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<Memory> {
    let first = store.require_memory(&pair.first_id)?;
    let second = store.require_memory(&pair.second_id)?;

    let context = SourceContext {
        merged_from: vec![first.id.clone(), second.id.clone()],
        session_id: Some(session_id.to_string()),
        ..Default::default()
    };

    let mut tags = first.tags.clone();
    for tag in &second.tags {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }

    let merged = Memory::create(NewMemory {
        content: merged_content.to_string(),
        summary: merged_summary.to_string(),
        memory_type: first.memory_type,
        scope: first.scope,
        confidence: first.confidence.max(second.confidence),
        priority: first.priority.max(second.priority),
        pinned: first.pinned || second.pinned,
        source_type: SourceType::Extraction,
        source_session: session_id.to_string(),
        source_context: Some(context),
        tags,
        created_at: Some(now),
        ..Default::default()
    })?;

    let edges = [
        Edge::create(NewEdge {
            source_id: merged.id.clone(),
            target_id: first.id.clone(),
            relation_type: RelationType::Supersedes,
            strength: 1.0,
            bidirectional: false,
            status: EdgeStatus::Active,
            created_at: Some(now),
        })?,
        Edge::create(NewEdge {
            source_id: merged.id.clone(),
            target_id: second.id.clone(),
            relation_type: RelationType::Supersedes,
            strength: 1.0,
            bidirectional: false,
            status: EdgeStatus::Active,
            created_at: Some(now),
        })?,
    ];

    store.apply_merge(
        &merged,
        &edges,
        &[first.id.clone(), second.id.clone()],
        now,
    )?;
    store.require_memory(&merged.id)
}

// ============================================================================
// CONSOLIDATE RUN
// ============================================================================

/// Outcome of a consolidation run
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidateReport {
    pub pairs_found: usize,
    pub pairs_merged: usize,
    pub pairs_skipped: usize,
    pub passes: usize,
}

/// Detect duplicate pairs under the checkpoint envelope.
///
/// No auto-merge happens in this release, so the detection loop breaks
/// after its first pass and every pair counts as skipped. On any error the
/// checkpoint is restored and the failure surfaces as SafetyRollback
/// carrying the original reason. On success the checkpoint file is
/// deleted.
pub fn execute_consolidate(store: &Store, config: &EngineConfig) -> Result<ConsolidateReport> {
    let checkpoint_path = create_checkpoint(store)?;

    let run = || -> Result<ConsolidateReport> {
        let mut report = ConsolidateReport::default();
        for pass in 1..=config.max_passes.max(1) {
            report.passes = pass;
            let pairs = detect_duplicates(store, config.consolidation_threshold)?;
            if pass == 1 {
                report.pairs_found = pairs.len();
            }
            // Merges are human-gated in this release; a pass that merged
            // nothing cannot converge further.
            if report.pairs_merged == 0 {
                break;
            }
        }
        report.pairs_skipped = report.pairs_found - report.pairs_merged;
        Ok(report)
    };

    match run() {
        Ok(report) => {
            if let Err(e) = std::fs::remove_file(&checkpoint_path) {
                tracing::warn!(error = %e, "failed to delete consolidation checkpoint");
            }
            Ok(report)
        }
        Err(original) => {
            if let Err(restore_error) = restore_checkpoint(store, &checkpoint_path) {
                tracing::warn!(error = %restore_error, "checkpoint restore failed");
            }
            Err(CortexError::SafetyRollback(original.to_string()))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::REMOTE_DIMENSIONS;
    use crate::model::{MemoryStatus, MemoryType, Scope};
    use tempfile::TempDir;

    fn test_store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("p.db"), Scope::Project).unwrap();
        (dir, store)
    }

    fn insert(store: &Store, id: &str, summary: &str) -> Memory {
        let memory = Memory::create(NewMemory {
            id: Some(id.into()),
            content: format!("{summary} in detail"),
            summary: summary.into(),
            memory_type: MemoryType::Pattern,
            scope: Scope::Project,
            confidence: 0.8,
            priority: 5,
            source_type: SourceType::Extraction,
            source_session: "sess".into(),
            ..Default::default()
        })
        .unwrap();
        store.insert_memory(&memory).unwrap();
        memory
    }

    #[test]
    fn test_detect_near_duplicates() {
        let (_dir, store) = test_store();
        insert(&store, "a", "use the builder pattern for config structs");
        insert(&store, "b", "use the builder pattern for config structs everywhere");
        insert(&store, "c", "always run migrations inside a transaction");

        let pairs = detect_duplicates(&store, 0.5).unwrap();
        assert_eq!(pairs.len(), 1);
        let pair = &pairs[0];
        assert!(pair.similarity > 0.6);
        assert!(
            (pair.first_id == "a" && pair.second_id == "b")
                || (pair.first_id == "b" && pair.second_id == "a")
        );
    }

    #[test]
    fn test_detect_sorted_descending() {
        let (_dir, store) = test_store();
        insert(&store, "a", "cache invalidation is hard");
        insert(&store, "b", "cache invalidation is hard work");
        insert(&store, "c", "cache invalidation is hard work indeed friend");

        let pairs = detect_duplicates(&store, 0.5).unwrap();
        assert!(pairs.len() >= 2);
        assert!(pairs.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn test_maybe_band_prefers_remote_cosine() {
        let (_dir, store) = test_store();
        // Summaries overlap partially: Jaccard lands in the maybe band
        insert(&store, "a", "retry the request with jitter backoff");
        insert(&store, "b", "retry the fetch call with exponential delay");

        let mut vector = vec![0.0; REMOTE_DIMENSIONS];
        vector[0] = 1.0;
        store.set_remote_embedding("a", &vector).unwrap();
        store.set_remote_embedding("b", &vector).unwrap();

        // Identical vectors: cosine 1.0 clears any threshold
        let pairs = detect_duplicates(&store, 0.99).unwrap();
        assert_eq!(pairs.len(), 1);
        assert!((pairs[0].similarity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_merge_pair_supersedes_predecessors() {
        let (_dir, store) = test_store();
        let mut first = insert(&store, "a", "first duplicate");
        let _second = insert(&store, "b", "second duplicate");
        first.tags = vec!["keep".into()];

        let pair = DuplicatePair {
            first_id: "a".into(),
            second_id: "b".into(),
            similarity: 0.9,
        };
        let merged = merge_pair(
            &store,
            &pair,
            "merged summary",
            "merged content",
            "merge-session",
            Utc::now(),
        )
        .unwrap();

        assert_eq!(merged.status, MemoryStatus::Active);
        let context = merged.context().unwrap();
        assert_eq!(context.merged_from, vec!["a".to_string(), "b".to_string()]);

        for id in ["a", "b"] {
            assert_eq!(
                store.get_memory(id).unwrap().unwrap().status,
                MemoryStatus::Superseded
            );
        }

        let supersedes = store
            .edges_from(&merged.id, Some(RelationType::Supersedes))
            .unwrap();
        assert_eq!(supersedes.len(), 2);
        assert!(supersedes.iter().all(|e| e.strength == 1.0));
    }

    // Scenario: detection finds the pair, merges nothing, deletes the
    // checkpoint, leaves both memories active.
    #[test]
    fn test_execute_consolidate_gated() {
        let (_dir, store) = test_store();
        insert(&store, "a", "identical content twin");
        insert(&store, "b", "identical content twin");

        let report = execute_consolidate(&store, &EngineConfig::default()).unwrap();
        assert_eq!(report.pairs_found, 1);
        assert_eq!(report.pairs_merged, 0);
        assert_eq!(report.pairs_skipped, 1);
        assert_eq!(report.passes, 1);

        for id in ["a", "b"] {
            assert_eq!(
                store.get_memory(id).unwrap().unwrap().status,
                MemoryStatus::Active
            );
        }
        assert!(!store.path().with_file_name("p.db.checkpoint").exists());
    }

    #[test]
    fn test_consolidate_no_duplicates_noop() {
        let (_dir, store) = test_store();
        insert(&store, "a", "completely unrelated topic alpha");
        insert(&store, "b", "orthogonal subject matter beta");

        let before: Vec<String> = store
            .active_memories()
            .unwrap()
            .iter()
            .map(|m| m.id.clone())
            .collect();
        let report = execute_consolidate(&store, &EngineConfig::default()).unwrap();
        assert_eq!(report.pairs_found, 0);

        let after: Vec<String> = store
            .active_memories()
            .unwrap()
            .iter()
            .map(|m| m.id.clone())
            .collect();
        assert_eq!(before, after);
    }
}
