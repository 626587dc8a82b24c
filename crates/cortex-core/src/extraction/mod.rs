//! Extraction pipeline
//!
//! Session-end entry point: windows the transcript from the last
//! checkpoint, asks the external extractor for candidates, deduplicates,
//! inserts, wires similarity edges, saves the cursor, and finishes with a
//! lifecycle sweep. The pipeline never propagates an error to the invoking
//! hook; every failure mode lands in the returned report.

pub mod gitctx;
pub mod llm;
pub mod parse;
pub mod prompt;
pub mod window;

pub use gitctx::{derive_git_context, GitContext};
pub use llm::{CandidateExtractor, RemoteExtractor};
pub use parse::{parse_extraction_response, Candidate};
pub use window::take_window;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::lifecycle::{run_sweep, SweepReport};
use crate::model::{
    Edge, EdgeStatus, ExtractionCheckpoint, Memory, NewEdge, NewMemory, RelationType, Scope,
    SourceContext, SourceType,
};
use crate::similarity::{self, PrefilterBand, SimilarityAction};
use crate::storage::{route_scope, Store};

/// Commits stamped into a memory's source context
const CONTEXT_COMMIT_LIMIT: usize = 3;

/// Files stamped into a memory's source context
const CONTEXT_FILE_LIMIT: usize = 10;

// ============================================================================
// HOOK INPUT / REPORT
// ============================================================================

/// Stop-hook payload read from stdin. Unknown extra keys are tolerated;
/// missing or mistyped required fields reject the input.
#[derive(Debug, Clone, Deserialize)]
pub struct HookInput {
    pub session_id: String,
    pub transcript_path: String,
    pub cwd: String,
}

/// Extraction tunables beyond the engine config
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractionOptions {
    /// Coerce unknown candidate types to `context` instead of dropping
    pub lenient_types: bool,
}

/// What one extraction invocation did. Always returned, never thrown.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub session_id: String,
    pub cursor: u64,
    pub candidates_found: usize,
    pub candidates_dropped: usize,
    pub inserted: usize,
    pub duplicates_skipped: usize,
    pub edges_created: usize,
    pub edges_suggested: usize,
    /// Pairs the classifier marked consolidate; recorded, not written
    pub consolidation_flagged: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<SweepReport>,
}

impl ExtractionReport {
    fn failed(session_id: &str, cursor: u64, error: impl Into<String>) -> ExtractionReport {
        ExtractionReport {
            success: false,
            error: Some(error.into()),
            session_id: session_id.to_string(),
            cursor,
            ..Default::default()
        }
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Run the full extraction pipeline. Infallible by contract: all failure
/// modes produce a `success = false` report so the hook is never blocked.
pub fn run_extraction(
    input: &HookInput,
    project: &Store,
    global: &Store,
    extractor: &dyn CandidateExtractor,
    config: &EngineConfig,
    options: ExtractionOptions,
    now: DateTime<Utc>,
) -> ExtractionReport {
    let session_id = input.session_id.as_str();

    // 1. Transcript bytes
    let transcript = match std::fs::read(&input.transcript_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            return ExtractionReport::failed(
                session_id,
                0,
                format!("transcript read failed: {e}"),
            );
        }
    };

    // 2. Resume cursor
    let cursor = match project.get_extraction_checkpoint(session_id) {
        Ok(checkpoint) => checkpoint.map(|c| c.cursor_position).unwrap_or(0),
        Err(e) => {
            return ExtractionReport::failed(session_id, 0, format!("checkpoint read failed: {e}"));
        }
    };

    // 3. Window
    let window = take_window(&transcript, cursor, config.extraction_window_bytes);
    let mut report = ExtractionReport {
        success: true,
        session_id: session_id.to_string(),
        cursor: window.new_cursor,
        ..Default::default()
    };

    if window.text.is_empty() {
        report.lifecycle = run_final_sweep(project, global, config, now);
        return report;
    }

    // 4. Git context
    let cwd = std::path::Path::new(&input.cwd);
    let git = derive_git_context(cwd);
    let project_name = cwd
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    // 5.-6. Prompt and extractor call. A failed or unparseable window is
    // skipped, not retried: the checkpoint still advances to the window end.
    let prompt = prompt::build_extraction_prompt(&window.text, &git, &project_name);
    let raw = match extractor.extract(&prompt) {
        Ok(raw) => raw,
        Err(e) => {
            save_cursor(project, session_id, window.new_cursor);
            return ExtractionReport::failed(
                session_id,
                window.new_cursor,
                format!("extractor failed: {e}"),
            );
        }
    };

    // 7. Parse
    let parsed = match parse_extraction_response(
        &raw,
        options.lenient_types,
        config.global_scope_min_confidence,
    ) {
        Ok(parsed) => parsed,
        Err(e) => {
            save_cursor(project, session_id, window.new_cursor);
            return ExtractionReport::failed(
                session_id,
                window.new_cursor,
                format!("response parse failed: {e}"),
            );
        }
    };
    report.candidates_found = parsed.candidates.len();
    report.candidates_dropped = parsed.dropped;

    // 8. Dedup against existing actives (both scopes) and intra-batch
    let project_existing = project.active_memories().unwrap_or_default();
    let global_existing = global.active_memories().unwrap_or_default();

    let mut existing_summaries: Vec<std::collections::HashSet<String>> = project_existing
        .iter()
        .chain(global_existing.iter())
        .map(|m| similarity::tokenize(&m.summary))
        .collect();

    let mut surviving: Vec<Candidate> = Vec::new();
    for candidate in parsed.candidates {
        let tokens = similarity::tokenize(&candidate.summary);
        let duplicate = existing_summaries
            .iter()
            .any(|known| similarity::jaccard(&tokens, known) >= config.dedup_threshold);
        if duplicate {
            report.duplicates_skipped += 1;
            continue;
        }
        existing_summaries.push(tokens);
        surviving.push(candidate);
    }

    // 9. Insert, embeddings queued for backfill
    let context = SourceContext {
        branch: Some(git.branch.clone()),
        commits: git.commits.iter().take(CONTEXT_COMMIT_LIMIT).cloned().collect(),
        files: git.files.iter().take(CONTEXT_FILE_LIMIT).cloned().collect(),
        session_id: Some(session_id.to_string()),
        ..Default::default()
    };

    let mut inserted: Vec<Memory> = Vec::new();
    for candidate in surviving {
        let built = Memory::create(NewMemory {
            content: candidate.content,
            summary: candidate.summary,
            memory_type: candidate.memory_type,
            scope: candidate.scope,
            confidence: candidate.confidence,
            priority: candidate.priority,
            source_type: SourceType::Extraction,
            source_session: session_id.to_string(),
            source_context: Some(context.clone()),
            tags: candidate.tags,
            created_at: Some(now),
            ..Default::default()
        });
        let memory = match built {
            Ok(memory) => memory,
            Err(e) => {
                tracing::warn!(error = %e, "candidate failed validation");
                continue;
            }
        };

        let store = route_scope(memory.scope, project, global);
        match store.insert_memory(&memory) {
            Ok(()) => {
                report.inserted += 1;
                inserted.push(memory);
            }
            Err(e) => {
                tracing::warn!(id = %memory.id, error = %e, "memory insert failed");
            }
        }
    }

    // 10. Edge creation against pre-existing memories of the same scope
    for memory in &inserted {
        let peers = match memory.scope {
            Scope::Project => &project_existing,
            Scope::Global => &global_existing,
        };
        let store = route_scope(memory.scope, project, global);
        let own_tokens = similarity::tokenize(&memory.similarity_text());

        for peer in peers {
            let score = similarity::jaccard(
                &own_tokens,
                &similarity::tokenize(&peer.similarity_text()),
            );
            let edge_kind = match similarity::prefilter(score) {
                PrefilterBand::DefinitelyDifferent => None,
                PrefilterBand::DefinitelySimilar => Some((EdgeStatus::Active, score)),
                PrefilterBand::Maybe => match similarity::classify_action(score) {
                    SimilarityAction::Relate { strength } => Some((EdgeStatus::Active, strength)),
                    SimilarityAction::Suggest { strength } => {
                        Some((EdgeStatus::Suggested, strength))
                    }
                    SimilarityAction::Consolidate => {
                        report.consolidation_flagged += 1;
                        None
                    }
                    SimilarityAction::Ignore => None,
                },
            };

            let Some((status, strength)) = edge_kind else {
                continue;
            };
            let edge = Edge::create(NewEdge {
                source_id: memory.id.clone(),
                target_id: peer.id.clone(),
                relation_type: RelationType::RelatesTo,
                strength,
                bidirectional: true,
                status,
                created_at: Some(now),
            });
            match edge.and_then(|e| store.insert_edge(&e)) {
                Ok(()) => match status {
                    EdgeStatus::Active => report.edges_created += 1,
                    EdgeStatus::Suggested => report.edges_suggested += 1,
                },
                Err(e) if e.is_duplicate_edge() => {
                    tracing::debug!(error = %e, "edge already present");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "edge insert failed");
                }
            }
        }
    }

    // 11. Checkpoint
    save_cursor(project, session_id, window.new_cursor);

    // 12. Lifecycle sweep; failures logged, never fatal
    report.lifecycle = run_final_sweep(project, global, config, now);

    report
}

fn save_cursor(project: &Store, session_id: &str, cursor: u64) {
    let saved = ExtractionCheckpoint::create(session_id, cursor)
        .and_then(|checkpoint| project.save_extraction_checkpoint(&checkpoint));
    if let Err(e) = saved {
        tracing::warn!(error = %e, "checkpoint save failed");
    }
}

fn run_final_sweep(
    project: &Store,
    global: &Store,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Option<SweepReport> {
    let mut combined = SweepReport::default();
    for store in [project, global] {
        match run_sweep(store, config, now) {
            Ok(report) => {
                combined.decayed += report.decayed;
                combined.archived += report.archived;
                combined.pruned += report.pruned;
            }
            Err(e) => {
                tracing::warn!(scope = %store.scope(), error = %e, "lifecycle sweep failed");
                return None;
            }
        }
    }
    Some(combined)
}

// ============================================================================
// TESTS
// ============================================================================
