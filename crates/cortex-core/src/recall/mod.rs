//! Recall and traverse orchestration
//!
//! Recall prefers embedding search when a provider key is present and falls
//! back to keyword search on any failure, reporting which method ran.
//! Returned primaries are expanded with linked code (source_of edges) and a
//! bounded graph neighborhood, then have their access stats bumped.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::embeddings::{query_embedding_text, remote::RemoteEmbeddingClient};
use crate::error::{CortexError, Result};
use crate::graph::{Direction, MemoryGraph, TraverseOptions};
use crate::model::{Memory, RelationType, Scope, SourceContext};
use crate::ranking::{merge_results, ScoredMemory};
use crate::similarity;
use crate::storage::{route_scope, Store};

// ============================================================================
// RECALL
// ============================================================================

/// Recall tuning knobs
#[derive(Debug, Clone)]
pub struct RecallOptions {
    pub branch: Option<String>,
    pub limit: usize,
    /// Skip embedding search even when a key is available
    pub force_keyword: bool,
}

impl Default for RecallOptions {
    fn default() -> Self {
        RecallOptions {
            branch: None,
            limit: 10,
            force_keyword: false,
        }
    }
}

/// A related memory reached by traversal
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedMemory {
    pub memory: Memory,
    pub depth: u32,
}

/// One recall result with its expansions
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallHit {
    pub memory: Memory,
    pub score: f64,
    /// Raw code memories linked through outgoing source_of edges
    pub linked_code: Vec<Memory>,
    pub related: Vec<RelatedMemory>,
}

/// Full recall response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallResponse {
    /// "embedding" or "keyword"
    pub method: String,
    pub hits: Vec<RecallHit>,
}

/// Run recall across both scope DBs.
pub fn recall(
    project: &Store,
    global: &Store,
    query: &str,
    options: &RecallOptions,
    remote: Option<&RemoteEmbeddingClient>,
    project_name: &str,
    now: DateTime<Utc>,
) -> Result<RecallResponse> {
    let (mut results, method) = match remote {
        Some(client) if !options.force_keyword => {
            match embedding_search(project, global, query, options.limit, client, project_name) {
                Ok(results) => (results, "embedding"),
                Err(e) => {
                    tracing::warn!(error = %e, "embedding recall failed, falling back to keyword");
                    (keyword_search(project, global, query, options.limit)?, "keyword")
                }
            }
        }
        _ => (keyword_search(project, global, query, options.limit)?, "keyword"),
    };

    // Branch filter: only memories whose recorded branch matches survive;
    // parse failures drop silently.
    if let Some(wanted) = &options.branch {
        results.retain(|r| {
            SourceContext::branch_of(&r.memory.source_context).as_deref() == Some(wanted.as_str())
        });
    }

    let hits = expand_hits(project, global, results)?;

    // Access stats, batched per scope DB
    let mut by_scope: BTreeMap<Scope, Vec<String>> = BTreeMap::new();
    for hit in &hits {
        by_scope
            .entry(hit.memory.scope)
            .or_default()
            .push(hit.memory.id.clone());
    }
    for (scope, ids) in by_scope {
        route_scope(scope, project, global).record_access(&ids, now)?;
    }

    Ok(RecallResponse {
        method: method.to_string(),
        hits,
    })
}

/// Cosine-ranked embedding search over both DBs, top `limit` per DB.
fn embedding_search(
    project: &Store,
    global: &Store,
    query: &str,
    limit: usize,
    client: &RemoteEmbeddingClient,
    project_name: &str,
) -> Result<Vec<ScoredMemory>> {
    let query_text = query_embedding_text(project_name, query);
    let mut vectors = client.embed_texts(&[query_text])?;
    let query_vector = vectors
        .pop()
        .ok_or_else(|| CortexError::MalformedResponse("no query embedding returned".into()))?;

    let mut per_scope = Vec::new();
    for store in [project, global] {
        let mut scored: Vec<ScoredMemory> = store
            .memories_with_remote_embedding()?
            .into_iter()
            .filter_map(|memory| {
                let embedding = memory.remote_embedding.as_deref()?;
                let score = similarity::cosine(&query_vector, embedding).ok()?;
                Some(ScoredMemory { memory, score })
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        per_scope.push(scored);
    }

    let global_results = per_scope.pop().unwrap_or_default();
    let project_results = per_scope.pop().unwrap_or_default();
    Ok(merge_results(project_results, global_results, limit))
}

/// FTS-backed keyword search over both DBs. Scores follow index rank order
/// so merging stays stable.
fn keyword_search(
    project: &Store,
    global: &Store,
    query: &str,
    limit: usize,
) -> Result<Vec<ScoredMemory>> {
    let score_by_rank = |memories: Vec<Memory>| -> Vec<ScoredMemory> {
        memories
            .into_iter()
            .enumerate()
            .map(|(position, memory)| ScoredMemory {
                memory,
                score: 1.0 / (position as f64 + 1.0),
            })
            .collect()
    };

    let project_results = score_by_rank(project.keyword_search(query, limit)?);
    let global_results = score_by_rank(global.keyword_search(query, limit)?);
    Ok(merge_results(project_results, global_results, limit))
}

/// Attach linked code and a depth-2 neighborhood to each primary hit.
fn expand_hits(
    project: &Store,
    global: &Store,
    results: Vec<ScoredMemory>,
) -> Result<Vec<RecallHit>> {
    let primary_ids: HashSet<String> = results.iter().map(|r| r.memory.id.clone()).collect();
    let mut hits = Vec::with_capacity(results.len());

    for result in results {
        let store = route_scope(result.memory.scope, project, global);

        // Linked code blocks through outgoing source_of edges
        let code_ids: Vec<String> = store
            .edges_from(&result.memory.id, Some(RelationType::SourceOf))?
            .into_iter()
            .map(|edge| edge.target_id)
            .collect();
        let linked_code = store.memories_by_ids(&code_ids)?;

        // Bounded neighborhood, both directions, depth 2
        let edges = store.all_edges()?;
        let graph = MemoryGraph::build(&edges, None, 0.0);
        let traverse_options = TraverseOptions {
            max_depth: 2,
            direction: Direction::Both,
            ..Default::default()
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut related = Vec::new();
        for hit in graph.traverse(&result.memory.id, &traverse_options) {
            if primary_ids.contains(&hit.memory_id) || !seen.insert(hit.memory_id.clone()) {
                continue;
            }
            if let Some(memory) = store.get_memory(&hit.memory_id)? {
                related.push(RelatedMemory {
                    memory,
                    depth: hit.depth,
                });
            }
        }

        hits.push(RecallHit {
            memory: result.memory,
            score: result.score,
            linked_code,
            related,
        });
    }

    Ok(hits)
}

// ============================================================================
// TRAVERSE
// ============================================================================

/// Validated traverse request
#[derive(Debug, Clone)]
pub struct TraverseRequest {
    pub start_id: String,
    pub options: TraverseOptions,
}

/// Traverse response: discovered memories grouped by depth
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraverseResponse {
    pub start_id: String,
    pub by_depth: BTreeMap<u32, Vec<Memory>>,
}

/// Run a bounded traversal from a start memory in one store.
pub fn traverse(store: &Store, request: &TraverseRequest) -> Result<TraverseResponse> {
    request.options.validate()?;
    // Missing start is an error, not an empty result
    store.require_memory(&request.start_id)?;

    let edges = store.all_edges()?;
    let graph = MemoryGraph::build(
        &edges,
        request.options.relation_types.as_ref(),
        request.options.min_strength,
    );

    let mut ids_by_depth: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    for hit in graph.traverse(&request.start_id, &request.options) {
        ids_by_depth.entry(hit.depth).or_default().push(hit.memory_id);
    }

    let mut by_depth = BTreeMap::new();
    for (depth, ids) in ids_by_depth {
        by_depth.insert(depth, store.memories_by_ids(&ids)?);
    }

    Ok(TraverseResponse {
        start_id: request.start_id.clone(),
        by_depth,
    })
}

// ============================================================================
// TESTS
// ============================================================================
