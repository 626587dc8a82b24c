//! Ranking and surface selection
//!
//! Composite rank over confidence, priority, centrality, access frequency,
//! branch affinity, and recency; category-budgeted selection with overflow
//! redistribution; and project/global result merging.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::decay::age_days;
use crate::model::{Memory, MemoryType, SourceContext};

// ============================================================================
// COMPOSITE RANK
// ============================================================================

/// A memory with its computed rank
#[derive(Debug, Clone)]
pub struct RankedMemory {
    pub memory: Memory,
    pub rank: f64,
}

/// A search hit with its retrieval score
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: Memory,
    pub score: f64,
}

/// Composite rank in [0, 1].
///
/// Weighted sum of confidence (0.50), priority (0.20), centrality (0.15),
/// and log-normalized access count (0.15), plus a 0.10 branch boost when
/// the memory's source branch matches the active one. The whole sum is
/// multiplied by a recency factor (skipped for pinned memories) and
/// clamped.
pub fn rank_memory(
    memory: &Memory,
    centrality: f64,
    max_log_access: f64,
    active_branch: Option<&str>,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> f64 {
    let access_component = if max_log_access > 0.0 {
        ((memory.access_count as f64) + 1.0).ln() / max_log_access
    } else {
        0.0
    };

    let mut rank = 0.50 * memory.confidence
        + 0.20 * (memory.priority as f64 / 10.0)
        + 0.15 * centrality
        + 0.15 * access_component;

    // Branch boost; context parse failures silently drop it
    if let Some(active) = active_branch {
        if SourceContext::branch_of(&memory.source_context).as_deref() == Some(active) {
            rank += 0.10;
        }
    }

    if !memory.pinned {
        let age = age_days(memory.created_at, now).max(0.0);
        let recency = 1.0 / (1.0 + age / config.recency_half_life_days);
        rank *= recency;
    }

    rank.clamp(0.0, 1.0)
}

/// Rank a set of memories, computing the corpus-wide max log-access once
/// and the per-memory centrality from the given map. Output is sorted by
/// rank descending.
pub fn rank_all(
    memories: Vec<Memory>,
    centrality: &HashMap<String, f64>,
    active_branch: Option<&str>,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Vec<RankedMemory> {
    let max_log_access = memories
        .iter()
        .map(|m| ((m.access_count as f64) + 1.0).ln())
        .fold(0.0_f64, f64::max);

    let mut ranked: Vec<RankedMemory> = memories
        .into_iter()
        .map(|memory| {
            let node_centrality = centrality.get(&memory.id).copied().unwrap_or(0.0);
            let rank = rank_memory(
                &memory,
                node_centrality,
                max_log_access,
                active_branch,
                config,
                now,
            );
            RankedMemory { memory, rank }
        })
        .collect();

    ranked.sort_by(|a, b| b.rank.partial_cmp(&a.rank).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}

// ============================================================================
// SURFACE SELECTION
// ============================================================================

/// Newline-separated line count of a summary, minimum 1.
fn line_cost(summary: &str) -> usize {
    summary.lines().count().max(1)
}

/// Token estimate for a summary: character count over 4, rounded up.
fn token_estimate(summary: &str) -> usize {
    summary.chars().count().div_ceil(4)
}

/// Pick the memories that make up a surface.
///
/// Raw code never surfaces. The first pass walks rank-descending under the
/// per-type line budgets until the token target or cap; if the target is
/// not reached, a second pass re-admits skipped memories ignoring the
/// per-type caps. The final selection is re-sorted by rank.
pub fn select_for_surface(
    ranked: &[RankedMemory],
    config: &EngineConfig,
) -> Vec<RankedMemory> {
    let mut ordered: Vec<&RankedMemory> = ranked
        .iter()
        .filter(|r| r.memory.memory_type != MemoryType::Code)
        .collect();
    ordered.sort_by(|a, b| b.rank.partial_cmp(&a.rank).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected: Vec<RankedMemory> = Vec::new();
    let mut selected_ids: Vec<String> = Vec::new();
    let mut lines_used: HashMap<MemoryType, usize> = HashMap::new();
    let mut tokens = 0usize;

    // First pass: respect category budgets
    for entry in &ordered {
        if tokens >= config.surface_target_tokens {
            break;
        }
        let memory_type = entry.memory.memory_type;
        let cost = line_cost(&entry.memory.summary);
        let used = lines_used.get(&memory_type).copied().unwrap_or(0);
        if used + cost > config.line_budget(memory_type) {
            continue;
        }
        let estimate = token_estimate(&entry.memory.summary);
        if tokens + estimate > config.surface_max_tokens {
            continue;
        }
        lines_used.insert(memory_type, used + cost);
        tokens += estimate;
        selected_ids.push(entry.memory.id.clone());
        selected.push((**entry).clone());
    }

    // Overflow redistribution: spend what the budgets left on the table
    if tokens < config.surface_target_tokens {
        for entry in &ordered {
            if tokens >= config.surface_target_tokens {
                break;
            }
            if selected_ids.contains(&entry.memory.id) {
                continue;
            }
            let estimate = token_estimate(&entry.memory.summary);
            if tokens + estimate > config.surface_max_tokens {
                continue;
            }
            tokens += estimate;
            selected_ids.push(entry.memory.id.clone());
            selected.push((**entry).clone());
        }
    }

    selected.sort_by(|a, b| b.rank.partial_cmp(&a.rank).unwrap_or(std::cmp::Ordering::Equal));
    selected
}

// ============================================================================
// RESULT MERGING
// ============================================================================

/// Merge per-scope search results. Project results take precedence on
/// duplicate ids; the merged list sorts by score descending and truncates
/// to `limit`.
pub fn merge_results(
    project: Vec<ScoredMemory>,
    global: Vec<ScoredMemory>,
    limit: usize,
) -> Vec<ScoredMemory> {
    let mut merged: Vec<ScoredMemory> = Vec::with_capacity(project.len() + global.len());
    let mut seen: Vec<String> = Vec::new();

    for result in project.into_iter().chain(global.into_iter()) {
        if seen.contains(&result.memory.id) {
            continue;
        }
        seen.push(result.memory.id.clone());
        merged.push(result);
    }

    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(limit);
    merged
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewMemory, Scope, SourceType};
    use chrono::Duration;

    fn memory_with(
        id: &str,
        memory_type: MemoryType,
        confidence: f64,
        branch: Option<&str>,
        now: DateTime<Utc>,
    ) -> Memory {
        let context = branch.map(|b| SourceContext {
            branch: Some(b.to_string()),
            ..Default::default()
        });
        Memory::create(NewMemory {
            id: Some(id.into()),
            content: format!("{id} content"),
            summary: format!("{id} summary"),
            memory_type,
            scope: Scope::Project,
            confidence,
            priority: 5,
            source_type: SourceType::Extraction,
            source_session: "sess".into(),
            source_context: context,
            created_at: Some(now),
            ..Default::default()
        })
        .unwrap()
    }

    fn scored(id: &str, score: f64, now: DateTime<Utc>) -> ScoredMemory {
        ScoredMemory {
            memory: memory_with(id, MemoryType::Context, 0.5, None, now),
            score,
        }
    }

    // Scenario: identical memories, only the branch differs; the one on the
    // active branch ranks strictly higher.
    #[test]
    fn test_branch_boost_orders_identical_memories() {
        let now = Utc::now();
        let config = EngineConfig::default();
        let on_main = memory_with("m1", MemoryType::Context, 0.7, Some("main"), now);
        let on_feature = memory_with("m2", MemoryType::Context, 0.7, Some("feature-branch"), now);

        let main_rank = rank_memory(&on_main, 0.0, 0.0, Some("main"), &config, now);
        let feature_rank = rank_memory(&on_feature, 0.0, 0.0, Some("main"), &config, now);
        assert!(main_rank > feature_rank);
        assert!((main_rank - feature_rank - 0.10).abs() < 1e-9);
    }

    #[test]
    fn test_rank_bounded_and_parse_failure_drops_boost() {
        let now = Utc::now();
        let config = EngineConfig::default();
        let mut memory = memory_with("m1", MemoryType::Context, 1.0, None, now);
        memory.source_context = "not json".into();
        memory.priority = 10;
        let rank = rank_memory(&memory, 1.0, 0.0, Some("main"), &config, now);
        assert!((0.0..=1.0).contains(&rank));
        // 0.5 + 0.2 + 0.15, no boost, age 0 so recency = 1
        assert!((rank - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_recency_multiplier_and_pinned_skip() {
        let now = Utc::now();
        let config = EngineConfig::default();
        let mut aged = memory_with("m1", MemoryType::Context, 0.8, None, now);
        aged.created_at = now - Duration::days(30);
        let fresh = memory_with("m2", MemoryType::Context, 0.8, None, now);

        let aged_rank = rank_memory(&aged, 0.0, 0.0, None, &config, now);
        let fresh_rank = rank_memory(&fresh, 0.0, 0.0, None, &config, now);
        // At one half-life the multiplier is 1/2
        assert!((aged_rank - fresh_rank / 2.0).abs() < 1e-9);

        aged.pinned = true;
        let pinned_rank = rank_memory(&aged, 0.0, 0.0, None, &config, now);
        assert!((pinned_rank - fresh_rank).abs() < 1e-9);
    }

    #[test]
    fn test_access_component_zero_when_corpus_silent() {
        let now = Utc::now();
        let config = EngineConfig::default();
        let mut memory = memory_with("m1", MemoryType::Context, 0.0, None, now);
        memory.priority = 1;
        memory.access_count = 50;
        // max_log_access 0 means the component contributes nothing
        let rank = rank_memory(&memory, 0.0, 0.0, None, &config, now);
        assert!((rank - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_rank_all_sorted_descending() {
        let now = Utc::now();
        let config = EngineConfig::default();
        let memories = vec![
            memory_with("low", MemoryType::Context, 0.2, None, now),
            memory_with("high", MemoryType::Context, 0.9, None, now),
            memory_with("mid", MemoryType::Context, 0.5, None, now),
        ];
        let ranked = rank_all(memories, &HashMap::new(), None, &config, now);
        assert_eq!(ranked[0].memory.id, "high");
        assert_eq!(ranked[2].memory.id, "low");
    }

    #[test]
    fn test_select_excludes_code() {
        let now = Utc::now();
        let config = EngineConfig::default();
        let ranked = vec![
            RankedMemory {
                memory: memory_with("code", MemoryType::Code, 0.9, None, now),
                rank: 0.9,
            },
            RankedMemory {
                memory: memory_with("prose", MemoryType::Pattern, 0.5, None, now),
                rank: 0.5,
            },
        ];
        let selected = select_for_surface(&ranked, &config);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].memory.id, "prose");
    }

    #[test]
    fn test_select_respects_category_budget_then_redistributes() {
        let now = Utc::now();
        let mut config = EngineConfig::default();
        config.category_line_budgets.insert(MemoryType::Progress, 2);
        // Keep token limits far away so only line budgets matter in pass 1
        config.surface_target_tokens = 10_000;
        config.surface_max_tokens = 20_000;

        let mut ranked = Vec::new();
        for i in 0..4 {
            let mut memory = memory_with(
                &format!("p{i}"),
                MemoryType::Progress,
                0.9 - i as f64 * 0.1,
                None,
                now,
            );
            memory.summary = format!("progress item {i}");
            ranked.push(RankedMemory {
                memory,
                rank: 0.9 - i as f64 * 0.1,
            });
        }

        let selected = select_for_surface(&ranked, &config);
        // Budget admits 2 in pass 1; the token target is still far off, so
        // redistribution admits the remaining two.
        assert_eq!(selected.len(), 4);

        // With a tight token target the budget is final
        config.surface_target_tokens = 8;
        config.surface_max_tokens = 9;
        let selected = select_for_surface(&ranked, &config);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].memory.id, "p0");
    }

    #[test]
    fn test_select_sorted_by_rank() {
        let now = Utc::now();
        let config = EngineConfig::default();
        let ranked = vec![
            RankedMemory {
                memory: memory_with("low", MemoryType::Pattern, 0.2, None, now),
                rank: 0.2,
            },
            RankedMemory {
                memory: memory_with("high", MemoryType::Gotcha, 0.9, None, now),
                rank: 0.9,
            },
        ];
        let selected = select_for_surface(&ranked, &config);
        assert!(selected.windows(2).all(|w| w[0].rank >= w[1].rank));
    }

    #[test]
    fn test_merge_results_dedup_and_truncate() {
        let now = Utc::now();
        let project = vec![scored("shared", 0.4, now), scored("p1", 0.9, now)];
        let mut global_shared = scored("shared", 0.99, now);
        global_shared.memory.scope = Scope::Global;
        let global = vec![global_shared, scored("g1", 0.5, now)];

        let merged = merge_results(project, global, 2);
        assert_eq!(merged.len(), 2);
        // No duplicate ids, project copy of "shared" won
        assert_eq!(merged[0].memory.id, "p1");
        assert_eq!(merged[1].memory.id, "g1");
        assert!(merged.iter().all(|r| r.memory.scope == Scope::Project || r.memory.id == "g1"));
    }

    #[test]
    fn test_merge_results_sorted_by_score() {
        let now = Utc::now();
        let merged = merge_results(
            vec![scored("a", 0.1, now), scored("b", 0.8, now)],
            vec![scored("c", 0.5, now)],
            10,
        );
        let scores: Vec<f64> = merged.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![0.8, 0.5, 0.1]);
    }

    #[test]
    fn test_line_cost_minimum_one() {
        assert_eq!(line_cost(""), 1);
        assert_eq!(line_cost("one line"), 1);
        assert_eq!(line_cost("a\nb\nc"), 3);
    }
}
