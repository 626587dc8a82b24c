//! Engine tunables
//!
//! One value object passed into the subsystems that need it. Defaults match
//! the shipped behavior; tests override individual fields.

use std::collections::HashMap;

use crate::model::MemoryType;

/// Environment variable holding the remote provider key.
/// Absence selects local-only embedding mode.
pub const API_KEY_ENV: &str = "CORTEX_API_KEY";

/// Environment variable overriding the global DB path (testing hook).
pub const GLOBAL_DB_ENV: &str = "CORTEX_GLOBAL_DB";

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Recency half-life for the ranking multiplier, in days
    pub recency_half_life_days: f64,
    /// Soft token target for the rendered surface
    pub surface_target_tokens: usize,
    /// Hard token cap for the rendered surface
    pub surface_max_tokens: usize,
    /// Per-type summary-line budgets for surface selection
    pub category_line_budgets: HashMap<MemoryType, usize>,
    /// Transcript window size in bytes
    pub extraction_window_bytes: usize,
    /// Jaccard threshold at which extraction candidates are duplicates
    pub dedup_threshold: f64,
    /// Similarity threshold for consolidation pair detection
    pub consolidation_threshold: f64,
    /// Detection pass cap for consolidation
    pub max_passes: usize,
    /// Remote embedding batch ceiling
    pub remote_batch_size: usize,
    /// Days an archived memory may sit unaccessed before pruning
    pub archive_prune_days: i64,
    /// Decayed confidence below which archival is considered
    pub archive_confidence_threshold: f64,
    /// Days low confidence must be sustained before archival
    pub archive_sustain_days: i64,
    /// Cache age at which a surface is stale, in hours
    pub stale_cache_hours: i64,
    /// Minimum extraction confidence for global-scope candidates
    pub global_scope_min_confidence: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut budgets = HashMap::new();
        budgets.insert(MemoryType::Architecture, 10);
        budgets.insert(MemoryType::Decision, 10);
        budgets.insert(MemoryType::Pattern, 8);
        budgets.insert(MemoryType::Gotcha, 8);
        budgets.insert(MemoryType::Context, 6);
        budgets.insert(MemoryType::Progress, 4);
        budgets.insert(MemoryType::CodeDescription, 6);
        budgets.insert(MemoryType::Code, 0);

        Self {
            recency_half_life_days: 30.0,
            surface_target_tokens: 1500,
            surface_max_tokens: 2000,
            category_line_budgets: budgets,
            extraction_window_bytes: 100_000,
            dedup_threshold: 0.6,
            consolidation_threshold: 0.5,
            max_passes: 3,
            remote_batch_size: 100,
            archive_prune_days: 30,
            archive_confidence_threshold: 0.3,
            archive_sustain_days: 14,
            stale_cache_hours: 24,
            global_scope_min_confidence: 0.8,
        }
    }
}

impl EngineConfig {
    /// Line budget for a memory type; types missing from the map get 0.
    pub fn line_budget(&self, memory_type: MemoryType) -> usize {
        self.category_line_budgets
            .get(&memory_type)
            .copied()
            .unwrap_or(0)
    }
}
