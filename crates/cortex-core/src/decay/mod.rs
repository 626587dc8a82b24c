//! Decay engine
//!
//! Per-type half-life decay with access and centrality modifiers, plus the
//! lifecycle action ladder that decides archival and pruning. Age is always
//! computed against a caller-supplied "now" so sweeps are deterministic.

use chrono::{DateTime, Duration, Utc};

use crate::config::EngineConfig;
use crate::model::{Memory, MemoryStatus, MemoryType};

// ============================================================================
// HALF-LIFE TABLE
// ============================================================================

/// Base half-life in days for a memory type. None = stable, never decays.
pub fn half_life_days(memory_type: MemoryType) -> Option<f64> {
    match memory_type {
        MemoryType::Architecture
        | MemoryType::Decision
        | MemoryType::CodeDescription
        | MemoryType::Code => None,
        MemoryType::Pattern => Some(60.0),
        MemoryType::Gotcha => Some(45.0),
        MemoryType::Context => Some(30.0),
        MemoryType::Progress => Some(7.0),
    }
}

/// Half-life after modifiers: doubled for frequently-accessed memories
/// (access_count > 10), doubled again for hubs (centrality > 0.5).
pub fn effective_half_life(base_days: f64, access_count: i64, centrality: f64) -> f64 {
    let mut half_life = base_days;
    if access_count > 10 {
        half_life *= 2.0;
    }
    if centrality > 0.5 {
        half_life *= 2.0;
    }
    half_life
}

/// Fractional age in days between two instants, floored at 0.
pub fn age_days(from: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let seconds = (now - from).num_seconds();
    (seconds.max(0) as f64) / 86_400.0
}

/// Decay factor 0.5^(age / effective_half_life) for a memory at `now`.
/// Stable types and pinned memories return 1.0.
pub fn decay_factor(memory: &Memory, centrality: f64, now: DateTime<Utc>) -> f64 {
    if memory.pinned {
        return 1.0;
    }
    let Some(base) = half_life_days(memory.memory_type) else {
        return 1.0;
    };
    let half_life = effective_half_life(base, memory.access_count, centrality);
    let age = age_days(memory.created_at, now);
    0.5_f64.powf(age / half_life)
}

/// Confidence after decay at `now`.
pub fn decayed_confidence(memory: &Memory, centrality: f64, now: DateTime<Utc>) -> f64 {
    memory.confidence * decay_factor(memory, centrality, now)
}

// ============================================================================
// LIFECYCLE ACTIONS
// ============================================================================

/// Why a memory is exempt from archival
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExemptReason {
    Pinned,
    HighCentrality,
}

impl ExemptReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExemptReason::Pinned => "pinned",
            ExemptReason::HighCentrality => "high_centrality",
        }
    }
}

/// What the sweep should do with a memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Nothing beyond the confidence update
    None,
    /// Protected from archival
    Exempt(ExemptReason),
    /// Archive for sustained low confidence
    Archive,
    /// Prune an archived memory untouched past the age window
    Prune,
}

/// Decide the lifecycle action for one memory.
///
/// Ladder, first match wins: terminal statuses do nothing; archived
/// memories untouched for the prune window are pruned; pinned and
/// high-centrality memories are exempt; confidence decayed below the
/// archive threshold and already below it a full sustain window ago
/// archives; anything else is left alone.
pub fn decide_action(
    memory: &Memory,
    centrality: f64,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> LifecycleAction {
    if memory.status.is_terminal() {
        return LifecycleAction::None;
    }

    if memory.status == MemoryStatus::Archived {
        let idle_days = age_days(memory.last_accessed_at, now);
        if idle_days >= config.archive_prune_days as f64 {
            return LifecycleAction::Prune;
        }
        return LifecycleAction::None;
    }

    if memory.pinned {
        return LifecycleAction::Exempt(ExemptReason::Pinned);
    }
    if centrality > 0.5 {
        return LifecycleAction::Exempt(ExemptReason::HighCentrality);
    }

    let threshold = config.archive_confidence_threshold;
    let now_decayed = decayed_confidence(memory, centrality, now);
    if now_decayed < threshold {
        // Sustained means the confidence was already below threshold a full
        // sustain window ago, not just at this instant.
        let sustain_point = now - Duration::days(config.archive_sustain_days);
        if decayed_confidence(memory, centrality, sustain_point) < threshold {
            return LifecycleAction::Archive;
        }
    }

    LifecycleAction::None
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewMemory, Scope, SourceType};

    fn memory_aged(
        memory_type: MemoryType,
        confidence: f64,
        access_count: i64,
        age_days: i64,
        now: DateTime<Utc>,
    ) -> Memory {
        let created = now - Duration::days(age_days);
        let mut memory = Memory::create(NewMemory {
            content: "content".into(),
            summary: "summary".into(),
            memory_type,
            scope: Scope::Project,
            confidence,
            priority: 5,
            source_type: SourceType::Extraction,
            source_session: "sess".into(),
            created_at: Some(created),
            ..Default::default()
        })
        .unwrap();
        memory.access_count = access_count;
        memory
    }

    // Scenario: progress at its half-life loses half its confidence.
    #[test]
    fn test_progress_one_half_life() {
        let now = Utc::now();
        let memory = memory_aged(MemoryType::Progress, 0.8, 5, 7, now);
        let decayed = decayed_confidence(&memory, 0.0, now);
        assert!((decayed - 0.40).abs() < 1e-9);
    }

    // Scenario: frequent access doubles the half-life.
    #[test]
    fn test_access_modifier_doubles_half_life() {
        let now = Utc::now();
        let memory = memory_aged(MemoryType::Progress, 0.8, 15, 7, now);
        let decayed = decayed_confidence(&memory, 0.0, now);
        // 0.8 * 2^(-7/14) = 0.8 * 0.7071...
        assert!((decayed - 0.8 * 2.0_f64.powf(-0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_centrality_modifier_stacks() {
        assert_eq!(effective_half_life(7.0, 15, 0.9), 28.0);
        assert_eq!(effective_half_life(7.0, 15, 0.5), 14.0);
        assert_eq!(effective_half_life(7.0, 10, 0.0), 7.0);
    }

    #[test]
    fn test_stable_types_never_decay() {
        let now = Utc::now();
        for memory_type in [
            MemoryType::Architecture,
            MemoryType::Decision,
            MemoryType::CodeDescription,
            MemoryType::Code,
        ] {
            let memory = memory_aged(memory_type, 0.9, 0, 500, now);
            assert_eq!(decayed_confidence(&memory, 0.0, now), 0.9);
        }
    }

    #[test]
    fn test_pinned_never_decays() {
        let now = Utc::now();
        let mut memory = memory_aged(MemoryType::Progress, 0.9, 0, 500, now);
        memory.pinned = true;
        assert_eq!(decay_factor(&memory, 0.0, now), 1.0);
    }

    #[test]
    fn test_terminal_statuses_no_action() {
        let now = Utc::now();
        let config = EngineConfig::default();
        for status in [MemoryStatus::Pruned, MemoryStatus::Superseded] {
            let mut memory = memory_aged(MemoryType::Progress, 0.1, 0, 200, now);
            memory.status = status;
            assert_eq!(decide_action(&memory, 0.0, now, &config), LifecycleAction::None);
        }
    }

    #[test]
    fn test_archived_prunes_after_window() {
        let now = Utc::now();
        let config = EngineConfig::default();
        let mut memory = memory_aged(MemoryType::Progress, 0.1, 0, 200, now);
        memory.status = MemoryStatus::Archived;
        memory.last_accessed_at = now - Duration::days(31);
        assert_eq!(decide_action(&memory, 0.0, now, &config), LifecycleAction::Prune);

        memory.last_accessed_at = now - Duration::days(5);
        assert_eq!(decide_action(&memory, 0.0, now, &config), LifecycleAction::None);
    }

    #[test]
    fn test_pinned_and_hub_exemptions() {
        let now = Utc::now();
        let config = EngineConfig::default();

        let mut memory = memory_aged(MemoryType::Progress, 0.1, 0, 200, now);
        memory.pinned = true;
        assert_eq!(
            decide_action(&memory, 0.0, now, &config),
            LifecycleAction::Exempt(ExemptReason::Pinned)
        );

        let memory = memory_aged(MemoryType::Progress, 0.1, 0, 200, now);
        assert_eq!(
            decide_action(&memory, 0.8, now, &config),
            LifecycleAction::Exempt(ExemptReason::HighCentrality)
        );
    }

    // Scenario: old low-confidence progress memory archives.
    #[test]
    fn test_sustained_low_confidence_archives() {
        let now = Utc::now();
        let config = EngineConfig::default();
        let memory = memory_aged(MemoryType::Progress, 0.1, 0, 100, now);
        assert_eq!(decide_action(&memory, 0.0, now, &config), LifecycleAction::Archive);
    }

    #[test]
    fn test_fresh_drop_below_threshold_not_yet_archived() {
        let now = Utc::now();
        let config = EngineConfig::default();
        // 12 days old: decayed now = 0.5 * 2^(-12/7) ~= 0.152 < 0.3, but at
        // the sustain point the memory did not exist yet (age clamps to 0)
        // so decayed there = 0.5 >= 0.3.
        let memory = memory_aged(MemoryType::Progress, 0.5, 0, 12, now);
        assert_eq!(decide_action(&memory, 0.0, now, &config), LifecycleAction::None);
    }

    #[test]
    fn test_healthy_memory_no_action() {
        let now = Utc::now();
        let config = EngineConfig::default();
        let memory = memory_aged(MemoryType::Pattern, 0.9, 3, 10, now);
        assert_eq!(decide_action(&memory, 0.0, now, &config), LifecycleAction::None);
    }
}
