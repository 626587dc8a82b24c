//! Lifecycle orchestrator
//!
//! One sweep per invocation: load active and archived memories plus every
//! edge, compute centrality once, decide decay and transitions per memory,
//! and apply everything in a single transaction. A failed sweep leaves the
//! DB exactly as it was.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::decay::{age_days, decayed_confidence, decide_action, LifecycleAction};
use crate::error::Result;
use crate::graph::MemoryGraph;
use crate::model::MemoryStatus;
use crate::storage::Store;

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub decayed: usize,
    pub archived: usize,
    pub pruned: usize,
}

/// Run the decay/archive/prune sweep over one store.
pub fn run_sweep(store: &Store, config: &EngineConfig, now: DateTime<Utc>) -> Result<SweepReport> {
    let memories = store.memories_by_status(&[MemoryStatus::Active, MemoryStatus::Archived])?;
    let edges = store.all_edges()?;
    let centrality = MemoryGraph::build(&edges, None, 0.0).centrality();

    let mut report = SweepReport::default();
    let mut confidence_updates: Vec<(String, f64)> = Vec::new();
    let mut transitions: Vec<(String, MemoryStatus)> = Vec::new();

    for memory in &memories {
        let node_centrality = centrality.get(&memory.id).copied().unwrap_or(0.0);

        // Active memories take their decayed confidence, whatever the
        // lifecycle ladder decides next.
        if memory.status == MemoryStatus::Active {
            let decayed = decayed_confidence(memory, node_centrality, now);
            if decayed < memory.confidence {
                confidence_updates.push((memory.id.clone(), decayed));
                report.decayed += 1;
            }
        }

        match decide_action(memory, node_centrality, now, config) {
            LifecycleAction::Archive => {
                transitions.push((memory.id.clone(), MemoryStatus::Archived));
                report.archived += 1;
                // An archive whose access age already clears the prune
                // window falls straight through in the same sweep.
                if age_days(memory.last_accessed_at, now) >= config.archive_prune_days as f64 {
                    transitions.push((memory.id.clone(), MemoryStatus::Pruned));
                    report.pruned += 1;
                }
            }
            LifecycleAction::Prune => {
                transitions.push((memory.id.clone(), MemoryStatus::Pruned));
                report.pruned += 1;
            }
            LifecycleAction::Exempt(reason) => {
                tracing::debug!(id = %memory.id, reason = reason.as_str(), "lifecycle exemption");
            }
            LifecycleAction::None => {}
        }
    }

    store.apply_lifecycle(&confidence_updates, &transitions, now)?;
    Ok(report)
}
