//! Safety envelope journeys: checkpoint restore, forget idempotence,
//! consolidation no-op guarantees

use chrono::Utc;
use cortex_e2e_tests::TestWorkspace;

use cortex_core::{
    create_checkpoint, detect_duplicates, execute_consolidate, merge_pair, restore_checkpoint,
    run_sweep, EngineConfig, MemoryStatus, MemoryType, RelationType,
};

#[test]
fn checkpoint_restore_recovers_all_three_tables() {
    let workspace = TestWorkspace::new();
    workspace.seed(
        &workspace.project,
        "keep",
        MemoryType::Decision,
        "memory that must survive",
    );

    let checkpoint = create_checkpoint(&workspace.project).unwrap();

    workspace.seed(
        &workspace.project,
        "doomed",
        MemoryType::Context,
        "memory added after the checkpoint",
    );
    workspace
        .project
        .set_status("keep", MemoryStatus::Pruned, Utc::now())
        .unwrap();

    restore_checkpoint(&workspace.project, &checkpoint).unwrap();

    let survivor = workspace.project.get_memory("keep").unwrap().unwrap();
    assert_eq!(survivor.status, MemoryStatus::Active);
    assert!(workspace.project.get_memory("doomed").unwrap().is_none());
}

#[test]
fn consolidate_detects_but_never_merges() {
    let workspace = TestWorkspace::new();
    workspace.seed(
        &workspace.project,
        "a",
        MemoryType::Pattern,
        "retry failed requests with exponential backoff",
    );
    workspace.seed(
        &workspace.project,
        "b",
        MemoryType::Pattern,
        "retry failed requests with exponential backoff",
    );

    let report = execute_consolidate(&workspace.project, &EngineConfig::default()).unwrap();
    assert_eq!(report.pairs_found, 1);
    assert_eq!(report.pairs_merged, 0);
    assert_eq!(report.pairs_skipped, 1);

    for id in ["a", "b"] {
        assert_eq!(
            workspace.project.get_memory(id).unwrap().unwrap().status,
            MemoryStatus::Active
        );
    }
}

#[test]
fn human_gated_merge_supersedes_and_hides_from_detection() {
    let workspace = TestWorkspace::new();
    workspace.seed(
        &workspace.project,
        "a",
        MemoryType::Pattern,
        "cache reads through the repository layer",
    );
    workspace.seed(
        &workspace.project,
        "b",
        MemoryType::Pattern,
        "cache reads through the repository layer always",
    );

    let pairs = detect_duplicates(&workspace.project, 0.5).unwrap();
    assert_eq!(pairs.len(), 1);

    let merged = merge_pair(
        &workspace.project,
        &pairs[0],
        "cache reads through the repository layer",
        "Cache every read through the repository layer so invalidation stays centralized.",
        "merge-session",
        Utc::now(),
    )
    .unwrap();

    // Predecessors left the active set and detection finds nothing new
    assert!(detect_duplicates(&workspace.project, 0.5).unwrap().is_empty());
    let supersedes = workspace
        .project
        .edges_from(&merged.id, Some(RelationType::Supersedes))
        .unwrap();
    assert_eq!(supersedes.len(), 2);

    // Superseded memories are terminal for the sweep as well
    let report = run_sweep(&workspace.project, &EngineConfig::default(), Utc::now()).unwrap();
    assert_eq!(report.pruned, 0);
}

#[test]
fn forget_is_idempotent() {
    let workspace = TestWorkspace::new();
    workspace.seed(
        &workspace.project,
        "m1",
        MemoryType::Context,
        "note to forget",
    );

    let now = Utc::now();
    workspace
        .project
        .set_status("m1", MemoryStatus::Archived, now)
        .unwrap();
    // Archiving an archived memory changes nothing and errors nothing
    workspace
        .project
        .set_status("m1", MemoryStatus::Archived, now)
        .unwrap();
    assert_eq!(
        workspace.project.get_memory("m1").unwrap().unwrap().status,
        MemoryStatus::Archived
    );
}
