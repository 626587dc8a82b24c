//! Extraction-to-recall journeys over real temp databases

use chrono::Utc;
use cortex_e2e_tests::{canned_candidates, StubExtractor, TestWorkspace};

use cortex_core::{
    collect_telemetry, rank_all, recall, render_surface, run_extraction, select_for_surface,
    wrap_with_sentinels, write_surface, EngineConfig, ExtractionOptions, MemoryType,
    RecallOptions, SENTINEL_END, SENTINEL_START,
};

fn run_extract(
    workspace: &TestWorkspace,
    session: &str,
    transcript: &str,
    extractor: &StubExtractor,
) -> cortex_core::ExtractionReport {
    let input = workspace.hook_input(session, transcript);
    run_extraction(
        &input,
        &workspace.project,
        &workspace.global,
        extractor,
        &EngineConfig::default(),
        ExtractionOptions::default(),
        Utc::now(),
    )
}

#[test]
fn extract_then_recall_round_trip() {
    let workspace = TestWorkspace::new();
    let extractor = StubExtractor::returning(canned_candidates());

    let report = run_extract(
        &workspace,
        "sess-1",
        "{\"role\":\"user\",\"text\":\"debug the worker pool\"}\n",
        &extractor,
    );
    assert!(report.success, "extraction failed: {:?}", report.error);
    assert_eq!(report.inserted, 2);

    let response = recall(
        &workspace.project,
        &workspace.global,
        "worker queue supervisor",
        &RecallOptions::default(),
        None,
        "acme",
        Utc::now(),
    )
    .unwrap();
    assert_eq!(response.method, "keyword");
    assert!(!response.hits.is_empty());
    assert!(response
        .hits
        .iter()
        .any(|h| h.memory.summary.contains("supervisor")));

    // Recall bumped access stats
    let accessed = &response.hits[0].memory;
    let reread = workspace
        .project
        .get_memory(&accessed.id)
        .unwrap()
        .unwrap();
    assert_eq!(reread.access_count, 1);
}

#[test]
fn second_extraction_resumes_and_dedups() {
    let workspace = TestWorkspace::new();
    let extractor = StubExtractor::returning(canned_candidates());
    let transcript = "{\"turn\":1}\n{\"turn\":2}\n";

    let first = run_extract(&workspace, "sess-1", transcript, &extractor);
    assert_eq!(first.inserted, 2);

    // Same session, same transcript: the cursor is at end-of-content, so
    // the window is empty and nothing re-runs
    let second = run_extract(&workspace, "sess-1", transcript, &extractor);
    assert!(second.success);
    assert_eq!(second.candidates_found, 0);
    assert_eq!(second.inserted, 0);

    // A new session over the same knowledge dedups against existing rows
    let third = run_extract(&workspace, "sess-2", transcript, &extractor);
    assert!(third.success);
    assert_eq!(third.inserted, 0);
    assert_eq!(third.duplicates_skipped, 2);
}

#[test]
fn failed_extractor_never_blocks_the_hook() {
    let workspace = TestWorkspace::new();
    let extractor = StubExtractor::failing("model exploded");

    let report = run_extract(&workspace, "sess-1", "{\"turn\":1}\n", &extractor);
    assert!(!report.success);
    assert!(report.error.unwrap().contains("model exploded"));

    // The failed window was skipped; a retry sees an empty window
    let retry = run_extract(&workspace, "sess-1", "{\"turn\":1}\n", &extractor);
    assert!(retry.success);
}

#[test]
fn generate_surface_from_extracted_memories() {
    let workspace = TestWorkspace::new();
    let extractor = StubExtractor::returning(canned_candidates());
    run_extract(&workspace, "sess-1", "{\"turn\":1}\n", &extractor);

    let config = EngineConfig::default();
    let memories = workspace.project.active_memories().unwrap();
    let ranked = rank_all(
        memories,
        &std::collections::HashMap::new(),
        None,
        &config,
        Utc::now(),
    );
    let selected = select_for_surface(&ranked, &config);
    let surface = render_surface(&selected, "main", None);
    assert!(surface.contains("## Gotcha"));
    assert!(surface.contains("## Decision"));

    write_surface(&workspace.paths, &wrap_with_sentinels(&surface)).unwrap();
    let written = std::fs::read_to_string(workspace.paths.surface_file()).unwrap();
    assert!(written.starts_with(SENTINEL_START));
    assert!(written.trim_end().ends_with(SENTINEL_END));
    assert!(!workspace.paths.lock_file().exists());
}

#[test]
fn code_memories_never_surface() {
    let workspace = TestWorkspace::new();
    workspace.seed(
        &workspace.project,
        "code-1",
        MemoryType::Code,
        "fn secret() {}",
    );
    workspace.seed(
        &workspace.project,
        "prose-1",
        MemoryType::Pattern,
        "wrap unsafe code behind safe interfaces",
    );

    let config = EngineConfig::default();
    let ranked = rank_all(
        workspace.project.active_memories().unwrap(),
        &std::collections::HashMap::new(),
        None,
        &config,
        Utc::now(),
    );
    let selected = select_for_surface(&ranked, &config);
    assert!(selected.iter().all(|r| r.memory.memory_type != MemoryType::Code));
    let surface = render_surface(&selected, "main", None);
    assert!(!surface.contains("secret"));
}

#[test]
fn telemetry_counts_both_scopes() {
    let workspace = TestWorkspace::new();
    workspace.seed(
        &workspace.project,
        "p1",
        MemoryType::Gotcha,
        "project scoped note",
    );
    workspace.seed(
        &workspace.global,
        "g1",
        MemoryType::Decision,
        "globally scoped note",
    );

    let snapshot = collect_telemetry(
        &workspace.project,
        &workspace.global,
        &workspace.paths,
        Utc::now(),
    )
    .unwrap();
    assert_eq!(snapshot.memory_counts.total, 2);
    assert_eq!(snapshot.memory_counts.by_scope["project"], 1);
    assert_eq!(snapshot.memory_counts.by_scope["global"], 1);
    assert_eq!(snapshot.embedding_queue_size, 2);
}
