//! Subcommand implementations
//!
//! Each function owns the open/close discipline for the scope databases it
//! touches and maps engine results onto exit behavior: `extract` always
//! produces a JSON result object, everything else propagates fatal errors
//! to main for a non-zero exit.

use std::collections::HashMap;
use std::io::Read;

use anyhow::{bail, Context};
use chrono::Utc;
use colored::Colorize;

use cortex_core::{
    cache, collect_telemetry, derive_git_context, ensure_gitignored, execute_consolidate,
    global_db_path, graph::MemoryGraph, invalidate_surface_cache, load_cached_surface, rank_all,
    recall, render_surface, run_extraction, run_sweep, select_for_surface, traverse,
    wrap_with_sentinels, write_status_file, write_surface, EngineConfig, ExtractionOptions,
    HookInput, LastExtraction, Memory, MemoryStatus, MemoryType, NewMemory, RecallOptions,
    RemoteEmbeddingClient, RemoteExtractor, RelationType, Scope, SourceContext, SourceType, Store,
    SurfaceCache, TraverseRequest, WorkspacePaths, API_KEY_ENV, GITIGNORE_PATTERNS,
};
use cortex_core::graph::TraverseOptions;
use cortex_core::model::{Edge, EdgeStatus, NewEdge};

/// Both scope stores plus the workspace paths they belong to
struct Stores {
    paths: WorkspacePaths,
    project: Store,
    global: Store,
}

fn open_stores(cwd: &str) -> anyhow::Result<Stores> {
    let paths = WorkspacePaths::new(cwd);
    let project = Store::open(paths.project_db(), Scope::Project)
        .with_context(|| format!("opening project DB under {cwd}"))?;
    let global =
        Store::open(global_db_path()?, Scope::Global).context("opening global DB")?;
    Ok(Stores {
        paths,
        project,
        global,
    })
}

fn provider_key() -> Option<String> {
    std::env::var(API_KEY_ENV)
        .ok()
        .filter(|k| !k.trim().is_empty())
}

fn remote_client() -> Option<RemoteEmbeddingClient> {
    provider_key().map(RemoteEmbeddingClient::new)
}

// ============================================================================
// EXTRACT
// ============================================================================

pub fn run_extract() -> anyhow::Result<()> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("reading hook input from stdin")?;
    let input: HookInput =
        serde_json::from_str(&raw).context("hook input must be a JSON object with session_id, transcript_path, and cwd")?;

    let stores = open_stores(&input.cwd)?;
    let config = EngineConfig::default();
    let now = Utc::now();

    let report = match provider_key() {
        Some(key) => {
            let extractor = RemoteExtractor::new(key);
            run_extraction(
                &input,
                &stores.project,
                &stores.global,
                &extractor,
                &config,
                ExtractionOptions::default(),
                now,
            )
        }
        // Without a key the extractor cannot run; report failure without
        // consuming the transcript so a keyed retry still sees it.
        None => cortex_core::ExtractionReport {
            success: false,
            error: Some("no provider key configured".into()),
            session_id: input.session_id.clone(),
            ..Default::default()
        },
    };

    // Post-extraction bookkeeping is non-fatal by contract
    if let Err(e) = invalidate_surface_cache(&stores.paths) {
        tracing::warn!(error = %e, "surface cache invalidation failed");
    }
    if let Err(e) = ensure_gitignored(std::path::Path::new(&input.cwd), GITIGNORE_PATTERNS) {
        tracing::warn!(error = %e, "gitignore update failed");
    }
    match collect_telemetry(&stores.project, &stores.global, &stores.paths, now) {
        Ok(mut snapshot) => {
            snapshot.last_extraction = Some(LastExtraction {
                status: if report.success { "success" } else { "failure" }.to_string(),
                timestamp: now,
                error: report.error.clone(),
            });
            if let Err(e) = write_status_file(&stores.paths, &snapshot) {
                tracing::warn!(error = %e, "status file write failed");
            }
        }
        Err(e) => tracing::warn!(error = %e, "telemetry collection failed"),
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

// ============================================================================
// GENERATE / LOAD-SURFACE
// ============================================================================

pub fn run_generate(cwd: &str) -> anyhow::Result<()> {
    let stores = open_stores(cwd)?;
    let config = EngineConfig::default();
    let now = Utc::now();
    let branch = derive_git_context(std::path::Path::new(cwd)).branch;

    // Rank actives from both scopes under one centrality view
    let mut memories = stores.project.active_memories()?;
    memories.extend(stores.global.active_memories()?);

    let mut edges = stores.project.all_edges()?;
    edges.extend(stores.global.all_edges()?);
    let centrality: HashMap<String, f64> = MemoryGraph::build(&edges, None, 0.0).centrality();

    let ranked = rank_all(memories, &centrality, Some(branch.as_str()), &config, now);
    let selected = select_for_surface(&ranked, &config);
    let surface = render_surface(&selected, &branch, None);

    write_surface(&stores.paths, &wrap_with_sentinels(&surface))?;
    cache::save_surface_cache(
        &stores.paths,
        &SurfaceCache {
            surface: surface.clone(),
            branch: branch.clone(),
            cwd: cwd.to_string(),
            generated_at: now,
        },
    )?;
    let snapshot = collect_telemetry(&stores.project, &stores.global, &stores.paths, now)?;
    write_status_file(&stores.paths, &snapshot)?;
    ensure_gitignored(std::path::Path::new(cwd), GITIGNORE_PATTERNS)?;

    println!(
        "{} {} memories on branch {}",
        "surfaced".green().bold(),
        selected.len(),
        branch
    );
    Ok(())
}

pub fn run_load_surface(cwd: &str) -> anyhow::Result<()> {
    let stores = open_stores(cwd)?;
    let config = EngineConfig::default();
    let now = Utc::now();

    match load_cached_surface(&stores.paths, now, &config) {
        Some((cached, staleness)) => {
            // Re-render the staleness note into the written surface
            let body = if staleness.stale {
                format!(
                    "{}\n\n> Warning: this surface is {:.0} hours old; run `cortex generate` to refresh.",
                    cached.surface.trim_end(),
                    staleness.age_hours
                )
            } else {
                cached.surface
            };
            write_surface(&stores.paths, &wrap_with_sentinels(&body))?;
            println!("{} cached surface (branch {})", "loaded".green(), cached.branch);
        }
        None => {
            println!("{}", "no cached surface".dimmed());
        }
    }
    Ok(())
}

// ============================================================================
// RECALL
// ============================================================================

pub fn run_recall(
    cwd: &str,
    query: &str,
    branch: Option<String>,
    limit: usize,
    keyword: bool,
) -> anyhow::Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }
    let stores = open_stores(cwd)?;
    let options = RecallOptions {
        branch,
        limit,
        force_keyword: keyword,
    };
    let client = remote_client();

    let response = recall(
        &stores.project,
        &stores.global,
        query,
        &options,
        client.as_ref(),
        &stores.paths.project_name(),
        Utc::now(),
    )?;

    if response.hits.is_empty() {
        println!("{}", "no memories matched".dimmed());
        return Ok(());
    }

    println!(
        "{} ({} search)",
        "## Recall results".bold(),
        response.method
    );
    for (position, hit) in response.hits.iter().enumerate() {
        println!(
            "{}. [{}] {} {}",
            position + 1,
            hit.memory.memory_type,
            hit.memory.summary,
            format!("({:.2})", hit.score).dimmed()
        );
        for code in &hit.linked_code {
            println!("   code: {}", code.summary);
        }
        for related in &hit.related {
            println!(
                "   related (d{}): {}",
                related.depth, related.memory.summary
            );
        }
    }
    Ok(())
}

// ============================================================================
// REMEMBER / INDEX-CODE / FORGET
// ============================================================================

#[allow(clippy::too_many_arguments)]
pub fn run_remember(
    cwd: &str,
    content: &str,
    memory_type: &str,
    priority: i64,
    scope: &str,
    pinned: bool,
    tags: Option<String>,
) -> anyhow::Result<()> {
    let stores = open_stores(cwd)?;
    let memory_type: MemoryType = memory_type.parse()?;
    let scope: Scope = scope.parse()?;
    let branch = derive_git_context(std::path::Path::new(cwd)).branch;

    let tags: Vec<String> = tags
        .map(|t| {
            t.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    // First line stands in for a summary on manual inserts
    let summary = content.lines().next().unwrap_or(content).to_string();

    let memory = Memory::create(NewMemory {
        content: content.to_string(),
        summary,
        memory_type,
        scope,
        confidence: 1.0,
        priority,
        pinned,
        source_type: SourceType::Manual,
        source_session: format!("manual-{}", Utc::now().format("%Y%m%d%H%M%S")),
        source_context: Some(SourceContext {
            branch: Some(branch),
            ..Default::default()
        }),
        tags,
        ..Default::default()
    })?;

    let store = cortex_core::route_scope(scope, &stores.project, &stores.global);
    store.insert_memory(&memory)?;
    println!("{} {} ({})", "remembered".green().bold(), memory.id, scope);
    Ok(())
}

pub fn run_index_code(cwd: &str, prose_id: &str, code_path: &str) -> anyhow::Result<()> {
    let stores = open_stores(cwd)?;
    let now = Utc::now();
    let code = std::fs::read_to_string(code_path)
        .with_context(|| format!("reading code file {code_path}"))?;
    let line_count = code.lines().count() as u64;
    let branch = derive_git_context(std::path::Path::new(cwd)).branch;

    // A fresh pair supersedes any prior pair indexed for the same file
    let mut superseded = 0;
    for memory in stores.project.active_memories()? {
        if memory.memory_type != MemoryType::CodeDescription
            && memory.memory_type != MemoryType::Code
        {
            continue;
        }
        let same_file = memory
            .context()
            .and_then(|c| c.file_path)
            .is_some_and(|p| p == code_path);
        if same_file {
            stores
                .project
                .set_status(&memory.id, MemoryStatus::Superseded, now)?;
            superseded += 1;
        }
    }

    let context = SourceContext {
        branch: Some(branch),
        file_path: Some(code_path.to_string()),
        start_line: Some(1),
        end_line: Some(line_count.max(1)),
        ..Default::default()
    };
    let session = format!("code-index-{}", now.format("%Y%m%d%H%M%S"));

    let file_name = std::path::Path::new(code_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| code_path.to_string());
    let prose = Memory::create(NewMemory {
        id: Some(prose_id.to_string()),
        content: format!("Indexed code file {code_path} ({line_count} lines)."),
        summary: format!("{file_name} ({line_count} lines)"),
        memory_type: MemoryType::CodeDescription,
        scope: Scope::Project,
        confidence: 1.0,
        priority: 5,
        source_type: SourceType::CodeIndex,
        source_session: session.clone(),
        source_context: Some(context.clone()),
        ..Default::default()
    })?;
    let code_memory = Memory::create(NewMemory {
        content: code,
        summary: format!("code of {file_name}"),
        memory_type: MemoryType::Code,
        scope: Scope::Project,
        confidence: 1.0,
        priority: 5,
        source_type: SourceType::CodeIndex,
        source_session: session,
        source_context: Some(context),
        ..Default::default()
    })?;

    stores.project.insert_memory(&prose)?;
    stores.project.insert_memory(&code_memory)?;
    stores.project.insert_edge(&Edge::create(NewEdge {
        source_id: prose.id.clone(),
        target_id: code_memory.id.clone(),
        relation_type: RelationType::SourceOf,
        strength: 1.0,
        bidirectional: false,
        status: EdgeStatus::Active,
        created_at: Some(now),
    })?)?;

    println!(
        "{} {} -> {} ({} prior superseded)",
        "indexed".green().bold(),
        prose.id,
        code_memory.id,
        superseded
    );
    Ok(())
}

pub fn run_forget(cwd: &str, id_or_query: &str) -> anyhow::Result<()> {
    let stores = open_stores(cwd)?;
    let now = Utc::now();

    for store in [&stores.project, &stores.global] {
        if let Some(memory) = store.get_memory(id_or_query)? {
            if memory.status != MemoryStatus::Archived {
                store.set_status(&memory.id, MemoryStatus::Archived, now)?;
            }
            println!("{} {}", "archived".yellow().bold(), memory.id);
            return Ok(());
        }
    }

    // No id matched: offer keyword candidates instead
    let mut candidates = stores.project.keyword_search(id_or_query, 5)?;
    candidates.extend(stores.global.keyword_search(id_or_query, 5)?);
    if candidates.is_empty() {
        println!("{}", "no matching memory".dimmed());
        return Ok(());
    }
    println!("did you mean:");
    for memory in candidates {
        println!("  {} [{}] {}", memory.id, memory.memory_type, memory.summary);
    }
    Ok(())
}

// ============================================================================
// CONSOLIDATE / LIFECYCLE
// ============================================================================

pub fn run_consolidate(cwd: &str) -> anyhow::Result<()> {
    let stores = open_stores(cwd)?;
    let report = execute_consolidate(&stores.project, &EngineConfig::default())?;
    println!(
        "{} {} pairs found, {} merged, {} skipped",
        "consolidate".cyan().bold(),
        report.pairs_found,
        report.pairs_merged,
        report.pairs_skipped
    );
    Ok(())
}

pub fn run_lifecycle(cwd: &str) -> anyhow::Result<()> {
    let stores = open_stores(cwd)?;
    let config = EngineConfig::default();
    let now = Utc::now();

    let mut decayed = 0;
    let mut archived = 0;
    let mut pruned = 0;
    for store in [&stores.project, &stores.global] {
        let report = run_sweep(store, &config, now)?;
        decayed += report.decayed;
        archived += report.archived;
        pruned += report.pruned;
    }
    println!(
        "{} {decayed} decayed, {archived} archived, {pruned} pruned",
        "lifecycle".cyan().bold()
    );
    Ok(())
}

// ============================================================================
// TRAVERSE / INSPECT / BACKFILL
// ============================================================================

pub fn run_traverse(cwd: &str, memory_id: &str, max_depth: Option<u32>) -> anyhow::Result<()> {
    let stores = open_stores(cwd)?;
    let options = TraverseOptions {
        max_depth: max_depth.unwrap_or(cortex_core::graph::DEFAULT_MAX_DEPTH),
        ..Default::default()
    };
    let request = TraverseRequest {
        start_id: memory_id.to_string(),
        options,
    };

    // The start memory may live in either scope
    let response = match traverse(&stores.project, &request) {
        Err(cortex_core::CortexError::NotFound(_)) => traverse(&stores.global, &request)?,
        other => other?,
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

pub fn run_inspect(cwd: &str) -> anyhow::Result<()> {
    let stores = open_stores(cwd)?;
    let snapshot = collect_telemetry(&stores.project, &stores.global, &stores.paths, Utc::now())?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

pub fn run_backfill(cwd: &str) -> anyhow::Result<()> {
    let stores = open_stores(cwd)?;
    let config = EngineConfig::default();
    let client = remote_client();
    if client.is_none() {
        tracing::debug!("no provider key; backfilling with the local model");
    }

    let project_name = stores.paths.project_name();
    for store in [&stores.project, &stores.global] {
        let report = cortex_core::run_backfill(store, client.as_ref(), &project_name, &config)?;
        println!(
            "{} {}: {} processed, {} failed ({})",
            "backfill".cyan().bold(),
            store.scope(),
            report.processed,
            report.failed,
            report.method
        );
        for error in &report.errors {
            eprintln!("[cortex] backfill: {error}");
        }
    }
    Ok(())
}
