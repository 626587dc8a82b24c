//! Cortex CLI
//!
//! One short-lived invocation per logical operation, wired into editor and
//! agent hooks at session boundaries. Diagnostics go to stderr with a
//! `[cortex]` prefix; machine output (extract, traverse, inspect) is JSON
//! on stdout.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Cortex - session-boundary memory engine
#[derive(Parser)]
#[command(name = "cortex")]
#[command(version = cortex_core::VERSION)]
#[command(about = "Local-first memory engine for agentic coding sessions")]
#[command(
    long_about = "Cortex captures knowledge from coding sessions into per-project and per-user\nSQLite databases, ranks it, and surfaces the best of it back into the editor."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract memories from a finished session (reads hook JSON on stdin)
    Extract,

    /// Generate the memory surface, cache, and telemetry for a workspace
    Generate {
        /// Workspace root
        cwd: String,
    },

    /// Search memories and print a ranked list
    Recall {
        cwd: String,
        /// Query text
        query: String,
        /// Only return memories recorded on this branch
        #[arg(long)]
        branch: Option<String>,
        /// Maximum results
        #[arg(long, default_value = "10")]
        limit: usize,
        /// Force keyword search even when a provider key is present
        #[arg(long)]
        keyword: bool,
    },

    /// Insert a memory by hand (confidence 1.0)
    Remember {
        cwd: String,
        /// Memory content
        content: String,
        /// Memory type (architecture, decision, pattern, gotcha, context,
        /// progress, code_description, code)
        #[arg(long = "type", default_value = "context")]
        memory_type: String,
        /// Priority 1-10
        #[arg(long, default_value = "5")]
        priority: i64,
        /// Scope (project or global)
        #[arg(long, default_value = "project")]
        scope: String,
        /// Exempt from decay and recency ranking
        #[arg(long)]
        pinned: bool,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
    },

    /// Index a code file as a paired description+code memory
    IndexCode {
        cwd: String,
        /// Id for the prose description memory
        prose_id: String,
        /// Path of the code file to index
        code_path: String,
    },

    /// Archive a memory by id, or list candidates matching a query
    Forget {
        cwd: String,
        /// Memory id, or a keyword query when no id matches
        id_or_query: String,
    },

    /// Detect duplicate pairs (read-only in this release)
    Consolidate {
        cwd: String,
    },

    /// Run the decay/archive/prune sweep over both databases
    Lifecycle {
        cwd: String,
    },

    /// Walk the memory graph from a start node and print JSON
    Traverse {
        cwd: String,
        memory_id: String,
        /// Depth bound 0-10
        max_depth: Option<u32>,
    },

    /// Print the telemetry snapshot as JSON
    Inspect {
        cwd: String,
    },

    /// Fill missing embeddings in both databases
    Backfill {
        cwd: String,
    },

    /// Write the cached surface into the workspace if one exists
    LoadSurface {
        cwd: String,
    },
}

fn main() {
    // Diagnostics to stderr so stdout stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Extract => commands::run_extract(),
        Commands::Generate { cwd } => commands::run_generate(&cwd),
        Commands::Recall {
            cwd,
            query,
            branch,
            limit,
            keyword,
        } => commands::run_recall(&cwd, &query, branch, limit, keyword),
        Commands::Remember {
            cwd,
            content,
            memory_type,
            priority,
            scope,
            pinned,
            tags,
        } => commands::run_remember(&cwd, &content, &memory_type, priority, &scope, pinned, tags),
        Commands::IndexCode {
            cwd,
            prose_id,
            code_path,
        } => commands::run_index_code(&cwd, &prose_id, &code_path),
        Commands::Forget { cwd, id_or_query } => commands::run_forget(&cwd, &id_or_query),
        Commands::Consolidate { cwd } => commands::run_consolidate(&cwd),
        Commands::Lifecycle { cwd } => commands::run_lifecycle(&cwd),
        Commands::Traverse {
            cwd,
            memory_id,
            max_depth,
        } => commands::run_traverse(&cwd, &memory_id, max_depth),
        Commands::Inspect { cwd } => commands::run_inspect(&cwd),
        Commands::Backfill { cwd } => commands::run_backfill(&cwd),
        Commands::LoadSurface { cwd } => commands::run_load_surface(&cwd),
    };

    if let Err(e) = outcome {
        eprintln!("[cortex] {e:#}");
        std::process::exit(1);
    }
}
