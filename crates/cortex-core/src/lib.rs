//! # Cortex Core
//!
//! Local-first memory engine for agentic coding sessions. Captures
//! knowledge at session boundaries, stores it in per-project and per-user
//! SQLite databases, and surfaces the highest-ranked memories back into the
//! editor context.
//!
//! Subsystems:
//!
//! - **Storage**: WAL-mode SQLite per scope, FTS5 keyword index kept in
//!   sync by triggers, raw little-endian embedding blobs, vacuum-into
//!   checkpoints with allowlisted restore
//! - **Similarity**: token-set Jaccard with pre-filter bands, cosine over
//!   dense vectors, action classification for edge creation
//! - **Graph**: bounded BFS with edge-type/direction/strength filters,
//!   in-degree centrality feeding ranking and decay
//! - **Lifecycle**: per-type half-life decay with access and centrality
//!   modifiers, confidence-gated archival, archive-age pruning
//! - **Extraction**: resumable transcript windowing, LLM candidate
//!   parsing, dedup, similarity-edge wiring
//! - **Consolidation**: duplicate detection with a human-gated merge under
//!   a checkpoint/restore envelope
//! - **Surface**: category-budgeted selection rendered to a sentinel-
//!   wrapped markdown block, PID-lock write discipline, cache + telemetry
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use cortex_core::prelude::*;
//!
//! let paths = WorkspacePaths::new("/path/to/project");
//! let project = Store::open(paths.project_db(), Scope::Project)?;
//! let global = Store::open(global_db_path()?, Scope::Global)?;
//!
//! let response = recall(
//!     &project, &global, "cache invalidation",
//!     &RecallOptions::default(), None, "my-project", chrono::Utc::now(),
//! )?;
//! ```

// ============================================================================
// MODULES
// ============================================================================

pub mod cache;
pub mod config;
pub mod consolidation;
pub mod decay;
pub mod embeddings;
pub mod error;
pub mod extraction;
pub mod graph;
pub mod lifecycle;
pub mod model;
pub mod ranking;
pub mod recall;
pub mod similarity;
pub mod storage;
pub mod surface;
pub mod workspace;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use error::{CortexError, Result};

pub use config::{EngineConfig, API_KEY_ENV, GLOBAL_DB_ENV};

pub use model::{
    Edge, EdgeStatus, ExtractionCheckpoint, Memory, MemoryStatus, MemoryType, NewEdge, NewMemory,
    RelationType, Scope, SourceContext, SourceType,
};

pub use storage::{create_checkpoint, restore_checkpoint, route_scope, Store};

pub use similarity::{
    classify_action, cosine, jaccard, prefilter, text_jaccard, tokenize, PrefilterBand,
    SimilarityAction,
};

pub use graph::{Direction, MemoryGraph, TraversalHit, TraverseOptions};

pub use decay::{decayed_confidence, decide_action, half_life_days, LifecycleAction};

pub use ranking::{merge_results, rank_all, rank_memory, select_for_surface, RankedMemory, ScoredMemory};

pub use surface::{render_surface, wrap_with_sentinels, SENTINEL_END, SENTINEL_START};

pub use workspace::{
    acquire_pid_lock, ensure_gitignored, global_db_path, write_surface, PidLock, WorkspacePaths,
    GITIGNORE_PATTERNS,
};

pub use cache::{
    collect_telemetry, compute_staleness, invalidate_surface_cache, load_cached_surface,
    read_last_extraction, save_surface_cache, write_status_file, LastExtraction, Staleness,
    SurfaceCache, TelemetrySnapshot,
};

pub use embeddings::{
    memory_embedding_text, query_embedding_text, remote::remote_available, run_backfill,
    BackfillReport, Embedding, RemoteEmbeddingClient, LOCAL_DIMENSIONS, REMOTE_DIMENSIONS,
};

#[cfg(feature = "local-embeddings")]
pub use embeddings::local::{embed_local, ensure_model_loaded};

pub use extraction::{
    derive_git_context, run_extraction, CandidateExtractor, ExtractionOptions, ExtractionReport,
    GitContext, HookInput, RemoteExtractor,
};

pub use consolidation::{
    detect_duplicates, execute_consolidate, merge_pair, ConsolidateReport, DuplicatePair,
};

pub use lifecycle::{run_sweep, SweepReport};

pub use recall::{
    recall, traverse, RecallHit, RecallOptions, RecallResponse, RelatedMemory, TraverseRequest,
    TraverseResponse,
};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        global_db_path, recall, run_extraction, run_sweep, CortexError, EngineConfig, Memory,
        MemoryStatus, MemoryType, RecallOptions, Result, Scope, Store, WorkspacePaths,
    };
}
