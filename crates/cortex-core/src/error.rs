//! Engine-wide error type
//!
//! One enum for every failure mode the engine can surface. Batch paths
//! (extraction inserts, edge creation, backfill rows) log and swallow
//! per-row errors; everything else propagates with `?`.

use thiserror::Error;

/// Crate-wide error enum
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CortexError {
    /// Malformed argument, stdin payload, or flag value
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Construction-time invariant failure on an entity
    #[error("validation failed: {0}")]
    Validation(String),

    /// Memory, edge, or checkpoint missing
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique constraint on (source_id, target_id, relation_type)
    #[error("duplicate edge: {source_id} -> {target_id} ({relation_type})")]
    DuplicateEdge {
        source_id: String,
        target_id: String,
        relation_type: String,
    },

    /// Surface lock owned by a live process
    #[error("surface lock held by pid {pid}")]
    LockHeld { pid: u32 },

    /// Cache or lock older than policy allows
    #[error("stale: {0}")]
    Stale(String),

    /// Deserialize or schema read failure
    #[error("storage corrupt: {0}")]
    StorageCorrupt(String),

    /// Remote provider rejected the credential (401/403)
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Remote provider rate limit (429)
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// HTTP or network failure other than auth/rate
    #[error("transport error: {0}")]
    Transport(String),

    /// Remote response did not parse or had wrong shape
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Local embedding model unavailable (load failure)
    #[error("local model unavailable: {0}")]
    ModelUnavailable(String),

    /// Cosine over vectors of different lengths
    #[error("vector dimension mismatch: {left} vs {right}")]
    VectorDimensionMismatch { left: usize, right: usize },

    /// Cosine over an empty vector
    #[error("empty vector")]
    EmptyVector,

    /// Consolidation failed and the checkpoint was restored
    #[error("consolidation rolled back: {0}")]
    SafetyRollback(String),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else, always with a reason
    #[error("internal error: {0}")]
    Internal(String),
}

/// Engine result type
pub type Result<T> = std::result::Result<T, CortexError>;

impl CortexError {
    /// True when the error is the edge-uniqueness violation, which callers
    /// swallow wherever idempotent edge creation is intended.
    pub fn is_duplicate_edge(&self) -> bool {
        matches!(self, CortexError::DuplicateEdge { .. })
    }
}
