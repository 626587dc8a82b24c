//! Embedding orchestration
//!
//! Two vector shapes coexist: the remote provider's 768-dim float64 and the
//! local model's 384-dim float32. The tagged [`Embedding`] variant carries
//! them across API boundaries; raw little-endian byte storage stays in the
//! DB layer via the codec functions here. Cross-dimension comparison is an
//! error, never a coercion.

pub mod backfill;
#[cfg(feature = "local-embeddings")]
pub mod local;
pub mod remote;

pub use backfill::{run_backfill, BackfillReport};
pub use remote::RemoteEmbeddingClient;

use crate::error::{CortexError, Result};
use crate::similarity;

/// Remote provider vector width
pub const REMOTE_DIMENSIONS: usize = 768;

/// Local model vector width
pub const LOCAL_DIMENSIONS: usize = 384;

// ============================================================================
// TAGGED VECTOR
// ============================================================================

/// An embedding vector tagged with its provider shape
#[derive(Debug, Clone, PartialEq)]
pub enum Embedding {
    /// 768-dim float64 from the remote provider
    Remote(Vec<f64>),
    Local(Vec<f32>),
}

impl Embedding {
    pub fn dimensions(&self) -> usize {
        match self {
            Embedding::Remote(v) => v.len(),
            Embedding::Local(v) => v.len(),
        }
    }

    /// Cosine similarity against another embedding of the same shape.
    /// Mixing shapes is a dimension mismatch error.
    pub fn cosine(&self, other: &Embedding) -> Result<f64> {
        match (self, other) {
            (Embedding::Remote(a), Embedding::Remote(b)) => similarity::cosine(a, b),
            (Embedding::Local(a), Embedding::Local(b)) => similarity::cosine_f32(a, b),
            _ => Err(CortexError::VectorDimensionMismatch {
                left: self.dimensions(),
                right: other.dimensions(),
            }),
        }
    }
}

// ============================================================================
// BLOB CODEC
// ============================================================================

/// Serialize a float64 vector as little-endian bytes.
pub fn f64_to_blob(vector: &[f64]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Deserialize a little-endian float64 blob, requiring an exact width.
/// Anything else is None; callers skip the row with a warning.
pub fn blob_to_f64(bytes: &[u8], dimensions: usize) -> Option<Vec<f64>> {
    if bytes.len() != dimensions * 8 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(8)
            .map(|chunk| {
                f64::from_le_bytes([
                    chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
                ])
            })
            .collect(),
    )
}

/// Serialize a float32 vector as little-endian bytes.
pub fn f32_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Deserialize a little-endian float32 blob, requiring an exact width.
pub fn blob_to_f32(bytes: &[u8], dimensions: usize) -> Option<Vec<f32>> {
    if bytes.len() != dimensions * 4 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

// ============================================================================
// TEXT CONVENTIONS
// ============================================================================

/// Text embedded for a memory. Stable across remote and local providers so
/// stored vectors stay comparable.
pub fn memory_embedding_text(memory_type: &str, project_name: &str, summary: &str) -> String {
    format!("[{memory_type}] [project:{project_name}] {summary}")
}

/// Text embedded for a recall query. The `[query]` prefix keeps queries in
/// the same embedding subspace as memories.
pub fn query_embedding_text(project_name: &str, text: &str) -> String {
    format!("[query] [project:{project_name}] {text}")
}

// ============================================================================
// TESTS
// ============================================================================
