//! Local embedding model
//!
//! Lazily loads a 384-dim mean-pooled sentence embedder (fastembed,
//! all-MiniLM-L6-v2) the first time an embedding is requested. The loaded
//! model is process-wide state with explicit lifecycle rules: a successful
//! load is cached for the life of the process, a failed load is cached for
//! five minutes before another attempt is made.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::error::{CortexError, Result};

use super::LOCAL_DIMENSIONS;

/// How long a load failure is remembered before retrying
pub const FAILURE_TTL: Duration = Duration::from_secs(5 * 60);

// ============================================================================
// MODEL CACHE
// ============================================================================

/// Lifecycle state of the cached model
enum ModelState<M> {
    Unloaded,
    Loaded(M),
    Failed { error: String, at: Instant },
}

/// Load-once cache with TTL'd failure memory. Generic over the model type
/// so the retry rules are testable without ONNX.
struct ModelCache<M> {
    state: ModelState<M>,
}

impl<M> ModelCache<M> {
    const fn new() -> ModelCache<M> {
        ModelCache {
            state: ModelState::Unloaded,
        }
    }

    /// Run `f` against the loaded model, loading it first if needed.
    /// Repeated calls after a failure short-circuit until the TTL lapses.
    fn with_model<T>(
        &mut self,
        now: Instant,
        loader: impl FnOnce() -> std::result::Result<M, String>,
        f: impl FnOnce(&mut M) -> Result<T>,
    ) -> Result<T> {
        if let ModelState::Failed { error, at } = &self.state {
            if now.duration_since(*at) < FAILURE_TTL {
                return Err(CortexError::ModelUnavailable(error.clone()));
            }
            self.state = ModelState::Unloaded;
        }

        if matches!(self.state, ModelState::Unloaded) {
            match loader() {
                Ok(model) => self.state = ModelState::Loaded(model),
                Err(error) => {
                    self.state = ModelState::Failed {
                        error: error.clone(),
                        at: now,
                    };
                    return Err(CortexError::ModelUnavailable(error));
                }
            }
        }

        match &mut self.state {
            ModelState::Loaded(model) => f(model),
            _ => unreachable!("model cache state settled above"),
        }
    }
}

static MODEL: Mutex<ModelCache<TextEmbedding>> = Mutex::new(ModelCache::new());

fn load_model() -> std::result::Result<TextEmbedding, String> {
    let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false);
    TextEmbedding::try_new(options)
        .map_err(|e| format!("failed to initialize all-MiniLM-L6-v2: {e}"))
}

/// Force a load attempt now; reports the cached failure if inside the TTL.
pub fn ensure_model_loaded() -> Result<()> {
    let mut cache = MODEL
        .lock()
        .map_err(|_| CortexError::Internal("model cache lock poisoned".into()))?;
    cache.with_model(Instant::now(), load_model, |_| Ok(()))
}

/// Embed one text with the local model. The model applies mean pooling
/// across tokens; the output is asserted to be 384-dim.
pub fn embed_local(text: &str) -> Result<Vec<f32>> {
    if text.trim().is_empty() {
        return Err(CortexError::InvalidInput(
            "cannot embed empty or whitespace-only text".into(),
        ));
    }

    let mut cache = MODEL
        .lock()
        .map_err(|_| CortexError::Internal("model cache lock poisoned".into()))?;
    cache.with_model(Instant::now(), load_model, |model| {
        let mut embeddings = model
            .embed(vec![text], None)
            .map_err(|e| CortexError::ModelUnavailable(format!("inference failed: {e}")))?;
        let vector = embeddings
            .pop()
            .ok_or_else(|| CortexError::ModelUnavailable("model returned no embedding".into()))?;
        if vector.len() != LOCAL_DIMENSIONS {
            return Err(CortexError::VectorDimensionMismatch {
                left: vector.len(),
                right: LOCAL_DIMENSIONS,
            });
        }
        Ok(vector)
    })
}

// ============================================================================
// TESTS
// ============================================================================
