//! Core domain entities
//!
//! Memories, edges, and extraction checkpoints with construction-time
//! invariant checks. Construction goes through the `create` factories;
//! everything they return is valid by construction.

mod context;

pub use context::SourceContext;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CortexError, Result};

// ============================================================================
// MEMORY TYPE
// ============================================================================

/// Closed set of memory categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// System-level structure knowledge
    Architecture,
    /// A decision and its rationale
    Decision,
    /// A recurring implementation pattern
    Pattern,
    /// A pitfall or surprising behavior
    Gotcha,
    /// Background knowledge about the project
    #[default]
    Context,
    /// Session progress notes
    Progress,
    /// Prose description of an indexed code block
    CodeDescription,
    /// Raw code block (never surfaced directly)
    Code,
}

impl MemoryType {
    /// Every variant, in taxonomy order
    pub const ALL: [MemoryType; 8] = [
        MemoryType::Architecture,
        MemoryType::Decision,
        MemoryType::Pattern,
        MemoryType::Gotcha,
        MemoryType::Context,
        MemoryType::Progress,
        MemoryType::CodeDescription,
        MemoryType::Code,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Architecture => "architecture",
            MemoryType::Decision => "decision",
            MemoryType::Pattern => "pattern",
            MemoryType::Gotcha => "gotcha",
            MemoryType::Context => "context",
            MemoryType::Progress => "progress",
            MemoryType::CodeDescription => "code_description",
            MemoryType::Code => "code",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "architecture" => Ok(MemoryType::Architecture),
            "decision" => Ok(MemoryType::Decision),
            "pattern" => Ok(MemoryType::Pattern),
            "gotcha" => Ok(MemoryType::Gotcha),
            "context" => Ok(MemoryType::Context),
            "progress" => Ok(MemoryType::Progress),
            "code_description" => Ok(MemoryType::CodeDescription),
            "code" => Ok(MemoryType::Code),
            other => Err(CortexError::Validation(format!(
                "unknown memory type: {other}"
            ))),
        }
    }
}

// ============================================================================
// SCOPE
// ============================================================================

/// Storage partition a memory belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Workspace-local DB
    #[default]
    Project,
    /// Per-user DB shared across workspaces
    Global,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Project => "project",
            Scope::Global => "global",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Scope {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "project" => Ok(Scope::Project),
            "global" => Ok(Scope::Global),
            other => Err(CortexError::Validation(format!("unknown scope: {other}"))),
        }
    }
}

// ============================================================================
// STATUS
// ============================================================================

/// Memory lifecycle status
///
/// Transitions are monotonic: active -> archived -> pruned, or
/// active -> superseded (consolidation). Pruned and superseded are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStatus {
    #[default]
    Active,
    Superseded,
    Archived,
    Pruned,
}

impl MemoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryStatus::Active => "active",
            MemoryStatus::Superseded => "superseded",
            MemoryStatus::Archived => "archived",
            MemoryStatus::Pruned => "pruned",
        }
    }

    /// Terminal statuses never decay and never re-enter ranking.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MemoryStatus::Pruned | MemoryStatus::Superseded)
    }
}

impl std::fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemoryStatus {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(MemoryStatus::Active),
            "superseded" => Ok(MemoryStatus::Superseded),
            "archived" => Ok(MemoryStatus::Archived),
            "pruned" => Ok(MemoryStatus::Pruned),
            other => Err(CortexError::Validation(format!("unknown status: {other}"))),
        }
    }
}

// ============================================================================
// SOURCE TYPE
// ============================================================================

/// Provenance of a memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Created by the session-end extraction pipeline
    #[default]
    Extraction,
    /// Created by an explicit `remember` invocation
    Manual,
    /// Created by `index-code`
    CodeIndex,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Extraction => "extraction",
            SourceType::Manual => "manual",
            SourceType::CodeIndex => "code_index",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "extraction" => Ok(SourceType::Extraction),
            "manual" => Ok(SourceType::Manual),
            "code_index" => Ok(SourceType::CodeIndex),
            other => Err(CortexError::Validation(format!(
                "unknown source type: {other}"
            ))),
        }
    }
}

// ============================================================================
// MEMORY
// ============================================================================

/// A single unit of captured knowledge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    /// Opaque unique id (UUID v4 for engine-created memories)
    pub id: String,
    /// Full free-text content
    pub content: String,
    /// Short summary used for surfaces and similarity
    pub summary: String,
    pub memory_type: MemoryType,
    pub scope: Scope,
    /// 768-dim float64 vector from the remote provider, if backfilled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_embedding: Option<Vec<f64>>,
    /// 384-dim float32 vector from the local model, if backfilled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_embedding: Option<Vec<f32>>,
    /// Extraction confidence in [0, 1]
    pub confidence: f64,
    /// Priority in [1, 10]
    pub priority: i64,
    /// Pinned memories never decay and skip the recency multiplier
    pub pinned: bool,
    pub source_type: SourceType,
    /// Session that produced this memory
    pub source_session: String,
    /// Opaque JSON blob; recognized keys are read through [`SourceContext`]
    pub source_context: String,
    /// Ordered tag list
    pub tags: Vec<String>,
    pub access_count: i64,
    pub last_accessed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: MemoryStatus,
}

/// Input for constructing a memory
///
/// Owned fields, consumed by [`Memory::create`]. Optional fields default at
/// construction: timestamps to "now", status to active, embeddings to none.
#[derive(Debug, Clone, Default)]
pub struct NewMemory {
    pub id: Option<String>,
    pub content: String,
    pub summary: String,
    pub memory_type: MemoryType,
    pub scope: Scope,
    pub confidence: f64,
    pub priority: i64,
    pub pinned: bool,
    pub source_type: SourceType,
    pub source_session: String,
    pub source_context: Option<SourceContext>,
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Memory {
    /// Construct a memory, enforcing every invariant.
    ///
    /// id/content/summary/source_session are trimmed; empty-after-trim is a
    /// validation error. Confidence must sit in [0, 1], priority in [1, 10].
    pub fn create(input: NewMemory) -> Result<Memory> {
        let id = match input.id {
            Some(id) => {
                let id = id.trim().to_string();
                if id.is_empty() {
                    return Err(CortexError::Validation("memory id is empty".into()));
                }
                id
            }
            None => Uuid::new_v4().to_string(),
        };

        let content = input.content.trim().to_string();
        if content.is_empty() {
            return Err(CortexError::Validation("memory content is empty".into()));
        }

        let summary = input.summary.trim().to_string();
        if summary.is_empty() {
            return Err(CortexError::Validation("memory summary is empty".into()));
        }

        let source_session = input.source_session.trim().to_string();
        if source_session.is_empty() {
            return Err(CortexError::Validation("source session is empty".into()));
        }

        if !(0.0..=1.0).contains(&input.confidence) || !input.confidence.is_finite() {
            return Err(CortexError::Validation(format!(
                "confidence {} outside [0, 1]",
                input.confidence
            )));
        }

        if !(1..=10).contains(&input.priority) {
            return Err(CortexError::Validation(format!(
                "priority {} outside [1, 10]",
                input.priority
            )));
        }

        let now = input.created_at.unwrap_or_else(Utc::now);
        let source_context = input
            .source_context
            .map(|c| c.to_json())
            .unwrap_or_else(|| "{}".to_string());

        Ok(Memory {
            id,
            content,
            summary,
            memory_type: input.memory_type,
            scope: input.scope,
            remote_embedding: None,
            local_embedding: None,
            confidence: input.confidence,
            priority: input.priority,
            pinned: input.pinned,
            source_type: input.source_type,
            source_session,
            source_context,
            tags: input.tags,
            access_count: 0,
            last_accessed_at: now,
            created_at: now,
            updated_at: now,
            status: MemoryStatus::Active,
        })
    }

    /// Parsed view over the source_context blob. Parse failures yield None;
    /// read sites degrade silently per the context contract.
    pub fn context(&self) -> Option<SourceContext> {
        SourceContext::parse(&self.source_context)
    }

    /// Text used for similarity comparisons during edge creation.
    pub fn similarity_text(&self) -> String {
        format!("{} {}", self.summary, self.content)
    }
}

// ============================================================================
// EDGE
// ============================================================================

/// Closed set of edge relation types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    RelatesTo,
    DerivedFrom,
    Contradicts,
    Exemplifies,
    Refines,
    Supersedes,
    /// Links a prose code_description to its raw code memory
    SourceOf,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::RelatesTo => "relates_to",
            RelationType::DerivedFrom => "derived_from",
            RelationType::Contradicts => "contradicts",
            RelationType::Exemplifies => "exemplifies",
            RelationType::Refines => "refines",
            RelationType::Supersedes => "supersedes",
            RelationType::SourceOf => "source_of",
        }
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RelationType {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "relates_to" => Ok(RelationType::RelatesTo),
            "derived_from" => Ok(RelationType::DerivedFrom),
            "contradicts" => Ok(RelationType::Contradicts),
            "exemplifies" => Ok(RelationType::Exemplifies),
            "refines" => Ok(RelationType::Refines),
            "supersedes" => Ok(RelationType::Supersedes),
            "source_of" => Ok(RelationType::SourceOf),
            other => Err(CortexError::Validation(format!(
                "unknown relation type: {other}"
            ))),
        }
    }
}

/// Edge status: active edges feed ranking and traversal, suggested edges
/// await confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStatus {
    #[default]
    Active,
    Suggested,
}

impl EdgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeStatus::Active => "active",
            EdgeStatus::Suggested => "suggested",
        }
    }
}

impl std::str::FromStr for EdgeStatus {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(EdgeStatus::Active),
            "suggested" => Ok(EdgeStatus::Suggested),
            other => Err(CortexError::Validation(format!(
                "unknown edge status: {other}"
            ))),
        }
    }
}

/// Directed relation between two distinct memories
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub relation_type: RelationType,
    /// Relation strength in [0, 1]
    pub strength: f64,
    pub bidirectional: bool,
    pub status: EdgeStatus,
    pub created_at: DateTime<Utc>,
}

/// Input for constructing an edge
#[derive(Debug, Clone)]
pub struct NewEdge {
    pub source_id: String,
    pub target_id: String,
    pub relation_type: RelationType,
    pub strength: f64,
    pub bidirectional: bool,
    pub status: EdgeStatus,
    pub created_at: Option<DateTime<Utc>>,
}

impl Edge {
    /// Construct an edge. Rejects self-loops and out-of-range strength.
    pub fn create(input: NewEdge) -> Result<Edge> {
        let source_id = input.source_id.trim().to_string();
        let target_id = input.target_id.trim().to_string();

        if source_id.is_empty() || target_id.is_empty() {
            return Err(CortexError::Validation("edge endpoint id is empty".into()));
        }
        if source_id == target_id {
            return Err(CortexError::Validation(format!(
                "self-loop edge on {source_id}"
            )));
        }
        if !(0.0..=1.0).contains(&input.strength) || !input.strength.is_finite() {
            return Err(CortexError::Validation(format!(
                "edge strength {} outside [0, 1]",
                input.strength
            )));
        }

        Ok(Edge {
            id: Uuid::new_v4().to_string(),
            source_id,
            target_id,
            relation_type: input.relation_type,
            strength: input.strength,
            bidirectional: input.bidirectional,
            status: input.status,
            created_at: input.created_at.unwrap_or_else(Utc::now),
        })
    }
}

// ============================================================================
// EXTRACTION CHECKPOINT
// ============================================================================

/// Resumable byte cursor into a session transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionCheckpoint {
    pub id: String,
    /// Session this cursor belongs to (unique per DB)
    pub session_id: String,
    /// Byte offset of the next unread transcript position
    pub cursor_position: u64,
    pub extracted_at: DateTime<Utc>,
}

impl ExtractionCheckpoint {
    /// Construct a checkpoint; session id must be non-empty after trim.
    pub fn create(session_id: &str, cursor_position: u64) -> Result<ExtractionCheckpoint> {
        let session_id = session_id.trim().to_string();
        if session_id.is_empty() {
            return Err(CortexError::Validation("checkpoint session id is empty".into()));
        }
        Ok(ExtractionCheckpoint {
            id: Uuid::new_v4().to_string(),
            session_id,
            cursor_position,
            extracted_at: Utc::now(),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
