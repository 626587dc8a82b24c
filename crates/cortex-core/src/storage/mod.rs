//! Storage layer
//!
//! One embedded SQLite store per scope (project and global), opened with WAL
//! journaling and foreign-key enforcement. The keyword index is an FTS5
//! mirror kept consistent by triggers. Embeddings persist as raw
//! little-endian float arrays. The commands layer owns open/close
//! discipline; nothing here hides a connection's lifetime.

mod checkpoint;
pub mod schema;

pub use checkpoint::{create_checkpoint, restore_checkpoint};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::embeddings::{
    blob_to_f32, blob_to_f64, f32_to_blob, f64_to_blob, LOCAL_DIMENSIONS, REMOTE_DIMENSIONS,
};
use crate::error::{CortexError, Result};
use crate::model::{
    Edge, EdgeStatus, ExtractionCheckpoint, Memory, MemoryStatus, MemoryType, RelationType, Scope,
    SourceType,
};

// ============================================================================
// SCOPE ROUTING
// ============================================================================

/// Pick the store matching a scope. Pure; no lifetime games.
pub fn route_scope<'a>(scope: Scope, project: &'a Store, global: &'a Store) -> &'a Store {
    match scope {
        Scope::Project => project,
        Scope::Global => global,
    }
}

// ============================================================================
// STORE
// ============================================================================

/// An open scope database
pub struct Store {
    conn: Connection,
    scope: Scope,
    path: PathBuf,
}

impl Store {
    /// Open (creating if needed) the DB at `path`, apply pragmas and
    /// migrations.
    pub fn open(path: impl AsRef<Path>, scope: Scope) -> Result<Store> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        schema::apply_migrations(&conn)?;

        Ok(Store { conn, scope, path })
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    // ========================================================================
    // MEMORY CRUD
    // ========================================================================

    /// Insert a memory row. The FTS mirror updates via trigger.
    pub fn insert_memory(&self, memory: &Memory) -> Result<()> {
        let tags_json =
            serde_json::to_string(&memory.tags).unwrap_or_else(|_| "[]".to_string());
        self.conn.execute(
            "INSERT INTO memories (
                id, content, summary, memory_type, scope,
                embedding, local_embedding,
                confidence, priority, pinned,
                source_type, source_session, source_context, tags,
                access_count, last_accessed_at, created_at, updated_at, status
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7,
                ?8, ?9, ?10,
                ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19
            )",
            params![
                memory.id,
                memory.content,
                memory.summary,
                memory.memory_type.as_str(),
                memory.scope.as_str(),
                memory.remote_embedding.as_deref().map(f64_to_blob),
                memory.local_embedding.as_deref().map(f32_to_blob),
                memory.confidence,
                memory.priority,
                memory.pinned as i64,
                memory.source_type.as_str(),
                memory.source_session,
                memory.source_context,
                tags_json,
                memory.access_count,
                memory.last_accessed_at.to_rfc3339(),
                memory.created_at.to_rfc3339(),
                memory.updated_at.to_rfc3339(),
                memory.status.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a memory by id.
    pub fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        let mut stmt = self.conn.prepare("SELECT * FROM memories WHERE id = ?1")?;
        let memory = stmt
            .query_row(params![id], Self::row_to_memory)
            .optional()?;
        Ok(memory)
    }

    /// Fetch a memory by id or fail NotFound.
    pub fn require_memory(&self, id: &str) -> Result<Memory> {
        self.get_memory(id)?
            .ok_or_else(|| CortexError::NotFound(format!("memory {id}")))
    }

    /// Memories in any of the given statuses.
    pub fn memories_by_status(&self, statuses: &[MemoryStatus]) -> Result<Vec<Memory>> {
        let mut result = Vec::new();
        for status in statuses {
            let mut stmt = self
                .conn
                .prepare("SELECT * FROM memories WHERE status = ?1")?;
            let rows = stmt.query_map(params![status.as_str()], Self::row_to_memory)?;
            for row in rows {
                result.push(row?);
            }
        }
        Ok(result)
    }

    /// All active memories.
    pub fn active_memories(&self) -> Result<Vec<Memory>> {
        self.memories_by_status(&[MemoryStatus::Active])
    }

    /// Bulk fetch by id; missing ids are silently absent from the result.
    pub fn memories_by_ids(&self, ids: &[String]) -> Result<Vec<Memory>> {
        let mut result = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(memory) = self.get_memory(id)? {
                result.push(memory);
            }
        }
        Ok(result)
    }

    /// Update status, stamping updated_at.
    pub fn set_status(&self, id: &str, status: MemoryStatus, now: DateTime<Utc>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE memories SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now.to_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(CortexError::NotFound(format!("memory {id}")));
        }
        Ok(())
    }

    /// Increment access counters for a batch of memories in one transaction.
    pub fn record_access(&self, ids: &[String], now: DateTime<Utc>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE memories
                 SET access_count = access_count + 1, last_accessed_at = ?1
                 WHERE id = ?2",
            )?;
            for id in ids {
                stmt.execute(params![now.to_rfc3339(), id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ========================================================================
    // EMBEDDING SLOTS
    // ========================================================================

    /// Write a remote embedding into an empty slot.
    pub fn set_remote_embedding(&self, id: &str, vector: &[f64]) -> Result<()> {
        if vector.len() != REMOTE_DIMENSIONS {
            return Err(CortexError::VectorDimensionMismatch {
                left: vector.len(),
                right: REMOTE_DIMENSIONS,
            });
        }
        let changed = self.conn.execute(
            "UPDATE memories SET embedding = ?1 WHERE id = ?2 AND embedding IS NULL",
            params![f64_to_blob(vector), id],
        )?;
        if changed == 0 {
            return Err(CortexError::NotFound(format!(
                "memory {id} with empty remote embedding slot"
            )));
        }
        Ok(())
    }

    /// Write a local embedding into an empty slot.
    pub fn set_local_embedding(&self, id: &str, vector: &[f32]) -> Result<()> {
        if vector.len() != LOCAL_DIMENSIONS {
            return Err(CortexError::VectorDimensionMismatch {
                left: vector.len(),
                right: LOCAL_DIMENSIONS,
            });
        }
        let changed = self.conn.execute(
            "UPDATE memories SET local_embedding = ?1 WHERE id = ?2 AND local_embedding IS NULL",
            params![f32_to_blob(vector), id],
        )?;
        if changed == 0 {
            return Err(CortexError::NotFound(format!(
                "memory {id} with empty local embedding slot"
            )));
        }
        Ok(())
    }

    /// Active memories carrying a readable remote embedding. Rows whose blob
    /// fails to deserialize are skipped with a warning.
    pub fn memories_with_remote_embedding(&self) -> Result<Vec<Memory>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM memories WHERE status = 'active' AND embedding IS NOT NULL",
        )?;
        let rows = stmt.query_map([], Self::row_to_memory)?;
        let mut result = Vec::new();
        for row in rows {
            let memory = row?;
            if memory.remote_embedding.is_some() {
                result.push(memory);
            } else {
                tracing::warn!(id = %memory.id, "skipping row with unreadable remote embedding");
            }
        }
        Ok(result)
    }

    /// Active memories carrying a readable local embedding.
    pub fn memories_with_local_embedding(&self) -> Result<Vec<Memory>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM memories WHERE status = 'active' AND local_embedding IS NOT NULL",
        )?;
        let rows = stmt.query_map([], Self::row_to_memory)?;
        let mut result = Vec::new();
        for row in rows {
            let memory = row?;
            if memory.local_embedding.is_some() {
                result.push(memory);
            } else {
                tracing::warn!(id = %memory.id, "skipping row with unreadable local embedding");
            }
        }
        Ok(result)
    }

    /// Active memories missing the remote embedding (backfill input).
    pub fn missing_remote_embedding(&self) -> Result<Vec<Memory>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM memories WHERE status = 'active' AND embedding IS NULL",
        )?;
        let rows = stmt.query_map([], Self::row_to_memory)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Active memories missing the local embedding (backfill input).
    pub fn missing_local_embedding(&self) -> Result<Vec<Memory>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM memories WHERE status = 'active' AND local_embedding IS NULL",
        )?;
        let rows = stmt.query_map([], Self::row_to_memory)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Memories with neither embedding (telemetry queue size).
    pub fn embedding_queue_size(&self) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM memories
             WHERE embedding IS NULL AND local_embedding IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ========================================================================
    // KEYWORD SEARCH
    // ========================================================================

    /// FTS5 keyword search preserving index rank order. Query tokens are
    /// quoted as literal phrases so operator characters (hyphens, colons)
    /// cannot reach the MATCH parser.
    pub fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<Memory>> {
        let fts_query = fts_phrase_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            "SELECT m.* FROM memories m
             JOIN memories_fts fts ON m.id = fts.id
             WHERE memories_fts MATCH ?1
             AND m.status = 'active'
             ORDER BY rank
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![fts_query, limit as i64], Self::row_to_memory)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // ========================================================================
    // EDGES
    // ========================================================================

    /// Insert an edge. A unique-constraint violation on
    /// (source_id, target_id, relation_type) maps to DuplicateEdge so
    /// callers can swallow it where idempotence is intended.
    pub fn insert_edge(&self, edge: &Edge) -> Result<()> {
        let outcome = self.conn.execute(
            "INSERT INTO edges (
                id, source_id, target_id, relation_type,
                strength, bidirectional, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                edge.id,
                edge.source_id,
                edge.target_id,
                edge.relation_type.as_str(),
                edge.strength,
                edge.bidirectional as i64,
                edge.status.as_str(),
                edge.created_at.to_rfc3339(),
            ],
        );

        match outcome {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, ref message))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
                    && message
                        .as_deref()
                        .is_some_and(|m| m.contains("UNIQUE")) =>
            {
                Err(CortexError::DuplicateEdge {
                    source_id: edge.source_id.clone(),
                    target_id: edge.target_id.clone(),
                    relation_type: edge.relation_type.as_str().to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Every edge in the store.
    pub fn all_edges(&self) -> Result<Vec<Edge>> {
        let mut stmt = self.conn.prepare("SELECT * FROM edges")?;
        let rows = stmt.query_map([], Self::row_to_edge)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Outgoing edges of a memory, optionally restricted to one relation.
    pub fn edges_from(
        &self,
        source_id: &str,
        relation_type: Option<RelationType>,
    ) -> Result<Vec<Edge>> {
        let mut result = Vec::new();
        match relation_type {
            Some(relation) => {
                let mut stmt = self.conn.prepare(
                    "SELECT * FROM edges WHERE source_id = ?1 AND relation_type = ?2",
                )?;
                let rows =
                    stmt.query_map(params![source_id, relation.as_str()], Self::row_to_edge)?;
                for row in rows {
                    result.push(row?);
                }
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT * FROM edges WHERE source_id = ?1")?;
                let rows = stmt.query_map(params![source_id], Self::row_to_edge)?;
                for row in rows {
                    result.push(row?);
                }
            }
        }
        Ok(result)
    }

    /// Total edge count.
    pub fn edge_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        Ok(count)
    }

    // ========================================================================
    // EXTRACTION CHECKPOINTS
    // ========================================================================

    /// Cursor for a session, if any.
    pub fn get_extraction_checkpoint(
        &self,
        session_id: &str,
    ) -> Result<Option<ExtractionCheckpoint>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM extraction_checkpoints WHERE session_id = ?1")?;
        let checkpoint = stmt
            .query_row(params![session_id], |row| {
                let extracted_at: String = row.get("extracted_at")?;
                Ok(ExtractionCheckpoint {
                    id: row.get("id")?,
                    session_id: row.get("session_id")?,
                    cursor_position: row.get::<_, i64>("cursor_position")? as u64,
                    extracted_at: parse_timestamp(&extracted_at, "extracted_at")?,
                })
            })
            .optional()?;
        Ok(checkpoint)
    }

    /// Upsert the cursor for a session.
    pub fn save_extraction_checkpoint(
        &self,
        checkpoint: &ExtractionCheckpoint,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO extraction_checkpoints (id, session_id, cursor_position, extracted_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_id) DO UPDATE SET
                cursor_position = excluded.cursor_position,
                extracted_at = excluded.extracted_at",
            params![
                checkpoint.id,
                checkpoint.session_id,
                checkpoint.cursor_position as i64,
                checkpoint.extracted_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ========================================================================
    // MULTI-WRITE UNITS
    // ========================================================================

    /// Consolidation merge: insert the merged memory, its supersedes edges,
    /// and demote the predecessors, all in one transaction.
    pub fn apply_merge(
        &self,
        merged: &Memory,
        edges: &[Edge],
        superseded_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let tags_json =
                serde_json::to_string(&merged.tags).unwrap_or_else(|_| "[]".to_string());
            tx.execute(
                "INSERT INTO memories (
                    id, content, summary, memory_type, scope,
                    embedding, local_embedding,
                    confidence, priority, pinned,
                    source_type, source_session, source_context, tags,
                    access_count, last_accessed_at, created_at, updated_at, status
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                          ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
                params![
                    merged.id,
                    merged.content,
                    merged.summary,
                    merged.memory_type.as_str(),
                    merged.scope.as_str(),
                    merged.remote_embedding.as_deref().map(f64_to_blob),
                    merged.local_embedding.as_deref().map(f32_to_blob),
                    merged.confidence,
                    merged.priority,
                    merged.pinned as i64,
                    merged.source_type.as_str(),
                    merged.source_session,
                    merged.source_context,
                    tags_json,
                    merged.access_count,
                    merged.last_accessed_at.to_rfc3339(),
                    merged.created_at.to_rfc3339(),
                    merged.updated_at.to_rfc3339(),
                    merged.status.as_str(),
                ],
            )?;
            for edge in edges {
                tx.execute(
                    "INSERT INTO edges (
                        id, source_id, target_id, relation_type,
                        strength, bidirectional, status, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        edge.id,
                        edge.source_id,
                        edge.target_id,
                        edge.relation_type.as_str(),
                        edge.strength,
                        edge.bidirectional as i64,
                        edge.status.as_str(),
                        edge.created_at.to_rfc3339(),
                    ],
                )?;
            }
            for id in superseded_ids {
                tx.execute(
                    "UPDATE memories SET status = 'superseded', updated_at = ?1 WHERE id = ?2",
                    params![now.to_rfc3339(), id],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Lifecycle sweep application: confidence updates and status
    /// transitions, all-or-nothing.
    pub fn apply_lifecycle(
        &self,
        confidence_updates: &[(String, f64)],
        transitions: &[(String, MemoryStatus)],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut confidence_stmt = tx.prepare(
                "UPDATE memories SET confidence = ?1, updated_at = ?2 WHERE id = ?3",
            )?;
            for (id, confidence) in confidence_updates {
                confidence_stmt.execute(params![confidence, now.to_rfc3339(), id])?;
            }
            let mut status_stmt = tx.prepare(
                "UPDATE memories SET status = ?1, updated_at = ?2 WHERE id = ?3",
            )?;
            for (id, status) in transitions {
                status_stmt.execute(params![status.as_str(), now.to_rfc3339(), id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ========================================================================
    // COUNTS
    // ========================================================================

    /// Total memory count.
    pub fn count_memories(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Memory counts grouped by type.
    pub fn type_counts(&self) -> Result<HashMap<MemoryType, i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT memory_type, COUNT(*) FROM memories GROUP BY memory_type")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut result = HashMap::new();
        for row in rows {
            let (type_name, count) = row?;
            match type_name.parse::<MemoryType>() {
                Ok(memory_type) => {
                    result.insert(memory_type, count);
                }
                Err(_) => {
                    tracing::warn!(memory_type = %type_name, "unknown memory type in counts");
                }
            }
        }
        Ok(result)
    }

    // ========================================================================
    // ROW MAPPING
    // ========================================================================

    fn row_to_memory(row: &rusqlite::Row) -> rusqlite::Result<Memory> {
        let tags_json: String = row.get("tags")?;
        let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();

        let memory_type: String = row.get("memory_type")?;
        let scope: String = row.get("scope")?;
        let source_type: String = row.get("source_type")?;
        let status: String = row.get("status")?;

        let last_accessed_at: String = row.get("last_accessed_at")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;

        let id: String = row.get("id")?;

        let remote_blob: Option<Vec<u8>> = row.get("embedding")?;
        let remote_embedding = match remote_blob {
            Some(bytes) => {
                let decoded = blob_to_f64(&bytes, REMOTE_DIMENSIONS);
                if decoded.is_none() {
                    tracing::warn!(id = %id, "remote embedding blob has wrong width");
                }
                decoded
            }
            None => None,
        };
        let local_blob: Option<Vec<u8>> = row.get("local_embedding")?;
        let local_embedding = match local_blob {
            Some(bytes) => {
                let decoded = blob_to_f32(&bytes, LOCAL_DIMENSIONS);
                if decoded.is_none() {
                    tracing::warn!(id = %id, "local embedding blob has wrong width");
                }
                decoded
            }
            None => None,
        };

        Ok(Memory {
            id,
            content: row.get("content")?,
            summary: row.get("summary")?,
            memory_type: parse_enum::<MemoryType>(&memory_type, "memory_type")?,
            scope: parse_enum::<Scope>(&scope, "scope")?,
            remote_embedding,
            local_embedding,
            confidence: row.get("confidence")?,
            priority: row.get("priority")?,
            pinned: row.get::<_, i64>("pinned")? != 0,
            source_type: parse_enum::<SourceType>(&source_type, "source_type")?,
            source_session: row.get("source_session")?,
            source_context: row.get("source_context")?,
            tags,
            access_count: row.get("access_count")?,
            last_accessed_at: parse_timestamp(&last_accessed_at, "last_accessed_at")?,
            created_at: parse_timestamp(&created_at, "created_at")?,
            updated_at: parse_timestamp(&updated_at, "updated_at")?,
            status: parse_enum::<MemoryStatus>(&status, "status")?,
        })
    }

    fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<Edge> {
        let relation_type: String = row.get("relation_type")?;
        let status: String = row.get("status")?;
        let created_at: String = row.get("created_at")?;

        Ok(Edge {
            id: row.get("id")?,
            source_id: row.get("source_id")?,
            target_id: row.get("target_id")?,
            relation_type: parse_enum::<RelationType>(&relation_type, "relation_type")?,
            strength: row.get("strength")?,
            bidirectional: row.get::<_, i64>("bidirectional")? != 0,
            status: parse_enum::<EdgeStatus>(&status, "status")?,
            created_at: parse_timestamp(&created_at, "created_at")?,
        })
    }
}

/// Parse an RFC-3339 timestamp column.
fn parse_timestamp(value: &str, field: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_failure(format!("invalid {field} timestamp '{value}': {e}")))
}

/// Parse a closed-set enum column.
fn parse_enum<T: std::str::FromStr<Err = CortexError>>(
    value: &str,
    field: &str,
) -> rusqlite::Result<T> {
    value
        .parse::<T>()
        .map_err(|e| conversion_failure(format!("invalid {field} '{value}': {e}")))
}

fn conversion_failure(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

// ============================================================================
// FTS QUERY QUOTING
// ============================================================================

/// Quote each whitespace token as an FTS5 literal phrase. Double quotes
/// inside tokens are doubled per FTS5 string syntax, which defeats
/// operator-character injection (hyphens, colons, NEAR, etc.). Tokens with
/// no alphanumeric content would tokenize to an empty phrase, so they are
/// dropped.
pub fn fts_phrase_query(input: &str) -> String {
    input
        .split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewEdge, NewMemory};
    use tempfile::TempDir;

    fn test_store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("project.db"), Scope::Project).unwrap();
        (dir, store)
    }

    pub(crate) fn sample_memory(id: &str, summary: &str) -> Memory {
        Memory::create(NewMemory {
            id: Some(id.into()),
            content: format!("{summary} content"),
            summary: summary.into(),
            memory_type: MemoryType::Pattern,
            scope: Scope::Project,
            confidence: 0.8,
            priority: 5,
            source_type: SourceType::Extraction,
            source_session: "sess-1".into(),
            ..Default::default()
        })
        .unwrap()
    }

    fn sample_edge(source: &str, target: &str) -> Edge {
        Edge::create(NewEdge {
            source_id: source.into(),
            target_id: target.into(),
            relation_type: RelationType::RelatesTo,
            strength: 0.7,
            bidirectional: true,
            status: EdgeStatus::Active,
            created_at: None,
        })
        .unwrap()
    }

    #[test]
    fn test_insert_and_read_back_roundtrip() {
        let (_dir, store) = test_store();
        let mut memory = sample_memory("m1", "first memory");
        memory.remote_embedding = Some(vec![0.25; REMOTE_DIMENSIONS]);
        memory.local_embedding = Some(vec![0.5; LOCAL_DIMENSIONS]);
        memory.tags = vec!["alpha".into(), "beta".into()];

        store.insert_memory(&memory).unwrap();
        let restored = store.get_memory("m1").unwrap().unwrap();

        assert_eq!(restored.id, memory.id);
        assert_eq!(restored.content, memory.content);
        assert_eq!(restored.summary, memory.summary);
        assert_eq!(restored.memory_type, memory.memory_type);
        assert_eq!(restored.tags, memory.tags);
        assert_eq!(restored.confidence, memory.confidence);
        assert_eq!(restored.remote_embedding, memory.remote_embedding);
        assert_eq!(restored.local_embedding, memory.local_embedding);
        assert_eq!(restored.created_at, memory.created_at);
        assert_eq!(restored.status, memory.status);
    }

    #[test]
    fn test_require_memory_not_found() {
        let (_dir, store) = test_store();
        assert!(matches!(
            store.require_memory("nope"),
            Err(CortexError::NotFound(_))
        ));
    }

    #[test]
    fn test_keyword_search_rank_order_and_injection() {
        let (_dir, store) = test_store();
        store
            .insert_memory(&sample_memory("m1", "tokio runtime panics on nested block_on"))
            .unwrap();
        store
            .insert_memory(&sample_memory("m2", "database uses connection pooling"))
            .unwrap();

        let hits = store.keyword_search("tokio panics", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "m1");

        // Operator characters must not reach the MATCH parser
        let hits = store.keyword_search("tokio - NEAR(", 10).unwrap();
        assert!(hits.len() <= 1);
        assert!(store.keyword_search("\"quoted\"", 10).is_ok());
        assert!(store.keyword_search("col:value", 10).is_ok());
    }

    #[test]
    fn test_keyword_search_excludes_inactive() {
        let (_dir, store) = test_store();
        store
            .insert_memory(&sample_memory("m1", "unique marker phrase"))
            .unwrap();
        store
            .set_status("m1", MemoryStatus::Archived, Utc::now())
            .unwrap();
        assert!(store.keyword_search("marker", 10).unwrap().is_empty());
    }

    #[test]
    fn test_edge_unique_constraint_maps_to_duplicate() {
        let (_dir, store) = test_store();
        store.insert_memory(&sample_memory("m1", "one")).unwrap();
        store.insert_memory(&sample_memory("m2", "two")).unwrap();

        store.insert_edge(&sample_edge("m1", "m2")).unwrap();
        let duplicate = store.insert_edge(&sample_edge("m1", "m2"));
        assert!(matches!(duplicate, Err(ref e) if e.is_duplicate_edge()));
    }

    #[test]
    fn test_edge_requires_existing_endpoints() {
        let (_dir, store) = test_store();
        store.insert_memory(&sample_memory("m1", "one")).unwrap();
        assert!(store.insert_edge(&sample_edge("m1", "ghost")).is_err());
    }

    #[test]
    fn test_endpoint_delete_cascades_to_edges() {
        let (_dir, store) = test_store();
        store.insert_memory(&sample_memory("m1", "one")).unwrap();
        store.insert_memory(&sample_memory("m2", "two")).unwrap();
        store.insert_edge(&sample_edge("m1", "m2")).unwrap();

        store
            .connection()
            .execute("DELETE FROM memories WHERE id = 'm1'", [])
            .unwrap();
        assert_eq!(store.edge_count().unwrap(), 0);
    }

    #[test]
    fn test_embedding_slot_written_once() {
        let (_dir, store) = test_store();
        store.insert_memory(&sample_memory("m1", "one")).unwrap();

        let vector = vec![0.1; REMOTE_DIMENSIONS];
        store.set_remote_embedding("m1", &vector).unwrap();
        // Slot already filled: second write is NotFound (no empty slot)
        assert!(store.set_remote_embedding("m1", &vector).is_err());

        assert!(matches!(
            store.set_remote_embedding("m1", &[0.1, 0.2]),
            Err(CortexError::VectorDimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_unreadable_embedding_skipped_with_warning() {
        let (_dir, store) = test_store();
        store.insert_memory(&sample_memory("m1", "one")).unwrap();
        // Claim an embedding with a wrong-width blob
        store
            .connection()
            .execute(
                "UPDATE memories SET embedding = ?1 WHERE id = 'm1'",
                params![vec![1u8, 2, 3]],
            )
            .unwrap();

        let withembedding = store.memories_with_remote_embedding().unwrap();
        assert!(withembedding.is_empty());

        // Plain reads still return the row, embedding None
        let memory = store.get_memory("m1").unwrap().unwrap();
        assert!(memory.remote_embedding.is_none());
    }

    #[test]
    fn test_extraction_checkpoint_upsert() {
        let (_dir, store) = test_store();
        assert!(store.get_extraction_checkpoint("sess").unwrap().is_none());

        let first = ExtractionCheckpoint::create("sess", 100).unwrap();
        store.save_extraction_checkpoint(&first).unwrap();
        let read = store.get_extraction_checkpoint("sess").unwrap().unwrap();
        assert_eq!(read.cursor_position, 100);

        let second = ExtractionCheckpoint::create("sess", 250).unwrap();
        store.save_extraction_checkpoint(&second).unwrap();
        let read = store.get_extraction_checkpoint("sess").unwrap().unwrap();
        assert_eq!(read.cursor_position, 250);
    }

    #[test]
    fn test_record_access_batch() {
        let (_dir, store) = test_store();
        store.insert_memory(&sample_memory("m1", "one")).unwrap();
        store.insert_memory(&sample_memory("m2", "two")).unwrap();

        let later = Utc::now() + chrono::Duration::hours(1);
        store
            .record_access(&["m1".into(), "m2".into()], later)
            .unwrap();
        store.record_access(&["m1".into()], later).unwrap();

        assert_eq!(store.get_memory("m1").unwrap().unwrap().access_count, 2);
        assert_eq!(store.get_memory("m2").unwrap().unwrap().access_count, 1);
    }

    #[test]
    fn test_apply_lifecycle_transactional() {
        let (_dir, store) = test_store();
        store.insert_memory(&sample_memory("m1", "one")).unwrap();
        store.insert_memory(&sample_memory("m2", "two")).unwrap();

        store
            .apply_lifecycle(
                &[("m1".into(), 0.4)],
                &[("m2".into(), MemoryStatus::Archived)],
                Utc::now(),
            )
            .unwrap();

        assert_eq!(store.get_memory("m1").unwrap().unwrap().confidence, 0.4);
        assert_eq!(
            store.get_memory("m2").unwrap().unwrap().status,
            MemoryStatus::Archived
        );
    }

    #[test]
    fn test_type_counts() {
        let (_dir, store) = test_store();
        store.insert_memory(&sample_memory("m1", "one")).unwrap();
        store.insert_memory(&sample_memory("m2", "two")).unwrap();
        let counts = store.type_counts().unwrap();
        assert_eq!(counts.get(&MemoryType::Pattern), Some(&2));
    }

    #[test]
    fn test_scope_routing() {
        let dir = TempDir::new().unwrap();
        let project = Store::open(dir.path().join("p.db"), Scope::Project).unwrap();
        let global = Store::open(dir.path().join("g.db"), Scope::Global).unwrap();

        assert_eq!(route_scope(Scope::Project, &project, &global).scope(), Scope::Project);
        assert_eq!(route_scope(Scope::Global, &project, &global).scope(), Scope::Global);
    }

    #[test]
    fn test_fts_phrase_query_quoting() {
        assert_eq!(fts_phrase_query("hello world"), "\"hello\" \"world\"");
        assert_eq!(fts_phrase_query("a-b c:d"), "\"a-b\" \"c:d\"");
        assert_eq!(fts_phrase_query("say \"hi\""), "\"say\" \"\"\"hi\"\"\"");
        // Pure operator tokens are dropped, not passed through
        assert_eq!(fts_phrase_query("- NEAR( x"), "\"NEAR(\" \"x\"");
        assert_eq!(fts_phrase_query("   "), "");
    }
}
