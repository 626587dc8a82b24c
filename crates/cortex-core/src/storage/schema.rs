//! Schema migrations
//!
//! Versioned DDL applied at open. Each scope DB (project and global) carries
//! the same schema; the `scope` column on memories records where a row was
//! born so merged result sets stay attributable.

use rusqlite::Connection;

use crate::error::Result;

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Initial schema: memories, edges, checkpoints, keyword index",
    up: MIGRATION_V1_UP,
}];

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    summary TEXT NOT NULL,
    memory_type TEXT NOT NULL,
    scope TEXT NOT NULL,

    -- Embeddings as raw little-endian float arrays
    -- remote: 768 x f64, local: 384 x f32
    embedding BLOB,
    local_embedding BLOB,

    confidence REAL NOT NULL,
    priority INTEGER NOT NULL,
    pinned INTEGER NOT NULL DEFAULT 0,

    -- Provenance
    source_type TEXT NOT NULL,
    source_session TEXT NOT NULL,
    source_context TEXT NOT NULL DEFAULT '{}',
    tags TEXT NOT NULL DEFAULT '[]',

    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active'
);

CREATE INDEX IF NOT EXISTS idx_memories_status ON memories(status);

CREATE TABLE IF NOT EXISTS edges (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    relation_type TEXT NOT NULL,
    strength REAL NOT NULL,
    bidirectional INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL,
    UNIQUE(source_id, target_id, relation_type)
);

CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);

CREATE TABLE IF NOT EXISTS extraction_checkpoints (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL UNIQUE,
    cursor_position INTEGER NOT NULL,
    extracted_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_session ON extraction_checkpoints(session_id);

-- FTS5 keyword index mirroring (id, content, summary, tags)
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    id,
    content,
    summary,
    tags,
    content='memories',
    content_rowid='rowid'
);

-- Triggers keep the index synchronized with the base table
CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, id, content, summary, tags)
    VALUES (NEW.rowid, NEW.id, NEW.content, NEW.summary, NEW.tags);
END;

CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, content, summary, tags)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content, OLD.summary, OLD.tags);
END;

CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, content, summary, tags)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content, OLD.summary, OLD.tags);
    INSERT INTO memories_fts(rowid, id, content, summary, tags)
    VALUES (NEW.rowid, NEW.id, NEW.content, NEW.summary, NEW.tags);
END;

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// Apply every migration newer than the recorded schema version.
pub fn apply_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        tracing::debug!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );
        conn.execute_batch(migration.up)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
            [migration.version],
        )?;
    }

    Ok(())
}
