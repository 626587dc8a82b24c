//! Database checkpoint and restore
//!
//! A checkpoint is a full copy of the database written to a sibling path by
//! `VACUUM INTO`, which is atomic from the reader's point of view. Restore
//! attaches the copy and replaces the allowlisted tables row-for-row. Both
//! paths refuse single-quote characters since the pragma-level SQL embeds
//! the path as a string literal.

use std::path::{Path, PathBuf};

use crate::error::{CortexError, Result};

use super::Store;

/// Tables replaced by a restore, in dependency-safe insert order. Hard-coded
/// allowlist; names are quoted as identifiers when spliced into SQL.
const RESTORE_TABLES: &[&str] = &["memories", "edges", "extraction_checkpoints"];

/// Checkpoint file suffix, appended to the DB file name.
const CHECKPOINT_SUFFIX: &str = ".checkpoint";

fn validated_path_str(path: &Path) -> Result<&str> {
    let path_str = path
        .to_str()
        .ok_or_else(|| CortexError::InvalidInput("checkpoint path is not UTF-8".into()))?;
    if path_str.contains('\'') {
        return Err(CortexError::InvalidInput(
            "checkpoint path must not contain a single quote".into(),
        ));
    }
    Ok(path_str)
}

/// Copy the whole database to a sibling `<db>.checkpoint` path and return
/// the copy's location. An existing copy at that path is replaced.
pub fn create_checkpoint(store: &Store) -> Result<PathBuf> {
    let mut file_name = store
        .path()
        .file_name()
        .ok_or_else(|| CortexError::InvalidInput("database path has no file name".into()))?
        .to_os_string();
    file_name.push(CHECKPOINT_SUFFIX);
    let checkpoint_path = store.path().with_file_name(file_name);

    let path_str = validated_path_str(&checkpoint_path)?;

    // VACUUM INTO refuses to overwrite
    if checkpoint_path.exists() {
        std::fs::remove_file(&checkpoint_path)?;
    }

    store
        .connection()
        .execute_batch(&format!("VACUUM INTO '{path_str}'"))?;
    Ok(checkpoint_path)
}

/// Replace the allowlisted tables with the contents of a checkpoint file.
/// Other tables are untouched. The copy itself runs in one transaction; the
/// FTS mirror follows via the delete/insert triggers.
pub fn restore_checkpoint(store: &Store, checkpoint_path: &Path) -> Result<()> {
    let path_str = validated_path_str(checkpoint_path)?;
    if !checkpoint_path.exists() {
        return Err(CortexError::NotFound(format!(
            "checkpoint file {}",
            checkpoint_path.display()
        )));
    }

    let conn = store.connection();
    conn.execute_batch(&format!("ATTACH DATABASE '{path_str}' AS checkpoint"))?;

    let copy = || -> Result<()> {
        let tx = conn.unchecked_transaction()?;
        // Delete children before parents so cascades cannot surprise,
        // insert parents before children so foreign keys hold.
        for table in RESTORE_TABLES.iter().rev() {
            tx.execute_batch(&format!("DELETE FROM main.\"{table}\""))?;
        }
        for table in RESTORE_TABLES {
            tx.execute_batch(&format!(
                "INSERT INTO main.\"{table}\" SELECT * FROM checkpoint.\"{table}\""
            ))?;
        }
        tx.commit()?;
        Ok(())
    };

    let outcome = copy();
    // Always detach, even when the copy failed
    if let Err(e) = conn.execute_batch("DETACH DATABASE checkpoint") {
        tracing::warn!(error = %e, "failed to detach checkpoint database");
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, EdgeStatus, ExtractionCheckpoint, MemoryStatus, NewEdge, RelationType, Scope};
    use crate::storage::tests::sample_memory;
    use chrono::Utc;
    use tempfile::TempDir;

    fn store_with_rows() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("project.db"), Scope::Project).unwrap();
        store.insert_memory(&sample_memory("m1", "first")).unwrap();
        store.insert_memory(&sample_memory("m2", "second")).unwrap();
        store
            .insert_edge(
                &Edge::create(NewEdge {
                    source_id: "m1".into(),
                    target_id: "m2".into(),
                    relation_type: RelationType::RelatesTo,
                    strength: 0.6,
                    bidirectional: true,
                    status: EdgeStatus::Active,
                    created_at: None,
                })
                .unwrap(),
            )
            .unwrap();
        store
            .save_extraction_checkpoint(&ExtractionCheckpoint::create("sess", 10).unwrap())
            .unwrap();
        (dir, store)
    }

    #[test]
    fn test_checkpoint_roundtrip_restores_exact_contents() {
        let (_dir, store) = store_with_rows();
        let checkpoint_path = create_checkpoint(&store).unwrap();
        assert!(checkpoint_path.exists());

        // Mutate everything after the checkpoint
        store.insert_memory(&sample_memory("m3", "third")).unwrap();
        store
            .set_status("m1", MemoryStatus::Archived, Utc::now())
            .unwrap();
        store
            .connection()
            .execute("DELETE FROM memories WHERE id = 'm2'", [])
            .unwrap();

        restore_checkpoint(&store, &checkpoint_path).unwrap();

        assert!(store.get_memory("m3").unwrap().is_none());
        assert_eq!(
            store.get_memory("m1").unwrap().unwrap().status,
            MemoryStatus::Active
        );
        assert!(store.get_memory("m2").unwrap().is_some());
        assert_eq!(store.edge_count().unwrap(), 1);
        assert_eq!(
            store
                .get_extraction_checkpoint("sess")
                .unwrap()
                .unwrap()
                .cursor_position,
            10
        );

        // The keyword index follows the restored rows
        assert_eq!(store.keyword_search("third", 10).unwrap().len(), 0);
        assert_eq!(store.keyword_search("second", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_restore_missing_file_is_not_found() {
        let (dir, store) = store_with_rows();
        let missing = dir.path().join("nothing.checkpoint");
        assert!(matches!(
            restore_checkpoint(&store, &missing),
            Err(CortexError::NotFound(_))
        ));
    }

    #[test]
    fn test_single_quote_paths_rejected() {
        let (_dir, store) = store_with_rows();
        let hostile = Path::new("/tmp/it's.db");
        assert!(matches!(
            restore_checkpoint(&store, hostile),
            Err(CortexError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_create_checkpoint_replaces_stale_copy() {
        let (_dir, store) = store_with_rows();
        let first = create_checkpoint(&store).unwrap();
        store.insert_memory(&sample_memory("m3", "third")).unwrap();
        let second = create_checkpoint(&store).unwrap();
        assert_eq!(first, second);

        // The refreshed copy carries the new row
        store
            .connection()
            .execute("DELETE FROM memories WHERE id = 'm3'", [])
            .unwrap();
        restore_checkpoint(&store, &second).unwrap();
        assert!(store.get_memory("m3").unwrap().is_some());
    }
}
