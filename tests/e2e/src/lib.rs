//! End-to-end test harness
//!
//! Isolated workspace fixtures: a temp directory holding the project and
//! global databases plus a transcript file, and a canned extractor so no
//! journey touches the network.

use std::path::PathBuf;

use cortex_core::{
    CandidateExtractor, CortexError, HookInput, Memory, MemoryType, NewMemory, Scope, SourceType,
    Store, WorkspacePaths,
};
use tempfile::TempDir;

/// A disposable workspace with both scope databases open
pub struct TestWorkspace {
    /// Kept alive so the directory outlives the fixture
    _dir: TempDir,
    pub root: PathBuf,
    pub paths: WorkspacePaths,
    pub project: Store,
    pub global: Store,
}

impl TestWorkspace {
    pub fn new() -> TestWorkspace {
        let dir = TempDir::new().expect("temp workspace");
        let root = dir.path().to_path_buf();
        let paths = WorkspacePaths::new(&root);
        let project =
            Store::open(paths.project_db(), Scope::Project).expect("project store");
        let global = Store::open(root.join("global.db"), Scope::Global).expect("global store");
        TestWorkspace {
            _dir: dir,
            root,
            paths,
            project,
            global,
        }
    }

    /// Write a transcript and build the matching hook input.
    pub fn hook_input(&self, session_id: &str, transcript: &str) -> HookInput {
        let transcript_path = self.root.join(format!("{session_id}.jsonl"));
        std::fs::write(&transcript_path, transcript).expect("transcript write");
        HookInput {
            session_id: session_id.to_string(),
            transcript_path: transcript_path.to_string_lossy().into_owned(),
            cwd: self.root.to_string_lossy().into_owned(),
        }
    }

    /// Seed one active memory into a store.
    pub fn seed(&self, store: &Store, id: &str, memory_type: MemoryType, summary: &str) -> Memory {
        let scope = store.scope();
        let memory = Memory::create(NewMemory {
            id: Some(id.to_string()),
            content: format!("{summary}, in full detail"),
            summary: summary.to_string(),
            memory_type,
            scope,
            confidence: 0.8,
            priority: 5,
            source_type: SourceType::Extraction,
            source_session: "seed".into(),
            ..Default::default()
        })
        .expect("valid seed memory");
        store.insert_memory(&memory).expect("seed insert");
        memory
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Extractor returning a canned response (or a canned failure)
pub struct StubExtractor {
    response: Result<String, String>,
}

impl StubExtractor {
    pub fn returning(response: impl Into<String>) -> StubExtractor {
        StubExtractor {
            response: Ok(response.into()),
        }
    }

    pub fn failing(message: impl Into<String>) -> StubExtractor {
        StubExtractor {
            response: Err(message.into()),
        }
    }
}

impl CandidateExtractor for StubExtractor {
    fn extract(&self, _prompt: &str) -> cortex_core::Result<String> {
        match &self.response {
            Ok(raw) => Ok(raw.clone()),
            Err(message) => Err(CortexError::Transport(message.clone())),
        }
    }
}

/// A two-candidate extractor payload used across journeys
pub fn canned_candidates() -> String {
    r#"[
        {"content":"The worker pool deadlocks if the queue is drained while a task re-enqueues itself; always drain through the supervisor.","summary":"drain the worker queue through the supervisor","type":"gotcha","confidence":0.9,"priority":8,"tags":["workers"]},
        {"content":"Database migrations run inside one transaction per version so a failed step rolls the whole version back.","summary":"one transaction per migration version","type":"decision","confidence":0.85,"priority":6}
    ]"#
    .to_string()
}
