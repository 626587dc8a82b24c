//! Workspace filesystem and lock
//!
//! Every writer-visible file lives under the workspace's `.memory/`
//! directory (the surface itself goes under `.claude/`). Surface writes are
//! serialized across processes by a PID-ownership lock; stale locks left by
//! crashed writers are reclaimed by overwriting the pid.

use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::config::GLOBAL_DB_ENV;
use crate::error::{CortexError, Result};

/// Engine-owned gitignore patterns
pub const GITIGNORE_PATTERNS: &[&str] = &[".memory/", ".claude/cortex-memory.local.md"];

// ============================================================================
// PATHS
// ============================================================================

/// Resolved workspace-relative paths
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: impl Into<PathBuf>) -> WorkspacePaths {
        WorkspacePaths { root: root.into() }
    }

    pub fn memory_dir(&self) -> PathBuf {
        self.root.join(".memory")
    }

    pub fn project_db(&self) -> PathBuf {
        self.memory_dir().join("project.db")
    }

    pub fn surface_cache_dir(&self) -> PathBuf {
        self.memory_dir().join("surface-cache")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.memory_dir().join("locks").join("surface.lock")
    }

    pub fn status_file(&self) -> PathBuf {
        self.memory_dir().join("cortex-status.json")
    }

    pub fn surface_file(&self) -> PathBuf {
        self.root.join(".claude").join("cortex-memory.local.md")
    }

    /// Project name used in embedding text: the workspace directory name.
    pub fn project_name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Per-user global DB location. `CORTEX_GLOBAL_DB` overrides for tests.
pub fn global_db_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(GLOBAL_DB_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let dirs = ProjectDirs::from("com", "cortex", "cortex").ok_or_else(|| {
        CortexError::Internal("could not determine user data directory".into())
    })?;
    Ok(dirs.data_dir().join("global.db"))
}

// ============================================================================
// PID LOCK
// ============================================================================

/// Held surface lock. Release deletes the lock file; a crashed holder
/// leaves the file behind for the next writer to reclaim.
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
}

impl PidLock {
    /// Delete the lock file. Absence at release time is not an error.
    pub fn release(self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// True when a process with this pid is alive. Probes with a zero signal;
/// on non-unix platforms the probe is unavailable and any recorded pid is
/// treated as alive (the conservative reading).
#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    // Ids that cannot be a pid_t would alias process groups when cast
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    // Signal 0 performs error checking only. EPERM still means alive.
    let outcome = unsafe { libc::kill(pid as libc::pid_t, 0) };
    outcome == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

/// Acquire the surface lock by atomically creating the lock file with this
/// process's pid. An existing lock held by a live foreign process fails
/// `LockHeld`; a dead or unreadable owner is reclaimed by overwrite.
pub fn acquire_pid_lock(lock_path: &Path) -> Result<PidLock> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let my_pid = std::process::id();

    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
    {
        Ok(mut file) => {
            write!(file, "{my_pid}")?;
            return Ok(PidLock {
                path: lock_path.to_path_buf(),
            });
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e.into()),
    }

    // Lock file exists: probe the recorded owner
    let owner = std::fs::read_to_string(lock_path)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok());

    if let Some(pid) = owner {
        if pid != my_pid && process_alive(pid) {
            return Err(CortexError::LockHeld { pid });
        }
        if pid == my_pid {
            // A lock recorded under this live pid is still held
            return Err(CortexError::LockHeld { pid });
        }
    }

    // Dead owner or unreadable pid: reclaim by overwrite. Concurrent
    // reclaimers race on this write and the last one wins; losers see
    // LockHeld on their next acquire attempt.
    tracing::debug!(path = %lock_path.display(), "reclaiming stale surface lock");
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(lock_path)?;
    write!(file, "{my_pid}")?;
    Ok(PidLock {
        path: lock_path.to_path_buf(),
    })
}

// ============================================================================
// SURFACE WRITE
// ============================================================================

/// Write the surface file inside the lock's critical section, creating
/// parent directories first.
pub fn write_surface(paths: &WorkspacePaths, content: &str) -> Result<()> {
    let lock = acquire_pid_lock(&paths.lock_file())?;
    let outcome = (|| -> Result<()> {
        let surface_path = paths.surface_file();
        if let Some(parent) = surface_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(surface_path, content)?;
        Ok(())
    })();
    let released = lock.release();
    outcome.and(released)
}

// ============================================================================
// GITIGNORE
// ============================================================================

/// Append any missing pattern to `.gitignore` on its own line. Creates the
/// file when absent; never duplicates; tolerates a missing trailing
/// newline.
pub fn ensure_gitignored(project_root: &Path, patterns: &[&str]) -> Result<()> {
    let gitignore = project_root.join(".gitignore");
    let existing = match std::fs::read_to_string(&gitignore) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let present: Vec<&str> = existing.lines().map(str::trim).collect();
    let missing: Vec<&str> = patterns
        .iter()
        .filter(|p| !present.contains(&p.trim()))
        .copied()
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    for pattern in missing {
        updated.push_str(pattern);
        updated.push('\n');
    }
    std::fs::write(&gitignore, updated)?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
