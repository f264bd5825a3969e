//! IF-013: Working-directory state: atomic writes, persisted plans, run lock.

use super::types::CapabilityPlan;
use crate::error::{ExecutorError, StateError};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Persisted plan file name inside a working directory.
pub const PLAN_FILE: &str = "plan.yaml";
/// Advisory lock file held for the duration of a run.
pub const LOCK_FILE: &str = ".infraforge.lock";

/// Working directory for a deployment name under the workspace root.
pub fn working_dir(workspace_root: &Path, name: &str) -> PathBuf {
    workspace_root.join(format!("{}_plan", name))
}

/// Path of the persisted plan in a working directory.
pub fn plan_file_path(working_dir: &Path) -> PathBuf {
    working_dir.join(PLAN_FILE)
}

/// Write a file atomically (write to temp, then rename).
pub fn write_atomic(path: &Path, content: &str) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| StateError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));
    std::fs::write(&tmp_path, content).map_err(|source| StateError::Write {
        path: tmp_path.clone(),
        source,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|source| StateError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Persist a plan as YAML in its working directory.
pub fn save_plan(plan: &CapabilityPlan) -> Result<PathBuf, StateError> {
    let path = plan_file_path(&plan.details.working_dir);
    let yaml = serde_yaml_ng::to_string(plan).map_err(|e| StateError::Serialize(e.to_string()))?;
    write_atomic(&path, &yaml)?;
    debug!(path = %path.display(), "plan saved");
    Ok(path)
}

/// Load a persisted plan. Returns None if the working directory has none.
pub fn load_plan(working_dir: &Path) -> Result<Option<CapabilityPlan>, StateError> {
    let path = plan_file_path(working_dir);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path).map_err(|source| StateError::Read {
        path: path.clone(),
        source,
    })?;
    let plan = serde_yaml_ng::from_str(&content).map_err(|e| StateError::Parse {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    Ok(Some(plan))
}

/// Exclusive claim on a working directory. Released on drop.
///
/// The holder's pid is written into the lock. A lock whose pid no longer
/// runs was left by a killed run and is taken over; anything else needs
/// [`RunLock::force_release`].
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Create the lock file; fails with `Locked` if a live run holds it.
    pub fn acquire(working_dir: &Path) -> Result<Self, ExecutorError> {
        std::fs::create_dir_all(working_dir).map_err(|source| ExecutorError::Io {
            path: working_dir.to_path_buf(),
            source,
        })?;
        let path = working_dir.join(LOCK_FILE);
        match Self::create(working_dir, &path) {
            Err(ExecutorError::Locked { .. }) if is_stale(&path) => {
                warn!(lock = %path.display(), "taking over lock left by a dead run");
                remove_lock(&path)?;
                Self::create(working_dir, &path)
            }
            other => other,
        }
    }

    /// Remove the lock whoever holds it. Returns whether one was present.
    pub fn force_release(working_dir: &Path) -> Result<bool, ExecutorError> {
        let path = working_dir.join(LOCK_FILE);
        if !path.exists() {
            return Ok(false);
        }
        remove_lock(&path)?;
        Ok(true)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn create(working_dir: &Path, path: &Path) -> Result<Self, ExecutorError> {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::AlreadyExists {
                    ExecutorError::Locked {
                        path: working_dir.to_path_buf(),
                    }
                } else {
                    ExecutorError::Io {
                        path: path.to_path_buf(),
                        source,
                    }
                }
            })?;
        let lock = Self {
            path: path.to_path_buf(),
        };
        writeln!(file, "{}", std::process::id()).map_err(|source| ExecutorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(lock)
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn remove_lock(path: &Path) -> Result<(), ExecutorError> {
    std::fs::remove_file(path).map_err(|source| ExecutorError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// A lock is stale only when it names a pid that is known to be gone. An
/// empty or unreadable lock may belong to a run still writing it.
fn is_stale(path: &Path) -> bool {
    let pid = std::fs::read_to_string(path)
        .ok()
        .and_then(|text| text.trim().parse::<u32>().ok());
    match pid {
        Some(pid) => !process_alive(pid),
        None => false,
    }
}

/// Liveness via `/proc/<pid>`. Without procfs every pid counts as alive.
fn process_alive(pid: u32) -> bool {
    let proc_root = Path::new("/proc");
    if !proc_root.join("self").exists() {
        return true;
    }
    proc_root.join(pid.to_string()).exists()
}
