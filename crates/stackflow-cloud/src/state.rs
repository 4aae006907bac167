//! State management
//!
//! Records the outputs of resolved nodes in `<state_dir>/state.json`
//! (or `state.<env>.json`) so a later run can resume without re-provisioning.

use crate::error::{CloudError, Result};
use crate::evaluation::Evaluation;
use crate::output::Outputs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const LOCK_FILE: &str = "lock.json";
const LOCK_STALE_AFTER_HOURS: i64 = 1;

/// Recorded state of one stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Resources indexed by kind:name
    pub resources: BTreeMap<String, ResourceRecord>,
}

impl Default for StackState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl StackState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ResourceRecord> {
        self.resources.get(key)
    }

    /// Add or update a resource
    pub fn set(&mut self, key: String, record: ResourceRecord) {
        self.resources.insert(key, record);
        self.updated_at = Utc::now();
    }

    pub fn remove(&mut self, key: &str) -> Option<ResourceRecord> {
        let removed = self.resources.remove(key);
        if removed.is_some() {
            self.updated_at = Utc::now();
        }
        removed
    }

    /// Recorded outputs keyed by kind:name, as the scheduler expects them
    pub fn recorded_outputs(&self) -> HashMap<String, Outputs> {
        self.resources
            .iter()
            .map(|(key, record)| (key.clone(), record.outputs.clone()))
            .collect()
    }

    /// Record every node the evaluation resolved
    ///
    /// Reused nodes keep their original timestamps.
    pub fn record(&mut self, evaluation: &Evaluation) -> usize {
        let mut written = 0;
        for outcome in evaluation.outcomes() {
            let Some(outputs) = &outcome.outputs else {
                continue;
            };
            if outcome.reused && self.resources.contains_key(&outcome.key()) {
                continue;
            }
            self.set(
                outcome.key(),
                ResourceRecord::new(&outcome.name, &outcome.kind, outputs.clone()),
            );
            written += 1;
        }
        written
    }
}

/// State of a single resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub name: String,
    pub kind: String,

    /// Outputs reported by the provisioner
    pub outputs: Outputs,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceRecord {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, outputs: Outputs) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            kind: kind.into(),
            outputs,
            created_at: now,
            updated_at: now,
        }
    }
}

/// State manager for reading/writing state files
pub struct StateManager {
    state_dir: PathBuf,
    environment: Option<String>,
}

impl StateManager {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
            environment: None,
        }
    }

    /// Keep a separate state file per environment
    pub fn with_environment(mut self, environment: Option<&str>) -> Self {
        self.environment = environment.map(str::to_string);
        self
    }

    pub fn state_path(&self) -> PathBuf {
        match &self.environment {
            Some(env) => self.state_dir.join(format!("state.{env}.json")),
            None => self.state_dir.join("state.json"),
        }
    }

    fn backup_path(&self) -> PathBuf {
        let mut path = self.state_path().into_os_string();
        path.push(".backup");
        PathBuf::from(path)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir.join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir).await?;
            tracing::debug!(dir = %self.state_dir.display(), "Created state directory");
        }
        Ok(())
    }

    /// Load the current state (empty if there is no state file yet)
    pub async fn load(&self) -> Result<StackState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "State file not found, returning empty state");
            return Ok(StackState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: StackState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!(resources = state.resources.len(), "Loaded state");
        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup
    ///
    /// The new content is written next to the state file and renamed over
    /// it, so an interrupted run never leaves a truncated state behind.
    pub async fn save(&self, state: &StackState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        if path.exists() {
            fs::copy(&path, self.backup_path()).await?;
        }

        let mut staging = path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);
        fs::write(&staging, serde_json::to_string_pretty(state)?).await?;
        fs::rename(&staging, &path).await?;

        tracing::debug!(path = %path.display(), resources = state.resources.len(), "Saved state");
        Ok(())
    }

    /// Acquire a lock for exclusive access
    ///
    /// A lock older than one hour is considered stale and replaced.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();
        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < LOCK_STALE_AFTER_HOURS {
                return Err(CloudError::LockError(format!(
                    "State is locked by {} (pid {}) since {}",
                    lock_info.holder, lock_info.pid, lock_info.acquired_at
                )));
            }

            tracing::warn!(holder = %lock_info.holder, "Removing stale lock");
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        fs::write(&lock_path, serde_json::to_string_pretty(&lock_info)?).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    #[serde(default)]
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
