//! Correlation store
//!
//! Durable mapping from instance id to the operation id returned by the
//! account-creation API. Entries are written ahead of submission as
//! `pending` reservations and become `confirmed` once the operation id is
//! known, so a crash or failed write between the two leaves a trace that
//! operators can reconcile.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

const STATE_VERSION: u32 = 1;

/// Persistent instance-to-operation correlation
///
/// Only one writer may reserve a given instance id; a second reservation
/// fails with [`StoreError::DuplicateInstance`].
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    /// Claim `instance_id` before submitting its creation request
    async fn reserve(&self, instance_id: &str) -> Result<(), StoreError>;

    /// Record the operation id for `instance_id`, confirming any reservation
    async fn put(&self, instance_id: &str, operation_id: &str) -> Result<(), StoreError>;

    /// Drop a pending reservation. Confirmed records are never removed.
    async fn release(&self, instance_id: &str) -> Result<bool, StoreError>;

    /// Confirmed record for `instance_id`, if any
    async fn get(&self, instance_id: &str) -> Result<Option<InstanceRecord>, StoreError>;

    /// Reservations that never received an operation id
    async fn pending(&self) -> Result<Vec<CorrelationEntry>, StoreError>;
}

/// Confirmed correlation of one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub operation_id: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of a stored entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Reserved; creation request not yet known to have an operation id
    Pending,
    /// Operation id recorded
    Confirmed,
}

impl std::fmt::Display for EntryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryState::Pending => write!(f, "pending"),
            EntryState::Confirmed => write!(f, "confirmed"),
        }
    }
}

/// Entry as persisted in the state file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationEntry {
    pub instance_id: String,
    pub operation_id: Option<String>,
    pub state: EntryState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CorrelationEntry {
    fn pending(instance_id: &str) -> Self {
        let now = Utc::now();
        Self {
            instance_id: instance_id.to_string(),
            operation_id: None,
            state: EntryState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    fn confirm(&mut self, operation_id: &str) {
        self.operation_id = Some(operation_id.to_string());
        self.state = EntryState::Confirmed;
        self.updated_at = Utc::now();
    }

    fn record(&self) -> Option<InstanceRecord> {
        match (&self.state, &self.operation_id) {
            (EntryState::Confirmed, Some(operation_id)) => Some(InstanceRecord {
                instance_id: self.instance_id.clone(),
                operation_id: operation_id.clone(),
                created_at: self.created_at,
            }),
            _ => None,
        }
    }
}

/// Whole store contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Entries indexed by instance id
    pub instances: BTreeMap<String, CorrelationEntry>,
}

impl Default for CorrelationState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            instances: BTreeMap::new(),
        }
    }
}

impl CorrelationState {
    pub fn new() -> Self {
        Self::default()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn reserve(&mut self, instance_id: &str) -> Result<(), StoreError> {
        if self.instances.contains_key(instance_id) {
            return Err(StoreError::DuplicateInstance(instance_id.to_string()));
        }

        self.instances.insert(
            instance_id.to_string(),
            CorrelationEntry::pending(instance_id),
        );
        self.touch();
        Ok(())
    }

    pub fn put(&mut self, instance_id: &str, operation_id: &str) -> Result<(), StoreError> {
        match self.instances.get_mut(instance_id) {
            Some(entry) if entry.state == EntryState::Confirmed => {
                return Err(StoreError::DuplicateInstance(instance_id.to_string()));
            }
            Some(entry) => entry.confirm(operation_id),
            None => {
                let mut entry = CorrelationEntry::pending(instance_id);
                entry.confirm(operation_id);
                self.instances.insert(instance_id.to_string(), entry);
            }
        }

        self.touch();
        Ok(())
    }

    pub fn release(&mut self, instance_id: &str) -> bool {
        let is_pending = self
            .instances
            .get(instance_id)
            .is_some_and(|e| e.state == EntryState::Pending);

        if is_pending {
            self.instances.remove(instance_id);
            self.touch();
        }
        is_pending
    }

    pub fn get(&self, instance_id: &str) -> Option<InstanceRecord> {
        self.instances.get(instance_id).and_then(|e| e.record())
    }

    pub fn pending(&self) -> Vec<CorrelationEntry> {
        self.instances
            .values()
            .filter(|e| e.state == EntryState::Pending)
            .cloned()
            .collect()
    }
}

/// Store kept in process memory
#[derive(Debug, Default)]
pub struct MemoryCorrelationStore {
    state: RwLock<CorrelationState>,
}

impl MemoryCorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CorrelationStore for MemoryCorrelationStore {
    async fn reserve(&self, instance_id: &str) -> Result<(), StoreError> {
        self.state.write().await.reserve(instance_id)
    }

    async fn put(&self, instance_id: &str, operation_id: &str) -> Result<(), StoreError> {
        self.state.write().await.put(instance_id, operation_id)
    }

    async fn release(&self, instance_id: &str) -> Result<bool, StoreError> {
        Ok(self.state.write().await.release(instance_id))
    }

    async fn get(&self, instance_id: &str) -> Result<Option<InstanceRecord>, StoreError> {
        Ok(self.state.read().await.get(instance_id))
    }

    async fn pending(&self) -> Result<Vec<CorrelationEntry>, StoreError> {
        Ok(self.state.read().await.pending())
    }
}

/// Holder of a state file lock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub holder: String,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// Exclusive claim on a state file
///
/// The lock file is created with `create_new`, so only one process can hold
/// it. It is removed on [`StoreLock::release`] or drop.
#[derive(Debug)]
pub struct StoreLock {
    lock_path: PathBuf,
    released: bool,
}

impl StoreLock {
    pub async fn acquire(lock_path: PathBuf) -> Result<Self, StoreError> {
        let opened = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .await;

        let mut file = match opened {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&lock_path)
                    .await
                    .ok()
                    .and_then(|content| serde_json::from_str::<LockInfo>(&content).ok())
                    .map(|info| {
                        format!(
                            "{} (pid {}) since {}",
                            info.holder, info.pid, info.acquired_at
                        )
                    })
                    .unwrap_or_else(|| "an unknown process".to_string());
                return Err(StoreError::Locked {
                    path: lock_path.display().to_string(),
                    holder,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let lock = Self {
            lock_path,
            released: false,
        };

        let info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&info)?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;

        tracing::debug!("Acquired state lock {}", lock.lock_path.display());
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    /// Release the lock
    pub async fn release(mut self) -> Result<(), StoreError> {
        if !self.released {
            fs::remove_file(&self.lock_path).await?;
            self.released = true;
            tracing::debug!("Released state lock {}", self.lock_path.display());
        }
        Ok(())
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

/// Store backed by a JSON state file
///
/// Opening takes an exclusive lock on `<path>.lock` for the lifetime of the
/// store, so the in-memory copy is the only writer of the file. Every
/// mutation is applied to a copy, written and synced to `<path>.tmp`, the
/// previous file is kept as `<path>.backup`, and the temp file is renamed
/// into place before the in-memory state is replaced. Readers never observe
/// an entry that is not on disk.
pub struct FileCorrelationStore {
    path: PathBuf,
    state: RwLock<CorrelationState>,
    lock: StoreLock,
}

impl FileCorrelationStore {
    /// Lock and open the store at `path`, starting empty if the file does
    /// not exist. Fails with [`StoreError::Locked`] while another store
    /// holds the same path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(parent_dir(&path)).await?;

        let lock = StoreLock::acquire(sibling(&path, "lock")).await?;
        let state = load(&path).await?;

        Ok(Self {
            path,
            state: RwLock::new(state),
            lock,
        })
    }

    /// Read the state file without locking it
    pub async fn snapshot(path: impl AsRef<Path>) -> Result<CorrelationState, StoreError> {
        load(path.as_ref()).await
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock
    pub async fn close(self) -> Result<(), StoreError> {
        self.lock.release().await
    }

    async fn save(&self, state: &CorrelationState) -> Result<(), StoreError> {
        let tmp = sibling(&self.path, "tmp");
        let content = serde_json::to_string_pretty(state)?;

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        if fs::try_exists(&self.path).await? {
            fs::copy(&self.path, sibling(&self.path, "backup")).await?;
        }
        fs::rename(&tmp, &self.path).await?;

        #[cfg(unix)]
        fs::File::open(parent_dir(&self.path))
            .await?
            .sync_all()
            .await?;

        tracing::debug!("Saved {} correlation entries", state.instances.len());
        Ok(())
    }

    async fn mutate<T: Send>(
        &self,
        apply: impl FnOnce(&mut CorrelationState) -> Result<T, StoreError> + Send,
    ) -> Result<T, StoreError> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        let out = apply(&mut next)?;

        self.save(&next).await?;
        *guard = next;
        Ok(out)
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

async fn load(path: &Path) -> Result<CorrelationState, StoreError> {
    if !fs::try_exists(path).await? {
        tracing::debug!("State file {} not found, starting empty", path.display());
        return Ok(CorrelationState::new());
    }

    let content = fs::read_to_string(path).await?;
    let state: CorrelationState = serde_json::from_str(&content)?;

    if state.version > STATE_VERSION {
        return Err(StoreError::UnsupportedVersion {
            found: state.version,
            supported: STATE_VERSION,
        });
    }

    tracing::debug!(
        "Loaded {} correlation entries from {}",
        state.instances.len(),
        path.display()
    );
    Ok(state)
}

#[async_trait]
impl CorrelationStore for FileCorrelationStore {
    async fn reserve(&self, instance_id: &str) -> Result<(), StoreError> {
        self.mutate(|state| state.reserve(instance_id)).await
    }

    async fn put(&self, instance_id: &str, operation_id: &str) -> Result<(), StoreError> {
        self.mutate(|state| state.put(instance_id, operation_id)).await
    }

    async fn release(&self, instance_id: &str) -> Result<bool, StoreError> {
        let is_pending = self
            .state
            .read()
            .await
            .instances
            .get(instance_id)
            .is_some_and(|e| e.state == EntryState::Pending);
        if !is_pending {
            return Ok(false);
        }
        self.mutate(|state| Ok(state.release(instance_id))).await
    }

    async fn get(&self, instance_id: &str) -> Result<Option<InstanceRecord>, StoreError> {
        Ok(self.state.read().await.get(instance_id))
    }

    async fn pending(&self) -> Result<Vec<CorrelationEntry>, StoreError> {
        Ok(self.state.read().await.pending())
    }
}
