//! Local persistence for the activation instance and the issued license key.
//!
//! Two records are kept:
//!
//! - the **instance record** (`{"encrypted_id": "..."}`), overwritten on every
//!   activation and read on every check;
//! - the **license record** (`{"key": "..."}`), created exactly once per
//!   activation lifecycle with exclusive-create semantics.
//!
//! The exclusive create of the license record is the only guard against two
//! concurrent activations. There is no in-process lock.
//!
//! ## Backends
//!
//! - [`InstanceStore::File`] writes two files under the configured data dir.
//! - [`InstanceStore::Memory`] keeps both records in memory (tests, ephemeral runs).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::{StorageBackend, StorageConfig};
use crate::errors::{GatewayError, GatewayResult};

/// On-disk form of the instance identifier. Only ever holds ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredInstance {
    pub encrypted_id: String,
}

/// On-disk form of the issued license key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredLicense {
    pub key: String,
}

/// Unified store over file and in-memory backends.
#[derive(Debug, Clone)]
pub enum InstanceStore {
    File(FileStore),
    Memory(MemoryStore),
}

impl InstanceStore {
    /// Build the store selected by configuration.
    pub fn from_config(config: &StorageConfig) -> Self {
        match config.backend {
            StorageBackend::File => InstanceStore::File(FileStore::new(
                config.instance_path(),
                config.license_path(),
            )),
            StorageBackend::Memory => InstanceStore::Memory(MemoryStore::default()),
        }
    }

    /// Read the instance record. Missing, unreadable or unparsable records
    /// all read as `None`.
    pub async fn read_instance(&self) -> Option<StoredInstance> {
        let record = match self {
            InstanceStore::File(store) => store.read_instance().await,
            InstanceStore::Memory(store) => store.instance(),
        };
        record.filter(|r| !r.encrypted_id.is_empty())
    }

    /// Replace the instance record with a new encrypted id.
    pub async fn write_instance(&self, encrypted_id: &str) -> GatewayResult<()> {
        let record = StoredInstance {
            encrypted_id: encrypted_id.to_string(),
        };
        match self {
            InstanceStore::File(store) => store.write_instance(&record).await,
            InstanceStore::Memory(store) => {
                store.set_instance(Some(record));
                Ok(())
            }
        }
    }

    /// Create the license record. Fails with [`GatewayError::AlreadyActivated`]
    /// if one already exists; never overwrites.
    pub async fn create_license_record(&self, key: &str) -> GatewayResult<()> {
        let record = StoredLicense {
            key: key.to_string(),
        };
        match self {
            InstanceStore::File(store) => store.create_license_record(&record).await,
            InstanceStore::Memory(store) => store.create_license(record),
        }
    }

    /// Whether a license record is present. An I/O failure while checking is
    /// an error, not "absent".
    pub async fn license_record_exists(&self) -> GatewayResult<bool> {
        match self {
            InstanceStore::File(store) => fs::try_exists(&store.license_path)
                .await
                .inspect_err(|e| {
                    warn!(path = %store.license_path.display(), "Cannot check license record: {e}")
                })
                .map_err(GatewayError::Storage),
            InstanceStore::Memory(store) => Ok(store.license().is_some()),
        }
    }

    /// Read the license record.
    ///
    /// - `Err(NotFound)` if there is none.
    /// - `Err(Format)` if it cannot be parsed.
    pub async fn read_license_record(&self) -> GatewayResult<StoredLicense> {
        match self {
            InstanceStore::File(store) => store.read_license_record().await,
            InstanceStore::Memory(store) => store.license().ok_or(GatewayError::NotFound),
        }
    }

    /// Remove the instance record (no-op if absent).
    pub async fn delete_instance(&self) -> GatewayResult<()> {
        match self {
            InstanceStore::File(store) => remove_if_present(&store.instance_path).await,
            InstanceStore::Memory(store) => {
                store.set_instance(None);
                Ok(())
            }
        }
    }

    /// Remove the license record (no-op if absent).
    pub async fn delete_license_record(&self) -> GatewayResult<()> {
        match self {
            InstanceStore::File(store) => remove_if_present(&store.license_path).await,
            InstanceStore::Memory(store) => {
                store.clear_license();
                Ok(())
            }
        }
    }
}

// === File backend ===

#[derive(Debug, Clone)]
pub struct FileStore {
    instance_path: PathBuf,
    license_path: PathBuf,
}

impl FileStore {
    pub fn new(instance_path: impl Into<PathBuf>, license_path: impl Into<PathBuf>) -> Self {
        Self {
            instance_path: instance_path.into(),
            license_path: license_path.into(),
        }
    }

    pub fn instance_path(&self) -> &Path {
        &self.instance_path
    }

    pub fn license_path(&self) -> &Path {
        &self.license_path
    }

    async fn read_instance(&self) -> Option<StoredInstance> {
        let data = match fs::read(&self.instance_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.instance_path.display(), "Failed to read instance record: {e}");
                return None;
            }
        };

        match serde_json::from_slice(&data) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %self.instance_path.display(), "Ignoring unparsable instance record: {e}");
                None
            }
        }
    }

    async fn write_instance(&self, record: &StoredInstance) -> GatewayResult<()> {
        ensure_parent(&self.instance_path).await?;
        let data = serde_json::to_vec(record)
            .map_err(|e| GatewayError::Format(format!("failed to encode instance record: {e}")))?;

        // Write beside the target and rename so readers never see a partial file.
        let tmp = self.instance_path.with_extension("tmp");
        let mut file = open_private(&tmp, false).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &self.instance_path).await?;
        debug!(path = %self.instance_path.display(), "Instance record written");
        Ok(())
    }

    async fn create_license_record(&self, record: &StoredLicense) -> GatewayResult<()> {
        ensure_parent(&self.license_path).await?;
        let data = serde_json::to_vec(record)
            .map_err(|e| GatewayError::Format(format!("failed to encode license record: {e}")))?;

        let mut file = match open_private(&self.license_path, true).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(GatewayError::AlreadyActivated)
            }
            Err(e) => return Err(GatewayError::Storage(e)),
        };

        if let Err(e) = write_and_sync(&mut file, &data).await {
            // Leave nothing half-written behind to block the next activation.
            drop(file);
            let _ = fs::remove_file(&self.license_path).await;
            return Err(GatewayError::Storage(e));
        }

        debug!(path = %self.license_path.display(), "License record created");
        Ok(())
    }

    async fn read_license_record(&self) -> GatewayResult<StoredLicense> {
        let data = match fs::read(&self.license_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(GatewayError::NotFound),
            Err(e) => return Err(GatewayError::Storage(e)),
        };

        let record: StoredLicense =
            serde_json::from_slice(&data).map_err(|e| GatewayError::Format(e.to_string()))?;

        if record.key.is_empty() {
            return Err(GatewayError::Format("license key is empty".to_string()));
        }

        Ok(record)
    }
}

async fn ensure_parent(path: &Path) -> GatewayResult<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).await?;
    }
    Ok(())
}

/// Open a file for writing with owner-only permissions.
///
/// `exclusive` fails with `AlreadyExists` instead of truncating.
async fn open_private(path: &Path, exclusive: bool) -> std::io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true);
    if exclusive {
        options.create_new(true);
    } else {
        options.create(true).truncate(true);
    }
    #[cfg(unix)]
    options.mode(0o600);
    options.open(path).await
}

async fn write_and_sync(file: &mut fs::File, data: &[u8]) -> std::io::Result<()> {
    file.write_all(data).await?;
    file.sync_all().await
}

async fn remove_if_present(path: &Path) -> GatewayResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(GatewayError::Storage(e)),
    }
}

// === Memory backend ===

#[derive(Debug, Default)]
struct MemoryState {
    instance: Option<StoredInstance>,
    license: Option<StoredLicense>,
}

/// In-memory store. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // Records are replaced whole, so a poisoned lock still holds consistent data.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn instance(&self) -> Option<StoredInstance> {
        self.lock().instance.clone()
    }

    fn set_instance(&self, record: Option<StoredInstance>) {
        self.lock().instance = record;
    }

    fn license(&self) -> Option<StoredLicense> {
        self.lock().license.clone()
    }

    fn clear_license(&self) {
        self.lock().license = None;
    }

    fn create_license(&self, record: StoredLicense) -> GatewayResult<()> {
        let mut state = self.lock();
        if state.license.is_some() {
            return Err(GatewayError::AlreadyActivated);
        }
        state.license = Some(record);
        Ok(())
    }
}
