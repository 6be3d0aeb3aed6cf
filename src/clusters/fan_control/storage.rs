//! Non-volatile storage of the persistent attribute group.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::state::PersistentAttributes;
use super::types::EndpointId;
use crate::error::Result;

/// Storage for the attributes that survive a restart, keyed by endpoint.
pub trait FanControlStorage: Send + Sync {
    /// Stored settings for the endpoint, `None` on first run.
    fn load(&self, endpoint_id: EndpointId) -> Result<Option<PersistentAttributes>>;

    fn persist(&self, endpoint_id: EndpointId, attributes: &PersistentAttributes) -> Result<()>;
}

/// Storage kept in memory only. Survives `deinit`/`init` but not the process.
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<EndpointId, PersistentAttributes>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, endpoint_id: EndpointId) -> Option<PersistentAttributes> {
        self.entries.read().get(&endpoint_id).copied()
    }
}

impl FanControlStorage for MemoryStorage {
    fn load(&self, endpoint_id: EndpointId) -> Result<Option<PersistentAttributes>> {
        Ok(self.get(endpoint_id))
    }

    fn persist(&self, endpoint_id: EndpointId, attributes: &PersistentAttributes) -> Result<()> {
        self.entries.write().insert(endpoint_id, *attributes);
        Ok(())
    }
}

/// On-disk layout of [`JsonFileStorage`]
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedEndpoints {
    pub endpoints: HashMap<EndpointId, PersistentAttributes>,
}

impl PersistedEndpoints {
    /// Parse the file at `path`, `Ok(None)` when it does not exist yet.
    pub fn read_from(path: &Path) -> Result<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Contents of `path`, empty when it is missing or unreadable.
    pub fn load(path: &Path) -> Self {
        Self::read_from(path)
            .inspect_err(|e| warn!("Discarding fan state in {:?}: {}", path, e))
            .ok()
            .flatten()
            .inspect(|loaded| {
                debug!("Fan state of {} endpoint(s) read from {:?}", loaded.endpoints.len(), path)
            })
            .unwrap_or_default()
    }

    /// Write as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

/// JSON file storage shared by all endpoints of the process.
pub struct JsonFileStorage {
    path: PathBuf,
    state: RwLock<PersistedEndpoints>,
}

impl JsonFileStorage {
    pub fn new(path: PathBuf) -> Self {
        let state = PersistedEndpoints::load(&path);
        Self {
            path,
            state: RwLock::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FanControlStorage for JsonFileStorage {
    fn load(&self, endpoint_id: EndpointId) -> Result<Option<PersistentAttributes>> {
        Ok(self.state.read().endpoints.get(&endpoint_id).copied())
    }

    fn persist(&self, endpoint_id: EndpointId, attributes: &PersistentAttributes) -> Result<()> {
        let mut state = self.state.write();
        if state.endpoints.get(&endpoint_id) == Some(attributes) {
            return Ok(());
        }
        // The cache only takes values that made it to disk
        let mut next = state.clone();
        next.endpoints.insert(endpoint_id, *attributes);
        next.save(&self.path)?;
        *state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clusters::fan_control::types::{FanModeEnum, RockBitmap};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("fan-control-test-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        assert!(storage.load(1).unwrap().is_none());

        let attrs = PersistentAttributes {
            fan_mode: FanModeEnum::High,
            percent_setting: 100,
            ..Default::default()
        };
        storage.persist(1, &attrs).unwrap();
        assert_eq!(storage.load(1).unwrap(), Some(attrs));
        assert!(storage.load(2).unwrap().is_none());
    }

    #[test]
    fn test_json_storage_survives_reopen() {
        let path = temp_path("reopen.json");
        let _ = fs::remove_file(&path);

        let attrs = PersistentAttributes {
            fan_mode: FanModeEnum::Low,
            percent_setting: 50,
            speed_setting: 3,
            rock_setting: RockBitmap::LEFT_RIGHT | RockBitmap::ROUND,
            ..Default::default()
        };
        {
            let storage = JsonFileStorage::new(path.clone());
            assert!(storage.load(7).unwrap().is_none());
            storage.persist(7, &attrs).unwrap();
        }

        let reopened = JsonFileStorage::new(path.clone());
        assert_eq!(reopened.load(7).unwrap(), Some(attrs));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_json_storage_failed_save_is_not_cached() {
        // A regular file where the state directory should be
        let blocker = temp_path("blocker");
        fs::create_dir_all(blocker.parent().unwrap()).unwrap();
        fs::write(&blocker, b"").unwrap();

        let storage = JsonFileStorage::new(blocker.join("state.json"));
        let attrs = PersistentAttributes {
            fan_mode: FanModeEnum::High,
            percent_setting: 100,
            ..Default::default()
        };
        assert!(storage.persist(1, &attrs).is_err());
        assert!(storage.load(1).unwrap().is_none());
        // Still not on disk, so the retry writes again and fails again
        assert!(storage.persist(1, &attrs).is_err());
        let _ = fs::remove_file(&blocker);
    }

    #[test]
    fn test_read_from_missing_file() {
        let path = temp_path("missing.json");
        let _ = fs::remove_file(&path);
        assert!(PersistedEndpoints::read_from(&path).unwrap().is_none());
        assert!(PersistedEndpoints::load(&path).endpoints.is_empty());
    }

    #[test]
    fn test_json_storage_ignores_corrupt_file() {
        let path = temp_path("corrupt.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not json").unwrap();

        assert!(PersistedEndpoints::read_from(&path).is_err());
        let storage = JsonFileStorage::new(path.clone());
        assert!(storage.load(1).unwrap().is_none());
        let _ = fs::remove_file(&path);
    }
}
