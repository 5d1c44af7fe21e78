//! Consumer registry: the producers a consumer portal talks to, stored as
//! `wsrp-consumers-config.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::producer_info::{ProducerInfo, RegistrationInfo};

pub const CONSUMERS_CONFIG_FILE: &str = "wsrp-consumers-config.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    producers: Vec<ProducerInfo>,
}

pub struct ConsumerRegistry {
    path: Option<PathBuf>,
    producers: RwLock<BTreeMap<String, ProducerInfo>>,
}

impl ConsumerRegistry {
    /// `~/.wsrp/wsrp-consumers-config.json`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".wsrp")
            .join(CONSUMERS_CONFIG_FILE)
    }

    /// A registry that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            producers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Open the registry stored at `path`; a missing file is an empty
    /// registry.
    pub fn open(path: &Path) -> Result<Self, RegistryError> {
        let producers = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let file: RegistryFile = serde_json::from_str(&content)?;
            file.producers
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect()
        } else {
            BTreeMap::new()
        };
        info!("Opened consumer registry {} ({} producers)", path.display(), producers.len());

        Ok(Self {
            path: Some(path.to_path_buf()),
            producers: RwLock::new(producers),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.producers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.read().is_empty()
    }

    pub fn get(&self, id: &str) -> Option<ProducerInfo> {
        self.producers.read().get(id).cloned()
    }

    /// All producers, ordered by id.
    pub fn list(&self) -> Vec<ProducerInfo> {
        self.producers.read().values().cloned().collect()
    }

    /// Add an inactive producer at `endpoint_url`.
    pub fn create_consumer(
        &self,
        id: &str,
        endpoint_url: &str,
        registration: RegistrationInfo,
    ) -> Result<ProducerInfo, RegistryError> {
        let info = ProducerInfo::new(id.trim(), endpoint_url, registration);
        validate(&info)?;

        self.mutate(|producers| {
            if producers.contains_key(&info.id) {
                return Err(RegistryError::DuplicateProducer(info.id.clone()));
            }
            producers.insert(info.id.clone(), info.clone());
            Ok(())
        })?;
        info!("Created consumer for producer '{}' at {}", info.id, info.endpoint_url);
        Ok(info)
    }

    pub fn remove(&self, id: &str) -> Result<ProducerInfo, RegistryError> {
        let removed = self.mutate(|producers| {
            producers
                .remove(id)
                .ok_or_else(|| RegistryError::NoSuchProducer(id.to_string()))
        })?;
        info!("Removed consumer for producer '{}'", id);
        Ok(removed)
    }

    pub fn activate(&self, id: &str) -> Result<(), RegistryError> {
        self.set_active(id, true)
    }

    pub fn deactivate(&self, id: &str) -> Result<(), RegistryError> {
        self.set_active(id, false)
    }

    fn set_active(&self, id: &str, active: bool) -> Result<(), RegistryError> {
        self.mutate(|producers| {
            let info = producers
                .get_mut(id)
                .ok_or_else(|| RegistryError::NoSuchProducer(id.to_string()))?;
            info.active = active;
            Ok(())
        })?;
        info!("Producer '{}' {}", id, if active { "activated" } else { "deactivated" });
        Ok(())
    }

    /// Replace the stored information of `previous_id` with `info`, which
    /// may carry a new id.
    pub fn update(&self, previous_id: &str, info: ProducerInfo) -> Result<(), RegistryError> {
        validate(&info)?;
        self.mutate(|producers| {
            if !producers.contains_key(previous_id) {
                return Err(RegistryError::NoSuchProducer(previous_id.to_string()));
            }
            if info.id != previous_id && producers.contains_key(&info.id) {
                return Err(RegistryError::DuplicateProducer(info.id.clone()));
            }
            producers.remove(previous_id);
            debug!("Updated producer '{}' (was '{}')", info.id, previous_id);
            producers.insert(info.id.clone(), info);
            Ok(())
        })
    }

    /// Apply `change` and write the registry; a failed write undoes the
    /// change.
    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut BTreeMap<String, ProducerInfo>) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let mut producers = self.producers.write();
        let before = producers.clone();
        let result = change(&mut producers)?;
        if let Err(e) = self.persist(&producers) {
            *producers = before;
            return Err(e);
        }
        Ok(result)
    }

    fn persist(&self, producers: &BTreeMap<String, ProducerInfo>) -> Result<(), RegistryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = RegistryFile {
            producers: producers.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        std::fs::write(path, json).map_err(|source| RegistryError::Io {
            path: path.clone(),
            source,
        })
    }
}

fn validate(info: &ProducerInfo) -> Result<(), RegistryError> {
    if info.id.trim().is_empty() {
        return Err(RegistryError::InvalidProducer {
            id: info.id.clone(),
            reason: "producer id cannot be empty".into(),
        });
    }
    if info.registration.consumer_name.trim().is_empty() {
        return Err(RegistryError::InvalidProducer {
            id: info.id.clone(),
            reason: "consumer name cannot be empty".into(),
        });
    }
    info.endpoint().map(|_| ())
}
