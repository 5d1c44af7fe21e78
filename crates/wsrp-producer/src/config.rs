//! Producer configuration, stored as `wsrp-producer-config.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;
use wsrp_protocol::{CookieProtocol, PropertyDescription, QName};

use crate::registration::PolicyConfig;

pub const PRODUCER_CONFIG_FILE: &str = "wsrp-producer-config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid producer configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid producer configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequirements {
    #[serde(default)]
    pub registration_required: bool,
    /// Hide offered portlets from unregistered service description calls.
    #[serde(default)]
    pub registration_required_for_full_description: bool,
    #[serde(default)]
    pub registration_properties: Vec<PropertyDescription>,
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl RegistrationRequirements {
    /// Expected registration properties keyed by name.
    pub fn expectations(&self) -> BTreeMap<QName, PropertyDescription> {
        self.registration_properties
            .iter()
            .map(|p| (p.name.clone(), p.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSettings {
    /// Keep exports on the producer and hand out references.
    #[serde(default)]
    pub by_reference: bool,
    /// Default lifetime of by-reference exports, in milliseconds.
    #[serde(default)]
    pub default_lifetime_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerConfiguration {
    #[serde(default)]
    pub registration_requirements: RegistrationRequirements,
    #[serde(default)]
    pub cookie_protocol: CookieProtocol,
    /// Seconds; negative means sessions never expire.
    #[serde(default = "default_session_expiration")]
    pub session_expiration_time: i32,
    #[serde(default)]
    pub export: ExportSettings,
    /// Reject requests for operations the producer does not support
    /// instead of ignoring them.
    #[serde(default = "default_true")]
    pub using_strict_mode: bool,
}

fn default_session_expiration() -> i32 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for ProducerConfiguration {
    fn default() -> Self {
        Self {
            registration_requirements: RegistrationRequirements::default(),
            cookie_protocol: CookieProtocol::None,
            session_expiration_time: default_session_expiration(),
            export: ExportSettings::default(),
            using_strict_mode: true,
        }
    }
}

impl ProducerConfiguration {
    /// `~/.wsrp/wsrp-producer-config.json`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".wsrp")
            .join(PRODUCER_CONFIG_FILE)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        info!("Loaded producer configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path`, or the defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let requirements = &self.registration_requirements;
        if !requirements.registration_required && !requirements.registration_properties.is_empty() {
            return Err(ConfigError::Invalid(
                "registration properties are set but registration is not required".into(),
            ));
        }
        if requirements.expectations().len() != requirements.registration_properties.len() {
            return Err(ConfigError::Invalid("duplicate registration property names".into()));
        }
        if requirements.policy.name.trim().is_empty() {
            return Err(ConfigError::Invalid("registration policy name cannot be empty".into()));
        }
        if matches!(self.export.default_lifetime_ms, Some(ms) if ms <= 0) {
            return Err(ConfigError::Invalid("export lifetime must be positive".into()));
        }
        Ok(())
    }
}
