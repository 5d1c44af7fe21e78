//! Core protocol value types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A reference to a portlet: its handle plus optional opaque state.
///
/// Producers that do not keep clone state themselves hand the state back to
/// the consumer, which must send it with every subsequent call.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortletContext {
    pub portlet_handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "b64::option")]
    pub portlet_state: Option<Vec<u8>>,
}

impl PortletContext {
    pub fn new(portlet_handle: impl Into<String>) -> Self {
        Self {
            portlet_handle: portlet_handle.into(),
            portlet_state: None,
        }
    }

    pub fn with_state(portlet_handle: impl Into<String>, state: Vec<u8>) -> Self {
        Self {
            portlet_handle: portlet_handle.into(),
            portlet_state: Some(state),
        }
    }

    pub fn id(&self) -> &str {
        &self.portlet_handle
    }

    pub fn state(&self) -> Option<&[u8]> {
        self.portlet_state.as_deref()
    }
}

/// Handle (and optional producer-side state) of a consumer registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationContext {
    pub registration_handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "b64::option")]
    pub registration_state: Option<Vec<u8>>,
}

impl RegistrationContext {
    pub fn new(registration_handle: impl Into<String>) -> Self {
        Self {
            registration_handle: registration_handle.into(),
            registration_state: None,
        }
    }
}

/// Where a portlet comes from, as seen by the portlet container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortletStatus {
    /// Published by the producer and usable by every consumer.
    Offered,
    /// Created by a consumer through cloning or import.
    Cloned,
}

/// Lifetime of an export (all values in milliseconds since the epoch,
/// except `refresh_duration` which is a duration in milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lifetime {
    pub current_time: i64,
    pub termination_time: Option<i64>,
    pub refresh_duration: Option<i64>,
}

impl Lifetime {
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.termination_time.is_some_and(|t| t <= now)
    }
}

/// The `requiresInitCookie` value of a service description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CookieProtocol {
    #[default]
    None,
    PerUser,
    PerGroup,
}

impl CookieProtocol {
    pub fn requires_init_cookie(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Portlet preferences as exposed through get/setPortletProperties.
pub type PropertyMap = BTreeMap<String, String>;

/// A single modification requested by setPortletProperties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyChange {
    Update { name: String, value: String },
    Reset { name: String },
}

impl PropertyChange {
    pub fn name(&self) -> &str {
        match self {
            Self::Update { name, .. } | Self::Reset { name } => name,
        }
    }
}

/// End-user identity forwarded by the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub user_context_key: String,
    #[serde(default)]
    pub user_categories: Vec<String>,
}

/// Serde adapters encoding byte payloads as base64 strings.
pub mod b64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        STANDARD.decode(raw.as_bytes()).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(b) => serializer.serialize_some(&STANDARD.encode(b)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            raw.map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
