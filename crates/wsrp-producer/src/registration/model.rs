//! Registration, consumer and consumer group records.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use wsrp_protocol::{PortletContext, QName, RegistrationContext};

/// Lifecycle status shared by registrations, consumers and groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    /// Needs a modifyRegistration before it can be used again.
    Pending,
    Valid,
    Invalid,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "valid" => Ok(Self::Valid),
            "invalid" => Ok(Self::Invalid),
            other => Err(format!("unknown registration status '{other}'")),
        }
    }
}

/// A consumer's authorization to use this producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Internal identifier assigned by the persistence layer.
    pub id: String,
    /// Opaque handle handed to the consumer. Empty until the policy assigns one.
    pub handle: String,
    pub consumer_id: String,
    pub status: RegistrationStatus,
    pub properties: BTreeMap<QName, String>,
    /// Handles of the portlets (clones, imports) this registration created.
    pub known_portlet_handles: BTreeSet<String>,
}

impl Registration {
    pub fn new(id: impl Into<String>, consumer_id: impl Into<String>, properties: BTreeMap<QName, String>) -> Self {
        Self {
            id: id.into(),
            handle: String::new(),
            consumer_id: consumer_id.into(),
            status: RegistrationStatus::Pending,
            properties,
            known_portlet_handles: BTreeSet::new(),
        }
    }

    pub fn context(&self) -> RegistrationContext {
        RegistrationContext::new(self.handle.clone())
    }

    pub fn knows(&self, portlet: &PortletContext) -> bool {
        self.known_portlet_handles.contains(portlet.id())
    }

    /// Returns true if the context was not known before.
    pub fn add_portlet_context(&mut self, portlet: &PortletContext) -> bool {
        self.known_portlet_handles.insert(portlet.id().to_string())
    }

    pub fn remove_portlet_context(&mut self, portlet: &PortletContext) -> bool {
        self.known_portlet_handles.remove(portlet.id())
    }

    pub fn known_portlet_contexts(&self) -> Vec<PortletContext> {
        self.known_portlet_handles.iter().map(PortletContext::new).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumer {
    /// Identity derived from the consumer name by the registration policy.
    pub id: String,
    pub name: String,
    pub group: Option<String>,
    pub status: RegistrationStatus,
    pub registrations: BTreeSet<String>,
}

impl Consumer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            group: None,
            status: RegistrationStatus::Pending,
            registrations: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerGroup {
    pub name: String,
    pub status: RegistrationStatus,
    pub consumers: BTreeSet<String>,
}

impl ConsumerGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: RegistrationStatus::Pending,
            consumers: BTreeSet::new(),
        }
    }
}
