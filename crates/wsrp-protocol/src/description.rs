//! Service and portlet descriptions, registration data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::qname::QName;
use crate::types::CookieProtocol;

/// Describes a registration property a producer expects from consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescription {
    pub name: QName,
    /// XML schema type of the value, e.g. `xsd:string`.
    #[serde(default = "default_property_type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

fn default_property_type() -> String {
    "xsd:string".into()
}

impl PropertyDescription {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            type_name: default_property_type(),
            label: None,
            hint: None,
        }
    }
}

/// Metadata of a single offered (or cloned) portlet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortletDescription {
    pub portlet_handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Portlets sharing a group id share cookies under the `perGroup`
    /// cookie protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default)]
    pub markup_types: Vec<String>,
}

/// What a producer publishes through getServiceDescription.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescription {
    pub requires_registration: bool,
    #[serde(default)]
    pub requires_init_cookie: CookieProtocol,
    #[serde(default)]
    pub offered_portlets: Vec<PortletDescription>,
    #[serde(default)]
    pub registration_properties: Vec<PropertyDescription>,
    #[serde(default)]
    pub supports_export_by_value: bool,
}

impl ServiceDescription {
    pub fn offered_portlet(&self, handle: &str) -> Option<&PortletDescription> {
        self.offered_portlets.iter().find(|p| p.portlet_handle == handle)
    }
}

/// Consumer information sent with register / modifyRegistration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationData {
    pub consumer_name: String,
    pub consumer_agent: String,
    #[serde(default)]
    pub method_get_supported: bool,
    #[serde(default)]
    pub registration_properties: BTreeMap<QName, String>,
}

impl RegistrationData {
    pub fn new(consumer_name: impl Into<String>, consumer_agent: impl Into<String>) -> Self {
        Self {
            consumer_name: consumer_name.into(),
            consumer_agent: consumer_agent.into(),
            method_get_supported: false,
            registration_properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: QName, value: impl Into<String>) -> Self {
        self.registration_properties.insert(name, value.into());
        self
    }
}
