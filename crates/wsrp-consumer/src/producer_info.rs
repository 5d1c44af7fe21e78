//! What a consumer knows about one producer: where it lives, how the
//! consumer is registered with it, and a cached service description.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;
use wsrp_protocol::{
    CookieProtocol, PortletDescription, QName, RegistrationContext, RegistrationData, RegistrationPort,
    ServiceDescription, ServiceDescriptionPort,
};

use crate::error::{ConsumerError, RegistryError};

pub const DEFAULT_CONSUMER_AGENT: &str = "wsrp-rs consumer";

/// Registration data sent to the producer and the context it returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationInfo {
    pub consumer_name: String,
    #[serde(default = "default_agent")]
    pub consumer_agent: String,
    #[serde(default)]
    pub properties: BTreeMap<QName, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<RegistrationContext>,
}

fn default_agent() -> String {
    DEFAULT_CONSUMER_AGENT.into()
}

impl RegistrationInfo {
    pub fn new(consumer_name: impl Into<String>) -> Self {
        Self {
            consumer_name: consumer_name.into(),
            consumer_agent: default_agent(),
            properties: BTreeMap::new(),
            context: None,
        }
    }

    pub fn with_property(mut self, name: QName, value: impl Into<String>) -> Self {
        self.properties.insert(name, value.into());
        self
    }

    pub fn is_registered(&self) -> bool {
        self.context.is_some()
    }

    pub fn registration_data(&self) -> RegistrationData {
        RegistrationData {
            consumer_name: self.consumer_name.clone(),
            consumer_agent: self.consumer_agent.clone(),
            method_get_supported: false,
            registration_properties: self.properties.clone(),
        }
    }
}

/// Outcome of [`ProducerInfo::refresh`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RefreshResult {
    /// False when the cached description was still fresh.
    pub refreshed: bool,
    pub registration_required: bool,
    /// Required properties the registration information does not provide.
    pub missing_properties: Vec<QName>,
}

impl RefreshResult {
    pub fn needs_registration(&self, info: &ProducerInfo) -> bool {
        self.registration_required && !info.registration.is_registered()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerInfo {
    pub id: String,
    pub endpoint_url: String,
    pub registration: RegistrationInfo,
    #[serde(default)]
    pub active: bool,
    /// Seconds a fetched service description stays fresh; always refetch
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_expiration: Option<u32>,
    #[serde(skip)]
    service_description: Option<ServiceDescription>,
    #[serde(skip)]
    last_refresh: Option<i64>,
}

impl ProducerInfo {
    pub fn new(id: impl Into<String>, endpoint_url: impl Into<String>, registration: RegistrationInfo) -> Self {
        Self {
            id: id.into(),
            endpoint_url: endpoint_url.into(),
            registration,
            active: false,
            cache_expiration: None,
            service_description: None,
            last_refresh: None,
        }
    }

    pub fn endpoint(&self) -> Result<Url, RegistryError> {
        Url::parse(&self.endpoint_url).map_err(|e| RegistryError::InvalidProducer {
            id: self.id.clone(),
            reason: format!("invalid endpoint URL '{}': {e}", self.endpoint_url),
        })
    }

    pub fn service_description(&self) -> Option<&ServiceDescription> {
        self.service_description.as_ref()
    }

    pub fn last_refresh(&self) -> Option<i64> {
        self.last_refresh
    }

    pub fn is_cache_valid_at(&self, now: i64) -> bool {
        match (self.last_refresh, self.cache_expiration) {
            (Some(last), Some(seconds)) => now < last + i64::from(seconds) * 1000,
            _ => false,
        }
    }

    pub fn cookie_protocol(&self) -> CookieProtocol {
        self.service_description
            .as_ref()
            .map(|d| d.requires_init_cookie)
            .unwrap_or_default()
    }

    pub fn is_registration_required(&self) -> bool {
        self.service_description
            .as_ref()
            .is_some_and(|d| d.requires_registration)
    }

    pub fn offered_portlets(&self) -> &[PortletDescription] {
        self.service_description
            .as_ref()
            .map(|d| d.offered_portlets.as_slice())
            .unwrap_or_default()
    }

    pub fn registration_context(&self) -> Option<&RegistrationContext> {
        self.registration.context.as_ref()
    }

    /// Fetch the service description unless the cached one is still fresh
    /// (or `force` is set).
    pub fn refresh(
        &mut self,
        force: bool,
        now: i64,
        port: &dyn ServiceDescriptionPort,
    ) -> Result<RefreshResult, ConsumerError> {
        if !force && self.service_description.is_some() && self.is_cache_valid_at(now) {
            debug!("Service description of '{}' is still fresh", self.id);
            return Ok(RefreshResult {
                refreshed: false,
                registration_required: self.is_registration_required(),
                missing_properties: self.missing_properties(),
            });
        }

        let description = port
            .get_service_description(self.registration.context.as_ref(), &["en".to_string()])
            .inspect_err(|fault| warn!("Could not refresh producer '{}': {}", self.id, fault))?;
        info!(
            "Refreshed producer '{}': {} offered portlets, registration {}",
            self.id,
            description.offered_portlets.len(),
            if description.requires_registration { "required" } else { "not required" }
        );

        self.service_description = Some(description);
        self.last_refresh = Some(now);
        Ok(RefreshResult {
            refreshed: true,
            registration_required: self.is_registration_required(),
            missing_properties: self.missing_properties(),
        })
    }

    fn missing_properties(&self) -> Vec<QName> {
        self.service_description
            .iter()
            .flat_map(|d| d.registration_properties.iter())
            .map(|p| &p.name)
            .filter(|name| !self.registration.properties.contains_key(*name))
            .cloned()
            .collect()
    }

    pub fn register(&mut self, port: &dyn RegistrationPort) -> Result<RegistrationContext, ConsumerError> {
        if self.registration.is_registered() {
            return Err(ConsumerError::AlreadyRegistered(self.id.clone()));
        }
        let context = port.register(&self.registration.registration_data())?;
        info!("Registered with producer '{}' as {}", self.id, context.registration_handle);
        self.registration.context = Some(context.clone());
        // The description may differ for registered consumers.
        self.last_refresh = None;
        Ok(context)
    }

    pub fn modify_registration(&mut self, port: &dyn RegistrationPort) -> Result<(), ConsumerError> {
        let data = self.registration.registration_data();
        let context = self
            .registration
            .context
            .as_mut()
            .ok_or_else(|| ConsumerError::NotRegistered(self.id.clone()))?;
        if let Some(state) = port.modify_registration(context, &data)? {
            context.registration_state = Some(state);
        }
        info!("Modified registration with producer '{}'", self.id);
        Ok(())
    }

    pub fn deregister(&mut self, port: &dyn RegistrationPort) -> Result<(), ConsumerError> {
        let context = self
            .registration
            .context
            .as_ref()
            .ok_or_else(|| ConsumerError::NotRegistered(self.id.clone()))?;
        port.deregister(context)?;
        info!("Deregistered from producer '{}'", self.id);
        self.registration.context = None;
        self.last_refresh = None;
        Ok(())
    }
}
