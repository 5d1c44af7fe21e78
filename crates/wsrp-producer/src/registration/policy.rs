//! Registration policies and the compile-time policy registry.
//!
//! A policy decides what registration data is acceptable, how consumer
//! identities and registration handles are derived, and whether a
//! registration may touch a given portlet. Policies are selected by name
//! from a [`PolicyRegistry`] of factory closures.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use wsrp_protocol::{PortletContext, PropertyDescription, QName};

use crate::error::RegistrationError;
use crate::registration::model::Registration;

pub trait RegistrationPolicy: Send + Sync {
    /// Check the registration properties sent by a consumer against the
    /// properties the producer expects.
    fn validate_registration_data_for(
        &self,
        properties: &BTreeMap<QName, String>,
        consumer_identity: &str,
        expectations: &BTreeMap<QName, PropertyDescription>,
    ) -> Result<(), RegistrationError>;

    fn create_registration_handle_for(&self, registration_id: &str) -> String;

    fn get_consumer_id_from(
        &self,
        consumer_name: &str,
        properties: &BTreeMap<QName, String>,
    ) -> Result<String, RegistrationError>;

    fn validate_consumer_name(&self, consumer_name: &str) -> Result<(), RegistrationError>;

    fn validate_consumer_group_name(&self, group_name: &str) -> Result<(), RegistrationError>;

    /// Group newly created consumers are put in, if any.
    fn get_automatic_group_name_for(&self, consumer_name: &str) -> Option<String>;

    fn allow_access_to(&self, portlet: &PortletContext, registration: &Registration, operation: &str) -> bool;
}

/// Requires exactly the expected properties, derives identities from
/// consumer names, uses registration ids as handles and never restricts
/// portlet access on its own.
#[derive(Debug, Clone, Default)]
pub struct DefaultRegistrationPolicy {
    automatic_group: Option<String>,
}

impl DefaultRegistrationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_automatic_group(group: impl Into<String>) -> Self {
        Self {
            automatic_group: Some(group.into()),
        }
    }
}

impl RegistrationPolicy for DefaultRegistrationPolicy {
    fn validate_registration_data_for(
        &self,
        properties: &BTreeMap<QName, String>,
        consumer_identity: &str,
        expectations: &BTreeMap<QName, PropertyDescription>,
    ) -> Result<(), RegistrationError> {
        for name in expectations.keys() {
            match properties.get(name) {
                None => {
                    return Err(RegistrationError::InvalidConsumerData(format!(
                        "missing required registration property '{name}' for consumer '{consumer_identity}'"
                    )));
                }
                Some(value) if value.trim().is_empty() => {
                    return Err(RegistrationError::InvalidConsumerData(format!(
                        "registration property '{name}' has an empty value"
                    )));
                }
                Some(_) => {}
            }
        }

        if let Some(unknown) = properties.keys().find(|name| !expectations.contains_key(*name)) {
            return Err(RegistrationError::InvalidConsumerData(format!(
                "unknown registration property '{unknown}' for consumer '{consumer_identity}'"
            )));
        }

        Ok(())
    }

    fn create_registration_handle_for(&self, registration_id: &str) -> String {
        registration_id.to_string()
    }

    fn get_consumer_id_from(
        &self,
        consumer_name: &str,
        _properties: &BTreeMap<QName, String>,
    ) -> Result<String, RegistrationError> {
        self.validate_consumer_name(consumer_name)?;
        Ok(consumer_name.trim().to_string())
    }

    fn validate_consumer_name(&self, consumer_name: &str) -> Result<(), RegistrationError> {
        if consumer_name.trim().is_empty() {
            return Err(RegistrationError::IllegalArgument("consumer name cannot be empty".into()));
        }
        Ok(())
    }

    fn validate_consumer_group_name(&self, group_name: &str) -> Result<(), RegistrationError> {
        if group_name.trim().is_empty() {
            return Err(RegistrationError::IllegalArgument("consumer group name cannot be empty".into()));
        }
        Ok(())
    }

    fn get_automatic_group_name_for(&self, _consumer_name: &str) -> Option<String> {
        self.automatic_group.clone()
    }

    fn allow_access_to(&self, _portlet: &PortletContext, _registration: &Registration, _operation: &str) -> bool {
        true
    }
}

/// Names a policy and its options in the producer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
    #[serde(default = "default_policy_name")]
    pub name: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

pub const DEFAULT_POLICY: &str = "default";

fn default_policy_name() -> String {
    DEFAULT_POLICY.into()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            name: default_policy_name(),
            options: BTreeMap::new(),
        }
    }
}

type PolicyFactory = Box<dyn Fn(&PolicyConfig) -> Arc<dyn RegistrationPolicy> + Send + Sync>;

/// Maps policy names to factories.
pub struct PolicyRegistry {
    factories: BTreeMap<String, PolicyFactory>,
}

impl PolicyRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// The built-in policies. `default` honours an `automaticGroup` option.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(DEFAULT_POLICY, |config| {
            let policy = match config.options.get("automaticGroup") {
                Some(group) => DefaultRegistrationPolicy::with_automatic_group(group.clone()),
                None => DefaultRegistrationPolicy::new(),
            };
            Arc::new(policy)
        });
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&PolicyConfig) -> Arc<dyn RegistrationPolicy> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn create(&self, config: &PolicyConfig) -> Result<Arc<dyn RegistrationPolicy>, RegistrationError> {
        self.factories
            .get(&config.name)
            .map(|factory| factory(config))
            .ok_or_else(|| {
                RegistrationError::IllegalArgument(format!("unknown registration policy '{}'", config.name))
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
