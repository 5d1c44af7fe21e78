//! RegistrationManager: consumer, group and registration lifecycle.
//!
//! All validation is delegated to the active [`RegistrationPolicy`]; all
//! storage to a [`RegistrationPersistenceManager`]. Registration removal is
//! voted on by the registered [`RegistrationDestructionListener`]s.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use wsrp_protocol::{PortletContext, PropertyDescription, QName};

use crate::error::RegistrationError;
use crate::registration::model::{Consumer, ConsumerGroup, Registration, RegistrationStatus};
use crate::registration::persistence::RegistrationPersistenceManager;
use crate::registration::policy::RegistrationPolicy;

/// Answer of a destruction listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vote {
    Accept,
    Reject(String),
}

impl Vote {
    pub fn is_negative(&self) -> bool {
        matches!(self, Self::Reject(_))
    }
}

/// Notified before a registration is destroyed. A single negative vote
/// cancels the destruction.
pub trait RegistrationDestructionListener: Send + Sync {
    fn on_registration_destruction(&self, registration: &Registration) -> Vote;
}

pub struct RegistrationManager {
    persistence: Arc<dyn RegistrationPersistenceManager>,
    policy: RwLock<Arc<dyn RegistrationPolicy>>,
    listeners: RwLock<Vec<Weak<dyn RegistrationDestructionListener>>>,
    /// Serializes read-modify-write of a registration's known contexts.
    update_lock: Mutex<()>,
    /// Serializes new registrations: consumer lookup, creation and update.
    consumer_lock: Mutex<()>,
}

impl RegistrationManager {
    pub fn new(
        persistence: Arc<dyn RegistrationPersistenceManager>,
        policy: Arc<dyn RegistrationPolicy>,
    ) -> Self {
        Self {
            persistence,
            policy: RwLock::new(policy),
            listeners: RwLock::new(Vec::new()),
            update_lock: Mutex::new(()),
            consumer_lock: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> Arc<dyn RegistrationPolicy> {
        self.policy.read().clone()
    }

    pub fn set_policy(&self, policy: Arc<dyn RegistrationPolicy>) {
        *self.policy.write() = policy;
    }

    pub fn persistence(&self) -> &Arc<dyn RegistrationPersistenceManager> {
        &self.persistence
    }

    /// Listeners are held weakly; dropped listeners are forgotten.
    pub fn add_destruction_listener(&self, listener: &Arc<dyn RegistrationDestructionListener>) {
        self.listeners.write().push(Arc::downgrade(listener));
    }

    // ── Registrations ────────────────────────────────────────────────────

    /// Validate `properties`, find (or create) the consumer named
    /// `consumer_name` and attach a new, valid registration to it.
    pub fn add_registration_to(
        &self,
        consumer_name: &str,
        properties: BTreeMap<QName, String>,
        expectations: &BTreeMap<QName, PropertyDescription>,
        create_consumer_if_needed: bool,
    ) -> Result<Registration, RegistrationError> {
        let policy = self.policy();
        let identity = policy.get_consumer_id_from(consumer_name, &properties)?;
        policy.validate_registration_data_for(&properties, &identity, expectations)?;

        let _guard = self.consumer_lock.lock();
        let consumer = match self.persistence.get_consumer_by_id(&identity) {
            Some(consumer) => consumer,
            None if create_consumer_if_needed => self.create_consumer(consumer_name)?,
            None => return Err(RegistrationError::NoSuchConsumer(identity)),
        };

        let mut registration = self.persistence.add_registration_for(&consumer.id, properties)?;
        registration.handle = policy.create_registration_handle_for(&registration.id);
        registration.status = RegistrationStatus::Valid;
        if let Err(e) = self.persistence.save_registration(&registration) {
            if let Err(cleanup) = self.persistence.remove_registration(&registration.id) {
                warn!("Could not remove unsaved registration {}: {}", registration.id, cleanup);
            }
            return Err(e);
        }

        if consumer.status != RegistrationStatus::Valid {
            let mut consumer = self
                .persistence
                .get_consumer_by_id(&consumer.id)
                .ok_or_else(|| RegistrationError::NoSuchConsumer(consumer.id.clone()))?;
            consumer.status = RegistrationStatus::Valid;
            self.persistence.save_consumer(&consumer)?;
        }

        info!("Registered consumer '{}' with handle {}", consumer.id, registration.handle);
        Ok(registration)
    }

    /// Replace the properties of an existing registration and mark it valid.
    pub fn modify_registration(
        &self,
        handle: &str,
        properties: BTreeMap<QName, String>,
        expectations: &BTreeMap<QName, PropertyDescription>,
    ) -> Result<Registration, RegistrationError> {
        let _guard = self.update_lock.lock();
        let mut registration = self.require_registration(handle)?;
        self.policy()
            .validate_registration_data_for(&properties, &registration.consumer_id, expectations)?;

        registration.properties = properties;
        registration.status = RegistrationStatus::Valid;
        self.persistence.save_registration(&registration)?;
        info!("Modified registration {}", handle);
        Ok(registration)
    }

    /// Destroy the registration identified by `handle` once every listener
    /// accepted.
    pub fn remove_registration(&self, handle: &str) -> Result<Registration, RegistrationError> {
        let registration = self.require_registration(handle)?;

        let listeners: Vec<_> = self.listeners.read().iter().filter_map(Weak::upgrade).collect();
        for listener in listeners {
            if let Vote::Reject(reason) = listener.on_registration_destruction(&registration) {
                warn!("Destruction of registration {} vetoed: {}", handle, reason);
                return Err(RegistrationError::DestructionVetoed {
                    handle: handle.to_string(),
                    reason,
                });
            }
        }
        self.listeners.write().retain(|l| l.strong_count() > 0);

        let removed = self.persistence.remove_registration(&registration.id)?;
        info!("Removed registration {} of consumer '{}'", handle, removed.consumer_id);
        Ok(removed)
    }

    pub fn get_registration(&self, handle: &str) -> Option<Registration> {
        self.persistence.get_registration_by_handle(handle)
    }

    pub fn get_registration_by_id(&self, id: &str) -> Option<Registration> {
        self.persistence.get_registration(id)
    }

    pub fn get_registrations(&self) -> Vec<Registration> {
        self.persistence.get_registrations()
    }

    pub fn save_registration(&self, registration: &Registration) -> Result<(), RegistrationError> {
        let _guard = self.update_lock.lock();
        self.persistence.save_registration(registration)
    }

    /// Mark every valid registration pending, forcing consumers through
    /// modifyRegistration. Used when the registration requirements change.
    pub fn mark_registrations_pending(&self) -> Result<usize, RegistrationError> {
        let _guard = self.update_lock.lock();
        let mut changed = 0;
        for mut registration in self.persistence.get_registrations() {
            if registration.status == RegistrationStatus::Valid {
                registration.status = RegistrationStatus::Pending;
                self.persistence.save_registration(&registration)?;
                changed += 1;
            }
        }
        if changed > 0 {
            info!("Marked {} registrations as pending", changed);
        }
        Ok(changed)
    }

    /// Record that the registration with id `registration_id` owns `portlet`.
    pub fn add_portlet_context(
        &self,
        registration_id: &str,
        portlet: &PortletContext,
    ) -> Result<(), RegistrationError> {
        let _guard = self.update_lock.lock();
        let mut registration = self
            .persistence
            .get_registration(registration_id)
            .ok_or_else(|| RegistrationError::NoSuchRegistration(registration_id.to_string()))?;
        if registration.add_portlet_context(portlet) {
            self.persistence.save_registration(&registration)?;
            debug!("Registration {} now knows portlet {}", registration_id, portlet.id());
        }
        Ok(())
    }

    pub fn remove_portlet_context(
        &self,
        registration_id: &str,
        portlet: &PortletContext,
    ) -> Result<(), RegistrationError> {
        let _guard = self.update_lock.lock();
        let mut registration = self
            .persistence
            .get_registration(registration_id)
            .ok_or_else(|| RegistrationError::NoSuchRegistration(registration_id.to_string()))?;
        if registration.remove_portlet_context(portlet) {
            self.persistence.save_registration(&registration)?;
            debug!("Registration {} forgot portlet {}", registration_id, portlet.id());
        }
        Ok(())
    }

    fn require_registration(&self, handle: &str) -> Result<Registration, RegistrationError> {
        self.get_registration(handle)
            .ok_or_else(|| RegistrationError::NoSuchRegistration(handle.to_string()))
    }

    // ── Consumers ────────────────────────────────────────────────────────

    pub fn get_consumer_by_identity(&self, identity: &str) -> Option<Consumer> {
        self.persistence.get_consumer_by_id(identity)
    }

    /// The consumer owning the registration with `handle`.
    pub fn get_consumer_for(&self, handle: &str) -> Option<Consumer> {
        let registration = self.get_registration(handle)?;
        self.persistence.get_consumer_by_id(&registration.consumer_id)
    }

    pub fn get_consumers(&self) -> Vec<Consumer> {
        self.persistence.get_consumers()
    }

    /// Create a consumer, putting it in the policy's automatic group if
    /// there is one.
    pub fn create_consumer(&self, name: &str) -> Result<Consumer, RegistrationError> {
        let policy = self.policy();
        policy.validate_consumer_name(name)?;
        let identity = policy.get_consumer_id_from(name, &BTreeMap::new())?;
        let consumer = self.persistence.create_consumer(&identity, name)?;
        info!("Created consumer '{}'", identity);

        match policy.get_automatic_group_name_for(name) {
            Some(group) => {
                self.add_consumer_to_group_named(&identity, &group, true)?;
                self.persistence
                    .get_consumer_by_id(&identity)
                    .ok_or(RegistrationError::NoSuchConsumer(identity))
            }
            None => Ok(consumer),
        }
    }

    /// Remove a consumer and, first, each of its registrations. Stops at the
    /// first vetoed registration.
    pub fn remove_consumer(&self, identity: &str) -> Result<Consumer, RegistrationError> {
        let consumer = self
            .persistence
            .get_consumer_by_id(identity)
            .ok_or_else(|| RegistrationError::NoSuchConsumer(identity.to_string()))?;

        for registration_id in &consumer.registrations {
            if let Some(registration) = self.persistence.get_registration(registration_id) {
                self.remove_registration(&registration.handle)?;
            }
        }

        let removed = self.persistence.remove_consumer(identity)?;
        info!("Removed consumer '{}'", identity);
        Ok(removed)
    }

    // ── Consumer groups ──────────────────────────────────────────────────

    pub fn create_consumer_group(&self, name: &str) -> Result<ConsumerGroup, RegistrationError> {
        self.policy().validate_consumer_group_name(name)?;
        let group = self.persistence.create_consumer_group(name)?;
        info!("Created consumer group '{}'", name);
        Ok(group)
    }

    pub fn get_consumer_group(&self, name: &str) -> Option<ConsumerGroup> {
        self.persistence.get_consumer_group(name)
    }

    pub fn get_consumer_groups(&self) -> Vec<ConsumerGroup> {
        self.persistence.get_consumer_groups()
    }

    pub fn add_consumer_to_group_named(
        &self,
        identity: &str,
        group_name: &str,
        create_group_if_needed: bool,
    ) -> Result<(), RegistrationError> {
        if self.persistence.get_consumer_group(group_name).is_none() {
            if !create_group_if_needed {
                return Err(RegistrationError::NoSuchConsumerGroup(group_name.to_string()));
            }
            self.create_consumer_group(group_name)?;
        }
        self.persistence.add_consumer_to_group_named(identity, group_name)?;
        debug!("Consumer '{}' joined group '{}'", identity, group_name);
        Ok(())
    }

    /// Remove a group together with its member consumers.
    pub fn remove_consumer_group(&self, name: &str) -> Result<ConsumerGroup, RegistrationError> {
        let group = self
            .persistence
            .get_consumer_group(name)
            .ok_or_else(|| RegistrationError::NoSuchConsumerGroup(name.to_string()))?;

        for identity in &group.consumers {
            self.remove_consumer(identity)?;
        }

        let removed = self.persistence.remove_consumer_group(name)?;
        info!("Removed consumer group '{}'", name);
        Ok(removed)
    }
}
