//! Registration persistence: the storage interface and its in-memory form.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use tracing::debug;
use wsrp_protocol::QName;

use crate::error::RegistrationError;
use crate::registration::model::{Consumer, ConsumerGroup, Registration};

/// Storage of the consumer / group / registration graph.
///
/// Implementations keep both sides of every relation consistent: removing
/// a registration detaches it from its consumer, removing a consumer drops
/// its registrations and its group membership.
pub trait RegistrationPersistenceManager: Send + Sync {
    fn create_consumer(&self, id: &str, name: &str) -> Result<Consumer, RegistrationError>;
    fn get_consumer_by_id(&self, id: &str) -> Option<Consumer>;
    fn get_consumers(&self) -> Vec<Consumer>;
    fn save_consumer(&self, consumer: &Consumer) -> Result<(), RegistrationError>;
    fn remove_consumer(&self, id: &str) -> Result<Consumer, RegistrationError>;

    fn create_consumer_group(&self, name: &str) -> Result<ConsumerGroup, RegistrationError>;
    fn get_consumer_group(&self, name: &str) -> Option<ConsumerGroup>;
    fn get_consumer_groups(&self) -> Vec<ConsumerGroup>;
    fn save_consumer_group(&self, group: &ConsumerGroup) -> Result<(), RegistrationError>;
    fn remove_consumer_group(&self, name: &str) -> Result<ConsumerGroup, RegistrationError>;
    fn add_consumer_to_group_named(&self, consumer_id: &str, group_name: &str) -> Result<(), RegistrationError>;

    fn add_registration_for(
        &self,
        consumer_id: &str,
        properties: BTreeMap<QName, String>,
    ) -> Result<Registration, RegistrationError>;
    fn get_registration(&self, id: &str) -> Option<Registration>;
    fn get_registrations(&self) -> Vec<Registration>;
    fn save_registration(&self, registration: &Registration) -> Result<(), RegistrationError>;
    fn remove_registration(&self, id: &str) -> Result<Registration, RegistrationError>;

    fn get_registration_by_handle(&self, handle: &str) -> Option<Registration> {
        self.get_registrations().into_iter().find(|r| r.handle == handle)
    }
}

/// The whole graph; cloned to take snapshots.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoreState {
    pub consumers: HashMap<String, Consumer>,
    pub groups: HashMap<String, ConsumerGroup>,
    pub registrations: HashMap<String, Registration>,
}

/// Registration graph held in memory behind a single lock.
#[derive(Default)]
pub struct InMemoryRegistrationStore {
    state: RwLock<StoreState>,
}

impl InMemoryRegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_state(state: StoreState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    pub(crate) fn snapshot(&self) -> StoreState {
        self.state.read().clone()
    }

    pub(crate) fn restore(&self, state: StoreState) {
        *self.state.write() = state;
    }
}

impl RegistrationPersistenceManager for InMemoryRegistrationStore {
    fn create_consumer(&self, id: &str, name: &str) -> Result<Consumer, RegistrationError> {
        let mut state = self.state.write();
        if state.consumers.contains_key(id) {
            return Err(RegistrationError::DuplicateConsumer(id.to_string()));
        }
        let consumer = Consumer::new(id, name);
        state.consumers.insert(id.to_string(), consumer.clone());
        debug!("Created consumer {}", id);
        Ok(consumer)
    }

    fn get_consumer_by_id(&self, id: &str) -> Option<Consumer> {
        self.state.read().consumers.get(id).cloned()
    }

    fn get_consumers(&self) -> Vec<Consumer> {
        let mut consumers: Vec<Consumer> = self.state.read().consumers.values().cloned().collect();
        consumers.sort_by(|a, b| a.id.cmp(&b.id));
        consumers
    }

    fn save_consumer(&self, consumer: &Consumer) -> Result<(), RegistrationError> {
        let mut state = self.state.write();
        if !state.consumers.contains_key(&consumer.id) {
            return Err(RegistrationError::NoSuchConsumer(consumer.id.clone()));
        }
        state.consumers.insert(consumer.id.clone(), consumer.clone());
        Ok(())
    }

    fn remove_consumer(&self, id: &str) -> Result<Consumer, RegistrationError> {
        let mut state = self.state.write();
        let consumer = state
            .consumers
            .remove(id)
            .ok_or_else(|| RegistrationError::NoSuchConsumer(id.to_string()))?;

        for registration_id in &consumer.registrations {
            state.registrations.remove(registration_id);
        }
        if let Some(group_name) = &consumer.group {
            if let Some(group) = state.groups.get_mut(group_name) {
                group.consumers.remove(id);
            }
        }
        debug!("Removed consumer {}", id);
        Ok(consumer)
    }

    fn create_consumer_group(&self, name: &str) -> Result<ConsumerGroup, RegistrationError> {
        let mut state = self.state.write();
        if state.groups.contains_key(name) {
            return Err(RegistrationError::DuplicateConsumerGroup(name.to_string()));
        }
        let group = ConsumerGroup::new(name);
        state.groups.insert(name.to_string(), group.clone());
        Ok(group)
    }

    fn get_consumer_group(&self, name: &str) -> Option<ConsumerGroup> {
        self.state.read().groups.get(name).cloned()
    }

    fn get_consumer_groups(&self) -> Vec<ConsumerGroup> {
        let mut groups: Vec<ConsumerGroup> = self.state.read().groups.values().cloned().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        groups
    }

    fn save_consumer_group(&self, group: &ConsumerGroup) -> Result<(), RegistrationError> {
        let mut state = self.state.write();
        match state.groups.get_mut(&group.name) {
            Some(existing) => {
                // Membership is owned by add_consumer_to_group_named.
                existing.status = group.status;
                Ok(())
            }
            None => Err(RegistrationError::NoSuchConsumerGroup(group.name.clone())),
        }
    }

    fn remove_consumer_group(&self, name: &str) -> Result<ConsumerGroup, RegistrationError> {
        let mut state = self.state.write();
        let group = state
            .groups
            .remove(name)
            .ok_or_else(|| RegistrationError::NoSuchConsumerGroup(name.to_string()))?;
        for consumer_id in &group.consumers {
            if let Some(consumer) = state.consumers.get_mut(consumer_id) {
                consumer.group = None;
            }
        }
        Ok(group)
    }

    fn add_consumer_to_group_named(&self, consumer_id: &str, group_name: &str) -> Result<(), RegistrationError> {
        let mut state = self.state.write();
        if !state.groups.contains_key(group_name) {
            return Err(RegistrationError::NoSuchConsumerGroup(group_name.to_string()));
        }
        let previous = {
            let consumer = state
                .consumers
                .get_mut(consumer_id)
                .ok_or_else(|| RegistrationError::NoSuchConsumer(consumer_id.to_string()))?;
            consumer.group.replace(group_name.to_string())
        };

        if let Some(previous) = previous {
            if let Some(group) = state.groups.get_mut(&previous) {
                group.consumers.remove(consumer_id);
            }
        }
        if let Some(group) = state.groups.get_mut(group_name) {
            group.consumers.insert(consumer_id.to_string());
        }
        Ok(())
    }

    fn add_registration_for(
        &self,
        consumer_id: &str,
        properties: BTreeMap<QName, String>,
    ) -> Result<Registration, RegistrationError> {
        let mut state = self.state.write();
        let consumer = state
            .consumers
            .get_mut(consumer_id)
            .ok_or_else(|| RegistrationError::NoSuchConsumer(consumer_id.to_string()))?;

        let registration = Registration::new(uuid::Uuid::new_v4().to_string(), consumer_id, properties);
        consumer.registrations.insert(registration.id.clone());
        state.registrations.insert(registration.id.clone(), registration.clone());
        Ok(registration)
    }

    fn get_registration(&self, id: &str) -> Option<Registration> {
        self.state.read().registrations.get(id).cloned()
    }

    fn get_registrations(&self) -> Vec<Registration> {
        let mut registrations: Vec<Registration> =
            self.state.read().registrations.values().cloned().collect();
        registrations.sort_by(|a, b| a.id.cmp(&b.id));
        registrations
    }

    fn save_registration(&self, registration: &Registration) -> Result<(), RegistrationError> {
        let mut state = self.state.write();
        if !state.registrations.contains_key(&registration.id) {
            return Err(RegistrationError::NoSuchRegistration(registration.id.clone()));
        }
        state.registrations.insert(registration.id.clone(), registration.clone());
        Ok(())
    }

    fn remove_registration(&self, id: &str) -> Result<Registration, RegistrationError> {
        let mut state = self.state.write();
        let registration = state
            .registrations
            .remove(id)
            .ok_or_else(|| RegistrationError::NoSuchRegistration(id.to_string()))?;
        if let Some(consumer) = state.consumers.get_mut(&registration.consumer_id) {
            consumer.registrations.remove(id);
        }
        Ok(registration)
    }

    fn get_registration_by_handle(&self, handle: &str) -> Option<Registration> {
        self.state
            .read()
            .registrations
            .values()
            .find(|r| r.handle == handle)
            .cloned()
    }
}
