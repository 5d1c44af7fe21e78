//! Registration subsystem tests: policy, manager, stores, SQLite bridge.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use wsrp_producer::error::RegistrationError;
    use wsrp_producer::registration::*;
    use wsrp_protocol::{PropertyDescription, QName};

    fn prop(local: &str) -> QName {
        QName::new("urn:test", local)
    }

    fn expectations(names: &[&str]) -> BTreeMap<QName, PropertyDescription> {
        names
            .iter()
            .map(|n| (prop(n), PropertyDescription::new(prop(n))))
            .collect()
    }

    fn properties(pairs: &[(&str, &str)]) -> BTreeMap<QName, String> {
        pairs.iter().map(|(k, v)| (prop(k), v.to_string())).collect()
    }

    fn manager() -> RegistrationManager {
        RegistrationManager::new(
            Arc::new(InMemoryRegistrationStore::new()),
            Arc::new(DefaultRegistrationPolicy::new()),
        )
    }

    /// Records every registration it is asked about and answers with `vote`.
    struct RecordingListener {
        vote: Vote,
        seen: Mutex<Vec<String>>,
    }

    impl RegistrationDestructionListener for RecordingListener {
        fn on_registration_destruction(&self, registration: &Registration) -> Vote {
            self.seen.lock().push(registration.handle.clone());
            self.vote.clone()
        }
    }

    /// In-memory store whose registration updates always fail.
    #[derive(Default)]
    struct ReadOnlyRegistrations {
        inner: InMemoryRegistrationStore,
    }

    impl RegistrationPersistenceManager for ReadOnlyRegistrations {
        fn create_consumer(&self, id: &str, name: &str) -> Result<Consumer, RegistrationError> {
            self.inner.create_consumer(id, name)
        }
        fn get_consumer_by_id(&self, id: &str) -> Option<Consumer> {
            self.inner.get_consumer_by_id(id)
        }
        fn get_consumers(&self) -> Vec<Consumer> {
            self.inner.get_consumers()
        }
        fn save_consumer(&self, consumer: &Consumer) -> Result<(), RegistrationError> {
            self.inner.save_consumer(consumer)
        }
        fn remove_consumer(&self, id: &str) -> Result<Consumer, RegistrationError> {
            self.inner.remove_consumer(id)
        }
        fn create_consumer_group(&self, name: &str) -> Result<ConsumerGroup, RegistrationError> {
            self.inner.create_consumer_group(name)
        }
        fn get_consumer_group(&self, name: &str) -> Option<ConsumerGroup> {
            self.inner.get_consumer_group(name)
        }
        fn get_consumer_groups(&self) -> Vec<ConsumerGroup> {
            self.inner.get_consumer_groups()
        }
        fn save_consumer_group(&self, group: &ConsumerGroup) -> Result<(), RegistrationError> {
            self.inner.save_consumer_group(group)
        }
        fn remove_consumer_group(&self, name: &str) -> Result<ConsumerGroup, RegistrationError> {
            self.inner.remove_consumer_group(name)
        }
        fn add_consumer_to_group_named(&self, consumer_id: &str, group_name: &str) -> Result<(), RegistrationError> {
            self.inner.add_consumer_to_group_named(consumer_id, group_name)
        }
        fn add_registration_for(
            &self,
            consumer_id: &str,
            properties: BTreeMap<QName, String>,
        ) -> Result<Registration, RegistrationError> {
            self.inner.add_registration_for(consumer_id, properties)
        }
        fn get_registration(&self, id: &str) -> Option<Registration> {
            self.inner.get_registration(id)
        }
        fn get_registrations(&self) -> Vec<Registration> {
            self.inner.get_registrations()
        }
        fn save_registration(&self, registration: &Registration) -> Result<(), RegistrationError> {
            Err(RegistrationError::IllegalArgument(format!("cannot save {}", registration.id)))
        }
        fn remove_registration(&self, id: &str) -> Result<Registration, RegistrationError> {
            self.inner.remove_registration(id)
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Policy
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn default_policy_accepts_exact_properties() {
        let policy = DefaultRegistrationPolicy::new();
        let result = policy.validate_registration_data_for(
            &properties(&[("email", "a@b.c")]),
            "acme",
            &expectations(&["email"]),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn default_policy_rejects_missing_property() {
        let policy = DefaultRegistrationPolicy::new();
        let err = policy
            .validate_registration_data_for(&BTreeMap::new(), "acme", &expectations(&["email"]))
            .unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidConsumerData(_)));
        assert!(err.to_string().contains("email"));
    }

    #[test]
    fn default_policy_rejects_unknown_and_empty_properties() {
        let policy = DefaultRegistrationPolicy::new();
        let unknown = policy.validate_registration_data_for(
            &properties(&[("email", "x"), ("shoe", "42")]),
            "acme",
            &expectations(&["email"]),
        );
        assert!(matches!(unknown, Err(RegistrationError::InvalidConsumerData(_))));

        let empty = policy.validate_registration_data_for(
            &properties(&[("email", "  ")]),
            "acme",
            &expectations(&["email"]),
        );
        assert!(matches!(empty, Err(RegistrationError::InvalidConsumerData(_))));
    }

    #[test]
    fn default_policy_derives_identity_from_name() {
        let policy = DefaultRegistrationPolicy::new();
        assert_eq!(policy.get_consumer_id_from("  Acme Portal ", &BTreeMap::new()).unwrap(), "Acme Portal");
        assert!(policy.get_consumer_id_from("   ", &BTreeMap::new()).is_err());
        assert_eq!(policy.create_registration_handle_for("reg-1"), "reg-1");
    }

    #[test]
    fn policy_registry_builds_named_policies() {
        let registry = PolicyRegistry::with_defaults();
        assert_eq!(registry.names(), vec![DEFAULT_POLICY]);

        let mut config = PolicyConfig::default();
        config.options.insert("automaticGroup".into(), "everyone".into());
        let policy = registry.create(&config).unwrap();
        assert_eq!(policy.get_automatic_group_name_for("acme").as_deref(), Some("everyone"));

        let unknown = PolicyConfig {
            name: "ldap".into(),
            options: BTreeMap::new(),
        };
        assert!(matches!(registry.create(&unknown), Err(RegistrationError::IllegalArgument(_))));
    }

    #[test]
    fn policy_registry_accepts_custom_factories() {
        let mut registry = PolicyRegistry::empty();
        registry.register("grouped", |_| Arc::new(DefaultRegistrationPolicy::with_automatic_group("g")));
        let config = PolicyConfig {
            name: "grouped".into(),
            options: BTreeMap::new(),
        };
        let policy = registry.create(&config).unwrap();
        assert_eq!(policy.get_automatic_group_name_for("x").as_deref(), Some("g"));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Manager
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn add_registration_creates_consumer_and_valid_registration() {
        let manager = manager();
        let registration = manager
            .add_registration_to("acme", properties(&[("email", "a@b.c")]), &expectations(&["email"]), true)
            .unwrap();

        assert_eq!(registration.status, RegistrationStatus::Valid);
        assert_eq!(registration.handle, registration.id);
        assert_eq!(manager.get_registration(&registration.handle), Some(registration.clone()));

        let consumer = manager.get_consumer_for(&registration.handle).unwrap();
        assert_eq!(consumer.id, "acme");
        assert_eq!(consumer.status, RegistrationStatus::Valid);
        assert!(consumer.registrations.contains(&registration.id));
    }

    #[test]
    fn add_registration_without_consumer_creation_fails() {
        let manager = manager();
        let result = manager.add_registration_to("ghost", BTreeMap::new(), &BTreeMap::new(), false);
        assert!(matches!(result, Err(RegistrationError::NoSuchConsumer(id)) if id == "ghost"));
    }

    #[test]
    fn add_registration_with_missing_property_fails() {
        let manager = manager();
        let result = manager.add_registration_to("acme", BTreeMap::new(), &expectations(&["email"]), true);
        assert!(matches!(result, Err(RegistrationError::InvalidConsumerData(_))));
        assert!(manager.get_consumers().is_empty());
    }

    #[test]
    fn concurrent_first_registrations_share_one_consumer() {
        let manager = manager();
        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        manager.add_registration_to(
                            "acme",
                            properties(&[("email", "a@b.c")]),
                            &expectations(&["email"]),
                            true,
                        )
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.iter().all(Result::is_ok));
        let consumers = manager.get_consumers();
        assert_eq!(consumers.len(), 1);
        assert_eq!(consumers[0].registrations.len(), 8);
    }

    #[test]
    fn unsaved_registration_is_removed() {
        let store = Arc::new(ReadOnlyRegistrations::default());
        let manager = RegistrationManager::new(store.clone(), Arc::new(DefaultRegistrationPolicy::new()));

        let result = manager.add_registration_to("acme", BTreeMap::new(), &BTreeMap::new(), true);
        assert!(matches!(result, Err(RegistrationError::IllegalArgument(_))));
        assert!(store.get_registrations().is_empty());
        assert!(store.get_consumer_by_id("acme").unwrap().registrations.is_empty());
    }

    #[test]
    fn modify_registration_replaces_properties_and_revalidates() {
        let manager = manager();
        let registration = manager
            .add_registration_to("acme", properties(&[("email", "old")]), &expectations(&["email"]), true)
            .unwrap();
        manager.mark_registrations_pending().unwrap();
        assert_eq!(
            manager.get_registration(&registration.handle).unwrap().status,
            RegistrationStatus::Pending
        );

        let modified = manager
            .modify_registration(&registration.handle, properties(&[("email", "new")]), &expectations(&["email"]))
            .unwrap();
        assert_eq!(modified.status, RegistrationStatus::Valid);
        assert_eq!(modified.properties.get(&prop("email")).map(String::as_str), Some("new"));
    }

    #[test]
    fn modify_unknown_registration_fails() {
        let manager = manager();
        let result = manager.modify_registration("nope", BTreeMap::new(), &BTreeMap::new());
        assert!(matches!(result, Err(RegistrationError::NoSuchRegistration(_))));
    }

    #[test]
    fn remove_registration_consults_listeners() {
        let manager = manager();
        let accepting = Arc::new(RecordingListener {
            vote: Vote::Accept,
            seen: Mutex::new(Vec::new()),
        });
        let listener: Arc<dyn RegistrationDestructionListener> = accepting.clone();
        manager.add_destruction_listener(&listener);

        let registration = manager.add_registration_to("acme", BTreeMap::new(), &BTreeMap::new(), true).unwrap();
        manager.remove_registration(&registration.handle).unwrap();

        assert_eq!(accepting.seen.lock().as_slice(), &[registration.handle.clone()]);
        assert!(manager.get_registration(&registration.handle).is_none());
        assert!(manager.get_consumer_by_identity("acme").unwrap().registrations.is_empty());
    }

    #[test]
    fn negative_vote_keeps_registration() {
        let manager = manager();
        let listener: Arc<dyn RegistrationDestructionListener> = Arc::new(RecordingListener {
            vote: Vote::Reject("clones still in use".into()),
            seen: Mutex::new(Vec::new()),
        });
        manager.add_destruction_listener(&listener);

        let registration = manager.add_registration_to("acme", BTreeMap::new(), &BTreeMap::new(), true).unwrap();
        let err = manager.remove_registration(&registration.handle).unwrap_err();

        assert!(matches!(err, RegistrationError::DestructionVetoed { ref reason, .. } if reason == "clones still in use"));
        assert!(manager.get_registration(&registration.handle).is_some());
    }

    #[test]
    fn dropped_listeners_are_ignored() {
        let manager = manager();
        {
            let listener: Arc<dyn RegistrationDestructionListener> = Arc::new(RecordingListener {
                vote: Vote::Reject("gone".into()),
                seen: Mutex::new(Vec::new()),
            });
            manager.add_destruction_listener(&listener);
        }
        let registration = manager.add_registration_to("acme", BTreeMap::new(), &BTreeMap::new(), true).unwrap();
        assert!(manager.remove_registration(&registration.handle).is_ok());
    }

    #[test]
    fn portlet_contexts_are_tracked_per_registration() {
        let manager = manager();
        let registration = manager.add_registration_to("acme", BTreeMap::new(), &BTreeMap::new(), true).unwrap();
        let clone = wsrp_protocol::PortletContext::new("clone-1");

        manager.add_portlet_context(&registration.id, &clone).unwrap();
        assert!(manager.get_registration(&registration.handle).unwrap().knows(&clone));

        manager.remove_portlet_context(&registration.id, &clone).unwrap();
        assert!(!manager.get_registration(&registration.handle).unwrap().knows(&clone));
    }

    #[test]
    fn automatic_group_is_applied_to_new_consumers() {
        let manager = RegistrationManager::new(
            Arc::new(InMemoryRegistrationStore::new()),
            Arc::new(DefaultRegistrationPolicy::with_automatic_group("partners")),
        );
        let consumer = manager.create_consumer("acme").unwrap();
        assert_eq!(consumer.group.as_deref(), Some("partners"));

        let group = manager.get_consumer_group("partners").unwrap();
        assert!(group.consumers.contains("acme"));
    }

    #[test]
    fn duplicate_consumer_is_rejected() {
        let manager = manager();
        manager.create_consumer("acme").unwrap();
        assert!(matches!(manager.create_consumer("acme"), Err(RegistrationError::DuplicateConsumer(_))));
    }

    #[test]
    fn remove_consumer_cascades_to_registrations() {
        let manager = manager();
        let first = manager.add_registration_to("acme", BTreeMap::new(), &BTreeMap::new(), true).unwrap();
        let second = manager.add_registration_to("acme", BTreeMap::new(), &BTreeMap::new(), true).unwrap();

        manager.remove_consumer("acme").unwrap();
        assert!(manager.get_registration(&first.handle).is_none());
        assert!(manager.get_registration(&second.handle).is_none());
        assert!(manager.get_consumer_by_identity("acme").is_none());
    }

    #[test]
    fn remove_consumer_group_removes_members() {
        let manager = manager();
        manager.create_consumer_group("partners").unwrap();
        manager.create_consumer("acme").unwrap();
        manager.add_consumer_to_group_named("acme", "partners", false).unwrap();

        manager.remove_consumer_group("partners").unwrap();
        assert!(manager.get_consumer_groups().is_empty());
        assert!(manager.get_consumer_by_identity("acme").is_none());
    }

    #[test]
    fn joining_missing_group_requires_creation_flag() {
        let manager = manager();
        manager.create_consumer("acme").unwrap();
        assert!(matches!(
            manager.add_consumer_to_group_named("acme", "partners", false),
            Err(RegistrationError::NoSuchConsumerGroup(_))
        ));
        manager.add_consumer_to_group_named("acme", "partners", true).unwrap();
        assert_eq!(manager.get_consumer_by_identity("acme").unwrap().group.as_deref(), Some("partners"));
    }

    #[test]
    fn moving_consumer_between_groups_updates_both() {
        let manager = manager();
        manager.create_consumer("acme").unwrap();
        manager.add_consumer_to_group_named("acme", "a", true).unwrap();
        manager.add_consumer_to_group_named("acme", "b", true).unwrap();

        assert!(!manager.get_consumer_group("a").unwrap().consumers.contains("acme"));
        assert!(manager.get_consumer_group("b").unwrap().consumers.contains("acme"));
    }

    // ─────────────────────────────────────────────────────────────────────
    // SQLite bridge
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn persistent_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registrations.db");

        let handle = {
            let store = Arc::new(PersistentRegistrationStore::open(&path).unwrap());
            let manager = RegistrationManager::new(store.clone(), Arc::new(DefaultRegistrationPolicy::new()));
            manager.create_consumer_group("partners").unwrap();
            let registration = manager
                .add_registration_to("acme", properties(&[("email", "a@b.c")]), &expectations(&["email"]), true)
                .unwrap();
            manager.add_consumer_to_group_named("acme", "partners", false).unwrap();
            manager
                .add_portlet_context(&registration.id, &wsrp_protocol::PortletContext::new("clone-1"))
                .unwrap();
            assert_eq!(store.persisted_registration_count().unwrap(), 1);
            registration.handle
        };

        let reopened = PersistentRegistrationStore::open(&path).unwrap();
        let registration = reopened.get_registration_by_handle(&handle).unwrap();
        assert_eq!(registration.status, RegistrationStatus::Valid);
        assert_eq!(registration.properties.get(&prop("email")).map(String::as_str), Some("a@b.c"));
        assert!(registration.known_portlet_handles.contains("clone-1"));

        let consumer = reopened.get_consumer_by_id("acme").unwrap();
        assert_eq!(consumer.group.as_deref(), Some("partners"));
        assert!(consumer.registrations.contains(&registration.id));
        assert!(reopened.get_consumer_group("partners").unwrap().consumers.contains("acme"));
    }

    #[test]
    fn persistent_store_removal_cascades_in_database() {
        let store = PersistentRegistrationStore::open_in_memory().unwrap();
        store.create_consumer("acme", "acme").unwrap();
        store.add_registration_for("acme", BTreeMap::new()).unwrap();
        assert_eq!(store.persisted_registration_count().unwrap(), 1);

        store.remove_consumer("acme").unwrap();
        assert_eq!(store.persisted_registration_count().unwrap(), 0);
        assert!(store.get_registrations().is_empty());
    }

    #[test]
    fn failed_persistence_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registrations.db");
        let store = PersistentRegistrationStore::open(&path).unwrap();
        store.create_consumer("acme", "acme").unwrap();

        let other = rusqlite::Connection::open(&path).unwrap();
        other.execute_batch("DROP TABLE registrations;").unwrap();

        let err = store.add_registration_for("acme", BTreeMap::new()).unwrap_err();
        assert!(matches!(err, RegistrationError::Persistence(_)));
        assert!(store.get_registrations().is_empty());
        assert!(store.get_consumer_by_id("acme").unwrap().registrations.is_empty());
    }

    #[test]
    fn in_memory_store_keeps_relations_consistent() {
        let store = InMemoryRegistrationStore::new();
        store.create_consumer("acme", "Acme").unwrap();
        let registration = store.add_registration_for("acme", BTreeMap::new()).unwrap();
        assert!(store.get_consumer_by_id("acme").unwrap().registrations.contains(&registration.id));

        store.remove_registration(&registration.id).unwrap();
        assert!(store.get_consumer_by_id("acme").unwrap().registrations.is_empty());
        assert!(matches!(
            store.remove_registration(&registration.id),
            Err(RegistrationError::NoSuchRegistration(_))
        ));
    }
}
