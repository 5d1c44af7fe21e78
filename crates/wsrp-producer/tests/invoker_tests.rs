//! Portlet invoker tests: the container and the registration-checking
//! wrapper.

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Arc;

    use parking_lot::Mutex;
    use wsrp_producer::error::{PortletInvokerError, RegistrationError};
    use wsrp_producer::invoker::*;
    use wsrp_producer::registration::*;
    use wsrp_protocol::{PortletContext, PortletStateChange, PortletStatus, PropertyChange, PropertyDescription, PropertyMap, QName};

    /// Default policy that additionally denies a fixed set of handles.
    struct DenyingPolicy {
        inner: DefaultRegistrationPolicy,
        denied: BTreeSet<String>,
    }

    impl RegistrationPolicy for DenyingPolicy {
        fn validate_registration_data_for(
            &self,
            properties: &BTreeMap<QName, String>,
            consumer_identity: &str,
            expectations: &BTreeMap<QName, PropertyDescription>,
        ) -> Result<(), RegistrationError> {
            self.inner
                .validate_registration_data_for(properties, consumer_identity, expectations)
        }

        fn create_registration_handle_for(&self, registration_id: &str) -> String {
            self.inner.create_registration_handle_for(registration_id)
        }

        fn get_consumer_id_from(
            &self,
            consumer_name: &str,
            properties: &BTreeMap<QName, String>,
        ) -> Result<String, RegistrationError> {
            self.inner.get_consumer_id_from(consumer_name, properties)
        }

        fn validate_consumer_name(&self, consumer_name: &str) -> Result<(), RegistrationError> {
            self.inner.validate_consumer_name(consumer_name)
        }

        fn validate_consumer_group_name(&self, group_name: &str) -> Result<(), RegistrationError> {
            self.inner.validate_consumer_group_name(group_name)
        }

        fn get_automatic_group_name_for(&self, consumer_name: &str) -> Option<String> {
            self.inner.get_automatic_group_name_for(consumer_name)
        }

        fn allow_access_to(&self, portlet: &PortletContext, _registration: &Registration, _operation: &str) -> bool {
            !self.denied.contains(portlet.id())
        }
    }

    /// Container wrapper whose destroy_clones fails for chosen handles.
    struct StubbornContainer {
        inner: SimplePortletContainer,
        undestroyable: Mutex<BTreeSet<String>>,
        destroy_requests: Mutex<Vec<String>>,
    }

    impl PortletInvoker for StubbornContainer {
        fn get_portlet(&self, portlet: &PortletContext) -> Result<Portlet, PortletInvokerError> {
            self.inner.get_portlet(portlet)
        }

        fn get_portlets(&self) -> Result<Vec<Portlet>, PortletInvokerError> {
            self.inner.get_portlets()
        }

        fn get_status(&self, portlet: &PortletContext) -> Result<Option<PortletStatus>, PortletInvokerError> {
            self.inner.get_status(portlet)
        }

        fn invoke(&self, invocation: &PortletInvocation) -> Result<InvocationResponse, PortletInvokerError> {
            self.inner.invoke(invocation)
        }

        fn create_clone(&self, portlet: &PortletContext) -> Result<PortletContext, PortletInvokerError> {
            self.inner.create_clone(portlet)
        }

        fn destroy_clones(&self, portlets: &[PortletContext]) -> Result<Vec<DestroyCloneFailure>, PortletInvokerError> {
            let undestroyable = self.undestroyable.lock();
            let mut failures = Vec::new();
            let mut destroyable = Vec::new();
            for portlet in portlets {
                self.destroy_requests.lock().push(portlet.id().to_string());
                if undestroyable.contains(portlet.id()) {
                    failures.push(DestroyCloneFailure {
                        portlet_id: portlet.id().to_string(),
                        reason: "in use".into(),
                    });
                } else {
                    destroyable.push(portlet.clone());
                }
            }
            failures.extend(self.inner.destroy_clones(&destroyable)?);
            Ok(failures)
        }

        fn get_properties(
            &self,
            portlet: &PortletContext,
            names: Option<&[String]>,
        ) -> Result<PropertyMap, PortletInvokerError> {
            self.inner.get_properties(portlet, names)
        }

        fn set_properties(
            &self,
            portlet: &PortletContext,
            changes: &[PropertyChange],
        ) -> Result<PortletContext, PortletInvokerError> {
            self.inner.set_properties(portlet, changes)
        }

        fn export_portlet(&self, portlet: &PortletContext) -> Result<PortletContext, PortletInvokerError> {
            self.inner.export_portlet(portlet)
        }

        fn import_portlet(&self, exported: &PortletContext) -> Result<PortletContext, PortletInvokerError> {
            self.inner.import_portlet(exported)
        }
    }

    fn container() -> SimplePortletContainer {
        SimplePortletContainer::with_portlets([
            OfferedPortlet::new("weather", "Weather").with_preference("city", "Paris"),
            OfferedPortlet::new("news", "News").with_group("media"),
        ])
    }

    struct Fixture {
        manager: Arc<RegistrationManager>,
        invoker: Arc<RegistrationCheckingPortletInvoker>,
        registration: Registration,
    }

    fn fixture_with(policy: Arc<dyn RegistrationPolicy>, next: Arc<dyn PortletInvoker>) -> Fixture {
        let manager = Arc::new(RegistrationManager::new(Arc::new(InMemoryRegistrationStore::new()), policy));
        let invoker = RegistrationCheckingPortletInvoker::new(next, manager.clone());
        let registration = manager
            .add_registration_to("acme", BTreeMap::new(), &BTreeMap::new(), true)
            .unwrap();
        Fixture {
            manager,
            invoker,
            registration,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(DefaultRegistrationPolicy::new()), Arc::new(container()))
    }

    impl Fixture {
        fn current(&self) -> Registration {
            self.manager.get_registration(&self.registration.handle).unwrap()
        }
    }

    fn no_such_portlet(result: Result<impl std::fmt::Debug, PortletInvokerError>, id: &str) {
        match result {
            Err(PortletInvokerError::NoSuchPortlet(found)) => assert_eq!(found, id),
            other => panic!("expected NoSuchPortlet({id}), got {other:?}"),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Container
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn container_renders_offered_portlet() {
        let container = container();
        let response = container
            .invoke(&PortletInvocation::render(PortletContext::new("weather")))
            .unwrap();
        match response {
            InvocationResponse::Content { markup, mime_type, title } => {
                assert!(markup.contains("data-handle=\"weather\""));
                assert!(markup.contains("city=Paris"));
                assert_eq!(mime_type, "text/html");
                assert_eq!(title.as_deref(), Some("Weather"));
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn container_clone_before_write_leaves_offered_portlet_untouched() {
        let container = container();
        let mut form = BTreeMap::new();
        form.insert("pref.city".to_string(), vec!["Oslo".to_string()]);
        let response = container
            .invoke(&PortletInvocation::action(
                PortletContext::new("weather"),
                PortletStateChange::CloneBeforeWrite,
                form,
            ))
            .unwrap();

        let InvocationResponse::Update {
            new_context: Some(clone),
            ..
        } = response
        else {
            panic!("expected a clone");
        };
        assert_eq!(container.get_properties(&clone, None).unwrap()["city"], "Oslo");
        assert_eq!(
            container.get_properties(&PortletContext::new("weather"), None).unwrap()["city"],
            "Paris"
        );
    }

    #[test]
    fn container_read_only_write_requires_state_change() {
        let container = container();
        let mut form = BTreeMap::new();
        form.insert("pref.city".to_string(), vec!["Oslo".to_string()]);
        let result = container.invoke(&PortletInvocation::action(
            PortletContext::new("weather"),
            PortletStateChange::ReadOnly,
            form.clone(),
        ));
        assert!(matches!(result, Err(PortletInvokerError::StateChangeRequired(_))));

        let result = container.invoke(&PortletInvocation::action(
            PortletContext::new("weather"),
            PortletStateChange::ReadWrite,
            form,
        ));
        assert!(matches!(result, Err(PortletInvokerError::StateChangeRequired(_))));
    }

    #[test]
    fn container_set_properties_clones_offered_and_updates_clones_in_place() {
        let container = container();
        let changes = [PropertyChange::Update {
            name: "city".into(),
            value: "Rome".into(),
        }];
        let clone = container
            .set_properties(&PortletContext::new("weather"), &changes)
            .unwrap();
        assert_ne!(clone.id(), "weather");

        let same = container
            .set_properties(&clone, &[PropertyChange::Reset { name: "city".into() }])
            .unwrap();
        assert_eq!(same.id(), clone.id());
        assert_eq!(container.get_properties(&clone, None).unwrap()["city"], "Paris");
    }

    #[test]
    fn container_export_import_recreates_preferences() {
        let source = container();
        let clone = source
            .set_properties(
                &PortletContext::new("weather"),
                &[PropertyChange::Update {
                    name: "city".into(),
                    value: "Lima".into(),
                }],
            )
            .unwrap();
        let exported = source.export_portlet(&clone).unwrap();
        assert!(exported.state().is_some());

        let target = container();
        let imported = target.import_portlet(&exported).unwrap();
        assert_eq!(target.get_status(&imported).unwrap(), Some(PortletStatus::Cloned));
        assert_eq!(target.get_properties(&imported, None).unwrap()["city"], "Lima");
    }

    #[test]
    fn container_destroy_reports_offered_and_unknown_portlets() {
        let container = container();
        let clone = container.create_clone(&PortletContext::new("news")).unwrap();
        let failures = container
            .destroy_clones(&[clone.clone(), PortletContext::new("news"), PortletContext::new("ghost")])
            .unwrap();

        let failed: Vec<&str> = failures.iter().map(|f| f.portlet_id.as_str()).collect();
        assert_eq!(failed, vec!["news", "ghost"]);
        assert_eq!(container.get_status(&clone).unwrap(), None);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Access checks
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn without_registration_calls_pass_through() {
        let f = fixture();
        let other_clone = f.invoker.next().create_clone(&PortletContext::new("weather")).unwrap();
        let scope = f.invoker.for_registration(None);
        assert!(scope.get_portlet(&other_clone).is_ok());
    }

    #[test]
    fn registration_reaches_offered_portlets() {
        let f = fixture();
        let scope = f.invoker.for_registration(Some(f.registration.clone()));
        assert_eq!(scope.get_portlet(&PortletContext::new("weather")).unwrap().status, PortletStatus::Offered);
    }

    #[test]
    fn registration_cannot_reach_foreign_clones() {
        let f = fixture();
        let foreign = f.invoker.next().create_clone(&PortletContext::new("weather")).unwrap();
        let scope = f.invoker.for_registration(Some(f.registration.clone()));

        no_such_portlet(scope.get_portlet(&foreign), foreign.id());
        no_such_portlet(scope.get_properties(&foreign, None), foreign.id());
        no_such_portlet(scope.export_portlet(&foreign), foreign.id());
        assert_eq!(scope.get_status(&foreign).unwrap(), None);
    }

    #[test]
    fn denied_portlets_fail_for_every_operation() {
        let policy = Arc::new(DenyingPolicy {
            inner: DefaultRegistrationPolicy::new(),
            denied: BTreeSet::from(["weather".to_string()]),
        });
        let f = fixture_with(policy, Arc::new(container()));
        let scope = f.invoker.for_registration(Some(f.registration.clone()));
        let weather = PortletContext::new("weather");

        no_such_portlet(scope.get_portlet(&weather), "weather");
        no_such_portlet(scope.invoke(&PortletInvocation::render(weather.clone())), "weather");
        no_such_portlet(scope.create_clone(&weather), "weather");
        no_such_portlet(scope.destroy_clones(&[weather.clone()]), "weather");
        no_such_portlet(scope.get_properties(&weather, None), "weather");
        no_such_portlet(scope.set_properties(&weather, &[]), "weather");
        no_such_portlet(scope.export_portlet(&weather), "weather");

        let visible: Vec<String> = scope.get_portlets().unwrap().into_iter().map(|p| p.id().to_string()).collect();
        assert_eq!(visible, vec!["news"]);
    }

    #[test]
    fn clones_are_registered_with_the_registration() {
        let f = fixture();
        let scope = f.invoker.for_registration(Some(f.registration.clone()));
        let clone = scope.create_clone(&PortletContext::new("weather")).unwrap();

        assert!(f.current().knows(&clone));
        assert_eq!(scope.get_portlet(&clone).unwrap().status, PortletStatus::Cloned);
    }

    #[test]
    fn set_properties_with_new_id_registers_the_clone() {
        let f = fixture();
        let scope = f.invoker.for_registration(Some(f.registration.clone()));
        let clone = scope
            .set_properties(
                &PortletContext::new("weather"),
                &[PropertyChange::Update {
                    name: "city".into(),
                    value: "Kyiv".into(),
                }],
            )
            .unwrap();
        assert!(f.current().knows(&clone));
    }

    #[test]
    fn clone_before_write_interaction_registers_the_clone() {
        let f = fixture();
        let scope = f.invoker.for_registration(Some(f.registration.clone()));
        let mut form = BTreeMap::new();
        form.insert("pref.city".to_string(), vec!["Quito".to_string()]);
        let response = scope
            .invoke(&PortletInvocation::action(
                PortletContext::new("weather"),
                PortletStateChange::CloneBeforeWrite,
                form,
            ))
            .unwrap();

        let InvocationResponse::Update {
            new_context: Some(clone),
            ..
        } = response
        else {
            panic!("expected a clone");
        };
        assert!(f.current().knows(&clone));
    }

    #[test]
    fn imported_portlets_are_registered() {
        let f = fixture();
        let exported = f
            .invoker
            .next()
            .export_portlet(&PortletContext::new("weather"))
            .unwrap();
        let scope = f.invoker.for_registration(Some(f.registration.clone()));
        let imported = scope.import_portlet(&exported).unwrap();
        assert!(f.current().knows(&imported));
    }

    #[test]
    fn destroyed_clones_are_forgotten() {
        let f = fixture();
        let scope = f.invoker.for_registration(Some(f.registration.clone()));
        let clone = scope.create_clone(&PortletContext::new("news")).unwrap();

        let failures = scope.destroy_clones(&[clone.clone()]).unwrap();
        assert!(failures.is_empty());
        assert!(!f.current().knows(&clone));
    }

    #[test]
    fn get_portlets_prunes_stale_contexts() {
        let f = fixture();
        let scope = f.invoker.for_registration(Some(f.registration.clone()));
        let kept = scope.create_clone(&PortletContext::new("weather")).unwrap();
        let stale = scope.create_clone(&PortletContext::new("news")).unwrap();

        // Destroyed behind the registration's back.
        f.invoker.next().destroy_clones(&[stale.clone()]).unwrap();

        let ids: BTreeSet<String> = scope.get_portlets().unwrap().into_iter().map(|p| p.id().to_string()).collect();
        assert!(ids.contains("weather"));
        assert!(ids.contains("news"));
        assert!(ids.contains(kept.id()));
        assert!(!ids.contains(stale.id()));

        let registration = f.current();
        assert!(registration.knows(&kept));
        assert!(!registration.knows(&stale));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Registration destruction
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn registration_destruction_destroys_its_clones() {
        let f = fixture();
        let scope = f.invoker.for_registration(Some(f.registration.clone()));
        let first = scope.create_clone(&PortletContext::new("weather")).unwrap();
        let second = scope.create_clone(&PortletContext::new("news")).unwrap();

        f.manager.remove_registration(&f.registration.handle).unwrap();
        assert_eq!(f.invoker.next().get_status(&first).unwrap(), None);
        assert_eq!(f.invoker.next().get_status(&second).unwrap(), None);
        assert!(f.manager.get_registration(&f.registration.handle).is_none());
    }

    #[test]
    fn failed_clone_destruction_vetoes_registration_removal() {
        let stubborn = Arc::new(StubbornContainer {
            inner: container(),
            undestroyable: Mutex::new(BTreeSet::new()),
            destroy_requests: Mutex::new(Vec::new()),
        });
        let f = fixture_with(Arc::new(DefaultRegistrationPolicy::new()), stubborn.clone());
        let scope = f.invoker.for_registration(Some(f.registration.clone()));
        let first = scope.create_clone(&PortletContext::new("weather")).unwrap();
        let second = scope.create_clone(&PortletContext::new("news")).unwrap();
        stubborn.undestroyable.lock().insert(second.id().to_string());

        let err = f.manager.remove_registration(&f.registration.handle).unwrap_err();
        assert!(matches!(err, RegistrationError::DestructionVetoed { .. }));

        let requested: BTreeSet<String> = stubborn.destroy_requests.lock().iter().cloned().collect();
        assert_eq!(requested, BTreeSet::from([first.id().to_string(), second.id().to_string()]));

        let registration = f.current();
        assert!(registration.knows(&second));
        assert!(!registration.knows(&first));
    }
}
