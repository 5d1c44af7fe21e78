//! Migration records and consumer registry tests.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use wsrp_consumer::*;
    use wsrp_protocol::{
        ExportPortletsResponse, ExportedPortlet, FailedPortlets, ImportPortletsFailed, ImportPortletsResponse,
        ImportedPortlet, Lifetime, PortletContext, WSRPErrorCode,
    };

    fn export_at(time: i64, expiration: Option<i64>) -> ExportInfo {
        let portlets = BTreeMap::from([("p1".to_string(), vec![1, 2, 3])]);
        ExportInfo::new(time, expiration, b"ctx".to_vec(), portlets, BTreeMap::new())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Export / import records
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn export_info_from_response_sorts_handles_and_groups_errors() {
        let response = ExportPortletsResponse {
            export_context: b"ctx".to_vec(),
            exported_portlets: vec![
                ExportedPortlet {
                    portlet_handle: "zeta".into(),
                    export_data: vec![2],
                },
                ExportedPortlet {
                    portlet_handle: "alpha".into(),
                    export_data: vec![1],
                },
            ],
            failed_portlets: vec![
                FailedPortlets {
                    portlet_handles: vec!["ghost".into()],
                    error_code: WSRPErrorCode::InvalidHandle,
                    reason: None,
                },
                FailedPortlets {
                    portlet_handles: vec!["phantom".into()],
                    error_code: WSRPErrorCode::InvalidHandle,
                    reason: Some("gone".into()),
                },
            ],
            lifetime: Some(Lifetime {
                current_time: 100,
                termination_time: Some(500),
                refresh_duration: None,
            }),
        };

        let info = ExportInfo::from_response(100, &response);
        assert_eq!(info.export_time(), 100);
        assert_eq!(info.expiration_time(), Some(500));
        assert_eq!(info.exported_handles().collect::<Vec<_>>(), vec!["alpha", "zeta"]);
        assert_eq!(info.portlet_state("zeta"), Some(&[2u8][..]));

        let invalid = WSRPErrorCode::InvalidHandle.qname();
        assert_eq!(info.errors()[&invalid], vec!["ghost", "phantom"]);
        assert_eq!(info.error_for("phantom"), Some(&invalid));
        assert_eq!(info.error_for("alpha"), None);

        assert!(!info.is_expired_at(499));
        assert!(info.is_expired_at(500));
    }

    #[test]
    fn import_info_from_response() {
        let response = ImportPortletsResponse {
            import_results: vec![ImportedPortlet {
                import_id: "i1".into(),
                portlet_context: PortletContext::new("clone-1"),
            }],
            import_failures: vec![ImportPortletsFailed {
                import_ids: vec!["i2".into()],
                error_code: WSRPErrorCode::OperationFailed,
                reason: None,
            }],
        };
        let info = ImportInfo::from_response(7, &response);
        assert_eq!(info.import_time(), 7);
        assert_eq!(info.imported("i1").unwrap().id(), "clone-1");
        assert_eq!(info.errors()[&WSRPErrorCode::OperationFailed.qname()], vec!["i2"]);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Migration service
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn add_get_remove() {
        let service = InMemoryMigrationService::new();
        assert!(service.is_available_export_infos_empty());

        let info = export_at(1_000, None);
        service.add(info.clone()).unwrap();
        assert_eq!(service.get_export_info(1_000), Some(info.clone()));
        assert!(!service.is_available_export_infos_empty());

        assert_eq!(service.remove(&info), Some(info.clone()));
        assert_eq!(service.get_export_info(1_000), None);
        assert_eq!(service.remove(&info), None);
    }

    #[test]
    fn duplicate_export_time_is_rejected() {
        let service = InMemoryMigrationService::new();
        service.add(export_at(1_000, None)).unwrap();
        assert_eq!(
            service.add(export_at(1_000, Some(5))),
            Err(MigrationError::AlreadyExists(1_000))
        );
    }

    #[test]
    fn available_exports_are_sorted_by_time() {
        let service = InMemoryMigrationService::new();
        for time in [30, 10, 20] {
            service.add(export_at(time, None)).unwrap();
        }
        let times: Vec<i64> = service
            .get_available_export_infos()
            .iter()
            .map(ExportInfo::export_time)
            .collect();
        assert_eq!(times, vec![10, 20, 30]);
    }

    #[test]
    fn expired_exports_are_swept() {
        let service = InMemoryMigrationService::new();
        service.add(export_at(1, Some(100))).unwrap();
        service.add(export_at(2, Some(200))).unwrap();
        service.add(export_at(3, None)).unwrap();

        let removed = service.remove_expired(150);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].export_time(), 1);
        assert_eq!(service.get_available_export_infos().len(), 2);
        assert!(service.remove_expired(150).is_empty());
    }

    #[test]
    fn update_requires_recorded_export() {
        let service = InMemoryMigrationService::new();
        assert_eq!(
            service.update(export_at(1, None)),
            Err(MigrationError::NoSuchExport(1))
        );
        service.add(export_at(1, None)).unwrap();
        service.update(export_at(1, Some(9))).unwrap();
        assert_eq!(service.get_export_info(1).unwrap().expiration_time(), Some(9));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Consumer registry
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn registry_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(registry::CONSUMERS_CONFIG_FILE);

        let registry = ConsumerRegistry::open(&path).unwrap();
        assert!(registry.is_empty());
        registry
            .create_consumer("acme", "http://acme.test/wsrp", RegistrationInfo::new("portal"))
            .unwrap();
        registry.activate("acme").unwrap();

        let reopened = ConsumerRegistry::open(&path).unwrap();
        let info = reopened.get("acme").unwrap();
        assert!(info.active);
        assert_eq!(info.endpoint_url, "http://acme.test/wsrp");
        assert_eq!(info.registration.consumer_name, "portal");
    }

    #[test]
    fn registry_rejects_bad_producers() {
        let registry = ConsumerRegistry::in_memory();
        assert!(matches!(
            registry.create_consumer(" ", "http://a.test", RegistrationInfo::new("portal")),
            Err(RegistryError::InvalidProducer { .. })
        ));
        assert!(matches!(
            registry.create_consumer("a", "not a url", RegistrationInfo::new("portal")),
            Err(RegistryError::InvalidProducer { .. })
        ));

        registry
            .create_consumer("a", "http://a.test", RegistrationInfo::new("portal"))
            .unwrap();
        assert!(matches!(
            registry.create_consumer("a", "http://b.test", RegistrationInfo::new("portal")),
            Err(RegistryError::DuplicateProducer(id)) if id == "a"
        ));
        assert!(matches!(registry.activate("missing"), Err(RegistryError::NoSuchProducer(_))));
        assert!(matches!(registry.remove("missing"), Err(RegistryError::NoSuchProducer(_))));
    }

    #[test]
    fn registry_update_can_rename() {
        let registry = ConsumerRegistry::in_memory();
        let mut info = registry
            .create_consumer("old", "http://a.test", RegistrationInfo::new("portal"))
            .unwrap();
        registry
            .create_consumer("other", "http://b.test", RegistrationInfo::new("portal"))
            .unwrap();

        info.id = "other".into();
        assert!(matches!(
            registry.update("old", info.clone()),
            Err(RegistryError::DuplicateProducer(_))
        ));

        info.id = "new".into();
        registry.update("old", info).unwrap();
        assert!(registry.get("old").is_none());
        assert!(registry.get("new").is_some());

        let ids: Vec<String> = registry.list().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["new", "other"]);
        registry.deactivate("new").unwrap();
        assert_eq!(registry.remove("new").unwrap().id, "new");
        assert_eq!(registry.len(), 1);
    }
}
