//! Export encoding tests: byte layout, by value / by reference, lifetimes.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use wsrp_producer::error::ExportError;
    use wsrp_producer::export::data::{decode, encode_inline, encode_reference, read_header};
    use wsrp_producer::export::*;
    use wsrp_protocol::Lifetime;

    fn by_reference() -> (ExportManager, Arc<InMemoryExportStore>) {
        let store = Arc::new(InMemoryExportStore::new());
        (ExportManager::new(Some(store.clone())), store)
    }

    fn lifetime_until(termination: i64) -> Lifetime {
        Lifetime {
            current_time: 0,
            termination_time: Some(termination),
            refresh_duration: None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Byte layout
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn inline_portlet_data_layout() {
        let bytes = encode_inline(&ExportPortletData::new("p", vec![7, 8])).unwrap();

        let mut expected = vec![0x00, 0x02, b'P', b'D'];
        expected.extend_from_slice(&1.0f64.to_be_bytes());
        expected.extend_from_slice(&[0x00, 0x06]);
        expected.extend_from_slice(b"inline");
        expected.extend_from_slice(&[0x00, 0x01, b'p']);
        expected.extend_from_slice(&[0x00, 0x00, 0x00, 0x02, 7, 8]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn reference_header_has_no_payload() {
        let bytes = encode_reference::<ExportContext>("key-1").unwrap();
        let (header, rest) = read_header(&bytes).unwrap();
        assert_eq!(header.type_tag, "EC");
        assert_eq!(header.version, 1.0);
        assert_eq!(header.id, "key-1");
        assert!(!header.is_inline());
        assert!(rest.is_empty());
    }

    #[test]
    fn inline_id_cannot_be_a_reference() {
        assert!(encode_reference::<ExportContext>(INLINE_ID).is_err());
    }

    #[test]
    fn export_context_survives_encoding() {
        let mut context = ExportContext::new(1_700_000_000_000, true);
        context.termination_time = Some(1_700_000_360_000);
        context.portlet_handles = vec!["p1".into(), "p2".into()];

        let decoded = decode::<ExportContext>(&encode_inline(&context).unwrap()).unwrap();
        assert_eq!(decoded, Encoded::Inline(context));
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut bytes = encode_inline(&ExportPortletData::new("p", vec![1])).unwrap();
        // Version starts after the two length bytes and the two tag bytes.
        bytes[4..12].copy_from_slice(&2.0f64.to_be_bytes());

        match decode::<ExportPortletData>(&bytes) {
            Err(ExportError::VersionMismatch { type_tag, expected, found }) => {
                assert_eq!(type_tag, "PD");
                assert_eq!(expected, 1.0);
                assert_eq!(found, 2.0);
            }
            other => panic!("expected a version mismatch, got {other:?}"),
        }
    }

    #[test]
    fn unknown_and_unexpected_types_are_rejected() {
        let context = encode_inline(&ExportContext::new(1, true)).unwrap();
        assert!(matches!(
            decode::<ExportPortletData>(&context),
            Err(ExportError::UnexpectedType { .. })
        ));

        let mut unknown = context.clone();
        unknown[2] = b'Z';
        assert!(matches!(decode::<ExportContext>(&unknown), Err(ExportError::UnknownType(tag)) if tag == "ZC"));
    }

    #[test]
    fn truncated_payload_is_malformed() {
        let bytes = encode_inline(&ExportPortletData::new("portlet", vec![1, 2, 3])).unwrap();
        let truncated = &bytes[..bytes.len() - 2];
        assert!(matches!(decode::<ExportPortletData>(truncated), Err(ExportError::Malformed(_))));
        assert!(matches!(decode::<ExportPortletData>(&[]), Err(ExportError::Malformed(_))));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Export manager
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn without_persistence_exports_are_by_value() {
        let manager = ExportManager::new(None);
        let context = manager.create_export_context(false, Some(&lifetime_until(10)), 1).unwrap();
        assert!(context.export_by_value);
        assert_eq!(context.termination_time, None);
        assert_eq!(context.reference_id, None);

        let data = ExportPortletData::new("p1", b"state".to_vec());
        let encoded = manager.encode_portlet_data(&context, &data).unwrap();
        assert_eq!(manager.decode_portlet_data(&encoded).unwrap(), data);
    }

    #[test]
    fn by_value_required_bypasses_persistence() {
        let (manager, store) = by_reference();
        let context = manager.create_export_context(true, None, 1).unwrap();
        assert!(context.export_by_value);
        assert_eq!(store.context_count(), 0);
    }

    #[test]
    fn by_reference_round_trip() {
        let (manager, store) = by_reference();
        let mut context = manager
            .create_export_context(false, Some(&lifetime_until(5_000)), 1_000)
            .unwrap();
        assert!(!context.export_by_value);
        assert_eq!(context.termination_time, Some(5_000));

        let data = ExportPortletData::new("p1", b"state".to_vec());
        let encoded_data = manager.encode_portlet_data(&context, &data).unwrap();
        context.portlet_handles.push("p1".into());
        let encoded_context = manager.encode_export_context(&context).unwrap();

        let (header, _) = read_header(&encoded_data).unwrap();
        assert!(!header.is_inline());
        assert_eq!(store.context_count(), 1);

        let decoded = manager.decode_export_context(&encoded_context).unwrap();
        assert_eq!(decoded.portlet_handles, vec!["p1"]);
        assert_eq!(decoded.reference_id, context.reference_id);
        assert_eq!(manager.decode_portlet_data(&encoded_data).unwrap(), data);
    }

    #[test]
    fn reference_without_persistence_manager_fails() {
        let (manager, _) = by_reference();
        let context = manager.create_export_context(false, None, 1).unwrap();
        let encoded = manager.encode_export_context(&context).unwrap();

        let plain = ExportManager::new(None);
        assert!(matches!(
            plain.decode_export_context(&encoded),
            Err(ExportError::MissingPersistenceManager(_))
        ));
    }

    #[test]
    fn released_exports_are_gone() {
        let (manager, store) = by_reference();
        let context = manager.create_export_context(false, None, 1).unwrap();
        let data = manager
            .encode_portlet_data(&context, &ExportPortletData::new("p1", vec![1]))
            .unwrap();
        let encoded = manager.encode_export_context(&context).unwrap();

        manager.release_export(&encoded).unwrap();
        assert_eq!(store.context_count(), 0);
        assert!(matches!(manager.decode_export_context(&encoded), Err(ExportError::NoSuchExport(_))));
        assert!(matches!(manager.decode_portlet_data(&data), Err(ExportError::NoSuchExport(_))));
    }

    #[test]
    fn releasing_by_value_export_is_a_no_op() {
        let manager = ExportManager::new(None);
        let context = manager.create_export_context(false, None, 1).unwrap();
        let encoded = manager.encode_export_context(&context).unwrap();
        assert!(manager.release_export(&encoded).is_ok());
    }

    #[test]
    fn export_lifetime_can_be_extended_until_expiry() {
        let (manager, _) = by_reference();
        let context = manager
            .create_export_context(false, Some(&lifetime_until(2_000)), 1_000)
            .unwrap();
        let encoded = manager.encode_export_context(&context).unwrap();

        let updated = manager
            .set_export_lifetime(&encoded, Some(&lifetime_until(9_000)), 1_500)
            .unwrap()
            .unwrap();
        assert_eq!(updated.current_time, 1_500);
        assert_eq!(updated.termination_time, Some(9_000));

        let decoded = manager.decode_export_context(&encoded).unwrap();
        assert!(manager.check_validity(&decoded, 8_999).is_ok());
        assert!(matches!(manager.check_validity(&decoded, 9_000), Err(ExportError::Expired(9_000))));
        assert!(matches!(
            manager.set_export_lifetime(&encoded, None, 9_500),
            Err(ExportError::Expired(_))
        ));
    }

    #[test]
    fn by_value_exports_have_no_lifetime() {
        let manager = ExportManager::new(None);
        let context = manager.create_export_context(false, None, 1).unwrap();
        let encoded = manager.encode_export_context(&context).unwrap();
        assert_eq!(manager.set_export_lifetime(&encoded, Some(&lifetime_until(5)), 2).unwrap(), None);
    }
}
