#[cfg(test)]
mod tests {
    use reportkit::filter::{FilterCriteria, RawQuery};
    use reportkit::store::{SiteSession, Store, StoreError, WizardState, UNTITLED_REPORT};

    fn state(columns: &[&str]) -> WizardState {
        WizardState {
            filter_criteria: Some(FilterCriteria::new().with("status", "paid")),
            filter_query: Some(RawQuery::new().with("status", "paid")),
            columns: Some(columns.iter().map(|c| c.to_string()).collect()),
        }
    }

    fn relations(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reports_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.db");

        let id = {
            let store = Store::open(&path).unwrap();
            let report = store
                .save_report(None, false, "orders", &state(&["id"]), "alice")
                .unwrap();
            store
                .update_report_details(&report.id, "orders", "alice", "Paid orders", None)
                .unwrap();
            report.id
        };

        let store = Store::open(&path).unwrap();
        let report = store.get_report(&id, "orders").unwrap();
        assert_eq!(report.display_name(), "Paid orders");
        assert_eq!(report.data, state(&["id"]));
        assert_eq!(report.added_by, "alice");
    }

    #[test]
    fn test_session_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.db");

        {
            let store = Store::open(&path).unwrap();
            SiteSession::new(&store, "s1", "orders")
                .store_state(&state(&["total"]))
                .unwrap();
        }

        let store = Store::open(&path).unwrap();
        let loaded = SiteSession::new(&store, "s1", "orders").load_state().unwrap();
        assert_eq!(loaded, state(&["total"]));
        assert_eq!(store.clear_sessions().unwrap(), 3);
        assert_eq!(
            SiteSession::new(&store, "s1", "orders").load_state().unwrap(),
            WizardState::default()
        );
    }

    #[test]
    fn test_list_reports_scoped_and_newest_first() {
        let store = Store::open_in_memory().unwrap();
        let first = store
            .save_report(None, false, "orders", &state(&["id"]), "alice")
            .unwrap();
        let second = store
            .save_report(None, false, "orders", &state(&["total"]), "alice")
            .unwrap();
        store
            .save_report(None, false, "orders", &state(&["id"]), "bob")
            .unwrap();
        store
            .save_report(None, false, "people", &state(&["id"]), "alice")
            .unwrap();

        let listed: Vec<String> = store
            .list_reports("orders", "alice")
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(listed, vec![second.id, first.id]);
        assert!(store.list_reports("orders", "carol").unwrap().is_empty());
    }

    #[test]
    fn test_untitled_reports_have_display_name() {
        let store = Store::open_in_memory().unwrap();
        let report = store
            .save_report(None, false, "orders", &WizardState::default(), "alice")
            .unwrap();
        assert_eq!(report.name, None);
        assert_eq!(report.display_name(), UNTITLED_REPORT);
    }

    #[test]
    fn test_update_details_requires_owner() {
        let store = Store::open_in_memory().unwrap();
        let report = store
            .save_report(None, false, "orders", &WizardState::default(), "alice")
            .unwrap();

        let err = store
            .update_report_details(&report.id, "orders", "bob", "Mine now", None)
            .unwrap_err();
        assert!(matches!(err, StoreError::PermissionDenied { .. }));
        assert_eq!(store.get_report(&report.id, "orders").unwrap().name, None);
    }

    #[test]
    fn test_delete_unknown_report_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let err = store.delete_report("nope", "orders", "alice").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn test_registration_never_overwrites_names() {
        let store = Store::open_in_memory().unwrap();

        let created = store
            .register_columns("orders", "Orders", &relations(&["customer__city", "total"]))
            .unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].relation, "customer.city");
        assert_eq!(created[0].human_name, "Orders :: customer :: city");

        assert!(store
            .rename_column("orders", "customer.city", "City")
            .unwrap());

        let again = store
            .register_columns("orders", "Orders", &relations(&["customer.city", "status"]))
            .unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].relation, "status");

        let listed: Vec<(String, String)> = store
            .list_columns("orders")
            .unwrap()
            .into_iter()
            .map(|c| (c.relation, c.human_name))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("total".to_string(), "Orders :: total".to_string()),
                ("status".to_string(), "Orders :: status".to_string()),
                ("customer.city".to_string(), "City".to_string()),
            ]
        );
    }

    #[test]
    fn test_invalid_relation_registers_nothing() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .register_columns("orders", "Orders", &relations(&["total", "bad relation"]))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRelation(r) if r == "bad relation"));
        assert!(store.list_columns("orders").unwrap().is_empty());
    }

    #[test]
    fn test_version_mismatch_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.db");

        {
            let store = Store::open(&path).unwrap();
            store
                .save_report(None, false, "orders", &WizardState::default(), "alice")
                .unwrap();
        }
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute("UPDATE meta SET value = '7' WHERE key = 'version'", [])
                .unwrap();
        }

        match Store::open(&path) {
            Err(StoreError::VersionMismatch { found, expected }) => {
                assert_eq!(found, 7);
                assert_eq!(expected, 1);
            }
            other => panic!("expected version mismatch, got {:?}", other.map(|_| ())),
        }

        let conn = rusqlite::Connection::open(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    /// Two connections on one database: ownership is checked against what
    /// each connection reads at the time, and the later write wins.
    #[test]
    fn test_two_connections_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.db");
        let a = Store::open(&path).unwrap();
        let b = Store::open(&path).unwrap();

        let report = a
            .save_report(None, false, "orders", &state(&["id"]), "alice")
            .unwrap();

        a.save_report(Some(&report.id), false, "orders", &state(&["total"]), "alice")
            .unwrap();
        b.save_report(Some(&report.id), false, "orders", &state(&["status"]), "alice")
            .unwrap();

        assert_eq!(
            a.recall_report(&report.id, "orders").unwrap(),
            state(&["status"])
        );

        b.delete_report(&report.id, "orders", "alice").unwrap();
        let err = a
            .save_report(Some(&report.id), false, "orders", &state(&["id"]), "alice")
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
