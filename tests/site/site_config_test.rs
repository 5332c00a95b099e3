#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use reportkit::config::{Settings, SettingsError};
    use reportkit::filter::{FieldSetError, Lookup, RawQuery};
    use reportkit::record::Value;
    use reportkit::site::{SiteConfigError, SiteRegistry};

    const ORDERS_JSON: &str = r#"[
        {"id": 1, "status": "paid", "subtotal": 100, "shipping": 5.5, "customer": {"first": "Ada", "last": "Lovelace"}},
        {"id": 2, "status": "open", "subtotal": 40, "shipping": 0, "customer": {"first": "Grace", "last": "Hopper"}}
    ]"#;

    fn write(dir: &Path, name: &str, content: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path.display().to_string()
    }

    fn settings_from(dir: &Path, toml: &str) -> Settings {
        let config = write(dir, "reportkit.toml", toml);
        Settings::from_file(config).unwrap()
    }

    #[test]
    fn test_registry_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let data = write(dir.path(), "orders.json", ORDERS_JSON);
        let settings = settings_from(
            dir.path(),
            &format!(
                r#"
[results]
per_page = 10

[sites.orders]
name = "Orders"
data = '{data}'
display_field_exclusions = ["shipping"]

[[sites.orders.filters]]
name = "status"
kind = "choice"
choices = ["paid", "open"]

[[sites.orders.filters]]
name = "min_subtotal"
path = "subtotal"
kind = "integer"
lookup = "gte"

[[sites.orders.fieldsets]]
title = "Order"
fields = ["status", "min_subtotal"]

[[sites.orders.computed]]
name = "customer_name"
label = "Customer"
kind = "concat"
fields = ["customer.first", "customer.last"]

[[sites.orders.computed]]
name = "grand_total"
kind = "sum"
fields = ["subtotal", "shipping"]
"#
            ),
        );

        let registry = SiteRegistry::from_settings(&settings).unwrap();
        assert_eq!(registry.labels().collect::<Vec<_>>(), vec!["orders"]);

        let site = registry.get("orders").unwrap();
        assert_eq!(site.name(), "Orders");
        assert_eq!(site.per_page(), 10);
        assert_eq!(site.base_collection().len(), 2);
        assert_eq!(site.layout().groups()[0].title.as_deref(), Some("Order"));
        assert_eq!(site.filters().field("min_subtotal").unwrap().lookup, Lookup::Gte);
        assert_eq!(site.column_exclusions(), ["shipping".to_string()]);

        let schema = site.schema();
        assert!(schema.has_attribute("customer__last"));
        assert_eq!(
            schema.computed("customer_name").unwrap().label.as_deref(),
            Some("Customer")
        );

        let first = &site.base_collection().into_records()[0];
        assert_eq!(
            schema.computed("customer_name").unwrap().call(first),
            Value::from("Ada Lovelace")
        );
        assert_eq!(
            schema.computed("grand_total").unwrap().call(first),
            Value::Float(105.5)
        );

        let criteria = site
            .filters()
            .clean(&RawQuery::new().with("min_subtotal", "50"))
            .unwrap();
        assert_eq!(criteria.get("min_subtotal"), Some(&Value::Int(50)));
    }

    #[test]
    fn test_site_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let data = write(dir.path(), "orders.json", ORDERS_JSON);
        let settings = settings_from(
            dir.path(),
            &format!(
                r#"
[sites.orders]
data = '{data}'
attributes = ["id", "status"]

[[sites.orders.filters]]
name = "status"
"#
            ),
        );

        let registry = SiteRegistry::from_settings(&settings).unwrap();
        let site = registry.get("orders").unwrap();
        assert_eq!(site.name(), "orders");
        assert_eq!(site.per_page(), 25);
        assert_eq!(site.layout().groups().len(), 1);
        assert_eq!(site.layout().groups()[0].title, None);
        assert_eq!(
            site.schema().attributes().collect::<Vec<_>>(),
            vec!["id", "status"]
        );
        assert!(registry.get("people").is_none());
    }

    #[test]
    fn test_fieldset_missing_a_field_fails_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let data = write(dir.path(), "orders.json", ORDERS_JSON);
        let settings = settings_from(
            dir.path(),
            &format!(
                r#"
[sites.orders]
data = '{data}'

[[sites.orders.filters]]
name = "status"

[[sites.orders.filters]]
name = "id"
kind = "integer"

[[sites.orders.fieldsets]]
fields = ["status"]
"#
            ),
        );

        match SiteRegistry::from_settings(&settings) {
            Err(SiteConfigError::FieldSet { site, source }) => {
                assert_eq!(site, "orders");
                assert_eq!(source, FieldSetError::Unaccounted("id".into()));
            }
            other => panic!("expected fieldset error, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_unknown_display_field_inclusion_fails_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let data = write(dir.path(), "orders.json", ORDERS_JSON);
        let settings = settings_from(
            dir.path(),
            &format!("[sites.orders]\ndata = '{data}'\ndisplay_field_inclusions = [\"status\", \"tpyo\"]\n"),
        );

        match SiteRegistry::from_settings(&settings) {
            Err(SiteConfigError::UnknownColumn { site, column }) => {
                assert_eq!(site, "orders");
                assert_eq!(column, "tpyo");
            }
            other => panic!("expected unknown column, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_missing_data_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json").display().to_string();
        let settings = settings_from(
            dir.path(),
            &format!("[sites.orders]\ndata = '{missing}'\n"),
        );

        let err = SiteRegistry::from_settings(&settings).unwrap_err();
        assert!(matches!(err, SiteConfigError::Source { ref site, .. } if site == "orders"));
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn test_choice_filter_without_choices_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let data = write(dir.path(), "orders.json", ORDERS_JSON);
        let settings = settings_from(
            dir.path(),
            &format!(
                "[sites.orders]\ndata = '{data}'\n\n[[sites.orders.filters]]\nname = \"status\"\nkind = \"choice\"\n"
            ),
        );

        let err = SiteRegistry::from_settings(&settings).unwrap_err();
        assert!(matches!(
            err,
            SiteConfigError::Settings {
                source: SettingsError::InvalidConfig(_),
                ..
            }
        ));
    }

    #[test]
    fn test_data_path_expands_env_vars() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "orders.json", ORDERS_JSON);
        std::env::set_var(
            "REPORTKIT_SITE_TEST_DIR",
            dir.path().display().to_string(),
        );

        let settings = settings_from(
            dir.path(),
            "[sites.orders]\ndata = '${REPORTKIT_SITE_TEST_DIR}/orders.json'\n",
        );
        let registry = SiteRegistry::from_settings(&settings).unwrap();
        assert_eq!(registry.get("orders").unwrap().base_collection().len(), 2);

        std::env::remove_var("REPORTKIT_SITE_TEST_DIR");
    }

    #[test]
    fn test_invalid_site_label_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let data = write(dir.path(), "orders.json", ORDERS_JSON);
        let settings = settings_from(
            dir.path(),
            &format!("[sites.\"my orders\"]\ndata = '{data}'\n"),
        );

        let err = SiteRegistry::from_settings(&settings).unwrap_err();
        assert!(matches!(err, SiteConfigError::InvalidLabel(label) if label == "my orders"));
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::from_file(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, SettingsError::FileNotFound(_)));
    }
}
