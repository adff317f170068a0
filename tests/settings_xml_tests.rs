use flexstore::{
    DbType, EntityType, EntityTypeRegistry, ExtendedDataType, ExtensionSettings, FieldDef,
    MemoryBackend, ScalarKind, Store, StoreError, Value,
};

fn order_registry() -> EntityTypeRegistry {
    EntityTypeRegistry::new()
        .with_type(
            EntityType::new(
                1,
                "Order",
                "Order",
                vec![
                    FieldDef::new("Id", DbType::Int32).key().auto_increment(),
                    FieldDef::new("Subject", DbType::String).size(255),
                ],
            )
            .unwrap(),
        )
        .unwrap()
}

fn order_store() -> Store<MemoryBackend> {
    let mut backend = MemoryBackend::new();
    backend.create_table("Order", &["Id", "Subject"], Some("Id"));
    Store::new(backend, order_registry())
}

#[test]
fn test_catalog_round_trips_through_document() {
    let mut store = order_store();
    store.add_lookup("Priorities").unwrap();
    store
        .create_extended_property(
            "Order",
            "Priority",
            ExtendedDataType::lookup("Priorities"),
            None,
            false,
        )
        .unwrap();
    store
        .create_extended_property(
            "Order",
            "Notes",
            ExtendedDataType::scalar(ScalarKind::String),
            Some(500),
            false,
        )
        .unwrap();

    let xml = store.settings_xml().unwrap();
    assert!(xml.contains("schemaVersion=\"3\""));
    assert!(xml.contains("Type=\"LookupDataType, Flexstore.Extended|Priorities\""));

    let mut restored = order_store();
    restored.load_settings_xml(&xml).unwrap();
    let props = restored.extended_properties("Order").unwrap();
    assert_eq!(props.len(), 2);

    let priority = props.iter().find(|p| p.name == "Priority").unwrap();
    assert!(priority.multi_value);
    assert_eq!(priority.data_type, ExtendedDataType::lookup("Priorities"));

    let notes = props.iter().find(|p| p.name == "Notes").unwrap();
    assert_eq!(notes.size, Some(500));
    assert!(!notes.multi_value);
}

#[test]
fn test_restored_catalog_is_usable_for_saves() {
    let mut store = order_store();
    store
        .create_extended_property(
            "Order",
            "Priority",
            ExtendedDataType::scalar(ScalarKind::Integer),
            None,
            false,
        )
        .unwrap();
    let xml = store.settings_xml().unwrap();

    let mut restored = order_store();
    restored.load_settings_xml(&xml).unwrap();
    let mut order = restored.new_entity("Order").unwrap();
    order.set("Subject", Value::from("check")).unwrap();
    order.set_extended("Priority", Value::Int(4)).unwrap();
    restored.save(&mut order).unwrap();
    assert_eq!(restored.backend().row_count("OrderBfx"), 1);
}

#[test]
fn test_older_document_loads_as_empty_catalog() {
    let xml = r#"<ExtensionSettings providerType="X" schemaVersion="2">
        <Lookups><Lookup Name="Legacy"/></Lookups>
        <ExtendedProperties>
            <ExtendedProperty Name="Old" NativeName="Old"
                Type="ScalarDataType, Flexstore.Extended|String" EntityTypeId="1"/>
        </ExtendedProperties>
    </ExtensionSettings>"#;

    let mut store = order_store();
    store.load_settings_xml(xml).unwrap();
    assert!(store.extended_properties("Order").unwrap().is_empty());
}

#[test]
fn test_newer_document_is_rejected() {
    let xml = r#"<ExtensionSettings providerType="X" schemaVersion="4"></ExtensionSettings>"#;
    let err = ExtensionSettings::from_xml(xml).unwrap_err();
    assert!(matches!(err, StoreError::UnsupportedSchemaVersion(4)));

    let mut store = order_store();
    assert!(store.load_settings_xml(xml).is_err());
}

#[test]
fn test_unknown_type_id_is_rejected_on_load() {
    let xml = r#"<ExtensionSettings providerType="X" schemaVersion="3">
        <ExtendedProperties>
            <ExtendedProperty Name="P" NativeName="P"
                Type="ReflectedDataType, SomeOtherAssembly|P" EntityTypeId="1"/>
        </ExtendedProperties>
    </ExtensionSettings>"#;
    assert!(ExtensionSettings::from_xml(xml).is_err());
}
