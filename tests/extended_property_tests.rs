use flexstore::{
    DbType, EntityType, EntityTypeRegistry, ExtendedDataType, FieldDef, MemoryBackend, ScalarKind,
    Store, StoreError, Value,
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
fn test_native_name_is_suggested_from_display_name() {
    let mut store = order_store();
    let def = store
        .create_extended_property(
            "Order",
            "1st Contact!",
            ExtendedDataType::scalar(ScalarKind::String),
            None,
            false,
        )
        .unwrap();
    assert_eq!(def.native_name, "_1stContact");

    // A colliding suggestion gets a numeric suffix.
    let def2 = store
        .create_extended_property(
            "Order",
            "1st-Contact",
            ExtendedDataType::scalar(ScalarKind::String),
            None,
            false,
        )
        .unwrap();
    assert_eq!(def2.native_name, "_1stContact2");
}

#[test]
fn test_duplicate_display_name_is_rejected() {
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
    let err = store
        .create_extended_property(
            "Order",
            "Priority",
            ExtendedDataType::scalar(ScalarKind::Integer),
            None,
            false,
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
}

#[test]
fn test_string_property_gets_default_size() {
    let mut store = order_store();
    let def = store
        .create_extended_property(
            "Order",
            "Notes",
            ExtendedDataType::scalar(ScalarKind::String),
            None,
            false,
        )
        .unwrap();
    assert_eq!(def.size, Some(2048));

    let sized = store
        .create_extended_property(
            "Order",
            "ShortNotes",
            ExtendedDataType::scalar(ScalarKind::String),
            Some(100),
            false,
        )
        .unwrap();
    assert_eq!(sized.size, Some(100));
}

#[test]
fn test_lookup_property_is_always_multi_value() {
    let mut store = order_store();
    store.add_lookup("Priorities").unwrap();
    let def = store
        .create_extended_property(
            "Order",
            "Priority",
            ExtendedDataType::lookup("Priorities"),
            None,
            false,
        )
        .unwrap();
    assert!(def.multi_value);
    assert_eq!(def.data_type.db_type(), DbType::Int64);
}

#[test]
fn test_deletion_is_blocked_while_values_exist() {
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

    let mut order = store.new_entity("Order").unwrap();
    order.set("Subject", Value::from("first")).unwrap();
    order.set_extended("Priority", Value::Int(5)).unwrap();
    store.save(&mut order).unwrap();

    let err = store
        .delete_extended_property("Order", "Priority")
        .unwrap_err();
    assert!(matches!(err, StoreError::PropertyInUse(_)));
    // The definition survives the refused deletion.
    assert_eq!(store.extended_properties("Order").unwrap().len(), 1);

    // Clearing the last stored value unblocks the deletion.
    order.set_extended("Priority", Value::Null).unwrap();
    store.save(&mut order).unwrap();
    store.delete_extended_property("Order", "Priority").unwrap();
    assert!(store.extended_properties("Order").unwrap().is_empty());
}

#[test]
fn test_deleting_unknown_property_is_an_error() {
    let mut store = order_store();
    let err = store
        .delete_extended_property("Order", "Nonexistent")
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
}
