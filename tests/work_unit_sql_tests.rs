use flexstore::{
    DbType, EntityType, EntityTypeRegistry, ExtendedDataType, FieldDef, MemoryBackend, ScalarKind,
    Store, UnitTarget, Value, WorkUnitKind,
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
                    FieldDef::new("Number", DbType::Int32),
                    FieldDef::new("Subject", DbType::String).size(255),
                ],
            )
            .unwrap(),
        )
        .unwrap()
}

fn order_store() -> Store<MemoryBackend> {
    let mut backend = MemoryBackend::new();
    backend.create_table("Order", &["Id", "Number", "Subject"], Some("Id"));
    let mut store = Store::new(backend, order_registry());
    store
        .create_extended_property(
            "Order",
            "Priority",
            ExtendedDataType::scalar(ScalarKind::Integer),
            None,
            false,
        )
        .unwrap();
    store
}

#[test]
fn test_new_entity_emits_core_insert_before_extended_inserts() {
    let store = order_store();
    let persister = store.persister("Order").unwrap();

    let mut order = store.new_entity("Order").unwrap();
    order.set("Number", Value::Int(7)).unwrap();
    order.set_extended("Priority", Value::Int(5)).unwrap();

    let units = persister.work_units(&order).unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(units[0].target(), UnitTarget::Core);
    assert_eq!(units[0].kind(), WorkUnitKind::Insert);
    assert_eq!(units[1].target(), UnitTarget::Extended);
    assert_eq!(units[1].kind(), WorkUnitKind::Insert);

    assert_eq!(units[0].sql(), "INSERT INTO [Order] ([Number]) VALUES (7)");
    // The generated key is not known yet; the side-table row snapshots a
    // NULL placeholder that the save pipeline rebinds after the core
    // insert runs.
    assert_eq!(
        units[1].sql(),
        "INSERT INTO [OrderBfx] ([Id], [Name], [Int64]) VALUES (NULL, 'Priority', 5)"
    );
}

#[test]
fn test_update_targets_the_key() {
    let mut store = order_store();
    let mut order = store.new_entity("Order").unwrap();
    order.set("Number", Value::Int(7)).unwrap();
    store.save(&mut order).unwrap();

    order.set("Subject", Value::from("urgent")).unwrap();
    let persister = store.persister("Order").unwrap();
    let units = persister.work_units(&order).unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(
        units[0].sql(),
        "UPDATE [Order] SET [Subject] = 'urgent' WHERE [Id] = 1"
    );
}

#[test]
fn test_key_only_change_set_emits_no_core_update() {
    let mut store = order_store();
    let mut order = store.new_entity("Order").unwrap();
    order.set("Number", Value::Int(7)).unwrap();
    store.save(&mut order).unwrap();

    // Nothing modified at all: a save is a no-op.
    let persister = store.persister("Order").unwrap();
    assert!(persister.work_units(&order).unwrap().is_empty());
}

#[test]
fn test_extended_update_renders_conditional_upsert() {
    let mut store = order_store();
    let mut order = store.new_entity("Order").unwrap();
    order.set("Number", Value::Int(7)).unwrap();
    store.save(&mut order).unwrap();

    order.set_extended("Priority", Value::Int(9)).unwrap();
    let persister = store.persister("Order").unwrap();
    let units = persister.work_units(&order).unwrap();
    assert_eq!(units.len(), 1);
    let sql = units[0].sql();
    assert!(sql.starts_with(
        "IF (SELECT COUNT(*) FROM [OrderBfx] WHERE [Id] = 1 AND [Name] = 'Priority') = 0"
    ));
    assert!(sql.contains("ELSE UPDATE [OrderBfx] SET [Int64] = 9"));
}

#[test]
fn test_delete_clears_side_table_before_core_row() {
    let mut store = order_store();
    let mut order = store.new_entity("Order").unwrap();
    order.set("Number", Value::Int(7)).unwrap();
    order.set_extended("Priority", Value::Int(5)).unwrap();
    store.save(&mut order).unwrap();

    order.mark_deleted().unwrap();
    let persister = store.persister("Order").unwrap();
    let units = persister.work_units(&order).unwrap();
    let sqls: Vec<String> = units.iter().map(|u| u.sql()).collect();
    assert_eq!(
        sqls,
        vec![
            "DELETE FROM [OrderBfx] WHERE [Id] = 1".to_string(),
            "DELETE FROM [Order] WHERE [Id] = 1".to_string(),
        ]
    );
}

#[test]
fn test_units_snapshot_values_at_construction() {
    let mut store = order_store();
    let mut order = store.new_entity("Order").unwrap();
    order.set("Number", Value::Int(7)).unwrap();
    store.save(&mut order).unwrap();

    order.set("Subject", Value::from("before")).unwrap();
    let persister = store.persister("Order").unwrap();
    let units = persister.work_units(&order).unwrap();
    let frozen = units[0].sql();

    // Later mutation must not leak into an already-built unit.
    order.set("Subject", Value::from("after")).unwrap();
    assert_eq!(units[0].sql(), frozen);
    assert!(frozen.contains("'before'"));
}
