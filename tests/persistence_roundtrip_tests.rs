use flexstore::{
    Backend, DbType, EntityType, EntityTypeRegistry, ExtendedDataType, ExtensibilityProvider,
    FieldDef, FlatTableProvider, MemoryBackend, ScalarKind, Store, Value,
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
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
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
fn test_priority_lifecycle() {
    let mut store = order_store();
    let entity_type = store.registry().get_by_name("Order").unwrap();
    let probe = FlatTableProvider::new();

    // Save a new order carrying a value for the dynamic property.
    let mut order = store.new_entity("Order").unwrap();
    order.set("Number", Value::Int(7)).unwrap();
    order.set_extended("Priority", Value::Int(5)).unwrap();
    store.save(&mut order).unwrap();

    assert_eq!(order.get("Id"), Some(&Value::Int(1)));
    assert_eq!(store.backend().row_count("OrderBfx"), 1);
    assert!(probe
        .is_property_in_use(store.backend_mut(), &entity_type, "Priority")
        .unwrap());

    // Reloading surfaces the side-table value as a pseudo-column.
    let persister = store.persister("Order").unwrap();
    let loaded = persister
        .require_by_id(store.backend_mut(), &[Value::Int(1)])
        .unwrap();
    assert_eq!(loaded.get_extended("Priority"), Some(&Value::Int(5)));

    // Clearing the value removes the row, not just the cell.
    order.set_extended("Priority", Value::Null).unwrap();
    store.save(&mut order).unwrap();
    assert_eq!(store.backend().row_count("OrderBfx"), 0);
    assert!(!probe
        .is_property_in_use(store.backend_mut(), &entity_type, "Priority")
        .unwrap());
}

#[test]
fn test_generated_key_is_bound_into_side_rows() {
    let mut store = order_store();
    // Two saves so the second entity gets id 2; its side row must carry
    // that id, not a stale or NULL key.
    for n in [1, 2] {
        let mut order = store.new_entity("Order").unwrap();
        order.set("Number", Value::Int(n)).unwrap();
        order.set_extended("Priority", Value::Int(n * 10)).unwrap();
        store.save(&mut order).unwrap();
    }

    let persister = store.persister("Order").unwrap();
    let second = persister
        .require_by_id(store.backend_mut(), &[Value::Int(2)])
        .unwrap();
    assert_eq!(second.get_extended("Priority"), Some(&Value::Int(20)));
}

#[test]
fn test_deleted_entity_rejects_further_use() {
    let mut store = order_store();
    let mut order = store.new_entity("Order").unwrap();
    order.set("Number", Value::Int(7)).unwrap();
    store.save(&mut order).unwrap();

    order.mark_deleted().unwrap();
    store.save(&mut order).unwrap();
    assert!(order.is_deleted());
    assert_eq!(store.backend().row_count("Order"), 0);

    assert!(order.set("Number", Value::Int(8)).is_err());
    assert!(order.mark_deleted().is_err());
    assert!(store.save(&mut order).is_err());
}

#[test]
fn test_batch_save_is_all_or_nothing() {
    // The backing table lacks the Subject column, so the second insert
    // fails mid-batch and the first must be rolled back with it.
    let mut backend = MemoryBackend::new();
    backend.create_table("Order", &["Id", "Number"], Some("Id"));
    let mut store = Store::new(backend, order_registry());
    let persister = store.persister("Order").unwrap();

    let mut good = store.new_entity("Order").unwrap();
    good.set("Number", Value::Int(1)).unwrap();
    let mut bad = store.new_entity("Order").unwrap();
    bad.set("Subject", Value::from("no such column")).unwrap();

    let mut batch = [good, bad];
    assert!(persister
        .save_batch(store.backend_mut(), &mut batch)
        .is_err());

    assert_eq!(store.backend().row_count("Order"), 0);
    // Reconciliation never ran: the first entity still counts as unsaved.
    assert!(batch[0].is_new());
    assert!(!store.backend().in_transaction());
}

#[test]
fn test_batch_save_commits_every_entity() {
    let mut store = order_store();
    let persister = store.persister("Order").unwrap();

    let mut batch: Vec<_> = (1..=3)
        .map(|n| {
            let mut order = store.new_entity("Order").unwrap();
            order.set("Number", Value::Int(n)).unwrap();
            order
        })
        .collect();
    persister
        .save_batch(store.backend_mut(), &mut batch)
        .unwrap();

    assert_eq!(store.backend().row_count("Order"), 3);
    for (i, order) in batch.iter().enumerate() {
        assert!(!order.is_new());
        assert_eq!(order.get("Id"), Some(&Value::Int(i as i64 + 1)));
    }
}

#[test]
fn test_demand_load_refreshes_without_dirtying() {
    let mut store = order_store();
    let mut order = store.new_entity("Order").unwrap();
    order.set("Number", Value::Int(1)).unwrap();
    order.set("Subject", Value::from("old")).unwrap();
    order.set_extended("Priority", Value::Int(5)).unwrap();
    store.save(&mut order).unwrap();

    // Another writer changes the row behind this entity's back.
    let persister = store.persister("Order").unwrap();
    let mut other = persister
        .require_by_id(store.backend_mut(), &[Value::Int(1)])
        .unwrap();
    other.set("Subject", Value::from("new")).unwrap();
    other.set_extended("Priority", Value::Int(9)).unwrap();
    store.save(&mut other).unwrap();

    persister
        .demand_load(store.backend_mut(), &mut order, &["Subject", "Priority"])
        .unwrap();
    assert_eq!(order.get("Subject"), Some(&Value::from("new")));
    assert_eq!(order.get_extended("Priority"), Some(&Value::Int(9)));
    // Demand-loaded values are provenance, not edits.
    assert!(!order.is_modified());
    assert!(persister.work_units(&order).unwrap().is_empty());
}

#[test]
fn test_demand_load_rejects_new_and_unknown_fields() {
    let mut store = order_store();
    let persister = store.persister("Order").unwrap();

    let mut fresh = store.new_entity("Order").unwrap();
    assert!(persister
        .demand_load(store.backend_mut(), &mut fresh, &["Subject"])
        .is_err());

    let mut order = store.new_entity("Order").unwrap();
    order.set("Number", Value::Int(1)).unwrap();
    store.save(&mut order).unwrap();
    assert!(persister
        .demand_load(store.backend_mut(), &mut order, &["NoSuchField"])
        .is_err());
}

#[test]
fn test_side_table_creation_happens_once() {
    let mut store = order_store();
    for n in [1, 2, 3] {
        let mut order = store.new_entity("Order").unwrap();
        order.set("Number", Value::Int(n)).unwrap();
        order.set_extended("Priority", Value::Int(n)).unwrap();
        store.save(&mut order).unwrap();
    }
    let stats = store.backend().stats();
    assert_eq!(stats.ddl_statements, 1);
    // The existence cache answers after the first probe.
    assert_eq!(stats.existence_probes, 1);
}

#[test]
fn test_delete_ids_clears_both_tables() {
    let mut store = order_store();
    for n in [1, 2] {
        let mut order = store.new_entity("Order").unwrap();
        order.set("Number", Value::Int(n)).unwrap();
        order.set_extended("Priority", Value::Int(n)).unwrap();
        store.save(&mut order).unwrap();
    }

    let persister = store.persister("Order").unwrap();
    persister
        .delete_ids(store.backend_mut(), &[Value::Int(1), Value::Int(2)], true)
        .unwrap();
    assert_eq!(store.backend().row_count("Order"), 0);
    assert_eq!(store.backend().row_count("OrderBfx"), 0);
}
