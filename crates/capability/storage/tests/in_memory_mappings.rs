use domain::{AggregationMethod, DataType, FieldSource, TenantContext};
use twin_storage::{
    DataPointMappingRecord, DataPointMappingStore, FieldMappingEdit, FieldMappingRecord,
    FieldMappingStore, InMemoryDataPointMappingStore, InMemoryFieldMappingStore, StorageError,
};

fn tenant_ctx() -> TenantContext {
    TenantContext::new("tenant-1", "user-1", vec![])
}

fn mapping(mapping_id: &str, asset_id: &str, device_id: &str, field: &str) -> DataPointMappingRecord {
    DataPointMappingRecord {
        mapping_id: mapping_id.to_string(),
        tenant_id: "tenant-1".to_string(),
        asset_id: asset_id.to_string(),
        device_id: device_id.to_string(),
        field_reference: field.to_string(),
        label: field.to_string(),
        unit: Some("°C".to_string()),
        aggregation: AggregationMethod::Average,
        rollup_enabled: true,
        transform_expression: None,
        warn_low: None,
        warn_high: Some(80.0),
        crit_low: None,
        crit_high: Some(95.0),
    }
}

fn field(device_type_id: &str, field_name: &str, source: FieldSource) -> FieldMappingRecord {
    FieldMappingRecord {
        tenant_id: "tenant-1".to_string(),
        device_type_id: device_type_id.to_string(),
        field_name: field_name.to_string(),
        source,
        friendly_name: field_name.to_string(),
        description: None,
        data_type: DataType::Number,
        unit: None,
        min_value: None,
        max_value: None,
        is_queryable: true,
        is_visible: true,
        display_order: 0,
        category: None,
        default_aggregation: AggregationMethod::Last,
    }
}

#[tokio::test]
async fn data_point_mapping_crud() {
    let store = InMemoryDataPointMappingStore::new();
    let ctx = tenant_ctx();

    let created = store
        .create_mapping(&ctx, mapping("m-1", "pump-1", "dev-1", "sensors.temp"))
        .await
        .expect("create");
    assert_eq!(created.mapping_id, "m-1");

    let found = store
        .find_for_device_field(&ctx, "dev-1", "sensors.temp")
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(found.asset_id, "pump-1");

    let for_asset = store.list_for_asset(&ctx, "pump-1").await.expect("list");
    assert_eq!(for_asset.len(), 1);

    assert!(store.delete_mapping(&ctx, "m-1").await.expect("delete"));
    assert!(!store.delete_mapping(&ctx, "m-1").await.expect("delete"));
}

#[tokio::test]
async fn device_field_binds_at_most_one_asset() {
    let store = InMemoryDataPointMappingStore::new();
    let ctx = tenant_ctx();

    store
        .create_mapping(&ctx, mapping("m-1", "pump-1", "dev-1", "sensors.temp"))
        .await
        .expect("create");
    let err = store
        .create_mapping(&ctx, mapping("m-2", "pump-2", "dev-1", "sensors.temp"))
        .await
        .expect_err("duplicate binding");
    assert!(matches!(err, StorageError::DuplicateMapping));

    // 同设备的其他字段不受影响
    store
        .create_mapping(&ctx, mapping("m-3", "pump-2", "dev-1", "sensors.pressure"))
        .await
        .expect("other field");
}

#[tokio::test]
async fn list_for_assets_batches_across_assets() {
    let store = InMemoryDataPointMappingStore::new();
    let ctx = tenant_ctx();

    store
        .create_mapping(&ctx, mapping("m-1", "pump-1", "dev-1", "sensors.temp"))
        .await
        .expect("create");
    store
        .create_mapping(&ctx, mapping("m-2", "pump-2", "dev-2", "sensors.temp"))
        .await
        .expect("create");

    let batch = store
        .list_for_assets(&ctx, &["pump-1".to_string(), "pump-2".to_string()])
        .await
        .expect("batch");
    assert_eq!(batch.len(), 2);
}

#[tokio::test]
async fn field_mapping_insert_is_unique_per_device_type() {
    let store = InMemoryFieldMappingStore::new();
    let ctx = tenant_ctx();

    store
        .insert_field(&ctx, field("dt-1", "temperature", FieldSource::Schema))
        .await
        .expect("insert");
    let err = store
        .insert_field(&ctx, field("dt-1", "temperature", FieldSource::Schema))
        .await
        .expect_err("duplicate");
    assert!(matches!(err, StorageError::DuplicateFieldName(_)));

    // 另一个设备类型可以有同名字段
    store
        .insert_field(&ctx, field("dt-2", "temperature", FieldSource::Schema))
        .await
        .expect("other device type");
}

#[tokio::test]
async fn field_mapping_edit_keeps_identity() {
    let store = InMemoryFieldMappingStore::new();
    let ctx = tenant_ctx();

    store
        .insert_field(&ctx, field("dt-1", "temperature", FieldSource::Schema))
        .await
        .expect("insert");
    let updated = store
        .update_field(
            &ctx,
            "dt-1",
            "temperature",
            FieldMappingEdit {
                friendly_name: Some("Temperature".to_string()),
                unit: Some("°C".to_string()),
                display_order: Some(3),
                ..Default::default()
            },
        )
        .await
        .expect("update")
        .expect("exists");
    assert_eq!(updated.friendly_name, "Temperature");
    assert_eq!(updated.unit.as_deref(), Some("°C"));
    assert_eq!(updated.display_order, 3);
    assert_eq!(updated.field_name, "temperature");

    let missing = store
        .update_field(&ctx, "dt-1", "nope", FieldMappingEdit::default())
        .await
        .expect("update missing");
    assert!(missing.is_none());
}

#[tokio::test]
async fn delete_for_device_type_is_cascading() {
    let store = InMemoryFieldMappingStore::new();
    let ctx = tenant_ctx();

    store
        .insert_field(&ctx, field("dt-1", "temperature", FieldSource::Schema))
        .await
        .expect("insert");
    store
        .insert_field(&ctx, field("dt-1", "humidity", FieldSource::Schema))
        .await
        .expect("insert");
    store
        .insert_field(&ctx, field("dt-2", "temperature", FieldSource::Schema))
        .await
        .expect("insert");

    let removed = store.delete_for_device_type(&ctx, "dt-1").await.expect("delete");
    assert_eq!(removed, 2);

    let remaining = store.list_for_device_type(&ctx, "dt-2").await.expect("list");
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn mappings_are_tenant_scoped() {
    let store = InMemoryDataPointMappingStore::new();
    let ctx = tenant_ctx();
    let other = TenantContext::new("tenant-2", "user-2", vec![]);

    store
        .create_mapping(&ctx, mapping("m-1", "pump-1", "dev-1", "sensors.temp"))
        .await
        .expect("create");

    let found = store
        .find_for_device_field(&other, "dev-1", "sensors.temp")
        .await
        .expect("find");
    assert!(found.is_none());
}
