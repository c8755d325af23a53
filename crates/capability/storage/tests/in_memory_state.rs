use domain::{AggregationMethod, AlarmStatus, ScalarValue, TenantContext};
use std::collections::BTreeMap;
use twin_storage::{
    AssetStateStore, InMemoryAssetStateStore, InMemoryRollupConfigStore, InMemoryRollupResultStore,
    RollupConfigRecord, RollupConfigStore, RollupResultRecord, RollupResultStore,
};

fn tenant_ctx() -> TenantContext {
    TenantContext::new("tenant-1", "user-1", vec![])
}

fn values(field: &str, value: f64) -> BTreeMap<String, ScalarValue> {
    let mut map = BTreeMap::new();
    map.insert(field.to_string(), ScalarValue::F64(value));
    map
}

#[tokio::test]
async fn upsert_merges_fields_and_advances_clock() {
    let store = InMemoryAssetStateStore::new();
    let ctx = tenant_ctx();

    assert!(store
        .upsert_values(&ctx, "pump-1", &values("temperature", 21.0), 1_000)
        .await
        .expect("write"));
    assert!(store
        .upsert_values(&ctx, "pump-1", &values("pressure", 2.4), 2_000)
        .await
        .expect("write"));

    let state = store.get_state(&ctx, "pump-1").await.expect("read").expect("state");
    assert_eq!(state.values.len(), 2);
    assert_eq!(state.values.get("temperature"), Some(&ScalarValue::F64(21.0)));
    assert_eq!(state.last_updated_at_ms, 2_000);
}

#[tokio::test]
async fn out_of_order_sample_is_dropped() {
    let store = InMemoryAssetStateStore::new();
    let ctx = tenant_ctx();

    store
        .upsert_values(&ctx, "pump-1", &values("temperature", 25.0), 2_000)
        .await
        .expect("write");
    let applied = store
        .upsert_values(&ctx, "pump-1", &values("temperature", 99.0), 1_000)
        .await
        .expect("write");
    assert!(!applied);

    let state = store.get_state(&ctx, "pump-1").await.expect("read").expect("state");
    assert_eq!(state.values.get("temperature"), Some(&ScalarValue::F64(25.0)));
    assert_eq!(state.last_updated_at_ms, 2_000);
}

#[tokio::test]
async fn override_ignores_clock() {
    let store = InMemoryAssetStateStore::new();
    let ctx = tenant_ctx();

    store
        .upsert_values(&ctx, "pump-1", &values("temperature", 25.0), 2_000)
        .await
        .expect("write");
    store
        .override_state(&ctx, "pump-1", &values("temperature", 10.0), 500)
        .await
        .expect("override");

    let state = store.get_state(&ctx, "pump-1").await.expect("read").expect("state");
    assert_eq!(state.values.get("temperature"), Some(&ScalarValue::F64(10.0)));
    assert_eq!(state.last_updated_at_ms, 500);
}

#[tokio::test]
async fn calculated_metrics_and_alarms_live_alongside_values() {
    let store = InMemoryAssetStateStore::new();
    let ctx = tenant_ctx();

    store
        .upsert_values(&ctx, "line-1", &values("temperature", 25.0), 2_000)
        .await
        .expect("write");
    store
        .set_calculated_metric(&ctx, "line-1", "avg_temperature", 23.5)
        .await
        .expect("metric");
    store
        .set_alarm(&ctx, "line-1", AlarmStatus::Warning, 2)
        .await
        .expect("alarm");

    let state = store.get_state(&ctx, "line-1").await.expect("read").expect("state");
    assert_eq!(state.calculated_metrics.get("avg_temperature"), Some(&23.5));
    assert_eq!(state.alarm_status, AlarmStatus::Warning);
    assert_eq!(state.alarm_count, 2);
    assert_eq!(state.values.len(), 1);
}

#[tokio::test]
async fn bulk_states_return_only_known_assets() {
    let store = InMemoryAssetStateStore::new();
    let ctx = tenant_ctx();

    store
        .upsert_values(&ctx, "pump-1", &values("temperature", 22.0), 1_000)
        .await
        .expect("write");
    store
        .upsert_values(&ctx, "pump-2", &values("temperature", 24.0), 1_000)
        .await
        .expect("write");

    let bulk = store
        .get_bulk_states(
            &ctx,
            &[
                "pump-1".to_string(),
                "pump-2".to_string(),
                "pump-3".to_string(),
            ],
        )
        .await
        .expect("bulk");
    assert_eq!(bulk.len(), 2);
    assert!(!bulk.contains_key("pump-3"));
}

#[tokio::test]
async fn state_is_tenant_scoped() {
    let store = InMemoryAssetStateStore::new();
    let ctx = tenant_ctx();
    let other = TenantContext::new("tenant-2", "user-2", vec![]);

    store
        .upsert_values(&ctx, "pump-1", &values("temperature", 22.0), 1_000)
        .await
        .expect("write");
    let state = store.get_state(&other, "pump-1").await.expect("read");
    assert!(state.is_none());
}

fn bucket(asset_id: &str, bucket_start_ms: i64, value: f64) -> RollupResultRecord {
    RollupResultRecord {
        tenant_id: "tenant-1".to_string(),
        asset_id: asset_id.to_string(),
        metric_name: "avg_temperature".to_string(),
        bucket_start_ms,
        bucket_end_ms: bucket_start_ms + 60_000,
        value,
        sample_count: 2,
        aggregation: AggregationMethod::Average,
        partial: false,
    }
}

#[tokio::test]
async fn rollup_buckets_are_append_only() {
    let store = InMemoryRollupResultStore::new();
    let ctx = tenant_ctx();

    assert!(store
        .append_result(&ctx, bucket("line-1", 60_000, 23.0))
        .await
        .expect("append"));
    // 同一桶重复写入被忽略，首次写入保持不变
    assert!(!store
        .append_result(&ctx, bucket("line-1", 60_000, 99.0))
        .await
        .expect("append"));

    let series = store
        .query_series(&ctx, "line-1", "avg_temperature", 0, 120_000)
        .await
        .expect("query");
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].value, 23.0);
}

#[tokio::test]
async fn series_query_is_half_open_and_ordered() {
    let store = InMemoryRollupResultStore::new();
    let ctx = tenant_ctx();

    store
        .append_result(&ctx, bucket("line-1", 120_000, 24.0))
        .await
        .expect("append");
    store
        .append_result(&ctx, bucket("line-1", 60_000, 23.0))
        .await
        .expect("append");
    store
        .append_result(&ctx, bucket("line-1", 180_000, 25.0))
        .await
        .expect("append");

    let series = store
        .query_series(&ctx, "line-1", "avg_temperature", 60_000, 180_000)
        .await
        .expect("query");
    let starts: Vec<i64> = series.iter().map(|item| item.bucket_start_ms).collect();
    assert_eq!(starts, vec![60_000, 120_000]);
}

#[tokio::test]
async fn rollup_config_lifecycle() {
    let store = InMemoryRollupConfigStore::new();
    let ctx = tenant_ctx();

    let record = RollupConfigRecord {
        config_id: "rc-1".to_string(),
        tenant_id: "tenant-1".to_string(),
        asset_id: "line-1".to_string(),
        metric_name: "avg_temperature".to_string(),
        aggregation: AggregationMethod::Average,
        interval_seconds: 60,
        include_children: true,
        window_seconds: None,
        weight_factors: BTreeMap::new(),
        filter_asset_type: None,
        filter_tag: None,
        enabled: true,
    };
    store.create_config(&ctx, record.clone()).await.expect("create");

    let mut disabled = record.clone();
    disabled.config_id = "rc-2".to_string();
    disabled.enabled = false;
    store.create_config(&ctx, disabled).await.expect("create");

    let enabled = store.list_all_enabled().await.expect("enabled");
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].config_id, "rc-1");

    let listed = store.list_for_asset(&ctx, "line-1").await.expect("list");
    assert_eq!(listed.len(), 2);

    assert!(store.delete_config(&ctx, "rc-1").await.expect("delete"));
    assert!(store.find_config(&ctx, "rc-1").await.expect("find").is_none());
}
