use async_trait::async_trait;
use domain::{AggregationMethod, AssetStatus, AssetType, CascadePolicy, ScalarValue, TenantContext};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use twin_rollup::{RollupEngine, RollupError, RollupOutcome, TelemetryQuery};
use twin_storage::{
    AssetFilter, AssetRecord, AssetStateStore, AssetStore, AssetUpdate, DataPointMappingRecord,
    DataPointMappingStore, InMemoryAssetStateStore, InMemoryAssetStore,
    InMemoryDataPointMappingStore, InMemoryRollupResultStore, LockMode, NewAsset,
    RollupConfigRecord, RollupResultStore, StorageError, SubtreeLockManager,
};

/// 固定样本的遥测查询桩；列入 fail_devices 的设备读取报错。
struct StubTelemetry {
    ranges: HashMap<(String, String), Vec<(i64, f64)>>,
    fail_devices: Vec<String>,
}

#[async_trait]
impl TelemetryQuery for StubTelemetry {
    async fn fetch_latest(
        &self,
        _ctx: &TenantContext,
        _device_id: &str,
        _fields: &[String],
    ) -> Result<HashMap<String, f64>, RollupError> {
        Ok(HashMap::new())
    }

    async fn fetch_range(
        &self,
        _ctx: &TenantContext,
        device_id: &str,
        field: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<(i64, f64)>, RollupError> {
        if self.fail_devices.iter().any(|d| d == device_id) {
            return Err(RollupError::Telemetry("simulated outage".to_string()));
        }
        let key = (device_id.to_string(), field.to_string());
        Ok(self
            .ranges
            .get(&key)
            .map(|points| {
                points
                    .iter()
                    .filter(|(ts, _)| *ts >= start_ms && *ts < end_ms)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn tenant_ctx() -> TenantContext {
    TenantContext::new("tenant-1", "user-1", vec![])
}

fn new_asset(asset_id: &str, parent_id: Option<&str>, asset_type: AssetType) -> NewAsset {
    NewAsset {
        asset_id: asset_id.to_string(),
        tenant_id: "tenant-1".to_string(),
        parent_id: parent_id.map(str::to_string),
        name: asset_id.to_string(),
        asset_type,
        status: AssetStatus::Active,
        location: None,
        metadata: BTreeMap::new(),
        tags: BTreeSet::new(),
    }
}

fn mapping(mapping_id: &str, asset_id: &str, device_id: &str) -> DataPointMappingRecord {
    DataPointMappingRecord {
        mapping_id: mapping_id.to_string(),
        tenant_id: "tenant-1".to_string(),
        asset_id: asset_id.to_string(),
        device_id: device_id.to_string(),
        field_reference: "sensors.temp".to_string(),
        label: "temperature".to_string(),
        unit: Some("°C".to_string()),
        aggregation: AggregationMethod::Average,
        rollup_enabled: true,
        transform_expression: None,
        warn_low: None,
        warn_high: None,
        crit_low: None,
        crit_high: None,
    }
}

fn config(asset_id: &str) -> RollupConfigRecord {
    RollupConfigRecord {
        config_id: format!("rc-{asset_id}"),
        tenant_id: "tenant-1".to_string(),
        asset_id: asset_id.to_string(),
        metric_name: "temperature".to_string(),
        aggregation: AggregationMethod::Average,
        interval_seconds: 60,
        include_children: true,
        window_seconds: None,
        weight_factors: BTreeMap::new(),
        filter_asset_type: None,
        filter_tag: None,
        enabled: true,
    }
}

struct Fixture {
    engine: RollupEngine,
    assets: Arc<InMemoryAssetStore>,
    mappings: Arc<InMemoryDataPointMappingStore>,
    states: Arc<InMemoryAssetStateStore>,
    results: Arc<InMemoryRollupResultStore>,
}

fn fixture(telemetry: StubTelemetry) -> Fixture {
    let locks = SubtreeLockManager::new();
    let assets = Arc::new(InMemoryAssetStore::new(locks.clone()));
    let mappings = Arc::new(InMemoryDataPointMappingStore::new());
    let states = Arc::new(InMemoryAssetStateStore::new());
    let results = Arc::new(InMemoryRollupResultStore::new());
    let engine = RollupEngine::new(
        assets.clone(),
        mappings.clone(),
        states.clone(),
        results.clone(),
        Arc::new(telemetry),
        locks,
    );
    Fixture {
        engine,
        assets,
        mappings,
        states,
        results,
    }
}

/// 种一棵 plant -> line-1 -> {pump-1, pump-2} 的树并接好映射。
async fn seed_line(fx: &Fixture) {
    let ctx = tenant_ctx();
    fx.assets
        .create_asset(&ctx, new_asset("plant", None, AssetType::Site))
        .await
        .expect("create");
    fx.assets
        .create_asset(&ctx, new_asset("line-1", Some("plant"), AssetType::Area))
        .await
        .expect("create");
    fx.assets
        .create_asset(&ctx, new_asset("pump-1", Some("line-1"), AssetType::Equipment))
        .await
        .expect("create");
    fx.assets
        .create_asset(&ctx, new_asset("pump-2", Some("line-1"), AssetType::Equipment))
        .await
        .expect("create");
    fx.mappings
        .create_mapping(&ctx, mapping("m-1", "pump-1", "dev-1"))
        .await
        .expect("mapping");
    fx.mappings
        .create_mapping(&ctx, mapping("m-2", "pump-2", "dev-2"))
        .await
        .expect("mapping");
}

async fn set_state(fx: &Fixture, asset_id: &str, value: f64, ts: i64) {
    let ctx = tenant_ctx();
    let values = BTreeMap::from([("temperature".to_string(), ScalarValue::F64(value))]);
    fx.states
        .upsert_values(&ctx, asset_id, &values, ts)
        .await
        .expect("state");
}

#[tokio::test]
async fn snapshot_rollup_averages_children() {
    let fx = fixture(StubTelemetry {
        ranges: HashMap::new(),
        fail_devices: vec![],
    });
    seed_line(&fx).await;
    set_state(&fx, "pump-1", 22.0, 1_000).await;
    set_state(&fx, "pump-2", 24.0, 1_000).await;
    let ctx = tenant_ctx();

    let outcome = fx
        .engine
        .run_rollup(&ctx, &config("line-1"), 0, 60_000)
        .await
        .expect("rollup");
    let record = match outcome {
        RollupOutcome::Written(record) => record,
        other => panic!("expected written, got {other:?}"),
    };
    assert_eq!(record.value, 23.0);
    assert_eq!(record.sample_count, 2);
    assert!(!record.partial);

    // 值同时镜像进父资产状态
    let parent = fx
        .states
        .get_state(&ctx, "line-1")
        .await
        .expect("read")
        .expect("state");
    assert_eq!(parent.calculated_metrics.get("temperature"), Some(&23.0));
}

#[tokio::test]
async fn windowed_rollup_uses_range_mean() {
    // line-1 下只有 pump-1 在窗口内有样本：22.0 与 24.0 的
    // 窗口均值 23.0，参与者数为 1
    let ranges = HashMap::from([(
        ("dev-1".to_string(), "sensors.temp".to_string()),
        vec![(10_000, 22.0), (40_000, 24.0)],
    )]);
    let fx = fixture(StubTelemetry {
        ranges,
        fail_devices: vec![],
    });
    seed_line(&fx).await;
    let ctx = tenant_ctx();

    let mut cfg = config("line-1");
    cfg.window_seconds = Some(60);
    let outcome = fx
        .engine
        .run_rollup(&ctx, &cfg, 0, 60_000)
        .await
        .expect("rollup");
    let record = match outcome {
        RollupOutcome::Written(record) => record,
        other => panic!("expected written, got {other:?}"),
    };
    assert_eq!(record.value, 23.0);
    assert_eq!(record.sample_count, 1);
}

#[tokio::test]
async fn weighted_average_divides_by_total_weight() {
    let fx = fixture(StubTelemetry {
        ranges: HashMap::new(),
        fail_devices: vec![],
    });
    seed_line(&fx).await;
    set_state(&fx, "pump-1", 20.0, 1_000).await;
    set_state(&fx, "pump-2", 30.0, 1_000).await;
    let ctx = tenant_ctx();

    let mut cfg = config("line-1");
    cfg.weight_factors = BTreeMap::from([
        ("pump-1".to_string(), 1.0),
        ("pump-2".to_string(), 4.0),
    ]);
    let outcome = fx
        .engine
        .run_rollup(&ctx, &cfg, 0, 60_000)
        .await
        .expect("rollup");
    let record = match outcome {
        RollupOutcome::Written(record) => record,
        other => panic!("expected written, got {other:?}"),
    };
    // (20*1 + 30*4) / 5 = 28
    assert_eq!(record.value, 28.0);
}

#[tokio::test]
async fn failed_child_is_excluded_and_marked_partial() {
    let ranges = HashMap::from([(
        ("dev-1".to_string(), "sensors.temp".to_string()),
        vec![(10_000, 22.0)],
    )]);
    let fx = fixture(StubTelemetry {
        ranges,
        fail_devices: vec!["dev-2".to_string()],
    });
    seed_line(&fx).await;
    let ctx = tenant_ctx();

    let mut cfg = config("line-1");
    cfg.window_seconds = Some(60);
    let outcome = fx
        .engine
        .run_rollup(&ctx, &cfg, 0, 60_000)
        .await
        .expect("rollup never aborts on child failure");
    let record = match outcome {
        RollupOutcome::Written(record) => record,
        other => panic!("expected written, got {other:?}"),
    };
    assert!(record.partial);
    assert_eq!(record.sample_count, 1);
    assert_eq!(record.value, 22.0);
}

#[tokio::test]
async fn zero_samples_skip_without_writing() {
    let fx = fixture(StubTelemetry {
        ranges: HashMap::new(),
        fail_devices: vec![],
    });
    seed_line(&fx).await;
    let ctx = tenant_ctx();

    // 无任何状态数据
    let outcome = fx
        .engine
        .run_rollup(&ctx, &config("line-1"), 0, 60_000)
        .await
        .expect("rollup");
    assert!(matches!(outcome, RollupOutcome::NoData));

    let series = fx
        .results
        .query_series(&ctx, "line-1", "temperature", 0, i64::MAX)
        .await
        .expect("query");
    assert!(series.is_empty());
}

#[tokio::test]
async fn duplicate_bucket_is_not_overwritten() {
    let fx = fixture(StubTelemetry {
        ranges: HashMap::new(),
        fail_devices: vec![],
    });
    seed_line(&fx).await;
    set_state(&fx, "pump-1", 22.0, 1_000).await;
    let ctx = tenant_ctx();

    let first = fx
        .engine
        .run_rollup(&ctx, &config("line-1"), 0, 60_000)
        .await
        .expect("rollup");
    assert!(matches!(first, RollupOutcome::Written(_)));

    set_state(&fx, "pump-1", 99.0, 2_000).await;
    let second = fx
        .engine
        .run_rollup(&ctx, &config("line-1"), 0, 60_000)
        .await
        .expect("rollup");
    assert!(matches!(second, RollupOutcome::BucketExists));

    let series = fx
        .results
        .query_series(&ctx, "line-1", "temperature", 0, i64::MAX)
        .await
        .expect("query");
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].value, 22.0);
}

#[tokio::test]
async fn filters_narrow_participants() {
    let fx = fixture(StubTelemetry {
        ranges: HashMap::new(),
        fail_devices: vec![],
    });
    seed_line(&fx).await;
    let ctx = tenant_ctx();
    // pump-2 打上 critical 标签
    fx.assets
        .update_asset(
            &ctx,
            "pump-2",
            twin_storage::AssetUpdate {
                tags: Some(BTreeSet::from(["critical".to_string()])),
                ..Default::default()
            },
        )
        .await
        .expect("update")
        .expect("exists");
    set_state(&fx, "pump-1", 20.0, 1_000).await;
    set_state(&fx, "pump-2", 30.0, 1_000).await;

    let mut cfg = config("line-1");
    cfg.filter_tag = Some("critical".to_string());
    let outcome = fx
        .engine
        .run_rollup(&ctx, &cfg, 0, 60_000)
        .await
        .expect("rollup");
    let record = match outcome {
        RollupOutcome::Written(record) => record,
        other => panic!("expected written, got {other:?}"),
    };
    assert_eq!(record.sample_count, 1);
    assert_eq!(record.value, 30.0);
}

/// find_asset 对 line-1 第一次返回过期路径的包装，之后透传；
/// 构造"读路径与加锁之间父节点刚被移动"的时序。
struct StaleOnceAssets {
    inner: Arc<InMemoryAssetStore>,
    served: AtomicBool,
}

#[async_trait]
impl AssetStore for StaleOnceAssets {
    async fn create_asset(
        &self,
        ctx: &TenantContext,
        input: NewAsset,
    ) -> Result<AssetRecord, StorageError> {
        self.inner.create_asset(ctx, input).await
    }

    async fn find_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Option<AssetRecord>, StorageError> {
        let record = self.inner.find_asset(ctx, asset_id).await?;
        if asset_id == "line-1" && !self.served.swap(true, Ordering::SeqCst) {
            if let Some(mut stale) = record {
                stale.path = "old-plant/line-1".to_string();
                stale.depth = 1;
                return Ok(Some(stale));
            }
        }
        Ok(record)
    }

    async fn update_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        update: AssetUpdate,
    ) -> Result<Option<AssetRecord>, StorageError> {
        self.inner.update_asset(ctx, asset_id, update).await
    }

    async fn move_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<AssetRecord, StorageError> {
        self.inner.move_asset(ctx, asset_id, new_parent_id).await
    }

    async fn delete_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        policy: CascadePolicy,
    ) -> Result<usize, StorageError> {
        self.inner.delete_asset(ctx, asset_id, policy).await
    }

    async fn list_children(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Vec<AssetRecord>, StorageError> {
        self.inner.list_children(ctx, asset_id).await
    }

    async fn list_descendants(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Vec<AssetRecord>, StorageError> {
        self.inner.list_descendants(ctx, asset_id).await
    }

    async fn list_ancestors(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Vec<AssetRecord>, StorageError> {
        self.inner.list_ancestors(ctx, asset_id).await
    }

    async fn list_roots(&self, ctx: &TenantContext) -> Result<Vec<AssetRecord>, StorageError> {
        self.inner.list_roots(ctx).await
    }

    async fn search_assets(
        &self,
        ctx: &TenantContext,
        filter: AssetFilter,
    ) -> Result<Vec<AssetRecord>, StorageError> {
        self.inner.search_assets(ctx, filter).await
    }
}

/// 第一次窗口读取在此停住，等测试侧放行；其余读取返回空。
struct GatedTelemetry {
    entered: Arc<Notify>,
    release: Arc<Notify>,
    gated: AtomicBool,
}

#[async_trait]
impl TelemetryQuery for GatedTelemetry {
    async fn fetch_latest(
        &self,
        _ctx: &TenantContext,
        _device_id: &str,
        _fields: &[String],
    ) -> Result<HashMap<String, f64>, RollupError> {
        Ok(HashMap::new())
    }

    async fn fetch_range(
        &self,
        _ctx: &TenantContext,
        _device_id: &str,
        _field: &str,
        _start_ms: i64,
        _end_ms: i64,
    ) -> Result<Vec<(i64, f64)>, RollupError> {
        if !self.gated.swap(true, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
            return Ok(vec![(10_000, 22.0)]);
        }
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn rollup_revalidates_subtree_path_after_locking() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let locks = SubtreeLockManager::new();
    let inner = Arc::new(InMemoryAssetStore::new(locks.clone()));
    let assets = Arc::new(StaleOnceAssets {
        inner: inner.clone(),
        served: AtomicBool::new(false),
    });
    let mappings = Arc::new(InMemoryDataPointMappingStore::new());
    let engine = Arc::new(RollupEngine::new(
        assets,
        mappings.clone(),
        Arc::new(InMemoryAssetStateStore::new()),
        Arc::new(InMemoryRollupResultStore::new()),
        Arc::new(GatedTelemetry {
            entered: entered.clone(),
            release: release.clone(),
            gated: AtomicBool::new(false),
        }),
        locks.clone(),
    ));
    let ctx = tenant_ctx();
    inner
        .create_asset(&ctx, new_asset("plant", None, AssetType::Site))
        .await
        .expect("create");
    inner
        .create_asset(&ctx, new_asset("line-1", Some("plant"), AssetType::Area))
        .await
        .expect("create");
    inner
        .create_asset(&ctx, new_asset("pump-1", Some("line-1"), AssetType::Equipment))
        .await
        .expect("create");
    mappings
        .create_mapping(&ctx, mapping("m-1", "pump-1", "dev-1"))
        .await
        .expect("mapping");

    let mut cfg = config("line-1");
    cfg.window_seconds = Some(60);
    let task = tokio::spawn({
        let engine = Arc::clone(&engine);
        let ctx = ctx.clone();
        async move { engine.run_rollup(&ctx, &cfg, 0, 60_000).await }
    });

    // 引擎已进入聚合阶段：真实路径上的读锁必须在手里，
    // 第一次查到的过期路径不应被占用
    entered.notified().await;
    assert!(
        locks
            .try_acquire("plant/line-1", LockMode::Write)
            .expect("lock")
            .is_none()
    );
    assert!(
        locks
            .try_acquire("old-plant/line-1", LockMode::Write)
            .expect("lock")
            .is_some()
    );

    release.notify_one();
    let outcome = task.await.expect("join").expect("rollup");
    assert!(matches!(outcome, RollupOutcome::Written(_)));
}

#[tokio::test]
async fn include_children_false_rolls_parent_alone() {
    let fx = fixture(StubTelemetry {
        ranges: HashMap::new(),
        fail_devices: vec![],
    });
    seed_line(&fx).await;
    let ctx = tenant_ctx();
    // line-1 自身有直连映射与状态
    fx.mappings
        .create_mapping(&ctx, mapping("m-3", "line-1", "dev-3"))
        .await
        .expect("mapping");
    set_state(&fx, "line-1", 18.0, 1_000).await;
    set_state(&fx, "pump-1", 99.0, 1_000).await;

    let mut cfg = config("line-1");
    cfg.include_children = false;
    let outcome = fx
        .engine
        .run_rollup(&ctx, &cfg, 0, 60_000)
        .await
        .expect("rollup");
    let record = match outcome {
        RollupOutcome::Written(record) => record,
        other => panic!("expected written, got {other:?}"),
    };
    assert_eq!(record.sample_count, 1);
    assert_eq!(record.value, 18.0);
}
