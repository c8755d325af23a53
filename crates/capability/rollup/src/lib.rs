//! 层级汇总引擎
//!
//! 按配置周期性地把子资产的指标聚合到父资产：
//! 1. 对父路径取子树读锁（与 move / 级联删除互斥，与其他汇总共存）
//! 2. 收集参与者：后代（或仅父节点）中映射暴露该指标且启用汇总的
//!    资产，按配置的类型/标签过滤
//! 3. 读取每个参与者的值：默认取当前状态快照；配置带时间窗时改用
//!    遥测历史的窗口均值
//! 4. 单个子节点读取失败只剔除该子节点（记日志 + 计数 + partial
//!    标记），从不中止本轮
//! 5. 零样本跳过（NoData，不写任何记录）；否则追加不可变时间桶
//!    并把值镜像进父资产的 calculated_metrics
//!
//! 调度器：单个 tokio 循环，每拍扫描启用配置并发执行（不相交
//! 子树互不阻塞），通过 watch 通道优雅停机——进行中的锁随任务
//! 结束释放，未完成的桶直接丢弃，下一拍自然重试。

pub mod aggregate;

pub use aggregate::{Sample, aggregate as aggregate_samples};

use async_trait::async_trait;
use domain::TenantContext;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use twin_storage::{
    AssetRecord, AssetStateStore, AssetStore, DataPointMappingRecord, DataPointMappingStore,
    LockMode, RollupConfigRecord, RollupConfigStore, RollupResultRecord, RollupResultStore,
    StorageError, SubtreeLockManager,
};

/// 汇总错误。
#[derive(Debug, thiserror::Error)]
pub enum RollupError {
    #[error("telemetry query error: {0}")]
    Telemetry(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// 遥测历史查询抽象（时序库是外部系统）。
#[async_trait]
pub trait TelemetryQuery: Send + Sync {
    /// 读取设备一组字段的最新值。
    async fn fetch_latest(
        &self,
        ctx: &TenantContext,
        device_id: &str,
        fields: &[String],
    ) -> Result<HashMap<String, f64>, RollupError>;

    /// 读取设备单字段在 `[start_ms, end_ms)` 内的样本序列。
    async fn fetch_range(
        &self,
        ctx: &TenantContext,
        device_id: &str,
        field: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<(i64, f64)>, RollupError>;
}

/// 单轮汇总的结果。
#[derive(Debug)]
pub enum RollupOutcome {
    /// 写入了新的时间桶。
    Written(RollupResultRecord),
    /// 零合格样本，本轮跳过。
    NoData,
    /// 该桶已存在（重复调度），未覆盖。
    BucketExists,
}

/// 汇总引擎。
pub struct RollupEngine {
    assets: Arc<dyn AssetStore>,
    mappings: Arc<dyn DataPointMappingStore>,
    states: Arc<dyn AssetStateStore>,
    results: Arc<dyn RollupResultStore>,
    telemetry: Arc<dyn TelemetryQuery>,
    locks: Arc<SubtreeLockManager>,
}

impl RollupEngine {
    pub fn new(
        assets: Arc<dyn AssetStore>,
        mappings: Arc<dyn DataPointMappingStore>,
        states: Arc<dyn AssetStateStore>,
        results: Arc<dyn RollupResultStore>,
        telemetry: Arc<dyn TelemetryQuery>,
        locks: Arc<SubtreeLockManager>,
    ) -> Self {
        Self {
            assets,
            mappings,
            states,
            results,
            telemetry,
            locks,
        }
    }

    /// 执行一轮汇总，桶为 `[bucket_start_ms, bucket_end_ms)`。
    pub async fn run_rollup(
        &self,
        ctx: &TenantContext,
        config: &RollupConfigRecord,
        bucket_start_ms: i64,
        bucket_end_ms: i64,
    ) -> Result<RollupOutcome, RollupError> {
        twin_telemetry::record_rollup_tick();
        // 读锁在本轮全程持有，结构在聚合中途不会变化。
        // 路径在加锁前读出，加锁后重读校验，不一致说明父节点刚被
        // 移动，释放重试。
        let (parent, _guard) = loop {
            let parent = self
                .assets
                .find_asset(ctx, &config.asset_id)
                .await?
                .ok_or(StorageError::NotFound)?;
            let guard = self.locks.acquire(&parent.path, LockMode::Read).await?;
            let fresh = self
                .assets
                .find_asset(ctx, &config.asset_id)
                .await?
                .ok_or(StorageError::NotFound)?;
            if fresh.path == parent.path {
                break (fresh, guard);
            }
        };

        let members = self.gather_members(ctx, config, &parent).await?;
        let mappings = self.metric_mappings(ctx, config, &members).await?;
        if mappings.is_empty() {
            twin_telemetry::record_rollup_no_data();
            return Ok(RollupOutcome::NoData);
        }

        let (samples, failures) = self
            .read_samples(ctx, config, &mappings, bucket_end_ms)
            .await;
        if samples.is_empty() {
            twin_telemetry::record_rollup_no_data();
            tracing::debug!(
                config_id = %config.config_id,
                metric = %config.metric_name,
                "no qualifying samples, rollup skipped"
            );
            return Ok(RollupOutcome::NoData);
        }

        let partial = failures > 0;
        if partial {
            twin_telemetry::record_rollup_partial();
        }
        let Some(value) = aggregate::aggregate(config.aggregation, &samples) else {
            twin_telemetry::record_rollup_no_data();
            return Ok(RollupOutcome::NoData);
        };

        let record = RollupResultRecord {
            tenant_id: ctx.tenant_id.clone(),
            asset_id: config.asset_id.clone(),
            metric_name: config.metric_name.clone(),
            bucket_start_ms,
            bucket_end_ms,
            value,
            sample_count: samples.len() as u32,
            aggregation: config.aggregation,
            partial,
        };
        let appended = self.results.append_result(ctx, record.clone()).await?;
        if !appended {
            return Ok(RollupOutcome::BucketExists);
        }
        self.states
            .set_calculated_metric(ctx, &config.asset_id, &config.metric_name, value)
            .await?;
        Ok(RollupOutcome::Written(record))
    }

    /// 参与本轮的资产集合（含过滤）。
    async fn gather_members(
        &self,
        ctx: &TenantContext,
        config: &RollupConfigRecord,
        parent: &AssetRecord,
    ) -> Result<Vec<AssetRecord>, RollupError> {
        let mut members = if config.include_children {
            self.assets.list_descendants(ctx, &parent.asset_id).await?
        } else {
            vec![parent.clone()]
        };
        if let Some(filter_type) = &config.filter_asset_type {
            members.retain(|asset| &asset.asset_type == filter_type);
        }
        if let Some(filter_tag) = &config.filter_tag {
            members.retain(|asset| asset.tags.contains(filter_tag));
        }
        Ok(members)
    }

    /// 每个参与资产暴露该指标的映射（取第一条匹配）。
    async fn metric_mappings(
        &self,
        ctx: &TenantContext,
        config: &RollupConfigRecord,
        members: &[AssetRecord],
    ) -> Result<Vec<DataPointMappingRecord>, RollupError> {
        let asset_ids: Vec<String> = members.iter().map(|a| a.asset_id.clone()).collect();
        let all = self.mappings.list_for_assets(ctx, &asset_ids).await?;
        let mut per_asset: Vec<DataPointMappingRecord> = Vec::new();
        for mapping in all {
            if mapping.label != config.metric_name || !mapping.rollup_enabled {
                continue;
            }
            if per_asset.iter().any(|m| m.asset_id == mapping.asset_id) {
                continue;
            }
            per_asset.push(mapping);
        }
        Ok(per_asset)
    }

    /// 逐参与者读值；失败剔除并计数，永不中止。
    async fn read_samples(
        &self,
        ctx: &TenantContext,
        config: &RollupConfigRecord,
        mappings: &[DataPointMappingRecord],
        bucket_end_ms: i64,
    ) -> (Vec<Sample>, usize) {
        let mut samples = Vec::new();
        let mut failures = 0;
        match config.window_seconds {
            Some(window_seconds) => {
                let window_start = bucket_end_ms - (window_seconds as i64) * 1_000;
                for mapping in mappings {
                    match self
                        .telemetry
                        .fetch_range(
                            ctx,
                            &mapping.device_id,
                            &mapping.field_reference,
                            window_start,
                            bucket_end_ms,
                        )
                        .await
                    {
                        Ok(points) if !points.is_empty() => {
                            let mean = points.iter().map(|(_, v)| v).sum::<f64>()
                                / points.len() as f64;
                            samples.push(Sample::new(mean, self.weight_of(config, mapping)));
                        }
                        Ok(_) => {}
                        Err(err) => {
                            failures += 1;
                            twin_telemetry::record_rollup_child_read_failure();
                            tracing::warn!(
                                asset_id = %mapping.asset_id,
                                device_id = %mapping.device_id,
                                error = %err,
                                "child window read failed, excluded from rollup"
                            );
                        }
                    }
                }
            }
            None => {
                let asset_ids: Vec<String> =
                    mappings.iter().map(|m| m.asset_id.clone()).collect();
                match self.states.get_bulk_states(ctx, &asset_ids).await {
                    Ok(states) => {
                        for mapping in mappings {
                            let value = states
                                .get(&mapping.asset_id)
                                .and_then(|state| state.values.get(&mapping.label))
                                .and_then(|value| value.as_f64());
                            if let Some(value) = value {
                                samples.push(Sample::new(value, self.weight_of(config, mapping)));
                            }
                        }
                    }
                    Err(err) => {
                        // 批量读取失败等价于所有子节点失败
                        failures += mappings.len();
                        twin_telemetry::record_rollup_child_read_failure();
                        tracing::warn!(
                            config_id = %config.config_id,
                            error = %err,
                            "bulk state read failed, rollup has no participants"
                        );
                    }
                }
            }
        }
        (samples, failures)
    }

    fn weight_of(&self, config: &RollupConfigRecord, mapping: &DataPointMappingRecord) -> f64 {
        config
            .weight_factors
            .get(&mapping.asset_id)
            .copied()
            .unwrap_or(1.0)
    }
}

/// 汇总调度器。
pub struct RollupScheduler {
    engine: Arc<RollupEngine>,
    configs: Arc<dyn RollupConfigStore>,
    tick: Duration,
}

impl RollupScheduler {
    pub fn new(
        engine: Arc<RollupEngine>,
        configs: Arc<dyn RollupConfigStore>,
        tick: Duration,
    ) -> Self {
        Self {
            engine,
            configs,
            tick,
        }
    }

    /// 调度循环；`shutdown` 置 true 后在当前拍边界退出。
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick_once(now_ms()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("rollup scheduler stopping");
                        return;
                    }
                }
            }
        }
    }

    /// 扫描启用配置并并发执行到期的桶。
    pub async fn tick_once(&self, now_ms: i64) {
        let configs = match self.configs.list_all_enabled().await {
            Ok(configs) => configs,
            Err(err) => {
                tracing::error!(error = %err, "failed to list rollup configs");
                return;
            }
        };
        let mut tasks = Vec::new();
        for config in configs {
            let interval_ms = (config.interval_seconds as i64).max(1) * 1_000;
            let bucket_end = now_ms - now_ms.rem_euclid(interval_ms);
            let bucket_start = bucket_end - interval_ms;
            if bucket_start < 0 {
                continue;
            }
            let engine = Arc::clone(&self.engine);
            tasks.push(tokio::spawn(async move {
                let ctx = TenantContext::system(config.tenant_id.clone());
                match engine
                    .run_rollup(&ctx, &config, bucket_start, bucket_end)
                    .await
                {
                    Ok(RollupOutcome::Written(record)) => {
                        tracing::debug!(
                            config_id = %config.config_id,
                            value = record.value,
                            sample_count = record.sample_count,
                            "rollup bucket written"
                        );
                    }
                    Ok(RollupOutcome::NoData) | Ok(RollupOutcome::BucketExists) => {}
                    Err(err) => {
                        tracing::error!(
                            config_id = %config.config_id,
                            error = %err,
                            "rollup run failed"
                        );
                    }
                }
            }));
        }
        for task in tasks {
            let _ = task.await;
        }
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
