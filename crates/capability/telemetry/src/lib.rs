//! 追踪与请求 ID 生成。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 基础指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub telemetry_batches: u64,
    pub telemetry_values: u64,
    pub dropped_out_of_order: u64,
    pub dropped_unmapped: u64,
    pub state_write_success: u64,
    pub state_write_failure: u64,
    pub alarms_raised: u64,
    pub rollup_ticks: u64,
    pub rollup_no_data: u64,
    pub rollup_partial: u64,
    pub rollup_child_read_failures: u64,
    pub asset_moves: u64,
    pub asset_cascade_deletes: u64,
    pub field_sync_created: u64,
}

/// 基础指标。
pub struct TwinMetrics {
    telemetry_batches: AtomicU64,
    telemetry_values: AtomicU64,
    dropped_out_of_order: AtomicU64,
    dropped_unmapped: AtomicU64,
    state_write_success: AtomicU64,
    state_write_failure: AtomicU64,
    alarms_raised: AtomicU64,
    rollup_ticks: AtomicU64,
    rollup_no_data: AtomicU64,
    rollup_partial: AtomicU64,
    rollup_child_read_failures: AtomicU64,
    asset_moves: AtomicU64,
    asset_cascade_deletes: AtomicU64,
    field_sync_created: AtomicU64,
}

impl TwinMetrics {
    pub fn new() -> Self {
        Self {
            telemetry_batches: AtomicU64::new(0),
            telemetry_values: AtomicU64::new(0),
            dropped_out_of_order: AtomicU64::new(0),
            dropped_unmapped: AtomicU64::new(0),
            state_write_success: AtomicU64::new(0),
            state_write_failure: AtomicU64::new(0),
            alarms_raised: AtomicU64::new(0),
            rollup_ticks: AtomicU64::new(0),
            rollup_no_data: AtomicU64::new(0),
            rollup_partial: AtomicU64::new(0),
            rollup_child_read_failures: AtomicU64::new(0),
            asset_moves: AtomicU64::new(0),
            asset_cascade_deletes: AtomicU64::new(0),
            field_sync_created: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            telemetry_batches: self.telemetry_batches.load(Ordering::Relaxed),
            telemetry_values: self.telemetry_values.load(Ordering::Relaxed),
            dropped_out_of_order: self.dropped_out_of_order.load(Ordering::Relaxed),
            dropped_unmapped: self.dropped_unmapped.load(Ordering::Relaxed),
            state_write_success: self.state_write_success.load(Ordering::Relaxed),
            state_write_failure: self.state_write_failure.load(Ordering::Relaxed),
            alarms_raised: self.alarms_raised.load(Ordering::Relaxed),
            rollup_ticks: self.rollup_ticks.load(Ordering::Relaxed),
            rollup_no_data: self.rollup_no_data.load(Ordering::Relaxed),
            rollup_partial: self.rollup_partial.load(Ordering::Relaxed),
            rollup_child_read_failures: self.rollup_child_read_failures.load(Ordering::Relaxed),
            asset_moves: self.asset_moves.load(Ordering::Relaxed),
            asset_cascade_deletes: self.asset_cascade_deletes.load(Ordering::Relaxed),
            field_sync_created: self.field_sync_created.load(Ordering::Relaxed),
        }
    }
}

static METRICS: OnceLock<TwinMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TwinMetrics {
    METRICS.get_or_init(TwinMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录遥测批次接收次数。
pub fn record_telemetry_batch() {
    metrics().telemetry_batches.fetch_add(1, Ordering::Relaxed);
}

/// 记录遥测字段值接收次数。
pub fn record_telemetry_values(count: u64) {
    metrics()
        .telemetry_values
        .fetch_add(count, Ordering::Relaxed);
}

/// 记录乱序样本丢弃次数。
pub fn record_dropped_out_of_order() {
    metrics()
        .dropped_out_of_order
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录未映射字段丢弃次数。
pub fn record_dropped_unmapped() {
    metrics().dropped_unmapped.fetch_add(1, Ordering::Relaxed);
}

/// 记录状态写入成功次数。
pub fn record_state_write_success() {
    metrics()
        .state_write_success
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录状态写入失败次数。
pub fn record_state_write_failure() {
    metrics()
        .state_write_failure
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录告警升级次数（Normal 以上）。
pub fn record_alarm_raised() {
    metrics().alarms_raised.fetch_add(1, Ordering::Relaxed);
}

/// 记录汇总执行次数。
pub fn record_rollup_tick() {
    metrics().rollup_ticks.fetch_add(1, Ordering::Relaxed);
}

/// 记录无数据跳过的汇总次数。
pub fn record_rollup_no_data() {
    metrics().rollup_no_data.fetch_add(1, Ordering::Relaxed);
}

/// 记录部分参与的汇总次数（有子节点被剔除）。
pub fn record_rollup_partial() {
    metrics().rollup_partial.fetch_add(1, Ordering::Relaxed);
}

/// 记录子节点状态读取失败次数。
pub fn record_rollup_child_read_failure() {
    metrics()
        .rollup_child_read_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录资产移动次数。
pub fn record_asset_move() {
    metrics().asset_moves.fetch_add(1, Ordering::Relaxed);
}

/// 记录级联删除次数。
pub fn record_asset_cascade_delete() {
    metrics()
        .asset_cascade_deletes
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录字段目录同步新建条数。
pub fn record_field_sync_created(count: u64) {
    metrics()
        .field_sync_created
        .fetch_add(count, Ordering::Relaxed);
}
