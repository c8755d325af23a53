//! 汇总结果内存存储实现
//!
//! 仅用于本地演示和测试。
//!
//! 时间桶只追加：同一 `(asset_id, metric, bucket_start)` 的桶
//! 已存在时不覆盖，返回 Ok(false)。

use crate::error::StorageError;
use crate::models::RollupResultRecord;
use crate::traits::RollupResultStore;
use crate::validation::{ensure_owned, ensure_tenant};
use domain::TenantContext;
use std::sync::RwLock;

/// 汇总结果内存存储
pub struct InMemoryRollupResultStore {
    results: RwLock<Vec<RollupResultRecord>>,
}

impl InMemoryRollupResultStore {
    /// 创建新的汇总结果存储
    pub fn new() -> Self {
        Self {
            results: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryRollupResultStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RollupResultStore for InMemoryRollupResultStore {
    /// 追加一个时间桶
    async fn append_result(
        &self,
        ctx: &TenantContext,
        record: RollupResultRecord,
    ) -> Result<bool, StorageError> {
        ensure_owned(ctx, &record.tenant_id)?;
        let mut items = self
            .results
            .write()
            .map_err(|_| StorageError::backend("lock failed"))?;
        let exists = items.iter().any(|item| {
            item.tenant_id == record.tenant_id
                && item.asset_id == record.asset_id
                && item.metric_name == record.metric_name
                && item.bucket_start_ms == record.bucket_start_ms
        });
        if exists {
            return Ok(false);
        }
        items.push(record);
        Ok(true)
    }

    /// 查询时间序列
    async fn query_series(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        metric_name: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<RollupResultRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let items = self
            .results
            .read()
            .map_err(|_| StorageError::backend("lock failed"))?;
        let mut series: Vec<RollupResultRecord> = items
            .iter()
            .filter(|item| {
                item.tenant_id == ctx.tenant_id
                    && item.asset_id == asset_id
                    && item.metric_name == metric_name
                    && item.bucket_start_ms >= start_ms
                    && item.bucket_start_ms < end_ms
            })
            .cloned()
            .collect();
        series.sort_by_key(|item| item.bucket_start_ms);
        Ok(series)
    }
}
