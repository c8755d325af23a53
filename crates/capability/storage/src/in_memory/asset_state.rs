//! 资产状态内存存储实现
//!
//! 仅用于本地演示和测试。
//!
//! 功能：
//! - 字段值合并写入（按时间序的后写者胜出）
//! - 汇总派生指标与告警写入
//! - 批量读取（一次锁获取取回全部）

use crate::error::StorageError;
use crate::models::AssetStateRecord;
use crate::traits::AssetStateStore;
use crate::validation::ensure_tenant;
use domain::{AlarmStatus, ScalarValue, TenantContext};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

fn state_key(tenant_id: &str, asset_id: &str) -> String {
    format!("{}:{}", tenant_id, asset_id)
}

/// 资产状态内存存储
///
/// 使用 RwLock + HashMap 提供线程安全的内存存储；
/// 单资产写入在 map 写锁内比较时间戳，天然串行化。
pub struct InMemoryAssetStateStore {
    states: RwLock<HashMap<String, AssetStateRecord>>,
}

impl InMemoryAssetStateStore {
    /// 创建新的状态存储
    pub fn new() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryAssetStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AssetStateStore for InMemoryAssetStateStore {
    /// 合并写入字段值（乱序样本返回 Ok(false)）
    async fn upsert_values(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        values: &BTreeMap<String, ScalarValue>,
        observed_at_ms: i64,
    ) -> Result<bool, StorageError> {
        ensure_tenant(ctx)?;
        let mut map = self
            .states
            .write()
            .map_err(|_| StorageError::backend("lock failed"))?;
        let record = map
            .entry(state_key(&ctx.tenant_id, asset_id))
            .or_insert_with(|| AssetStateRecord::empty(&ctx.tenant_id, asset_id));
        if record.last_updated_at_ms > 0 && observed_at_ms < record.last_updated_at_ms {
            return Ok(false);
        }
        for (field, value) in values {
            record.values.insert(field.clone(), value.clone());
        }
        record.last_updated_at_ms = observed_at_ms;
        Ok(true)
    }

    /// 写入汇总派生指标
    async fn set_calculated_metric(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        metric_name: &str,
        value: f64,
    ) -> Result<(), StorageError> {
        ensure_tenant(ctx)?;
        let mut map = self
            .states
            .write()
            .map_err(|_| StorageError::backend("lock failed"))?;
        let record = map
            .entry(state_key(&ctx.tenant_id, asset_id))
            .or_insert_with(|| AssetStateRecord::empty(&ctx.tenant_id, asset_id));
        record
            .calculated_metrics
            .insert(metric_name.to_string(), value);
        Ok(())
    }

    /// 更新告警状态与计数
    async fn set_alarm(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        status: AlarmStatus,
        alarm_count: i64,
    ) -> Result<(), StorageError> {
        ensure_tenant(ctx)?;
        let mut map = self
            .states
            .write()
            .map_err(|_| StorageError::backend("lock failed"))?;
        let record = map
            .entry(state_key(&ctx.tenant_id, asset_id))
            .or_insert_with(|| AssetStateRecord::empty(&ctx.tenant_id, asset_id));
        record.alarm_status = status;
        record.alarm_count = alarm_count;
        Ok(())
    }

    /// 读取状态快照
    async fn get_state(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Option<AssetStateRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let map = self
            .states
            .read()
            .map_err(|_| StorageError::backend("lock failed"))?;
        Ok(map.get(&state_key(&ctx.tenant_id, asset_id)).cloned())
    }

    /// 批量读取状态
    async fn get_bulk_states(
        &self,
        ctx: &TenantContext,
        asset_ids: &[String],
    ) -> Result<HashMap<String, AssetStateRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let map = self
            .states
            .read()
            .map_err(|_| StorageError::backend("lock failed"))?;
        let mut result = HashMap::new();
        for asset_id in asset_ids {
            if let Some(record) = map.get(&state_key(&ctx.tenant_id, asset_id)) {
                result.insert(asset_id.clone(), record.clone());
            }
        }
        Ok(result)
    }

    /// 人工覆写（无条件赋值）
    async fn override_state(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        values: &BTreeMap<String, ScalarValue>,
        observed_at_ms: i64,
    ) -> Result<(), StorageError> {
        ensure_tenant(ctx)?;
        let mut map = self
            .states
            .write()
            .map_err(|_| StorageError::backend("lock failed"))?;
        let record = map
            .entry(state_key(&ctx.tenant_id, asset_id))
            .or_insert_with(|| AssetStateRecord::empty(&ctx.tenant_id, asset_id));
        for (field, value) in values {
            record.values.insert(field.clone(), value.clone());
        }
        record.last_updated_at_ms = observed_at_ms;
        Ok(())
    }
}
