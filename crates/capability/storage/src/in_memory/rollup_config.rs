//! 汇总配置内存存储实现
//!
//! 仅用于本地演示和测试。

use crate::error::StorageError;
use crate::models::RollupConfigRecord;
use crate::traits::RollupConfigStore;
use crate::validation::{ensure_owned, ensure_tenant};
use domain::TenantContext;
use std::collections::HashMap;
use std::sync::RwLock;

/// 汇总配置内存存储
pub struct InMemoryRollupConfigStore {
    configs: RwLock<HashMap<String, RollupConfigRecord>>,
}

impl InMemoryRollupConfigStore {
    /// 创建新的汇总配置存储
    pub fn new() -> Self {
        Self {
            configs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRollupConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RollupConfigStore for InMemoryRollupConfigStore {
    /// 创建汇总配置
    async fn create_config(
        &self,
        ctx: &TenantContext,
        record: RollupConfigRecord,
    ) -> Result<RollupConfigRecord, StorageError> {
        ensure_owned(ctx, &record.tenant_id)?;
        let mut map = self
            .configs
            .write()
            .map_err(|_| StorageError::backend("lock failed"))?;
        if map.contains_key(&record.config_id) {
            return Err(StorageError::InvalidInput(
                "rollup config already exists".to_string(),
            ));
        }
        map.insert(record.config_id.clone(), record.clone());
        Ok(record)
    }

    /// 查找汇总配置
    async fn find_config(
        &self,
        ctx: &TenantContext,
        config_id: &str,
    ) -> Result<Option<RollupConfigRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let map = self
            .configs
            .read()
            .map_err(|_| StorageError::backend("lock failed"))?;
        Ok(map
            .get(config_id)
            .filter(|item| item.tenant_id == ctx.tenant_id)
            .cloned())
    }

    /// 列出资产的汇总配置
    async fn list_for_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Vec<RollupConfigRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let map = self
            .configs
            .read()
            .map_err(|_| StorageError::backend("lock failed"))?;
        let mut items: Vec<RollupConfigRecord> = map
            .values()
            .filter(|item| item.tenant_id == ctx.tenant_id && item.asset_id == asset_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.metric_name.cmp(&b.metric_name));
        Ok(items)
    }

    /// 列出全部启用的配置（调度器专用）
    async fn list_all_enabled(&self) -> Result<Vec<RollupConfigRecord>, StorageError> {
        let map = self
            .configs
            .read()
            .map_err(|_| StorageError::backend("lock failed"))?;
        let mut items: Vec<RollupConfigRecord> =
            map.values().filter(|item| item.enabled).cloned().collect();
        items.sort_by(|a, b| a.config_id.cmp(&b.config_id));
        Ok(items)
    }

    /// 删除汇总配置
    async fn delete_config(
        &self,
        ctx: &TenantContext,
        config_id: &str,
    ) -> Result<bool, StorageError> {
        ensure_tenant(ctx)?;
        let mut map = self
            .configs
            .write()
            .map_err(|_| StorageError::backend("lock failed"))?;
        match map.get(config_id) {
            Some(item) if item.tenant_id == ctx.tenant_id => {
                map.remove(config_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
