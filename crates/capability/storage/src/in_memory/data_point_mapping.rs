//! 数据点映射内存存储实现
//!
//! 仅用于本地演示和测试。
//!
//! 功能：
//! - 映射 CRUD 操作
//! - `(device_id, field_reference)` 唯一性约束（一个设备字段
//!   只允许绑定一个资产，汇总正确性依赖此约束）
//! - 租户隔离验证

use crate::error::StorageError;
use crate::models::DataPointMappingRecord;
use crate::traits::DataPointMappingStore;
use crate::validation::{ensure_owned, ensure_tenant};
use domain::TenantContext;
use std::collections::HashMap;
use std::sync::RwLock;

/// 数据点映射内存存储
///
/// 使用 RwLock + HashMap 提供线程安全的内存存储。
pub struct InMemoryDataPointMappingStore {
    mappings: RwLock<HashMap<String, DataPointMappingRecord>>,
}

impl InMemoryDataPointMappingStore {
    /// 创建新的映射存储
    pub fn new() -> Self {
        Self {
            mappings: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryDataPointMappingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DataPointMappingStore for InMemoryDataPointMappingStore {
    /// 创建映射
    async fn create_mapping(
        &self,
        ctx: &TenantContext,
        record: DataPointMappingRecord,
    ) -> Result<DataPointMappingRecord, StorageError> {
        ensure_owned(ctx, &record.tenant_id)?;
        let mut map = self
            .mappings
            .write()
            .map_err(|_| StorageError::backend("lock failed"))?;
        let duplicate = map.values().any(|item| {
            item.tenant_id == record.tenant_id
                && item.device_id == record.device_id
                && item.field_reference == record.field_reference
        });
        if duplicate || map.contains_key(&record.mapping_id) {
            return Err(StorageError::DuplicateMapping);
        }
        map.insert(record.mapping_id.clone(), record.clone());
        Ok(record)
    }

    /// 查找映射
    async fn find_mapping(
        &self,
        ctx: &TenantContext,
        mapping_id: &str,
    ) -> Result<Option<DataPointMappingRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let map = self
            .mappings
            .read()
            .map_err(|_| StorageError::backend("lock failed"))?;
        Ok(map
            .get(mapping_id)
            .filter(|item| item.tenant_id == ctx.tenant_id)
            .cloned())
    }

    /// 按设备字段查找映射
    async fn find_for_device_field(
        &self,
        ctx: &TenantContext,
        device_id: &str,
        field_reference: &str,
    ) -> Result<Option<DataPointMappingRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let map = self
            .mappings
            .read()
            .map_err(|_| StorageError::backend("lock failed"))?;
        Ok(map
            .values()
            .find(|item| {
                item.tenant_id == ctx.tenant_id
                    && item.device_id == device_id
                    && item.field_reference == field_reference
            })
            .cloned())
    }

    /// 列出资产的全部映射
    async fn list_for_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Vec<DataPointMappingRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let map = self
            .mappings
            .read()
            .map_err(|_| StorageError::backend("lock failed"))?;
        let mut items: Vec<DataPointMappingRecord> = map
            .values()
            .filter(|item| item.tenant_id == ctx.tenant_id && item.asset_id == asset_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(items)
    }

    /// 列出设备的全部映射
    async fn list_for_device(
        &self,
        ctx: &TenantContext,
        device_id: &str,
    ) -> Result<Vec<DataPointMappingRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let map = self
            .mappings
            .read()
            .map_err(|_| StorageError::backend("lock failed"))?;
        let mut items: Vec<DataPointMappingRecord> = map
            .values()
            .filter(|item| item.tenant_id == ctx.tenant_id && item.device_id == device_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.field_reference.cmp(&b.field_reference));
        Ok(items)
    }

    /// 批量列出一组资产的映射
    async fn list_for_assets(
        &self,
        ctx: &TenantContext,
        asset_ids: &[String],
    ) -> Result<Vec<DataPointMappingRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let map = self
            .mappings
            .read()
            .map_err(|_| StorageError::backend("lock failed"))?;
        let mut items: Vec<DataPointMappingRecord> = map
            .values()
            .filter(|item| {
                item.tenant_id == ctx.tenant_id
                    && asset_ids.iter().any(|id| id == &item.asset_id)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.asset_id.cmp(&b.asset_id).then_with(|| a.label.cmp(&b.label)));
        Ok(items)
    }

    /// 删除映射
    async fn delete_mapping(
        &self,
        ctx: &TenantContext,
        mapping_id: &str,
    ) -> Result<bool, StorageError> {
        ensure_tenant(ctx)?;
        let mut map = self
            .mappings
            .write()
            .map_err(|_| StorageError::backend("lock failed"))?;
        match map.get(mapping_id) {
            Some(item) if item.tenant_id == ctx.tenant_id => {
                map.remove(mapping_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
