//! 字段映射内存存储实现
//!
//! 仅用于本地演示和测试。
//!
//! 功能：
//! - 字段映射插入/更新/级联删除
//! - `(device_type_id, field_name)` 唯一性约束
//! - 已存在记录在 synchronize 中保持不动（用户定制不被覆盖）

use crate::error::StorageError;
use crate::models::{FieldMappingEdit, FieldMappingRecord};
use crate::traits::FieldMappingStore;
use crate::validation::{ensure_owned, ensure_tenant};
use domain::TenantContext;
use std::collections::HashMap;
use std::sync::RwLock;

fn field_key(tenant_id: &str, device_type_id: &str, field_name: &str) -> String {
    format!("{}:{}:{}", tenant_id, device_type_id, field_name)
}

/// 字段映射内存存储
///
/// 使用 RwLock + HashMap 提供线程安全的内存存储。
pub struct InMemoryFieldMappingStore {
    fields: RwLock<HashMap<String, FieldMappingRecord>>,
}

impl InMemoryFieldMappingStore {
    /// 创建新的字段映射存储
    pub fn new() -> Self {
        Self {
            fields: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryFieldMappingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl FieldMappingStore for InMemoryFieldMappingStore {
    /// 列出设备类型的全部字段映射
    async fn list_for_device_type(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
    ) -> Result<Vec<FieldMappingRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let map = self
            .fields
            .read()
            .map_err(|_| StorageError::backend("lock failed"))?;
        let mut items: Vec<FieldMappingRecord> = map
            .values()
            .filter(|item| {
                item.tenant_id == ctx.tenant_id && item.device_type_id == device_type_id
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then_with(|| a.field_name.cmp(&b.field_name))
        });
        Ok(items)
    }

    /// 查找字段映射
    async fn find_field(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
        field_name: &str,
    ) -> Result<Option<FieldMappingRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let map = self
            .fields
            .read()
            .map_err(|_| StorageError::backend("lock failed"))?;
        Ok(map
            .get(&field_key(&ctx.tenant_id, device_type_id, field_name))
            .cloned())
    }

    /// 插入新字段映射
    async fn insert_field(
        &self,
        ctx: &TenantContext,
        record: FieldMappingRecord,
    ) -> Result<FieldMappingRecord, StorageError> {
        ensure_owned(ctx, &record.tenant_id)?;
        let mut map = self
            .fields
            .write()
            .map_err(|_| StorageError::backend("lock failed"))?;
        let key = field_key(&record.tenant_id, &record.device_type_id, &record.field_name);
        if map.contains_key(&key) {
            return Err(StorageError::DuplicateFieldName(record.field_name));
        }
        map.insert(key, record.clone());
        Ok(record)
    }

    /// 更新用户可编辑属性
    async fn update_field(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
        field_name: &str,
        edit: FieldMappingEdit,
    ) -> Result<Option<FieldMappingRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let mut map = self
            .fields
            .write()
            .map_err(|_| StorageError::backend("lock failed"))?;
        let key = field_key(&ctx.tenant_id, device_type_id, field_name);
        let record = match map.get_mut(&key) {
            Some(record) => record,
            None => return Ok(None),
        };
        if let Some(friendly_name) = edit.friendly_name {
            record.friendly_name = friendly_name;
        }
        if let Some(description) = edit.description {
            record.description = Some(description);
        }
        if let Some(unit) = edit.unit {
            record.unit = Some(unit);
        }
        if let Some(is_visible) = edit.is_visible {
            record.is_visible = is_visible;
        }
        if let Some(display_order) = edit.display_order {
            record.display_order = display_order;
        }
        if let Some(category) = edit.category {
            record.category = Some(category);
        }
        if let Some(default_aggregation) = edit.default_aggregation {
            record.default_aggregation = default_aggregation;
        }
        Ok(Some(record.clone()))
    }

    /// 级联删除设备类型的全部字段映射
    async fn delete_for_device_type(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
    ) -> Result<usize, StorageError> {
        ensure_tenant(ctx)?;
        let mut map = self
            .fields
            .write()
            .map_err(|_| StorageError::backend("lock failed"))?;
        let doomed: Vec<String> = map
            .iter()
            .filter(|(_, item)| {
                item.tenant_id == ctx.tenant_id && item.device_type_id == device_type_id
            })
            .map(|(key, _)| key.clone())
            .collect();
        let count = doomed.len();
        for key in doomed {
            map.remove(&key);
        }
        Ok(count)
    }
}
