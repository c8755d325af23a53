//! 字段映射解析器
//!
//! 设备类型的字段目录由三个来源合并产生：
//! - System：平台内建字段（电量、信号强度、坐标、固件版本）
//! - Schema：设备类型模式解析出的字段
//! - Custom：用户在设备类型上临时声明的字段
//!
//! 合并规则：已存储的映射原样保留（用户定制永不被覆盖），
//! 缺失的候选按标题式友好名合成并落库。synchronize 幂等，
//! 重复执行不产生变化。

pub mod schema;

pub use schema::{DeviceSchema, FieldDescriptor, RecordField, map_data_type};

use async_trait::async_trait;
use domain::{AggregationMethod, DataType, FieldSource, TenantContext};
use std::sync::Arc;
use twin_storage::{FieldMappingEdit, FieldMappingRecord, FieldMappingStore, StorageError};

/// 平台内建字段列表（所有设备类型共有）。
const SYSTEM_FIELDS: &[(&str, DataType, Option<&str>)] = &[
    ("battery_level", DataType::Number, Some("%")),
    ("signal_strength", DataType::Number, Some("dBm")),
    ("latitude", DataType::Number, None),
    ("longitude", DataType::Number, None),
    ("firmware_version", DataType::String, None),
];

/// 字段映射错误。
#[derive(Debug, thiserror::Error)]
pub enum FieldMapError {
    #[error("schema provider error: {0}")]
    Provider(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// 设备类型模式提供者抽象。
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// 获取设备类型的模式（无模式返回 None）。
    async fn get_schema(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
    ) -> Result<Option<DeviceSchema>, FieldMapError>;

    /// 获取设备类型上用户声明的临时字段。
    async fn custom_fields(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
    ) -> Result<Vec<FieldDescriptor>, FieldMapError>;
}

/// 单条批量编辑的结果。
#[derive(Debug)]
pub struct EditOutcome {
    pub field_name: String,
    pub updated: bool,
    pub error: Option<FieldMapError>,
}

/// 字段映射解析器。
pub struct FieldMappingResolver {
    store: Arc<dyn FieldMappingStore>,
    provider: Arc<dyn SchemaProvider>,
}

impl FieldMappingResolver {
    pub fn new(store: Arc<dyn FieldMappingStore>, provider: Arc<dyn SchemaProvider>) -> Self {
        Self { store, provider }
    }

    /// 收集三个来源的候选字段（System 在前，Schema 次之，Custom 最后）。
    async fn collect_candidates(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
    ) -> Result<Vec<(FieldSource, FieldDescriptor)>, FieldMapError> {
        let mut candidates: Vec<(FieldSource, FieldDescriptor)> = SYSTEM_FIELDS
            .iter()
            .map(|(name, data_type, unit)| {
                (
                    FieldSource::System,
                    FieldDescriptor {
                        field_name: name.to_string(),
                        friendly_name: None,
                        description: None,
                        data_type: *data_type,
                        unit: unit.map(str::to_string),
                        min_value: None,
                        max_value: None,
                    },
                )
            })
            .collect();
        if let Some(device_schema) = self.provider.get_schema(ctx, device_type_id).await? {
            for descriptor in schema::parse_schema(&device_schema) {
                candidates.push((FieldSource::Schema, descriptor));
            }
        }
        for descriptor in self.provider.custom_fields(ctx, device_type_id).await? {
            candidates.push((FieldSource::Custom, descriptor));
        }
        Ok(candidates)
    }

    /// 合并三来源并落库缺失候选，返回新建数量。
    ///
    /// 幂等：已存储的记录（含用户定制）保持不动。
    pub async fn synchronize(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
    ) -> Result<usize, FieldMapError> {
        let candidates = self.collect_candidates(ctx, device_type_id).await?;
        let existing = self.store.list_for_device_type(ctx, device_type_id).await?;
        let mut next_order = existing
            .iter()
            .map(|record| record.display_order)
            .max()
            .map(|order| order + 1)
            .unwrap_or(0);
        let mut created = 0;
        for (source, descriptor) in candidates {
            let known = existing
                .iter()
                .any(|record| record.field_name == descriptor.field_name);
            if known {
                continue;
            }
            let friendly_name = descriptor
                .friendly_name
                .clone()
                .unwrap_or_else(|| schema::title_case(&descriptor.field_name));
            let record = FieldMappingRecord {
                tenant_id: ctx.tenant_id.clone(),
                device_type_id: device_type_id.to_string(),
                field_name: descriptor.field_name,
                source,
                friendly_name,
                description: descriptor.description,
                data_type: descriptor.data_type,
                unit: descriptor.unit,
                min_value: descriptor.min_value,
                max_value: descriptor.max_value,
                is_queryable: true,
                is_visible: true,
                display_order: next_order,
                category: None,
                default_aggregation: AggregationMethod::Last,
            };
            match self.store.insert_field(ctx, record).await {
                Ok(_) => {
                    created += 1;
                    next_order += 1;
                }
                // 并发 synchronize 先到先得，本次视为已存在
                Err(StorageError::DuplicateFieldName(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(created)
    }

    /// 获取设备类型的完整字段目录（先合并再读取）。
    pub async fn mappings_for_device_type(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
    ) -> Result<Vec<FieldMappingRecord>, FieldMapError> {
        self.synchronize(ctx, device_type_id).await?;
        Ok(self.store.list_for_device_type(ctx, device_type_id).await?)
    }

    /// 批量编辑用户可编辑属性，逐条返回结果。
    ///
    /// 友好名改名与目录内其他字段的字段名或友好名冲突
    /// （大小写不敏感）时该条返回 DuplicateFieldName。
    pub async fn update_many(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
        edits: Vec<(String, FieldMappingEdit)>,
    ) -> Result<Vec<EditOutcome>, FieldMapError> {
        let mut outcomes = Vec::with_capacity(edits.len());
        for (field_name, edit) in edits {
            if let Some(new_name) = edit.friendly_name.as_deref() {
                let catalog = self.store.list_for_device_type(ctx, device_type_id).await?;
                let collides = catalog.iter().any(|record| {
                    record.field_name != field_name
                        && (record.friendly_name.eq_ignore_ascii_case(new_name)
                            || record.field_name.eq_ignore_ascii_case(new_name))
                });
                if collides {
                    outcomes.push(EditOutcome {
                        field_name,
                        updated: false,
                        error: Some(
                            StorageError::DuplicateFieldName(new_name.to_string()).into(),
                        ),
                    });
                    continue;
                }
            }
            match self
                .store
                .update_field(ctx, device_type_id, &field_name, edit)
                .await
            {
                Ok(Some(_)) => outcomes.push(EditOutcome {
                    field_name,
                    updated: true,
                    error: None,
                }),
                Ok(None) => outcomes.push(EditOutcome {
                    field_name,
                    updated: false,
                    error: Some(StorageError::NotFound.into()),
                }),
                Err(err) => outcomes.push(EditOutcome {
                    field_name,
                    updated: false,
                    error: Some(err.into()),
                }),
            }
        }
        Ok(outcomes)
    }

    /// 按友好名或原始字段名解析（大小写不敏感）。
    pub async fn resolve(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
        name_or_field: &str,
    ) -> Result<FieldMappingRecord, FieldMapError> {
        let catalog = self.store.list_for_device_type(ctx, device_type_id).await?;
        let hit = catalog.iter().find(|record| {
            record.field_name.eq_ignore_ascii_case(name_or_field)
                || record.friendly_name.eq_ignore_ascii_case(name_or_field)
        });
        match hit {
            Some(record) => Ok(record.clone()),
            None => {
                let known = catalog
                    .iter()
                    .map(|record| record.field_name.as_str())
                    .collect::<Vec<&str>>()
                    .join(", ");
                Err(StorageError::UnknownField {
                    name: name_or_field.to_string(),
                    known,
                }
                .into())
            }
        }
    }
}
