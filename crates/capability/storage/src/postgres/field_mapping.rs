//! Postgres 字段映射存储实现
//!
//! `(tenant_id, device_type_id, field_name)` 为主键。
//! synchronize 通过 insert_field 的 insert-if-absent 语义保持幂等，
//! 已有记录（含用户定制）不被覆盖。

use crate::error::StorageError;
use crate::models::{FieldMappingEdit, FieldMappingRecord};
use crate::traits::FieldMappingStore;
use crate::validation::{ensure_owned, ensure_tenant};
use domain::{AggregationMethod, DataType, FieldSource, TenantContext};
use sqlx::{PgPool, Row};

const FIELD_COLUMNS: &str = "tenant_id, device_type_id, field_name, source, friendly_name, \
     description, data_type, unit, min_value, max_value, is_queryable, is_visible, \
     display_order, category, default_aggregation";

pub struct PgFieldMappingStore {
    pub pool: PgPool,
}

impl PgFieldMappingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<FieldMappingRecord, StorageError> {
        let source: String = row.try_get("source")?;
        let data_type: String = row.try_get("data_type")?;
        let default_aggregation: String = row.try_get("default_aggregation")?;
        Ok(FieldMappingRecord {
            tenant_id: row.try_get("tenant_id")?,
            device_type_id: row.try_get("device_type_id")?,
            field_name: row.try_get("field_name")?,
            source: FieldSource::parse(&source)
                .ok_or_else(|| StorageError::backend("invalid source in row"))?,
            friendly_name: row.try_get("friendly_name")?,
            description: row.try_get("description")?,
            data_type: DataType::parse(&data_type)
                .ok_or_else(|| StorageError::backend("invalid data_type in row"))?,
            unit: row.try_get("unit")?,
            min_value: row.try_get("min_value")?,
            max_value: row.try_get("max_value")?,
            is_queryable: row.try_get("is_queryable")?,
            is_visible: row.try_get("is_visible")?,
            display_order: row.try_get("display_order")?,
            category: row.try_get("category")?,
            default_aggregation: AggregationMethod::parse(&default_aggregation)
                .ok_or_else(|| StorageError::backend("invalid aggregation in row"))?,
        })
    }
}

#[async_trait::async_trait]
impl FieldMappingStore for PgFieldMappingStore {
    async fn list_for_device_type(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
    ) -> Result<Vec<FieldMappingRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let rows = sqlx::query(&format!(
            "select {} from field_mappings \
             where tenant_id = $1 and device_type_id = $2 \
             order by display_order, field_name",
            FIELD_COLUMNS
        ))
        .bind(&ctx.tenant_id)
        .bind(device_type_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn find_field(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
        field_name: &str,
    ) -> Result<Option<FieldMappingRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let row = sqlx::query(&format!(
            "select {} from field_mappings \
             where tenant_id = $1 and device_type_id = $2 and field_name = $3",
            FIELD_COLUMNS
        ))
        .bind(&ctx.tenant_id)
        .bind(device_type_id)
        .bind(field_name)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(Self::row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_field(
        &self,
        ctx: &TenantContext,
        record: FieldMappingRecord,
    ) -> Result<FieldMappingRecord, StorageError> {
        ensure_owned(ctx, &record.tenant_id)?;
        let result = sqlx::query(
            "insert into field_mappings (tenant_id, device_type_id, field_name, source, \
             friendly_name, description, data_type, unit, min_value, max_value, \
             is_queryable, is_visible, display_order, category, default_aggregation) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             on conflict (tenant_id, device_type_id, field_name) do nothing",
        )
        .bind(&record.tenant_id)
        .bind(&record.device_type_id)
        .bind(&record.field_name)
        .bind(record.source.as_str())
        .bind(&record.friendly_name)
        .bind(&record.description)
        .bind(record.data_type.as_str())
        .bind(&record.unit)
        .bind(record.min_value)
        .bind(record.max_value)
        .bind(record.is_queryable)
        .bind(record.is_visible)
        .bind(record.display_order)
        .bind(&record.category)
        .bind(record.default_aggregation.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::DuplicateFieldName(record.field_name));
        }
        Ok(record)
    }

    async fn update_field(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
        field_name: &str,
        edit: FieldMappingEdit,
    ) -> Result<Option<FieldMappingRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let row = sqlx::query(&format!(
            "update field_mappings set \
             friendly_name = coalesce($1, friendly_name), \
             description = coalesce($2, description), \
             unit = coalesce($3, unit), \
             is_visible = coalesce($4, is_visible), \
             display_order = coalesce($5, display_order), \
             category = coalesce($6, category), \
             default_aggregation = coalesce($7, default_aggregation) \
             where tenant_id = $8 and device_type_id = $9 and field_name = $10 \
             returning {}",
            FIELD_COLUMNS
        ))
        .bind(edit.friendly_name)
        .bind(edit.description)
        .bind(edit.unit)
        .bind(edit.is_visible)
        .bind(edit.display_order)
        .bind(edit.category)
        .bind(
            edit.default_aggregation
                .map(|aggregation| aggregation.as_str().to_string()),
        )
        .bind(&ctx.tenant_id)
        .bind(device_type_id)
        .bind(field_name)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(Self::row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn delete_for_device_type(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
    ) -> Result<usize, StorageError> {
        ensure_tenant(ctx)?;
        let result =
            sqlx::query("delete from field_mappings where tenant_id = $1 and device_type_id = $2")
                .bind(&ctx.tenant_id)
                .bind(device_type_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() as usize)
    }
}
