//! Postgres 数据点映射存储实现
//!
//! `(tenant_id, device_id, field_reference)` 上建有唯一索引，
//! 重复绑定由数据库约束兜底，应用层先查后插给出明确错误。

use crate::error::StorageError;
use crate::models::DataPointMappingRecord;
use crate::traits::DataPointMappingStore;
use crate::validation::{ensure_owned, ensure_tenant};
use domain::{AggregationMethod, TenantContext};
use sqlx::{PgPool, Row};

const MAPPING_COLUMNS: &str = "mapping_id, tenant_id, asset_id, device_id, field_reference, \
     label, unit, aggregation, rollup_enabled, transform_expression, \
     warn_low, warn_high, crit_low, crit_high";

pub struct PgDataPointMappingStore {
    pub pool: PgPool,
}

impl PgDataPointMappingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<DataPointMappingRecord, StorageError> {
        let aggregation: String = row.try_get("aggregation")?;
        Ok(DataPointMappingRecord {
            mapping_id: row.try_get("mapping_id")?,
            tenant_id: row.try_get("tenant_id")?,
            asset_id: row.try_get("asset_id")?,
            device_id: row.try_get("device_id")?,
            field_reference: row.try_get("field_reference")?,
            label: row.try_get("label")?,
            unit: row.try_get("unit")?,
            aggregation: AggregationMethod::parse(&aggregation)
                .ok_or_else(|| StorageError::backend("invalid aggregation in row"))?,
            rollup_enabled: row.try_get("rollup_enabled")?,
            transform_expression: row.try_get("transform_expression")?,
            warn_low: row.try_get("warn_low")?,
            warn_high: row.try_get("warn_high")?,
            crit_low: row.try_get("crit_low")?,
            crit_high: row.try_get("crit_high")?,
        })
    }
}

#[async_trait::async_trait]
impl DataPointMappingStore for PgDataPointMappingStore {
    async fn create_mapping(
        &self,
        ctx: &TenantContext,
        record: DataPointMappingRecord,
    ) -> Result<DataPointMappingRecord, StorageError> {
        ensure_owned(ctx, &record.tenant_id)?;
        let existing = self
            .find_for_device_field(ctx, &record.device_id, &record.field_reference)
            .await?;
        if existing.is_some() {
            return Err(StorageError::DuplicateMapping);
        }
        sqlx::query(
            "insert into data_point_mappings (mapping_id, tenant_id, asset_id, device_id, \
             field_reference, label, unit, aggregation, rollup_enabled, transform_expression, \
             warn_low, warn_high, crit_low, crit_high) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(&record.mapping_id)
        .bind(&record.tenant_id)
        .bind(&record.asset_id)
        .bind(&record.device_id)
        .bind(&record.field_reference)
        .bind(&record.label)
        .bind(&record.unit)
        .bind(record.aggregation.as_str())
        .bind(record.rollup_enabled)
        .bind(&record.transform_expression)
        .bind(record.warn_low)
        .bind(record.warn_high)
        .bind(record.crit_low)
        .bind(record.crit_high)
        .execute(&self.pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::DuplicateMapping,
            _ => err.into(),
        })?;
        Ok(record)
    }

    async fn find_mapping(
        &self,
        ctx: &TenantContext,
        mapping_id: &str,
    ) -> Result<Option<DataPointMappingRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let row = sqlx::query(&format!(
            "select {} from data_point_mappings \
             where tenant_id = $1 and mapping_id = $2",
            MAPPING_COLUMNS
        ))
        .bind(&ctx.tenant_id)
        .bind(mapping_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(Self::row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_for_device_field(
        &self,
        ctx: &TenantContext,
        device_id: &str,
        field_reference: &str,
    ) -> Result<Option<DataPointMappingRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let row = sqlx::query(&format!(
            "select {} from data_point_mappings \
             where tenant_id = $1 and device_id = $2 and field_reference = $3",
            MAPPING_COLUMNS
        ))
        .bind(&ctx.tenant_id)
        .bind(device_id)
        .bind(field_reference)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(Self::row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_for_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Vec<DataPointMappingRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let rows = sqlx::query(&format!(
            "select {} from data_point_mappings \
             where tenant_id = $1 and asset_id = $2 order by label",
            MAPPING_COLUMNS
        ))
        .bind(&ctx.tenant_id)
        .bind(asset_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn list_for_device(
        &self,
        ctx: &TenantContext,
        device_id: &str,
    ) -> Result<Vec<DataPointMappingRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let rows = sqlx::query(&format!(
            "select {} from data_point_mappings \
             where tenant_id = $1 and device_id = $2 order by field_reference",
            MAPPING_COLUMNS
        ))
        .bind(&ctx.tenant_id)
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn list_for_assets(
        &self,
        ctx: &TenantContext,
        asset_ids: &[String],
    ) -> Result<Vec<DataPointMappingRecord>, StorageError> {
        ensure_tenant(ctx)?;
        if asset_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "select {} from data_point_mappings \
             where tenant_id = $1 and asset_id = any($2) order by asset_id, label",
            MAPPING_COLUMNS
        ))
        .bind(&ctx.tenant_id)
        .bind(asset_ids)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn delete_mapping(
        &self,
        ctx: &TenantContext,
        mapping_id: &str,
    ) -> Result<bool, StorageError> {
        ensure_tenant(ctx)?;
        let result =
            sqlx::query("delete from data_point_mappings where tenant_id = $1 and mapping_id = $2")
                .bind(&ctx.tenant_id)
                .bind(mapping_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
