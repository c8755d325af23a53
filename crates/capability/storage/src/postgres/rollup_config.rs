//! Postgres 汇总配置存储实现
//!
//! weight_factors 以 JSON 文本列存储；list_all_enabled 供调度器
//! 跨租户扫描启用配置，逐条以系统上下文执行。

use crate::error::StorageError;
use crate::models::RollupConfigRecord;
use crate::traits::RollupConfigStore;
use crate::validation::{ensure_owned, ensure_tenant};
use domain::{AggregationMethod, AssetType, TenantContext};
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;

const CONFIG_COLUMNS: &str = "config_id, tenant_id, asset_id, metric_name, aggregation, \
     interval_seconds, include_children, window_seconds, weight_factors, \
     filter_asset_type, filter_tag, enabled";

pub struct PgRollupConfigStore {
    pub pool: PgPool,
}

impl PgRollupConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<RollupConfigRecord, StorageError> {
        let aggregation: String = row.try_get("aggregation")?;
        let interval_seconds: i64 = row.try_get("interval_seconds")?;
        let window_seconds: Option<i64> = row.try_get("window_seconds")?;
        let weight_factors: Option<String> = row.try_get("weight_factors")?;
        let weight_factors: BTreeMap<String, f64> = match weight_factors {
            Some(raw) => serde_json::from_str(&raw).map_err(StorageError::backend)?,
            None => BTreeMap::new(),
        };
        let filter_asset_type: Option<String> = row.try_get("filter_asset_type")?;
        Ok(RollupConfigRecord {
            config_id: row.try_get("config_id")?,
            tenant_id: row.try_get("tenant_id")?,
            asset_id: row.try_get("asset_id")?,
            metric_name: row.try_get("metric_name")?,
            aggregation: AggregationMethod::parse(&aggregation)
                .ok_or_else(|| StorageError::backend("invalid aggregation in row"))?,
            interval_seconds: interval_seconds.max(0) as u64,
            include_children: row.try_get("include_children")?,
            window_seconds: window_seconds.map(|seconds| seconds.max(0) as u64),
            weight_factors,
            filter_asset_type: filter_asset_type.as_deref().map(AssetType::parse),
            filter_tag: row.try_get("filter_tag")?,
            enabled: row.try_get("enabled")?,
        })
    }
}

#[async_trait::async_trait]
impl RollupConfigStore for PgRollupConfigStore {
    async fn create_config(
        &self,
        ctx: &TenantContext,
        record: RollupConfigRecord,
    ) -> Result<RollupConfigRecord, StorageError> {
        ensure_owned(ctx, &record.tenant_id)?;
        let weight_factors =
            serde_json::to_string(&record.weight_factors).map_err(StorageError::backend)?;
        sqlx::query(
            "insert into rollup_configs (config_id, tenant_id, asset_id, metric_name, \
             aggregation, interval_seconds, include_children, window_seconds, weight_factors, \
             filter_asset_type, filter_tag, enabled) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(&record.config_id)
        .bind(&record.tenant_id)
        .bind(&record.asset_id)
        .bind(&record.metric_name)
        .bind(record.aggregation.as_str())
        .bind(record.interval_seconds as i64)
        .bind(record.include_children)
        .bind(record.window_seconds.map(|seconds| seconds as i64))
        .bind(&weight_factors)
        .bind(
            record
                .filter_asset_type
                .as_ref()
                .map(|asset_type| asset_type.as_str().to_string()),
        )
        .bind(&record.filter_tag)
        .bind(record.enabled)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn find_config(
        &self,
        ctx: &TenantContext,
        config_id: &str,
    ) -> Result<Option<RollupConfigRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let row = sqlx::query(&format!(
            "select {} from rollup_configs where tenant_id = $1 and config_id = $2",
            CONFIG_COLUMNS
        ))
        .bind(&ctx.tenant_id)
        .bind(config_id)
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
    ) -> Result<Vec<RollupConfigRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let rows = sqlx::query(&format!(
            "select {} from rollup_configs \
             where tenant_id = $1 and asset_id = $2 order by metric_name",
            CONFIG_COLUMNS
        ))
        .bind(&ctx.tenant_id)
        .bind(asset_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn list_all_enabled(&self) -> Result<Vec<RollupConfigRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "select {} from rollup_configs where enabled order by config_id",
            CONFIG_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn delete_config(
        &self,
        ctx: &TenantContext,
        config_id: &str,
    ) -> Result<bool, StorageError> {
        ensure_tenant(ctx)?;
        let result =
            sqlx::query("delete from rollup_configs where tenant_id = $1 and config_id = $2")
                .bind(&ctx.tenant_id)
                .bind(config_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
