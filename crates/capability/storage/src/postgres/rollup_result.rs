//! Postgres 汇总结果存储实现
//!
//! 时间桶只追加：`(tenant_id, asset_id, metric_name, bucket_start_ms)`
//! 为主键，重复写入走 on conflict do nothing，由 rows_affected 区分。

use crate::error::StorageError;
use crate::models::RollupResultRecord;
use crate::traits::RollupResultStore;
use crate::validation::{ensure_owned, ensure_tenant};
use domain::{AggregationMethod, TenantContext};
use sqlx::{PgPool, Row};

pub struct PgRollupResultStore {
    pub pool: PgPool,
}

impl PgRollupResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<RollupResultRecord, StorageError> {
        let aggregation: String = row.try_get("aggregation")?;
        let sample_count: i32 = row.try_get("sample_count")?;
        Ok(RollupResultRecord {
            tenant_id: row.try_get("tenant_id")?,
            asset_id: row.try_get("asset_id")?,
            metric_name: row.try_get("metric_name")?,
            bucket_start_ms: row.try_get("bucket_start_ms")?,
            bucket_end_ms: row.try_get("bucket_end_ms")?,
            value: row.try_get("value")?,
            sample_count: sample_count.max(0) as u32,
            aggregation: AggregationMethod::parse(&aggregation)
                .ok_or_else(|| StorageError::backend("invalid aggregation in row"))?,
            partial: row.try_get("partial")?,
        })
    }
}

#[async_trait::async_trait]
impl RollupResultStore for PgRollupResultStore {
    async fn append_result(
        &self,
        ctx: &TenantContext,
        record: RollupResultRecord,
    ) -> Result<bool, StorageError> {
        ensure_owned(ctx, &record.tenant_id)?;
        let result = sqlx::query(
            "insert into rollup_results (tenant_id, asset_id, metric_name, bucket_start_ms, \
             bucket_end_ms, value, sample_count, aggregation, partial) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             on conflict (tenant_id, asset_id, metric_name, bucket_start_ms) do nothing",
        )
        .bind(&record.tenant_id)
        .bind(&record.asset_id)
        .bind(&record.metric_name)
        .bind(record.bucket_start_ms)
        .bind(record.bucket_end_ms)
        .bind(record.value)
        .bind(record.sample_count as i32)
        .bind(record.aggregation.as_str())
        .bind(record.partial)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query_series(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        metric_name: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<RollupResultRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let rows = sqlx::query(
            "select tenant_id, asset_id, metric_name, bucket_start_ms, bucket_end_ms, \
             value, sample_count, aggregation, partial from rollup_results \
             where tenant_id = $1 and asset_id = $2 and metric_name = $3 \
             and bucket_start_ms >= $4 and bucket_start_ms < $5 \
             order by bucket_start_ms",
        )
        .bind(&ctx.tenant_id)
        .bind(asset_id)
        .bind(metric_name)
        .bind(start_ms)
        .bind(end_ms)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_record).collect()
    }
}
