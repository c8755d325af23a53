//! Redis 资产状态存储实现
//!
//! 资产状态整体以 JSON 负载存入单个键，批量读取走 MGET。
//! 时间序冲突仲裁（乱序丢弃）与内存实现一致，在读-改-写
//! 中比较 observed_at；单写者（状态追踪器）前提下足够。

use crate::error::StorageError;
use crate::models::AssetStateRecord;
use crate::traits::AssetStateStore;
use crate::validation::ensure_tenant;
use domain::{AlarmStatus, ScalarValue, TenantContext};
use redis::AsyncCommands;
use std::collections::{BTreeMap, HashMap};

#[derive(serde::Serialize, serde::Deserialize)]
struct StatePayload {
    values: BTreeMap<String, serde_json::Value>,
    calculated_metrics: BTreeMap<String, f64>,
    alarm_status: String,
    alarm_count: i64,
    last_updated_at_ms: i64,
}

fn state_key(tenant_id: &str, asset_id: &str) -> String {
    format!("tenant:{}:asset:{}:state", tenant_id, asset_id)
}

fn scalar_to_json(value: &ScalarValue) -> serde_json::Value {
    match value {
        ScalarValue::F64(v) => serde_json::json!(v),
        ScalarValue::I64(v) => serde_json::json!(v),
        ScalarValue::Bool(v) => serde_json::json!(v),
        ScalarValue::Text(v) => serde_json::json!(v),
    }
}

fn json_to_scalar(value: &serde_json::Value) -> Option<ScalarValue> {
    match value {
        serde_json::Value::Bool(v) => Some(ScalarValue::Bool(*v)),
        serde_json::Value::Number(v) => {
            if let Some(i) = v.as_i64() {
                Some(ScalarValue::I64(i))
            } else {
                v.as_f64().map(ScalarValue::F64)
            }
        }
        serde_json::Value::String(v) => Some(ScalarValue::Text(v.clone())),
        _ => None,
    }
}

fn payload_to_record(
    tenant_id: &str,
    asset_id: &str,
    payload: StatePayload,
) -> Result<AssetStateRecord, StorageError> {
    let mut values = BTreeMap::new();
    for (field, value) in &payload.values {
        if let Some(scalar) = json_to_scalar(value) {
            values.insert(field.clone(), scalar);
        }
    }
    Ok(AssetStateRecord {
        tenant_id: tenant_id.to_string(),
        asset_id: asset_id.to_string(),
        values,
        calculated_metrics: payload.calculated_metrics,
        alarm_status: AlarmStatus::parse(&payload.alarm_status)
            .ok_or_else(|| StorageError::backend("invalid alarm status in payload"))?,
        alarm_count: payload.alarm_count,
        last_updated_at_ms: payload.last_updated_at_ms,
    })
}

fn record_to_payload(record: &AssetStateRecord) -> StatePayload {
    StatePayload {
        values: record
            .values
            .iter()
            .map(|(field, value)| (field.clone(), scalar_to_json(value)))
            .collect(),
        calculated_metrics: record.calculated_metrics.clone(),
        alarm_status: record.alarm_status.as_str().to_string(),
        alarm_count: record.alarm_count,
        last_updated_at_ms: record.last_updated_at_ms,
    }
}

/// Redis 资产状态存储
pub struct RedisAssetStateStore {
    client: redis::Client,
    state_ttl_seconds: Option<u64>,
}

impl RedisAssetStateStore {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            state_ttl_seconds: None,
        }
    }

    pub fn new_with_ttl(client: redis::Client, state_ttl_seconds: Option<u64>) -> Self {
        Self {
            client,
            state_ttl_seconds,
        }
    }

    pub fn connect(redis_url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url).map_err(StorageError::backend)?;
        Ok(Self::new(client))
    }

    pub fn connect_with_ttl(
        redis_url: &str,
        state_ttl_seconds: Option<u64>,
    ) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url).map_err(StorageError::backend)?;
        let ttl = match state_ttl_seconds {
            Some(value) if value == 0 => None,
            Some(value) => Some(value),
            None => None,
        };
        Ok(Self::new_with_ttl(client, ttl))
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StorageError> {
        self.client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(StorageError::backend)
    }

    async fn read_record(
        &self,
        connection: &mut redis::aio::MultiplexedConnection,
        tenant_id: &str,
        asset_id: &str,
    ) -> Result<Option<AssetStateRecord>, StorageError> {
        let data: Option<String> = connection
            .get(state_key(tenant_id, asset_id))
            .await
            .map_err(StorageError::backend)?;
        let Some(data) = data else {
            return Ok(None);
        };
        let payload: StatePayload = serde_json::from_str(&data).map_err(StorageError::backend)?;
        Ok(Some(payload_to_record(tenant_id, asset_id, payload)?))
    }

    async fn write_record(
        &self,
        connection: &mut redis::aio::MultiplexedConnection,
        record: &AssetStateRecord,
    ) -> Result<(), StorageError> {
        let data = serde_json::to_string(&record_to_payload(record)).map_err(StorageError::backend)?;
        let key = state_key(&record.tenant_id, &record.asset_id);
        if let Some(ttl) = self.state_ttl_seconds {
            connection
                .set_ex::<_, _, ()>(key, data, ttl)
                .await
                .map_err(StorageError::backend)?;
        } else {
            connection
                .set::<_, _, ()>(key, data)
                .await
                .map_err(StorageError::backend)?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AssetStateStore for RedisAssetStateStore {
    async fn upsert_values(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        values: &BTreeMap<String, ScalarValue>,
        observed_at_ms: i64,
    ) -> Result<bool, StorageError> {
        ensure_tenant(ctx)?;
        let mut connection = self.connection().await?;
        let mut record = self
            .read_record(&mut connection, &ctx.tenant_id, asset_id)
            .await?
            .unwrap_or_else(|| AssetStateRecord::empty(&ctx.tenant_id, asset_id));
        if record.last_updated_at_ms > 0 && observed_at_ms < record.last_updated_at_ms {
            return Ok(false);
        }
        for (field, value) in values {
            record.values.insert(field.clone(), value.clone());
        }
        record.last_updated_at_ms = observed_at_ms;
        self.write_record(&mut connection, &record).await?;
        Ok(true)
    }

    async fn set_calculated_metric(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        metric_name: &str,
        value: f64,
    ) -> Result<(), StorageError> {
        ensure_tenant(ctx)?;
        let mut connection = self.connection().await?;
        let mut record = self
            .read_record(&mut connection, &ctx.tenant_id, asset_id)
            .await?
            .unwrap_or_else(|| AssetStateRecord::empty(&ctx.tenant_id, asset_id));
        record
            .calculated_metrics
            .insert(metric_name.to_string(), value);
        self.write_record(&mut connection, &record).await
    }

    async fn set_alarm(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        status: AlarmStatus,
        alarm_count: i64,
    ) -> Result<(), StorageError> {
        ensure_tenant(ctx)?;
        let mut connection = self.connection().await?;
        let mut record = self
            .read_record(&mut connection, &ctx.tenant_id, asset_id)
            .await?
            .unwrap_or_else(|| AssetStateRecord::empty(&ctx.tenant_id, asset_id));
        record.alarm_status = status;
        record.alarm_count = alarm_count;
        self.write_record(&mut connection, &record).await
    }

    async fn get_state(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Option<AssetStateRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let mut connection = self.connection().await?;
        self.read_record(&mut connection, &ctx.tenant_id, asset_id)
            .await
    }

    async fn get_bulk_states(
        &self,
        ctx: &TenantContext,
        asset_ids: &[String],
    ) -> Result<HashMap<String, AssetStateRecord>, StorageError> {
        ensure_tenant(ctx)?;
        if asset_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let keys: Vec<String> = asset_ids
            .iter()
            .map(|asset_id| state_key(&ctx.tenant_id, asset_id))
            .collect();
        let mut connection = self.connection().await?;
        let values: Vec<Option<String>> = connection
            .mget(keys)
            .await
            .map_err(StorageError::backend)?;
        let mut result = HashMap::new();
        for (asset_id, value) in asset_ids.iter().zip(values.into_iter()) {
            let Some(value) = value else { continue };
            let payload: StatePayload = match serde_json::from_str(&value) {
                Ok(payload) => payload,
                Err(_) => continue,
            };
            result.insert(
                asset_id.clone(),
                payload_to_record(&ctx.tenant_id, asset_id, payload)?,
            );
        }
        Ok(result)
    }

    async fn override_state(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        values: &BTreeMap<String, ScalarValue>,
        observed_at_ms: i64,
    ) -> Result<(), StorageError> {
        ensure_tenant(ctx)?;
        let mut connection = self.connection().await?;
        let mut record = self
            .read_record(&mut connection, &ctx.tenant_id, asset_id)
            .await?
            .unwrap_or_else(|| AssetStateRecord::empty(&ctx.tenant_id, asset_id));
        for (field, value) in values {
            record.values.insert(field.clone(), value.clone());
        }
        record.last_updated_at_ms = observed_at_ms;
        self.write_record(&mut connection, &record).await
    }
}
