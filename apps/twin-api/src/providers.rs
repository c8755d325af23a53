//! 外部协作方的进程内实现
//!
//! 引擎的三个协作方接口在本服务内用轻量实现闭环：
//! - SchemaRegistry：设备类型模式登记（SchemaProvider）
//! - MappingAssignmentProvider：从数据点映射推导设备归属
//!   （DeviceAssignmentProvider）
//! - TelemetryBuffer：遥测历史缓冲（TelemetryQuery），
//!   为窗口聚合提供样本序列，代替外部时序库

use async_trait::async_trait;
use domain::TenantContext;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use twin_fieldmap::{
    DeviceSchema, FieldDescriptor, FieldMapError, RecordField, SchemaProvider, map_data_type,
};
use twin_rollup::{RollupError, TelemetryQuery};
use twin_state::{DeviceAssignmentProvider, StateError};
use twin_storage::DataPointMappingStore;

/// 单个设备类型的登记条目。
struct SchemaEntry {
    schema: Option<DeviceSchema>,
    custom_fields: Vec<FieldDescriptor>,
}

/// 设备类型模式登记表。
///
/// 键为 `(tenant_id, device_type_id)`，重复登记整体覆盖。
pub struct SchemaRegistry {
    entries: RwLock<HashMap<(String, String), SchemaEntry>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// 登记设备类型的模式与临时字段（覆盖旧条目）。
    pub fn register(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
        schema: Option<DeviceSchema>,
        custom_fields: Vec<FieldDescriptor>,
    ) -> Result<(), FieldMapError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| FieldMapError::Provider("schema registry lock poisoned".to_string()))?;
        entries.insert(
            (ctx.tenant_id.clone(), device_type_id.to_string()),
            SchemaEntry {
                schema,
                custom_fields,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl SchemaProvider for SchemaRegistry {
    async fn get_schema(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
    ) -> Result<Option<DeviceSchema>, FieldMapError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| FieldMapError::Provider("schema registry lock poisoned".to_string()))?;
        Ok(entries
            .get(&(ctx.tenant_id.clone(), device_type_id.to_string()))
            .and_then(|entry| entry.schema.clone()))
    }

    async fn custom_fields(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
    ) -> Result<Vec<FieldDescriptor>, FieldMapError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| FieldMapError::Provider("schema registry lock poisoned".to_string()))?;
        Ok(entries
            .get(&(ctx.tenant_id.clone(), device_type_id.to_string()))
            .map(|entry| entry.custom_fields.clone())
            .unwrap_or_default())
    }
}

/// 从请求体 JSON 解析记录式模式的字段声明数组。
pub fn record_fields_from_json(value: &serde_json::Value) -> Result<Vec<RecordField>, String> {
    let Some(items) = value.as_array() else {
        return Err("recordFields schema must be an array".to_string());
    };
    let mut fields = Vec::with_capacity(items.len());
    for item in items {
        let Some(name) = item.get("fieldName").and_then(|v| v.as_str()) else {
            return Err("record field missing fieldName".to_string());
        };
        fields.push(RecordField {
            name: name.to_string(),
            data_type: item
                .get("type")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            format: item
                .get("format")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            description: item
                .get("description")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            unit: item
                .get("unit")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            min_value: item.get("minValue").and_then(|v| v.as_f64()),
            max_value: item.get("maxValue").and_then(|v| v.as_f64()),
        });
    }
    Ok(fields)
}

/// 用户临时字段请求 -> 字段中间表示。
pub fn custom_field_descriptor(
    field_name: String,
    friendly_name: Option<String>,
    description: Option<String>,
    data_type: Option<&str>,
    unit: Option<String>,
) -> FieldDescriptor {
    FieldDescriptor {
        field_name,
        friendly_name,
        description,
        data_type: map_data_type(data_type, None),
        unit,
        min_value: None,
        max_value: None,
    }
}

/// 设备归属：取设备首条数据点映射所绑定的资产。
///
/// 设备注册是外部系统，本服务内设备与资产的关系完全由数据点
/// 映射表达；未建立任何映射的设备视为未归属。
pub struct MappingAssignmentProvider {
    mappings: Arc<dyn DataPointMappingStore>,
}

impl MappingAssignmentProvider {
    pub fn new(mappings: Arc<dyn DataPointMappingStore>) -> Self {
        Self { mappings }
    }
}

#[async_trait]
impl DeviceAssignmentProvider for MappingAssignmentProvider {
    async fn asset_for_device(
        &self,
        ctx: &TenantContext,
        device_id: &str,
    ) -> Result<Option<String>, StateError> {
        let mappings = self.mappings.list_for_device(ctx, device_id).await?;
        Ok(mappings.into_iter().next().map(|mapping| mapping.asset_id))
    }
}

/// 单序列样本上限，超出后丢弃最旧样本。
const MAX_SAMPLES_PER_SERIES: usize = 4096;

/// 遥测历史缓冲。
///
/// 按 `(tenant, device, field)` 保存最近的数值样本，序列内按
/// observed_at 升序。窗口聚合从这里读取 `[start, end)` 样本。
pub struct TelemetryBuffer {
    series: RwLock<HashMap<String, Vec<(i64, f64)>>>,
}

impl TelemetryBuffer {
    pub fn new() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
        }
    }

    fn series_key(tenant_id: &str, device_id: &str, field: &str) -> String {
        format!("{tenant_id}\u{1}{device_id}\u{1}{field}")
    }

    /// 记录一个数值样本（乱序到达按时间序插入）。
    pub fn record(
        &self,
        ctx: &TenantContext,
        device_id: &str,
        field: &str,
        observed_at_ms: i64,
        value: f64,
    ) -> Result<(), RollupError> {
        let mut series = self
            .series
            .write()
            .map_err(|_| RollupError::Telemetry("telemetry buffer lock poisoned".to_string()))?;
        let samples = series
            .entry(Self::series_key(&ctx.tenant_id, device_id, field))
            .or_default();
        let position = samples.partition_point(|(ts, _)| *ts <= observed_at_ms);
        samples.insert(position, (observed_at_ms, value));
        if samples.len() > MAX_SAMPLES_PER_SERIES {
            samples.remove(0);
        }
        Ok(())
    }
}

#[async_trait]
impl TelemetryQuery for TelemetryBuffer {
    async fn fetch_latest(
        &self,
        ctx: &TenantContext,
        device_id: &str,
        fields: &[String],
    ) -> Result<HashMap<String, f64>, RollupError> {
        let series = self
            .series
            .read()
            .map_err(|_| RollupError::Telemetry("telemetry buffer lock poisoned".to_string()))?;
        let mut latest = HashMap::new();
        for field in fields {
            let key = Self::series_key(&ctx.tenant_id, device_id, field);
            if let Some((_, value)) = series.get(&key).and_then(|samples| samples.last()) {
                latest.insert(field.clone(), *value);
            }
        }
        Ok(latest)
    }

    async fn fetch_range(
        &self,
        ctx: &TenantContext,
        device_id: &str,
        field: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<(i64, f64)>, RollupError> {
        let series = self
            .series
            .read()
            .map_err(|_| RollupError::Telemetry("telemetry buffer lock poisoned".to_string()))?;
        let key = Self::series_key(&ctx.tenant_id, device_id, field);
        Ok(series
            .get(&key)
            .map(|samples| {
                samples
                    .iter()
                    .filter(|(ts, _)| *ts >= start_ms && *ts < end_ms)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buffer_keeps_time_order_and_half_open_range() {
        let buffer = TelemetryBuffer::new();
        let ctx = TenantContext::new("t-1", "u-1", Vec::new());
        buffer.record(&ctx, "dev-1", "sensors.temp", 3_000, 23.0).unwrap();
        buffer.record(&ctx, "dev-1", "sensors.temp", 1_000, 21.0).unwrap();
        buffer.record(&ctx, "dev-1", "sensors.temp", 2_000, 22.0).unwrap();

        let range = buffer
            .fetch_range(&ctx, "dev-1", "sensors.temp", 1_000, 3_000)
            .await
            .unwrap();
        assert_eq!(range, vec![(1_000, 21.0), (2_000, 22.0)]);

        let latest = buffer
            .fetch_latest(&ctx, "dev-1", &["sensors.temp".to_string()])
            .await
            .unwrap();
        assert_eq!(latest.get("sensors.temp"), Some(&23.0));
    }

    #[tokio::test]
    async fn buffer_scopes_by_tenant() {
        let buffer = TelemetryBuffer::new();
        let ctx_a = TenantContext::new("t-a", "u-1", Vec::new());
        let ctx_b = TenantContext::new("t-b", "u-1", Vec::new());
        buffer.record(&ctx_a, "dev-1", "f", 1_000, 1.0).unwrap();

        let other = buffer.fetch_range(&ctx_b, "dev-1", "f", 0, 2_000).await.unwrap();
        assert!(other.is_empty());
    }
}
