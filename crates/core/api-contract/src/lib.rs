//! 稳定的 DTO 与 API 响应契约。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 坐标与地址。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationDto {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
}

/// 资产创建请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssetRequest {
    pub parent_id: Option<String>,
    pub name: String,
    pub asset_type: String,
    pub status: Option<String>,
    pub location: Option<LocationDto>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// 资产更新请求体（仅描述性字段；层级变更走 move 接口）。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAssetRequest {
    pub name: Option<String>,
    pub status: Option<String>,
    pub location: Option<LocationDto>,
    pub metadata: Option<BTreeMap<String, String>>,
    pub tags: Option<Vec<String>>,
}

/// 资产移动请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveAssetRequest {
    pub new_parent_id: Option<String>,
}

/// 资产返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDto {
    pub asset_id: String,
    pub parent_id: Option<String>,
    pub path: String,
    pub depth: i32,
    pub name: String,
    pub asset_type: String,
    pub status: String,
    pub location: Option<LocationDto>,
    pub metadata: BTreeMap<String, String>,
    pub tags: Vec<String>,
}

/// 资产子树返回结构（tree 接口）。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetTreeDto {
    #[serde(flatten)]
    pub asset: AssetDto,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<AssetTreeDto>,
}

/// 字段映射返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMappingDto {
    pub device_type_id: String,
    pub field_name: String,
    pub source: String,
    pub friendly_name: String,
    pub description: Option<String>,
    pub data_type: String,
    pub unit: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub is_queryable: bool,
    pub is_visible: bool,
    pub display_order: i32,
    pub category: Option<String>,
    pub default_aggregation: String,
}

/// 字段映射批量编辑请求体（按 fieldName 定位）。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMappingEditRequest {
    pub field_name: String,
    pub friendly_name: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub is_visible: Option<bool>,
    pub display_order: Option<i32>,
    pub category: Option<String>,
    pub default_aggregation: Option<String>,
}

/// 字段映射批量编辑的单项结果。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMappingEditResult {
    pub field_name: String,
    pub updated: bool,
    pub error: Option<String>,
}

/// 字段同步返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFieldsResponse {
    pub created: usize,
    pub total: usize,
}

/// 数据点映射创建请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDataPointMappingRequest {
    pub device_id: String,
    pub field_reference: String,
    pub label: String,
    pub unit: Option<String>,
    pub aggregation: Option<String>,
    pub rollup_enabled: Option<bool>,
    pub transform_expression: Option<String>,
    pub warn_low: Option<f64>,
    pub warn_high: Option<f64>,
    pub crit_low: Option<f64>,
    pub crit_high: Option<f64>,
}

/// 数据点映射返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPointMappingDto {
    pub mapping_id: String,
    pub asset_id: String,
    pub device_id: String,
    pub field_reference: String,
    pub label: String,
    pub unit: Option<String>,
    pub aggregation: String,
    pub rollup_enabled: bool,
    pub transform_expression: Option<String>,
}

/// 遥测上报请求体（外部接入方调用）。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyTelemetryRequest {
    pub values: BTreeMap<String, serde_json::Value>,
    pub observed_at_ms: i64,
}

/// 资产状态返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetStateDto {
    pub asset_id: String,
    pub values: BTreeMap<String, serde_json::Value>,
    pub calculated_metrics: BTreeMap<String, f64>,
    pub alarm_status: String,
    pub alarm_count: i64,
    pub last_updated_at_ms: i64,
}

/// 状态人工覆写请求体（测试与人工修正入口）。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideStateRequest {
    pub values: BTreeMap<String, serde_json::Value>,
    pub observed_at_ms: Option<i64>,
}

/// 汇总配置创建请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRollupConfigRequest {
    pub metric_name: String,
    pub aggregation: String,
    pub interval_seconds: u64,
    pub include_children: Option<bool>,
    pub window_seconds: Option<u64>,
    #[serde(default)]
    pub weight_factors: BTreeMap<String, f64>,
    pub filter_asset_type: Option<String>,
    pub filter_tag: Option<String>,
}

/// 汇总配置返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupConfigDto {
    pub config_id: String,
    pub asset_id: String,
    pub metric_name: String,
    pub aggregation: String,
    pub interval_seconds: u64,
    pub include_children: bool,
    pub window_seconds: Option<u64>,
    pub weight_factors: BTreeMap<String, f64>,
    pub filter_asset_type: Option<String>,
    pub filter_tag: Option<String>,
}

/// 汇总结果返回结构（只追加时间桶）。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupResultDto {
    pub asset_id: String,
    pub metric_name: String,
    pub bucket_start_ms: i64,
    pub bucket_end_ms: i64,
    pub value: f64,
    pub sample_count: u32,
    pub aggregation: String,
    pub partial: bool,
}

/// 删除资产返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAssetResponse {
    pub removed: usize,
}

/// 遥测应用返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyTelemetryResponse {
    pub asset_id: String,
    pub applied: usize,
    pub dropped_unmapped: usize,
    pub dropped_out_of_order: bool,
    pub alarm_status: String,
}

/// 设备类型模式注册请求体（schemaFormat 显式分派）。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSchemaRequest {
    pub schema_format: String,
    pub schema: serde_json::Value,
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldRequest>,
}

/// 用户在设备类型上声明的临时字段。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldRequest {
    pub field_name: String,
    pub friendly_name: Option<String>,
    pub description: Option<String>,
    pub data_type: Option<String>,
    pub unit: Option<String>,
}

/// 进程指标快照返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshotDto {
    pub telemetry_batches: u64,
    pub telemetry_values: u64,
    pub dropped_out_of_order: u64,
    pub dropped_unmapped: u64,
    pub state_write_success: u64,
    pub state_write_failure: u64,
    pub alarms_raised: u64,
    pub rollup_ticks: u64,
    pub rollup_no_data: u64,
    pub rollup_partial: u64,
    pub rollup_child_read_failures: u64,
    pub asset_moves: u64,
    pub asset_cascade_deletes: u64,
    pub field_sync_created: u64,
}
