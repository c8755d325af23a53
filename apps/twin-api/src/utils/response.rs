//! HTTP 响应辅助函数和 DTO 转换
//!
//! 提供统一的错误响应构造函数和 DTO 转换函数：
//! - 错误响应：storage_error（错误分类 -> 状态码 + 错误码）、
//!   fieldmap_error / state_error / rollup_error、bad_request_error
//! - DTO 转换：asset_to_dto, field_mapping_to_dto, mapping_to_dto,
//!   state_to_dto, rollup_config_to_dto, rollup_result_to_dto
//!
//! 设计原则：
//! - 所有错误返回统一的 ApiResponse 格式
//! - NotFound 与 Forbidden 分别映射 404/403，跨租户访问
//!   永远不是空 200

use api_contract::{
    AssetDto, AssetStateDto, DataPointMappingDto, FieldMappingDto, LocationDto, RollupConfigDto,
    RollupResultDto,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use twin_fieldmap::FieldMapError;
use twin_rollup::RollupError;
use twin_state::StateError;
use twin_storage::{
    AssetLocation, AssetRecord, AssetStateRecord, DataPointMappingRecord, FieldMappingRecord,
    RollupConfigRecord, RollupResultRecord, StorageError,
};

use api_contract::ApiResponse;

/// 错误请求响应
pub fn bad_request_error(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error("INVALID.REQUEST", message.into())),
    )
        .into_response()
}

/// 资源未找到错误响应
pub fn not_found_error() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error("RESOURCE.NOT_FOUND", "not found")),
    )
        .into_response()
}

/// 存储错误响应（错误分类 -> HTTP 状态码 + 点分错误码）
pub fn storage_error(err: StorageError) -> Response {
    let (status, code) = match &err {
        StorageError::NotFound => (StatusCode::NOT_FOUND, "RESOURCE.NOT_FOUND"),
        StorageError::Forbidden => (StatusCode::FORBIDDEN, "AUTH.FORBIDDEN"),
        StorageError::CircularReference => (StatusCode::CONFLICT, "HIERARCHY.CIRCULAR_REFERENCE"),
        StorageError::HasChildren => (StatusCode::CONFLICT, "HIERARCHY.HAS_CHILDREN"),
        StorageError::DuplicateMapping => (StatusCode::CONFLICT, "MAPPING.DUPLICATE"),
        StorageError::DuplicateFieldName(_) => (StatusCode::CONFLICT, "FIELD.DUPLICATE_NAME"),
        StorageError::UnknownField { .. } => (StatusCode::NOT_FOUND, "FIELD.UNKNOWN"),
        StorageError::InvalidSegment(_) => (StatusCode::BAD_REQUEST, "PATH.INVALID_SEGMENT"),
        StorageError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID.REQUEST"),
        StorageError::Backend(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL.ERROR"),
    };
    let message = err.to_string();
    (status, Json(ApiResponse::<()>::error(code, message))).into_response()
}

/// 字段映射错误响应
pub fn fieldmap_error(err: FieldMapError) -> Response {
    match err {
        FieldMapError::Storage(err) => storage_error(err),
        FieldMapError::Provider(message) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<()>::error("INTERNAL.ERROR", message)),
        )
            .into_response(),
    }
}

/// 状态追踪错误响应
pub fn state_error(err: StateError) -> Response {
    match err {
        StateError::Storage(err) => storage_error(err),
        StateError::UnassignedDevice(device_id) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::error(
                "DEVICE.UNASSIGNED",
                format!("device {device_id} is not assigned to an asset"),
            )),
        )
            .into_response(),
        StateError::Transform(err) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::error(
                "TRANSFORM.INVALID",
                err.to_string(),
            )),
        )
            .into_response(),
    }
}

/// 汇总错误响应
pub fn rollup_error(err: RollupError) -> Response {
    match err {
        RollupError::Storage(err) => storage_error(err),
        RollupError::Telemetry(message) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<()>::error("INTERNAL.ERROR", message)),
        )
            .into_response(),
    }
}

/// AssetLocation 转 LocationDto
pub fn location_to_dto(location: AssetLocation) -> LocationDto {
    LocationDto {
        latitude: location.latitude,
        longitude: location.longitude,
        address: location.address,
    }
}

/// LocationDto 转 AssetLocation
pub fn location_from_dto(dto: LocationDto) -> AssetLocation {
    AssetLocation {
        latitude: dto.latitude,
        longitude: dto.longitude,
        address: dto.address,
    }
}

/// AssetRecord 转 AssetDto
pub fn asset_to_dto(record: AssetRecord) -> AssetDto {
    AssetDto {
        asset_id: record.asset_id,
        parent_id: record.parent_id,
        path: record.path,
        depth: record.depth,
        name: record.name,
        asset_type: record.asset_type.as_str().to_string(),
        status: record.status.as_str().to_string(),
        location: record.location.map(location_to_dto),
        metadata: record.metadata,
        tags: record.tags.into_iter().collect(),
    }
}

/// FieldMappingRecord 转 FieldMappingDto
pub fn field_mapping_to_dto(record: FieldMappingRecord) -> FieldMappingDto {
    FieldMappingDto {
        device_type_id: record.device_type_id,
        field_name: record.field_name,
        source: record.source.as_str().to_string(),
        friendly_name: record.friendly_name,
        description: record.description,
        data_type: record.data_type.as_str().to_string(),
        unit: record.unit,
        min_value: record.min_value,
        max_value: record.max_value,
        is_queryable: record.is_queryable,
        is_visible: record.is_visible,
        display_order: record.display_order,
        category: record.category,
        default_aggregation: record.default_aggregation.as_str().to_string(),
    }
}

/// DataPointMappingRecord 转 DataPointMappingDto
pub fn mapping_to_dto(record: DataPointMappingRecord) -> DataPointMappingDto {
    DataPointMappingDto {
        mapping_id: record.mapping_id,
        asset_id: record.asset_id,
        device_id: record.device_id,
        field_reference: record.field_reference,
        label: record.label,
        unit: record.unit,
        aggregation: record.aggregation.as_str().to_string(),
        rollup_enabled: record.rollup_enabled,
        transform_expression: record.transform_expression,
    }
}

/// AssetStateRecord 转 AssetStateDto
pub fn state_to_dto(record: AssetStateRecord) -> AssetStateDto {
    AssetStateDto {
        asset_id: record.asset_id,
        values: record
            .values
            .iter()
            .map(|(label, value)| (label.clone(), super::scalar_to_json(value)))
            .collect(),
        calculated_metrics: record.calculated_metrics,
        alarm_status: record.alarm_status.as_str().to_string(),
        alarm_count: record.alarm_count,
        last_updated_at_ms: record.last_updated_at_ms,
    }
}

/// RollupConfigRecord 转 RollupConfigDto
pub fn rollup_config_to_dto(record: RollupConfigRecord) -> RollupConfigDto {
    RollupConfigDto {
        config_id: record.config_id,
        asset_id: record.asset_id,
        metric_name: record.metric_name,
        aggregation: record.aggregation.as_str().to_string(),
        interval_seconds: record.interval_seconds,
        include_children: record.include_children,
        window_seconds: record.window_seconds,
        weight_factors: record.weight_factors,
        filter_asset_type: record
            .filter_asset_type
            .map(|asset_type| asset_type.as_str().to_string()),
        filter_tag: record.filter_tag,
    }
}

/// RollupResultRecord 转 RollupResultDto
pub fn rollup_result_to_dto(record: RollupResultRecord) -> RollupResultDto {
    RollupResultDto {
        asset_id: record.asset_id,
        metric_name: record.metric_name,
        bucket_start_ms: record.bucket_start_ms,
        bucket_end_ms: record.bucket_end_ms,
        value: record.value,
        sample_count: record.sample_count,
        aggregation: record.aggregation.as_str().to_string(),
        partial: record.partial,
    }
}
