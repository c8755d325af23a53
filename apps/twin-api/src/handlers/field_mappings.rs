//! 设备类型字段目录 handlers
//!
//! - PUT /devicetypes/{id}/schema - 登记设备类型模式与临时字段
//! - GET /devicetypes/{id}/fields - 获取字段目录（先合并再读取）
//! - PUT /devicetypes/{id}/fields - 批量编辑，逐条返回结果
//! - POST /devicetypes/{id}/fields/sync - 幂等同步三来源
//! - GET /devicetypes/{id}/fields/resolve?name= - 按名解析

use crate::AppState;
use crate::middleware::require_tenant_context;
use crate::providers::{custom_field_descriptor, record_fields_from_json};
use crate::utils::normalize_required;
use crate::utils::response::{bad_request_error, field_mapping_to_dto, fieldmap_error};
use api_contract::{
    ApiResponse, FieldMappingDto, FieldMappingEditRequest, FieldMappingEditResult,
    RegisterSchemaRequest, SyncFieldsResponse,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use domain::AggregationMethod;
use twin_fieldmap::DeviceSchema;
use twin_storage::FieldMappingEdit;

#[derive(serde::Deserialize)]
pub struct DeviceTypePath {
    device_type_id: String,
}

#[derive(serde::Deserialize)]
pub struct ResolveQuery {
    name: String,
}

/// 登记设备类型模式（schemaFormat 显式分派，重复登记整体覆盖）
pub async fn register_schema(
    State(state): State<AppState>,
    Path(path): Path<DeviceTypePath>,
    headers: HeaderMap,
    Json(req): Json<RegisterSchemaRequest>,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let schema = match req.schema_format.as_str() {
        "jsonSchema" => Some(DeviceSchema::JsonSchema(req.schema)),
        "recordFields" => match record_fields_from_json(&req.schema) {
            Ok(fields) => Some(DeviceSchema::RecordFields(fields)),
            Err(message) => return bad_request_error(message),
        },
        "none" => None,
        other => return bad_request_error(format!("unknown schemaFormat: {other}")),
    };
    let mut custom_fields = Vec::with_capacity(req.custom_fields.len());
    for field in req.custom_fields {
        let field_name = match normalize_required(field.field_name, "fieldName") {
            Ok(value) => value,
            Err(response) => return response,
        };
        custom_fields.push(custom_field_descriptor(
            field_name,
            field.friendly_name,
            field.description,
            field.data_type.as_deref(),
            field.unit,
        ));
    }
    match state
        .schemas
        .register(&ctx, &path.device_type_id, schema, custom_fields)
    {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::success(()))).into_response(),
        Err(err) => fieldmap_error(err),
    }
}

/// 获取设备类型字段目录（合并 System/Schema/Custom 后按显示序返回）
pub async fn list_fields(
    State(state): State<AppState>,
    Path(path): Path<DeviceTypePath>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state
        .resolver
        .mappings_for_device_type(&ctx, &path.device_type_id)
        .await
    {
        Ok(items) => {
            let data: Vec<FieldMappingDto> = items.into_iter().map(field_mapping_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => fieldmap_error(err),
    }
}

/// 批量编辑字段目录的用户可编辑属性
///
/// 逐条返回结果；友好名改名与目录内其他字段冲突（大小写不
/// 敏感）时该条失败，其余照常执行。
pub async fn edit_fields(
    State(state): State<AppState>,
    Path(path): Path<DeviceTypePath>,
    headers: HeaderMap,
    Json(req): Json<Vec<FieldMappingEditRequest>>,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let mut edits = Vec::with_capacity(req.len());
    for item in req {
        let default_aggregation = match item.default_aggregation {
            Some(raw) => match AggregationMethod::parse(raw.trim()) {
                Some(method) => Some(method),
                None => return bad_request_error(format!("unknown aggregation: {raw}")),
            },
            None => None,
        };
        edits.push((
            item.field_name,
            FieldMappingEdit {
                friendly_name: item.friendly_name,
                description: item.description,
                unit: item.unit,
                is_visible: item.is_visible,
                display_order: item.display_order,
                category: item.category,
                default_aggregation,
            },
        ));
    }
    match state
        .resolver
        .update_many(&ctx, &path.device_type_id, edits)
        .await
    {
        Ok(outcomes) => {
            let data: Vec<FieldMappingEditResult> = outcomes
                .into_iter()
                .map(|outcome| FieldMappingEditResult {
                    field_name: outcome.field_name,
                    updated: outcome.updated,
                    error: outcome.error.map(|err| err.to_string()),
                })
                .collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => fieldmap_error(err),
    }
}

/// 同步三来源字段目录（幂等，返回新建与总数）
pub async fn sync_fields(
    State(state): State<AppState>,
    Path(path): Path<DeviceTypePath>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let created = match state
        .resolver
        .synchronize(&ctx, &path.device_type_id)
        .await
    {
        Ok(created) => created,
        Err(err) => return fieldmap_error(err),
    };
    twin_telemetry::record_field_sync_created(created as u64);
    match state
        .resolver
        .mappings_for_device_type(&ctx, &path.device_type_id)
        .await
    {
        Ok(items) => (
            StatusCode::OK,
            Json(ApiResponse::success(SyncFieldsResponse {
                created,
                total: items.len(),
            })),
        )
            .into_response(),
        Err(err) => fieldmap_error(err),
    }
}

/// 按友好名或原始字段名解析字段（大小写不敏感）
pub async fn resolve_field(
    State(state): State<AppState>,
    Path(path): Path<DeviceTypePath>,
    Query(query): Query<ResolveQuery>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if query.name.trim().is_empty() {
        return bad_request_error("name required");
    }
    match state
        .resolver
        .resolve(&ctx, &path.device_type_id, query.name.trim())
        .await
    {
        Ok(item) => (
            StatusCode::OK,
            Json(ApiResponse::success(field_mapping_to_dto(item))),
        )
            .into_response(),
        Err(err) => fieldmap_error(err),
    }
}
