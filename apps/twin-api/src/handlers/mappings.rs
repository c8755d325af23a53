//! 数据点映射 handlers
//!
//! - POST /assets/{id}/mappings - 绑定设备字段到资产
//! - GET /assets/{id}/mappings - 列出资产的映射
//! - DELETE /assets/{id}/mappings/{mapping_id} - 解绑
//!
//! 同一 (device_id, field_reference) 租户内只允许绑定一个资产，
//! 重复绑定返回 409 MAPPING.DUPLICATE。变换表达式在创建时解析，
//! 语法错误当场拒绝而不是等到遥测到达。

use crate::AppState;
use crate::middleware::require_tenant_context;
use crate::utils::response::{bad_request_error, mapping_to_dto, not_found_error, storage_error};
use crate::utils::{normalize_optional, normalize_required};
use api_contract::{ApiResponse, CreateDataPointMappingRequest, DataPointMappingDto};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use domain::AggregationMethod;
use twin_state::Transform;
use twin_storage::{AssetStore, DataPointMappingRecord, DataPointMappingStore};
use uuid::Uuid;

#[derive(serde::Deserialize)]
pub struct AssetPath {
    asset_id: String,
}

#[derive(serde::Deserialize)]
pub struct MappingPath {
    #[allow(dead_code)]
    asset_id: String,
    mapping_id: String,
}

/// 创建数据点映射
pub async fn create_mapping(
    State(state): State<AppState>,
    Path(path): Path<AssetPath>,
    headers: HeaderMap,
    Json(req): Json<CreateDataPointMappingRequest>,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let device_id = match normalize_required(req.device_id, "deviceId") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let field_reference = match normalize_required(req.field_reference, "fieldReference") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let label = match normalize_required(req.label, "label") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let aggregation = match req.aggregation {
        Some(raw) => match AggregationMethod::parse(raw.trim()) {
            Some(method) => method,
            None => return bad_request_error(format!("unknown aggregation: {raw}")),
        },
        None => AggregationMethod::Last,
    };
    let transform_expression = match normalize_optional(req.transform_expression, "transformExpression")
    {
        Ok(value) => value,
        Err(response) => return response,
    };
    // 表达式错误在创建时暴露
    if let Some(expression) = transform_expression.as_deref() {
        if let Err(err) = Transform::parse(expression) {
            return bad_request_error(err.to_string());
        }
    }
    // 目标资产必须存在且属于当前租户
    match state.assets.find_asset(&ctx, &path.asset_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found_error(),
        Err(err) => return storage_error(err),
    }
    let record = DataPointMappingRecord {
        mapping_id: Uuid::new_v4().to_string(),
        tenant_id: ctx.tenant_id.clone(),
        asset_id: path.asset_id,
        device_id,
        field_reference,
        label,
        unit: req.unit,
        aggregation,
        rollup_enabled: req.rollup_enabled.unwrap_or(true),
        transform_expression,
        warn_low: req.warn_low,
        warn_high: req.warn_high,
        crit_low: req.crit_low,
        crit_high: req.crit_high,
    };
    match state.mappings.create_mapping(&ctx, record).await {
        Ok(item) => (
            StatusCode::OK,
            Json(ApiResponse::success(mapping_to_dto(item))),
        )
            .into_response(),
        Err(err) => storage_error(err),
    }
}

/// 列出资产的数据点映射
pub async fn list_mappings(
    State(state): State<AppState>,
    Path(path): Path<AssetPath>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    // 目标资产必须存在且属于当前租户
    match state.assets.find_asset(&ctx, &path.asset_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found_error(),
        Err(err) => return storage_error(err),
    }
    match state.mappings.list_for_asset(&ctx, &path.asset_id).await {
        Ok(items) => {
            let data: Vec<DataPointMappingDto> = items.into_iter().map(mapping_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => storage_error(err),
    }
}

/// 删除数据点映射
pub async fn delete_mapping(
    State(state): State<AppState>,
    Path(path): Path<MappingPath>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.mappings.delete_mapping(&ctx, &path.mapping_id).await {
        Ok(true) => (StatusCode::OK, Json(ApiResponse::success(()))).into_response(),
        Ok(false) => not_found_error(),
        Err(err) => storage_error(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{app_state, new_asset, tenant_ctx, tenant_headers};

    fn mapping(asset_id: &str, tenant_id: &str) -> DataPointMappingRecord {
        DataPointMappingRecord {
            mapping_id: "m-1".to_string(),
            tenant_id: tenant_id.to_string(),
            asset_id: asset_id.to_string(),
            device_id: "dev-1".to_string(),
            field_reference: "sensors.temp".to_string(),
            label: "temperature".to_string(),
            unit: None,
            aggregation: AggregationMethod::Last,
            rollup_enabled: true,
            transform_expression: None,
            warn_low: None,
            warn_high: None,
            crit_low: None,
            crit_high: None,
        }
    }

    #[tokio::test]
    async fn list_mappings_rejects_foreign_tenant_asset() {
        let state = app_state();
        let owner = tenant_ctx("tenant-2");
        state
            .assets
            .create_asset(&owner, new_asset("pump-1", "tenant-2"))
            .await
            .unwrap();
        state
            .mappings
            .create_mapping(&owner, mapping("pump-1", "tenant-2"))
            .await
            .unwrap();

        // 跨租户读必须是 403，而不是空列表
        let response = list_mappings(
            State(state),
            Path(AssetPath {
                asset_id: "pump-1".to_string(),
            }),
            tenant_headers("tenant-1"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn list_mappings_unknown_asset_is_not_found() {
        let state = app_state();
        let response = list_mappings(
            State(state),
            Path(AssetPath {
                asset_id: "ghost".to_string(),
            }),
            tenant_headers("tenant-1"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
