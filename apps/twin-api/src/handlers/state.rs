//! 资产状态 handlers
//!
//! - POST /telemetry/{device_id} - 遥测应用入口（外部接入方调用）
//! - GET /assets/{id}/state - 读取状态快照
//! - POST /assets/{id}/state - 人工覆写（测试与修正入口）
//!
//! 遥测语义：无映射字段丢弃并计数；乱序批次整批丢弃（记日志，
//! 不报错）；写入后评估告警阈值。数值样本同时进入遥测历史缓冲，
//! 供窗口聚合读取。

use crate::AppState;
use crate::middleware::require_tenant_context;
use crate::utils::response::{
    bad_request_error, not_found_error, rollup_error, state_error, state_to_dto, storage_error,
};
use crate::utils::json_to_scalar;
use api_contract::{
    ApiResponse, ApplyTelemetryRequest, ApplyTelemetryResponse, OverrideStateRequest,
};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use domain::ScalarValue;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use twin_storage::AssetStore;

#[derive(serde::Deserialize)]
pub struct AssetPath {
    asset_id: String,
}

#[derive(serde::Deserialize)]
pub struct DevicePath {
    device_id: String,
}

/// 应用一批设备遥测
pub async fn apply_telemetry(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
    headers: HeaderMap,
    Json(req): Json<ApplyTelemetryRequest>,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let mut values: BTreeMap<String, ScalarValue> = BTreeMap::new();
    for (field_reference, raw) in &req.values {
        let Some(scalar) = json_to_scalar(raw) else {
            return bad_request_error(format!("field {field_reference} is not a scalar"));
        };
        values.insert(field_reference.clone(), scalar);
    }
    // 数值样本进历史缓冲（窗口聚合的数据源）
    for (field_reference, scalar) in &values {
        if let Some(value) = scalar.as_f64() {
            if let Err(err) = state.history.record(
                &ctx,
                &path.device_id,
                field_reference,
                req.observed_at_ms,
                value,
            ) {
                return rollup_error(err);
            }
        }
    }
    match state
        .tracker
        .apply_telemetry(&ctx, &path.device_id, &values, req.observed_at_ms)
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ApiResponse::success(ApplyTelemetryResponse {
                asset_id: outcome.asset_id,
                applied: outcome.applied,
                dropped_unmapped: outcome.dropped_unmapped,
                dropped_out_of_order: outcome.dropped_out_of_order,
                alarm_status: outcome.alarm_status.as_str().to_string(),
            })),
        )
            .into_response(),
        Err(err) => state_error(err),
    }
}

/// 读取资产状态快照
///
/// 先校验资产归属：他租户资产返回 403，不存在返回 404。
/// 有映射无数据返回空快照；既无状态也无映射返回 404。
pub async fn get_state(
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
    match state.tracker.get_state(&ctx, &path.asset_id).await {
        Ok(record) => (
            StatusCode::OK,
            Json(ApiResponse::success(state_to_dto(record))),
        )
            .into_response(),
        Err(err) => state_error(err),
    }
}

/// 人工覆写资产状态（无条件赋值，不参与时间序仲裁）
pub async fn override_state(
    State(state): State<AppState>,
    Path(path): Path<AssetPath>,
    headers: HeaderMap,
    Json(req): Json<OverrideStateRequest>,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let mut values: BTreeMap<String, ScalarValue> = BTreeMap::new();
    for (label, raw) in &req.values {
        let Some(scalar) = json_to_scalar(raw) else {
            return bad_request_error(format!("field {label} is not a scalar"));
        };
        values.insert(label.clone(), scalar);
    }
    // 目标资产必须存在且属于当前租户
    match state.assets.find_asset(&ctx, &path.asset_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found_error(),
        Err(err) => return storage_error(err),
    }
    let observed_at_ms = req.observed_at_ms.unwrap_or_else(now_ms);
    match state
        .tracker
        .override_state(&ctx, &path.asset_id, &values, observed_at_ms)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::success(()))).into_response(),
        Err(err) => state_error(err),
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{app_state, new_asset, tenant_ctx, tenant_headers};

    #[tokio::test]
    async fn get_state_rejects_foreign_tenant_asset() {
        let state = app_state();
        let owner = tenant_ctx("tenant-2");
        state
            .assets
            .create_asset(&owner, new_asset("pump-1", "tenant-2"))
            .await
            .unwrap();

        let response = get_state(
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
    async fn get_state_unknown_asset_is_not_found() {
        let state = app_state();
        let response = get_state(
            State(state),
            Path(AssetPath {
                asset_id: "ghost".to_string(),
            }),
            tenant_headers("tenant-1"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn override_state_rejects_foreign_tenant_asset() {
        let state = app_state();
        let owner = tenant_ctx("tenant-2");
        state
            .assets
            .create_asset(&owner, new_asset("pump-1", "tenant-2"))
            .await
            .unwrap();

        let mut values = std::collections::BTreeMap::new();
        values.insert("temperature".to_string(), serde_json::json!(21.5));
        let response = override_state(
            State(state),
            Path(AssetPath {
                asset_id: "pump-1".to_string(),
            }),
            tenant_headers("tenant-1"),
            Json(OverrideStateRequest {
                values,
                observed_at_ms: Some(1_000),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
