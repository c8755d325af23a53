//! 汇总 handlers
//!
//! - POST /assets/{id}/rollup-configs - 创建汇总配置
//! - GET /assets/{id}/rollup-configs - 列出资产的汇总配置
//! - DELETE /rollup-configs/{config_id} - 删除汇总配置
//! - GET /assets/{id}/rollup?metric=&start=&end= - 查询结果序列
//! - POST /rollup/tick - 手工触发一轮调度（运维入口）

use crate::AppState;
use crate::middleware::require_tenant_context;
use crate::utils::normalize_required;
use crate::utils::response::{
    bad_request_error, not_found_error, rollup_config_to_dto, rollup_result_to_dto, storage_error,
};
use api_contract::{
    ApiResponse, CreateRollupConfigRequest, RollupConfigDto, RollupResultDto,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use domain::{AggregationMethod, AssetType};
use std::time::{SystemTime, UNIX_EPOCH};
use twin_storage::{AssetStore, RollupConfigRecord, RollupConfigStore, RollupResultStore};
use uuid::Uuid;

#[derive(serde::Deserialize)]
pub struct AssetPath {
    asset_id: String,
}

#[derive(serde::Deserialize)]
pub struct ConfigPath {
    config_id: String,
}

#[derive(serde::Deserialize)]
pub struct SeriesQuery {
    metric: String,
    start: i64,
    end: i64,
}

/// 创建汇总配置
///
/// interval 必须为正；weight_factors 缺省的子资产按权重 1 参与。
pub async fn create_rollup_config(
    State(state): State<AppState>,
    Path(path): Path<AssetPath>,
    headers: HeaderMap,
    Json(req): Json<CreateRollupConfigRequest>,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let metric_name = match normalize_required(req.metric_name, "metricName") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let Some(aggregation) = AggregationMethod::parse(req.aggregation.trim()) else {
        return bad_request_error(format!("unknown aggregation: {}", req.aggregation));
    };
    if req.interval_seconds == 0 {
        return bad_request_error("intervalSeconds must be positive");
    }
    // 目标资产必须存在且属于当前租户
    match state.assets.find_asset(&ctx, &path.asset_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found_error(),
        Err(err) => return storage_error(err),
    }
    let record = RollupConfigRecord {
        config_id: Uuid::new_v4().to_string(),
        tenant_id: ctx.tenant_id.clone(),
        asset_id: path.asset_id,
        metric_name,
        aggregation,
        interval_seconds: req.interval_seconds,
        include_children: req.include_children.unwrap_or(true),
        window_seconds: req.window_seconds.filter(|value| *value > 0),
        weight_factors: req.weight_factors,
        filter_asset_type: req
            .filter_asset_type
            .filter(|value| !value.trim().is_empty())
            .map(|value| AssetType::parse(value.trim())),
        filter_tag: req.filter_tag.filter(|value| !value.trim().is_empty()),
        enabled: true,
    };
    match state.rollup_configs.create_config(&ctx, record).await {
        Ok(item) => (
            StatusCode::OK,
            Json(ApiResponse::success(rollup_config_to_dto(item))),
        )
            .into_response(),
        Err(err) => storage_error(err),
    }
}

/// 列出资产的汇总配置
pub async fn list_rollup_configs(
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
    match state.rollup_configs.list_for_asset(&ctx, &path.asset_id).await {
        Ok(items) => {
            let data: Vec<RollupConfigDto> =
                items.into_iter().map(rollup_config_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => storage_error(err),
    }
}

/// 删除汇总配置
pub async fn delete_rollup_config(
    State(state): State<AppState>,
    Path(path): Path<ConfigPath>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.rollup_configs.delete_config(&ctx, &path.config_id).await {
        Ok(true) => (StatusCode::OK, Json(ApiResponse::success(()))).into_response(),
        Ok(false) => not_found_error(),
        Err(err) => storage_error(err),
    }
}

/// 查询汇总结果时间序列（[start, end) 半开区间，按桶起点升序）
pub async fn query_rollup_series(
    State(state): State<AppState>,
    Path(path): Path<AssetPath>,
    Query(query): Query<SeriesQuery>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if query.metric.trim().is_empty() {
        return bad_request_error("metric required");
    }
    if query.end <= query.start {
        return bad_request_error("end must be greater than start");
    }
    // 目标资产必须存在且属于当前租户
    match state.assets.find_asset(&ctx, &path.asset_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found_error(),
        Err(err) => return storage_error(err),
    }
    match state
        .rollup_results
        .query_series(&ctx, &path.asset_id, query.metric.trim(), query.start, query.end)
        .await
    {
        Ok(items) => {
            let data: Vec<RollupResultDto> =
                items.into_iter().map(rollup_result_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => storage_error(err),
    }
}

/// 手工触发一轮汇总调度（扫描所有启用配置）
pub async fn trigger_rollup_tick(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = require_tenant_context(&headers) {
        return response;
    }
    state.scheduler.tick_once(current_ms()).await;
    (StatusCode::OK, Json(ApiResponse::success(()))).into_response()
}

fn current_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{app_state, new_asset, tenant_ctx, tenant_headers};
    use std::collections::BTreeMap;

    fn config(asset_id: &str, tenant_id: &str) -> RollupConfigRecord {
        RollupConfigRecord {
            config_id: "cfg-1".to_string(),
            tenant_id: tenant_id.to_string(),
            asset_id: asset_id.to_string(),
            metric_name: "temperature".to_string(),
            aggregation: AggregationMethod::Average,
            interval_seconds: 60,
            include_children: true,
            window_seconds: None,
            weight_factors: BTreeMap::new(),
            filter_asset_type: None,
            filter_tag: None,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn list_rollup_configs_rejects_foreign_tenant_asset() {
        let state = app_state();
        let owner = tenant_ctx("tenant-2");
        state
            .assets
            .create_asset(&owner, new_asset("line-1", "tenant-2"))
            .await
            .unwrap();
        state
            .rollup_configs
            .create_config(&owner, config("line-1", "tenant-2"))
            .await
            .unwrap();

        // 跨租户读必须是 403，而不是空列表
        let response = list_rollup_configs(
            State(state),
            Path(AssetPath {
                asset_id: "line-1".to_string(),
            }),
            tenant_headers("tenant-1"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn query_rollup_series_rejects_foreign_tenant_asset() {
        let state = app_state();
        let owner = tenant_ctx("tenant-2");
        state
            .assets
            .create_asset(&owner, new_asset("line-1", "tenant-2"))
            .await
            .unwrap();

        let response = query_rollup_series(
            State(state),
            Path(AssetPath {
                asset_id: "line-1".to_string(),
            }),
            Query(SeriesQuery {
                metric: "temperature".to_string(),
                start: 0,
                end: 60_000,
            }),
            tenant_headers("tenant-1"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn query_rollup_series_unknown_asset_is_not_found() {
        let state = app_state();
        let response = query_rollup_series(
            State(state),
            Path(AssetPath {
                asset_id: "ghost".to_string(),
            }),
            Query(SeriesQuery {
                metric: "temperature".to_string(),
                start: 0,
                end: 60_000,
            }),
            tenant_headers("tenant-1"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
