//! 路由定义
//!
//! 集中管理所有 API 路由，将路径映射到对应的 handlers。
//! 路由包括：
//! - 健康检查与指标：/health, /metrics-lite
//! - 资产层级：/assets/*（含 move / tree / search）
//! - 设备类型字段目录：/devicetypes/{id}/fields/*
//! - 数据点映射：/assets/{id}/mappings/*
//! - 资产状态：/assets/{id}/state, /telemetry/{device_id}
//! - 汇总：/assets/{id}/rollup*, /rollup/tick

use super::AppState;
use super::handlers::*;
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// 创建 API 路由
///
/// 返回包含所有 API 端点的 Router，调用方负责挂载 / 和 /api 前缀。
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics-lite", get(get_metrics))
        .route("/assets", post(create_asset))
        .route("/assets/roots", get(list_roots))
        .route("/assets/search", get(search_assets))
        .route(
            "/assets/:asset_id",
            get(get_asset).put(update_asset).delete(delete_asset),
        )
        .route("/assets/:asset_id/move", post(move_asset))
        .route("/assets/:asset_id/children", get(list_children))
        .route("/assets/:asset_id/descendants", get(list_descendants))
        .route("/assets/:asset_id/ancestors", get(list_ancestors))
        .route("/assets/:asset_id/tree", get(get_tree))
        .route("/devicetypes/:device_type_id/schema", put(register_schema))
        .route(
            "/devicetypes/:device_type_id/fields",
            get(list_fields).put(edit_fields),
        )
        .route("/devicetypes/:device_type_id/fields/sync", post(sync_fields))
        .route(
            "/devicetypes/:device_type_id/fields/resolve",
            get(resolve_field),
        )
        .route(
            "/assets/:asset_id/mappings",
            get(list_mappings).post(create_mapping),
        )
        .route(
            "/assets/:asset_id/mappings/:mapping_id",
            delete(delete_mapping),
        )
        .route(
            "/assets/:asset_id/state",
            get(get_state).post(override_state),
        )
        .route("/telemetry/:device_id", post(apply_telemetry))
        .route("/assets/:asset_id/rollup", get(query_rollup_series))
        .route(
            "/assets/:asset_id/rollup-configs",
            get(list_rollup_configs).post(create_rollup_config),
        )
        .route("/rollup-configs/:config_id", delete(delete_rollup_config))
        .route("/rollup/tick", post(trigger_rollup_tick))
}
