//! 健康检查与进程指标。
//!
//! - GET /health
//! - GET /metrics-lite

use api_contract::{ApiResponse, MetricsSnapshotDto};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use twin_telemetry::metrics;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

pub async fn get_metrics() -> Response {
    let snapshot = metrics().snapshot();
    (
        StatusCode::OK,
        Json(ApiResponse::success(MetricsSnapshotDto {
            telemetry_batches: snapshot.telemetry_batches,
            telemetry_values: snapshot.telemetry_values,
            dropped_out_of_order: snapshot.dropped_out_of_order,
            dropped_unmapped: snapshot.dropped_unmapped,
            state_write_success: snapshot.state_write_success,
            state_write_failure: snapshot.state_write_failure,
            alarms_raised: snapshot.alarms_raised,
            rollup_ticks: snapshot.rollup_ticks,
            rollup_no_data: snapshot.rollup_no_data,
            rollup_partial: snapshot.rollup_partial,
            rollup_child_read_failures: snapshot.rollup_child_read_failures,
            asset_moves: snapshot.asset_moves,
            asset_cascade_deletes: snapshot.asset_cascade_deletes,
            field_sync_created: snapshot.field_sync_created,
        })),
    )
        .into_response()
}
