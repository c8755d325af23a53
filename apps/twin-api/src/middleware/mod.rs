//! 请求中间件与租户上下文提取
//!
//! - request_context：注入 request_id/trace_id 并回写响应头
//! - require_tenant_context：从 x-tenant-id 头提取租户上下文
//!
//! 租户约定：调用方（完成过身份认证的网关）被信任已建立身份，
//! 本服务只执行租户隔离契约。缺少 x-tenant-id 头返回
//! AUTH.TENANT_REQUIRED，跨租户访问由存储层以 Forbidden 拒绝。

use axum::{
    Json,
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{Instrument, info_span};

use api_contract::ApiResponse;
use domain::TenantContext;
use twin_telemetry::new_request_ids;

/// 请求上下文中间件：注入 request_id/trace_id
pub async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    let ids = new_request_ids();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(ids.clone());

    let span = info_span!(
        "request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %method,
        path = %path
    );

    let mut response = next.run(req).instrument(span).await;
    response.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&ids.request_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response.headers_mut().insert(
        "x-trace-id",
        HeaderValue::from_str(&ids.trace_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}

/// 从请求头提取租户上下文
pub fn require_tenant_context(headers: &HeaderMap) -> Result<TenantContext, Response> {
    let tenant_id = headers
        .get("x-tenant-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let Some(tenant_id) = tenant_id else {
        return Err(tenant_required_error());
    };
    let user_id = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("anonymous");
    Ok(TenantContext::new(tenant_id, user_id, Vec::new()))
}

fn tenant_required_error() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiResponse::<()>::error(
            "AUTH.TENANT_REQUIRED",
            "x-tenant-id header required",
        )),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::require_tenant_context;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn tenant_header_extracts() {
        let mut headers = HeaderMap::new();
        headers.insert("x-tenant-id", HeaderValue::from_static("tenant-1"));
        headers.insert("x-user-id", HeaderValue::from_static("u-1"));
        let ctx = require_tenant_context(&headers).expect("ctx");
        assert_eq!(ctx.tenant_id, "tenant-1");
        assert_eq!(ctx.user_id, "u-1");
    }

    #[test]
    fn missing_tenant_rejected() {
        let headers = HeaderMap::new();
        assert!(require_tenant_context(&headers).is_err());
    }

    #[test]
    fn blank_tenant_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("x-tenant-id", HeaderValue::from_static("   "));
        assert!(require_tenant_context(&headers).is_err());
    }
}
