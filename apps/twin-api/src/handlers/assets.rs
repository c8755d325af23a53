//! 资产层级 handlers
//!
//! 提供资产树的增删改查与层级操作接口：
//! - POST /assets - 创建资产（path/depth 由存储层从父节点推导）
//! - GET /assets/{id} - 获取资产详情
//! - PUT /assets/{id} - 更新描述性字段（层级变更走 move）
//! - DELETE /assets/{id}?cascade= - 按级联策略删除
//! - POST /assets/{id}/move - 移动子树（原子前缀替换）
//! - GET /assets/{id}/children|descendants|ancestors|tree
//! - GET /assets/roots, GET /assets/search
//!
//! 权限要求：所有接口需要 x-tenant-id 头；跨租户访问由存储层
//! 返回 Forbidden（403），不会被掩饰成空结果。

use crate::AppState;
use crate::middleware::require_tenant_context;
use crate::utils::response::{
    asset_to_dto, bad_request_error, location_from_dto, not_found_error, storage_error,
};
use crate::utils::{normalize_optional, normalize_required, parse_cascade};
use api_contract::{
    ApiResponse, AssetDto, AssetTreeDto, CreateAssetRequest, DeleteAssetResponse, MoveAssetRequest,
    UpdateAssetRequest,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use domain::{AssetStatus, AssetType, CascadePolicy};
use std::collections::HashMap;
use twin_storage::{AssetFilter, AssetRecord, AssetStore, AssetUpdate, NewAsset};
use uuid::Uuid;

#[derive(serde::Deserialize)]
pub struct AssetPath {
    asset_id: String,
}

#[derive(serde::Deserialize)]
pub struct DeleteQuery {
    cascade: Option<String>,
}

#[derive(serde::Deserialize)]
pub struct TreeQuery {
    depth: Option<i32>,
}

#[derive(serde::Deserialize)]
pub struct SearchQuery {
    name: Option<String>,
    tag: Option<String>,
    #[serde(rename = "type")]
    asset_type: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

/// 创建资产
///
/// parent_id 为空时创建根资产；父节点缺失返回 404，父节点属于
/// 其他租户返回 403。物化路径与深度由存储层推导，请求不接受。
pub async fn create_asset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateAssetRequest>,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let name = match normalize_required(req.name, "name") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let parent_id = match normalize_optional(req.parent_id, "parentId") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let status = match req.status {
        Some(raw) => match AssetStatus::parse(raw.trim()) {
            Some(status) => status,
            None => return bad_request_error(format!("unknown status: {raw}")),
        },
        None => AssetStatus::Active,
    };
    let input = NewAsset {
        asset_id: Uuid::new_v4().to_string(),
        tenant_id: ctx.tenant_id.clone(),
        parent_id,
        name,
        asset_type: AssetType::parse(req.asset_type.trim()),
        status,
        location: req.location.map(location_from_dto),
        metadata: req.metadata,
        tags: req.tags.into_iter().collect(),
    };
    match state.assets.create_asset(&ctx, input).await {
        Ok(item) => (
            StatusCode::OK,
            Json(ApiResponse::success(asset_to_dto(item))),
        )
            .into_response(),
        Err(err) => storage_error(err),
    }
}

/// 获取资产详情
pub async fn get_asset(
    State(state): State<AppState>,
    Path(path): Path<AssetPath>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.assets.find_asset(&ctx, &path.asset_id).await {
        Ok(Some(item)) => (
            StatusCode::OK,
            Json(ApiResponse::success(asset_to_dto(item))),
        )
            .into_response(),
        Ok(None) => not_found_error(),
        Err(err) => storage_error(err),
    }
}

/// 更新资产描述性字段
///
/// path/depth/parent_id 不在此接口的词汇表内，层级变更走 move。
pub async fn update_asset(
    State(state): State<AppState>,
    Path(path): Path<AssetPath>,
    headers: HeaderMap,
    Json(req): Json<UpdateAssetRequest>,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let name = match normalize_optional(req.name, "name") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let status = match req.status {
        Some(raw) => match AssetStatus::parse(raw.trim()) {
            Some(status) => Some(status),
            None => return bad_request_error(format!("unknown status: {raw}")),
        },
        None => None,
    };
    let update = AssetUpdate {
        name,
        status,
        location: req.location.map(location_from_dto),
        metadata: req.metadata,
        tags: req.tags.map(|tags| tags.into_iter().collect()),
    };
    if update.name.is_none()
        && update.status.is_none()
        && update.location.is_none()
        && update.metadata.is_none()
        && update.tags.is_none()
    {
        return bad_request_error("empty update");
    }
    match state.assets.update_asset(&ctx, &path.asset_id, update).await {
        Ok(Some(item)) => (
            StatusCode::OK,
            Json(ApiResponse::success(asset_to_dto(item))),
        )
            .into_response(),
        Ok(None) => not_found_error(),
        Err(err) => storage_error(err),
    }
}

/// 移动资产到新父节点
///
/// new_parent_id 为空表示提升为根。目标是自身或自身后代时返回
/// 409 HIERARCHY.CIRCULAR_REFERENCE；整棵子树的 path/depth 原子
/// 改写，要么全部生效要么全部回滚。
pub async fn move_asset(
    State(state): State<AppState>,
    Path(path): Path<AssetPath>,
    headers: HeaderMap,
    Json(req): Json<MoveAssetRequest>,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let new_parent_id = match normalize_optional(req.new_parent_id, "newParentId") {
        Ok(value) => value,
        Err(response) => return response,
    };
    match state
        .assets
        .move_asset(&ctx, &path.asset_id, new_parent_id.as_deref())
        .await
    {
        Ok(item) => {
            twin_telemetry::record_asset_move();
            (
                StatusCode::OK,
                Json(ApiResponse::success(asset_to_dto(item))),
            )
                .into_response()
        }
        Err(err) => storage_error(err),
    }
}

/// 删除资产
///
/// ?cascade=reject|cascade|reparent:{target}，缺省 reject。
/// reject 策略下存在子节点返回 409 HIERARCHY.HAS_CHILDREN；
/// 返回本次删除的资产数量。
pub async fn delete_asset(
    State(state): State<AppState>,
    Path(path): Path<AssetPath>,
    Query(query): Query<DeleteQuery>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let policy = match parse_cascade(query.cascade.as_deref()) {
        Ok(policy) => policy,
        Err(response) => return response,
    };
    let cascading = policy == CascadePolicy::CascadeDelete;
    match state.assets.delete_asset(&ctx, &path.asset_id, policy).await {
        Ok(removed) => {
            if cascading {
                twin_telemetry::record_asset_cascade_delete();
            }
            (
                StatusCode::OK,
                Json(ApiResponse::success(DeleteAssetResponse { removed })),
            )
                .into_response()
        }
        Err(err) => storage_error(err),
    }
}

/// 列出直接子节点
pub async fn list_children(
    State(state): State<AppState>,
    Path(path): Path<AssetPath>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.assets.list_children(&ctx, &path.asset_id).await {
        Ok(items) => asset_list_response(items),
        Err(err) => storage_error(err),
    }
}

/// 列出全部后代（按 path 排序）
pub async fn list_descendants(
    State(state): State<AppState>,
    Path(path): Path<AssetPath>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.assets.list_descendants(&ctx, &path.asset_id).await {
        Ok(items) => asset_list_response(items),
        Err(err) => storage_error(err),
    }
}

/// 列出祖先链（根在前）
pub async fn list_ancestors(
    State(state): State<AppState>,
    Path(path): Path<AssetPath>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.assets.list_ancestors(&ctx, &path.asset_id).await {
        Ok(items) => asset_list_response(items),
        Err(err) => storage_error(err),
    }
}

/// 列出租户根资产
pub async fn list_roots(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.assets.list_roots(&ctx).await {
        Ok(items) => asset_list_response(items),
        Err(err) => storage_error(err),
    }
}

/// 获取以某资产为根的子树（?depth= 限制相对深度）
pub async fn get_tree(
    State(state): State<AppState>,
    Path(path): Path<AssetPath>,
    Query(query): Query<TreeQuery>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let root = match state.assets.find_asset(&ctx, &path.asset_id).await {
        Ok(Some(item)) => item,
        Ok(None) => return not_found_error(),
        Err(err) => return storage_error(err),
    };
    let descendants = match state.assets.list_descendants(&ctx, &path.asset_id).await {
        Ok(items) => items,
        Err(err) => return storage_error(err),
    };
    let tree = build_tree(root, descendants, query.depth);
    (StatusCode::OK, Json(ApiResponse::success(tree))).into_response()
}

/// 按名称/标签/类型检索（分页，limit 有上限）
pub async fn search_assets(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_tenant_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let limit = query
        .limit
        .unwrap_or(state.search_default_limit)
        .min(state.search_max_limit);
    let filter = AssetFilter {
        name_contains: query.name.filter(|value| !value.trim().is_empty()),
        tag: query.tag.filter(|value| !value.trim().is_empty()),
        asset_type: query
            .asset_type
            .filter(|value| !value.trim().is_empty())
            .map(|value| AssetType::parse(value.trim())),
        limit,
        offset: query.offset.unwrap_or(0),
    };
    match state.assets.search_assets(&ctx, filter).await {
        Ok(items) => asset_list_response(items),
        Err(err) => storage_error(err),
    }
}

fn asset_list_response(items: Vec<AssetRecord>) -> Response {
    let data: Vec<AssetDto> = items.into_iter().map(asset_to_dto).collect();
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// 从后代列表组装子树（后代已按 path 排序，子节点顺序稳定）。
fn build_tree(root: AssetRecord, descendants: Vec<AssetRecord>, depth: Option<i32>) -> AssetTreeDto {
    let mut children_of: HashMap<String, Vec<AssetRecord>> = HashMap::new();
    for node in descendants {
        if let Some(parent_id) = node.parent_id.clone() {
            children_of.entry(parent_id).or_default().push(node);
        }
    }
    attach(root, &mut children_of, depth.unwrap_or(i32::MAX).max(0), 0)
}

fn attach(
    node: AssetRecord,
    children_of: &mut HashMap<String, Vec<AssetRecord>>,
    max_depth: i32,
    level: i32,
) -> AssetTreeDto {
    let mut children = Vec::new();
    if level < max_depth {
        if let Some(kids) = children_of.remove(&node.asset_id) {
            for kid in kids {
                children.push(attach(kid, children_of, max_depth, level + 1));
            }
        }
    }
    AssetTreeDto {
        asset: asset_to_dto(node),
        children,
    }
}
