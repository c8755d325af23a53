//! Postgres 资产层级存储实现
//!
//! 通过 SQL 查询实现资产 CRUD 与层级变更。
//!
//! 设计要点：
//! - 所有操作都带有租户作用域验证，SQL 全部参数化
//! - `(tenant_id, path)` 建有前缀索引，后代查询是一次
//!   `path like $1 || '/%'` 范围扫描而不是递归 N 跳
//! - move 在单个事务内完成：环检测 + 整棵子树一条 UPDATE 前缀
//!   替换，任何一步失败整体回滚，树保持移动前状态

use crate::error::StorageError;
use crate::lock::{LockMode, SubtreeGuard, SubtreeLockManager};
use crate::models::{AssetFilter, AssetLocation, AssetRecord, AssetUpdate, NewAsset};
use crate::traits::AssetStore;
use crate::validation::{ensure_owned, ensure_tenant};
use domain::path::{encode_path, is_ancestor_or_self};
use domain::{AssetStatus, AssetType, CascadePolicy, TenantContext};
use sqlx::{PgPool, Row};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const ASSET_COLUMNS: &str = "asset_id, tenant_id, parent_id, path, depth, name, asset_type, \
     status, latitude, longitude, address, metadata, tags";

pub struct PgAssetStore {
    pub pool: PgPool,
    locks: Arc<SubtreeLockManager>,
}

impl PgAssetStore {
    pub fn new(pool: PgPool, locks: Arc<SubtreeLockManager>) -> Self {
        Self { pool, locks }
    }

    pub async fn connect(
        database_url: &str,
        locks: Arc<SubtreeLockManager>,
    ) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool, locks })
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<AssetRecord, StorageError> {
        let latitude: Option<f64> = row.try_get("latitude")?;
        let longitude: Option<f64> = row.try_get("longitude")?;
        let address: Option<String> = row.try_get("address")?;
        let location = if latitude.is_some() || longitude.is_some() || address.is_some() {
            Some(AssetLocation {
                latitude,
                longitude,
                address,
            })
        } else {
            None
        };
        let metadata: Option<String> = row.try_get("metadata")?;
        let metadata: BTreeMap<String, String> = match metadata {
            Some(raw) => serde_json::from_str(&raw).map_err(StorageError::backend)?,
            None => BTreeMap::new(),
        };
        let tags: Option<String> = row.try_get("tags")?;
        let tags: BTreeSet<String> = match tags {
            Some(raw) => serde_json::from_str(&raw).map_err(StorageError::backend)?,
            None => BTreeSet::new(),
        };
        let asset_type: String = row.try_get("asset_type")?;
        let status: String = row.try_get("status")?;
        Ok(AssetRecord {
            asset_id: row.try_get("asset_id")?,
            tenant_id: row.try_get("tenant_id")?,
            parent_id: row.try_get("parent_id")?,
            path: row.try_get("path")?,
            depth: row.try_get("depth")?,
            name: row.try_get("name")?,
            asset_type: AssetType::parse(&asset_type),
            status: AssetStatus::parse(&status)
                .ok_or_else(|| StorageError::backend("invalid status in row"))?,
            location,
            metadata,
            tags,
        })
    }

    async fn fetch_owned(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<AssetRecord, StorageError> {
        let row = sqlx::query(&format!(
            "select {} from assets where asset_id = $1",
            ASSET_COLUMNS
        ))
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;
        let row = row.ok_or(StorageError::NotFound)?;
        let record = Self::row_to_record(&row)?;
        ensure_owned(ctx, &record.tenant_id)?;
        Ok(record)
    }

    /// 获取覆盖 asset 当前子树的写锁（加锁后重读校验 path）。
    async fn lock_subtree(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<(SubtreeGuard, AssetRecord), StorageError> {
        loop {
            let path = self.fetch_owned(ctx, asset_id).await?.path;
            let guard = self.locks.acquire(&path, LockMode::Write).await?;
            let record = self.fetch_owned(ctx, asset_id).await?;
            if record.path == path {
                return Ok((guard, record));
            }
        }
    }
}

#[async_trait::async_trait]
impl AssetStore for PgAssetStore {
    async fn create_asset(
        &self,
        ctx: &TenantContext,
        input: NewAsset,
    ) -> Result<AssetRecord, StorageError> {
        ensure_owned(ctx, &input.tenant_id)?;
        let parent_path = match input.parent_id.as_deref() {
            Some(parent_id) => {
                let parent = self.fetch_owned(ctx, parent_id).await?;
                Some(parent.path)
            }
            None => None,
        };
        let path = encode_path(parent_path.as_deref(), &input.asset_id)?;
        let depth = domain::path::depth_of(&path) as i32;
        let metadata = serde_json::to_string(&input.metadata).map_err(StorageError::backend)?;
        let tags = serde_json::to_string(&input.tags).map_err(StorageError::backend)?;
        let (latitude, longitude, address) = match &input.location {
            Some(location) => (
                location.latitude,
                location.longitude,
                location.address.clone(),
            ),
            None => (None, None, None),
        };
        sqlx::query(
            "insert into assets (asset_id, tenant_id, parent_id, path, depth, name, asset_type, \
             status, latitude, longitude, address, metadata, tags) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(&input.asset_id)
        .bind(&input.tenant_id)
        .bind(&input.parent_id)
        .bind(&path)
        .bind(depth)
        .bind(&input.name)
        .bind(input.asset_type.as_str())
        .bind(input.status.as_str())
        .bind(latitude)
        .bind(longitude)
        .bind(&address)
        .bind(&metadata)
        .bind(&tags)
        .execute(&self.pool)
        .await?;
        Ok(AssetRecord {
            asset_id: input.asset_id,
            tenant_id: input.tenant_id,
            parent_id: input.parent_id,
            path,
            depth,
            name: input.name,
            asset_type: input.asset_type,
            status: input.status,
            location: input.location,
            metadata: input.metadata,
            tags: input.tags,
        })
    }

    async fn find_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Option<AssetRecord>, StorageError> {
        ensure_tenant(ctx)?;
        match self.fetch_owned(ctx, asset_id).await {
            Ok(record) => Ok(Some(record)),
            Err(StorageError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn update_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        update: AssetUpdate,
    ) -> Result<Option<AssetRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let current = match self.find_asset(ctx, asset_id).await? {
            Some(record) => record,
            None => return Ok(None),
        };
        let metadata = match &update.metadata {
            Some(metadata) => serde_json::to_string(metadata).map_err(StorageError::backend)?,
            None => serde_json::to_string(&current.metadata).map_err(StorageError::backend)?,
        };
        let tags = match &update.tags {
            Some(tags) => serde_json::to_string(tags).map_err(StorageError::backend)?,
            None => serde_json::to_string(&current.tags).map_err(StorageError::backend)?,
        };
        let location = update.location.or(current.location);
        let (latitude, longitude, address) = match &location {
            Some(location) => (
                location.latitude,
                location.longitude,
                location.address.clone(),
            ),
            None => (None, None, None),
        };
        let row = sqlx::query(&format!(
            "update assets set \
             name = coalesce($1, name), \
             status = coalesce($2, status), \
             latitude = $3, longitude = $4, address = $5, \
             metadata = $6, tags = $7 \
             where tenant_id = $8 and asset_id = $9 \
             returning {}",
            ASSET_COLUMNS
        ))
        .bind(update.name)
        .bind(update.status.map(|status| status.as_str().to_string()))
        .bind(latitude)
        .bind(longitude)
        .bind(address)
        .bind(metadata)
        .bind(tags)
        .bind(&ctx.tenant_id)
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(Self::row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn move_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<AssetRecord, StorageError> {
        let (_guard, record) = self.lock_subtree(ctx, asset_id).await?;
        // 锁外先做归属与环的快速检查，保证错误分类（Forbidden 等）
        if let Some(parent_id) = new_parent_id {
            let parent = self.fetch_owned(ctx, parent_id).await?;
            if is_ancestor_or_self(&record.path, &parent.path) {
                return Err(StorageError::CircularReference);
            }
        }

        // 进程内子树锁只覆盖本节点的前缀：两个方向相反的并发
        // move 各自锁到的是不相交的前缀，锁外读到的 path 可能在
        // 对方提交后失效。事务内对两行 for update 重读并重查环，
        // 把这种交错串行化（死锁由 Postgres 仲裁，一侧回滚重试）。
        let mut tx = self.pool.begin().await?;
        let current_path: String =
            sqlx::query("select path from assets where tenant_id = $1 and asset_id = $2 for update")
                .bind(&ctx.tenant_id)
                .bind(asset_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StorageError::NotFound)?
                .try_get("path")?;
        let new_parent_path = match new_parent_id {
            Some(parent_id) => {
                let parent_path: String = sqlx::query(
                    "select path from assets where tenant_id = $1 and asset_id = $2 for update",
                )
                .bind(&ctx.tenant_id)
                .bind(parent_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StorageError::NotFound)?
                .try_get("path")?;
                if is_ancestor_or_self(&current_path, &parent_path) {
                    return Err(StorageError::CircularReference);
                }
                Some(parent_path)
            }
            None => None,
        };
        let new_path = encode_path(new_parent_path.as_deref(), asset_id)?;
        let depth_delta =
            domain::path::depth_of(&new_path) as i32 - domain::path::depth_of(&current_path) as i32;

        // 整棵子树的前缀替换在同一事务内完成
        sqlx::query(
            "update assets set \
             path = $1 || substr(path, char_length($2) + 1), \
             depth = depth + $3 \
             where tenant_id = $4 and (path = $2 or path like $2 || '/%')",
        )
        .bind(&new_path)
        .bind(&current_path)
        .bind(depth_delta)
        .bind(&ctx.tenant_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("update assets set parent_id = $1 where tenant_id = $2 and asset_id = $3")
            .bind(new_parent_id)
            .bind(&ctx.tenant_id)
            .bind(asset_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.fetch_owned(ctx, asset_id).await
    }

    async fn delete_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        policy: CascadePolicy,
    ) -> Result<usize, StorageError> {
        let (_guard, record) = self.lock_subtree(ctx, asset_id).await?;
        match policy {
            CascadePolicy::RejectIfChildren => {
                let row = sqlx::query(
                    "select count(*) as children from assets \
                     where tenant_id = $1 and parent_id = $2",
                )
                .bind(&ctx.tenant_id)
                .bind(asset_id)
                .fetch_one(&self.pool)
                .await?;
                let children: i64 = row.try_get("children")?;
                if children > 0 {
                    return Err(StorageError::HasChildren);
                }
                let result =
                    sqlx::query("delete from assets where tenant_id = $1 and asset_id = $2")
                        .bind(&ctx.tenant_id)
                        .bind(asset_id)
                        .execute(&self.pool)
                        .await?;
                Ok(result.rows_affected() as usize)
            }
            CascadePolicy::CascadeDelete => {
                let result = sqlx::query(
                    "delete from assets where tenant_id = $1 \
                     and (path = $2 or path like $2 || '/%')",
                )
                .bind(&ctx.tenant_id)
                .bind(&record.path)
                .execute(&self.pool)
                .await?;
                Ok(result.rows_affected() as usize)
            }
            CascadePolicy::Reparent(target_id) => {
                let target = self.fetch_owned(ctx, &target_id).await?;
                if is_ancestor_or_self(&record.path, &target.path) {
                    return Err(StorageError::CircularReference);
                }
                let children = self.list_children(ctx, asset_id).await?;
                let mut tx = self.pool.begin().await?;
                for child in children {
                    let new_child_path = encode_path(Some(&target.path), &child.asset_id)?;
                    let depth_delta = domain::path::depth_of(&new_child_path) as i32
                        - domain::path::depth_of(&child.path) as i32;
                    sqlx::query(
                        "update assets set \
                         path = $1 || substr(path, char_length($2) + 1), \
                         depth = depth + $3 \
                         where tenant_id = $4 and (path = $2 or path like $2 || '/%')",
                    )
                    .bind(&new_child_path)
                    .bind(&child.path)
                    .bind(depth_delta)
                    .bind(&ctx.tenant_id)
                    .execute(&mut *tx)
                    .await?;
                    sqlx::query(
                        "update assets set parent_id = $1 \
                         where tenant_id = $2 and asset_id = $3",
                    )
                    .bind(&target_id)
                    .bind(&ctx.tenant_id)
                    .bind(&child.asset_id)
                    .execute(&mut *tx)
                    .await?;
                }
                sqlx::query("delete from assets where tenant_id = $1 and asset_id = $2")
                    .bind(&ctx.tenant_id)
                    .bind(asset_id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                Ok(1)
            }
        }
    }

    async fn list_children(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Vec<AssetRecord>, StorageError> {
        ensure_tenant(ctx)?;
        self.fetch_owned(ctx, asset_id).await?;
        let rows = sqlx::query(&format!(
            "select {} from assets \
             where tenant_id = $1 and parent_id = $2 order by path",
            ASSET_COLUMNS
        ))
        .bind(&ctx.tenant_id)
        .bind(asset_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn list_descendants(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Vec<AssetRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let record = self.fetch_owned(ctx, asset_id).await?;
        let rows = sqlx::query(&format!(
            "select {} from assets \
             where tenant_id = $1 and path like $2 || '/%' order by path",
            ASSET_COLUMNS
        ))
        .bind(&ctx.tenant_id)
        .bind(&record.path)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn list_ancestors(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Vec<AssetRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let record = self.fetch_owned(ctx, asset_id).await?;
        let ancestor_ids: Vec<String> = record
            .path
            .split(domain::path::SEPARATOR)
            .take_while(|segment| *segment != asset_id)
            .map(str::to_string)
            .collect();
        if ancestor_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "select {} from assets \
             where tenant_id = $1 and asset_id = any($2) order by depth",
            ASSET_COLUMNS
        ))
        .bind(&ctx.tenant_id)
        .bind(&ancestor_ids)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn list_roots(&self, ctx: &TenantContext) -> Result<Vec<AssetRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let rows = sqlx::query(&format!(
            "select {} from assets \
             where tenant_id = $1 and parent_id is null order by name",
            ASSET_COLUMNS
        ))
        .bind(&ctx.tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn search_assets(
        &self,
        ctx: &TenantContext,
        filter: AssetFilter,
    ) -> Result<Vec<AssetRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let limit = if filter.limit == 0 {
            i64::MAX
        } else {
            filter.limit as i64
        };
        let rows = sqlx::query(&format!(
            "select {} from assets \
             where tenant_id = $1 \
             and ($2::text is null or name ilike '%' || $2 || '%') \
             and ($3::text is null or tags like '%' || $3 || '%') \
             and ($4::text is null or asset_type = $4) \
             order by name, asset_id limit $5 offset $6",
            ASSET_COLUMNS
        ))
        .bind(&ctx.tenant_id)
        .bind(&filter.name_contains)
        .bind(filter.tag.as_ref().map(|tag| format!("\"{}\"", tag)))
        .bind(
            filter
                .asset_type
                .as_ref()
                .map(|asset_type| asset_type.as_str().to_string()),
        )
        .bind(limit)
        .bind(filter.offset as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_record).collect()
    }
}
