//! 资产层级内存存储实现
//!
//! 仅用于本地演示和测试。
//!
//! 功能：
//! - 资产 CRUD、move、级联删除
//! - path/depth 维护（创建推导、移动前缀替换）
//! - 前缀遍历（children/descendants/ancestors/roots）
//! - 租户隔离验证
//!
//! move 与级联删除先获取子树写锁再改写，与汇总引擎的子树读锁
//! 互斥；改写本身在 map 写锁内一次性完成，天然全有或全无。

use crate::error::StorageError;
use crate::lock::{LockMode, SubtreeGuard, SubtreeLockManager};
use crate::models::{AssetFilter, AssetRecord, AssetUpdate, NewAsset};
use crate::traits::AssetStore;
use crate::validation::{ensure_owned, ensure_tenant};
use domain::path::{encode_path, is_ancestor_or_self, is_strict_ancestor};
use domain::{CascadePolicy, TenantContext};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// 资产内存存储
///
/// 使用 RwLock + HashMap 提供线程安全的内存存储；
/// 子树锁管理器与汇总引擎共享。
pub struct InMemoryAssetStore {
    assets: RwLock<HashMap<String, AssetRecord>>,
    locks: Arc<SubtreeLockManager>,
}

impl InMemoryAssetStore {
    /// 创建新的资产存储
    pub fn new(locks: Arc<SubtreeLockManager>) -> Self {
        Self {
            assets: RwLock::new(HashMap::new()),
            locks,
        }
    }

    fn read_map(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, AssetRecord>>, StorageError> {
        self.assets
            .read()
            .map_err(|_| StorageError::backend("lock failed"))
    }

    fn write_map(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, AssetRecord>>, StorageError> {
        self.assets
            .write()
            .map_err(|_| StorageError::backend("lock failed"))
    }

    fn get_owned(
        map: &HashMap<String, AssetRecord>,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<AssetRecord, StorageError> {
        let record = map.get(asset_id).ok_or(StorageError::NotFound)?;
        ensure_owned(ctx, &record.tenant_id)?;
        Ok(record.clone())
    }

    /// 获取覆盖 asset 当前子树的写锁。
    ///
    /// 读路径与加锁之间可能有并发 move 改写了 path，
    /// 加锁后重读校验，不一致则重试。
    async fn lock_subtree(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<(SubtreeGuard, AssetRecord), StorageError> {
        loop {
            let path = {
                let map = self.read_map()?;
                Self::get_owned(&map, ctx, asset_id)?.path
            };
            let guard = self.locks.acquire(&path, LockMode::Write).await?;
            let record = {
                let map = self.read_map()?;
                Self::get_owned(&map, ctx, asset_id)?
            };
            if record.path == path {
                return Ok((guard, record));
            }
        }
    }

    /// 对 old_prefix 子树做前缀替换（含自身），一次性应用。
    fn rewrite_subtree(
        map: &mut HashMap<String, AssetRecord>,
        tenant_id: &str,
        old_prefix: &str,
        new_prefix: &str,
    ) {
        let depth_delta = domain::path::depth_of(new_prefix) as i32
            - domain::path::depth_of(old_prefix) as i32;
        for record in map.values_mut() {
            if record.tenant_id == tenant_id && is_ancestor_or_self(old_prefix, &record.path) {
                if let Some(new_path) =
                    domain::path::replace_prefix(&record.path, old_prefix, new_prefix)
                {
                    record.path = new_path;
                    record.depth += depth_delta;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl AssetStore for InMemoryAssetStore {
    /// 创建资产
    async fn create_asset(
        &self,
        ctx: &TenantContext,
        input: NewAsset,
    ) -> Result<AssetRecord, StorageError> {
        ensure_owned(ctx, &input.tenant_id)?;
        let mut map = self.write_map()?;
        if map.contains_key(&input.asset_id) {
            return Err(StorageError::InvalidInput("asset already exists".to_string()));
        }
        let parent_path = match input.parent_id.as_deref() {
            Some(parent_id) => {
                let parent = map.get(parent_id).ok_or(StorageError::NotFound)?;
                ensure_owned(ctx, &parent.tenant_id)?;
                Some(parent.path.clone())
            }
            None => None,
        };
        let path = encode_path(parent_path.as_deref(), &input.asset_id)?;
        let depth = domain::path::depth_of(&path) as i32;
        let record = AssetRecord {
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
        };
        map.insert(record.asset_id.clone(), record.clone());
        Ok(record)
    }

    /// 查找资产
    async fn find_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Option<AssetRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let map = self.read_map()?;
        match map.get(asset_id) {
            Some(record) if record.tenant_id == ctx.tenant_id => Ok(Some(record.clone())),
            Some(_) => Err(StorageError::Forbidden),
            None => Ok(None),
        }
    }

    /// 更新描述性字段
    async fn update_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        update: AssetUpdate,
    ) -> Result<Option<AssetRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let mut map = self.write_map()?;
        let record = match map.get_mut(asset_id) {
            Some(record) => record,
            None => return Ok(None),
        };
        if record.tenant_id != ctx.tenant_id {
            return Err(StorageError::Forbidden);
        }
        if let Some(name) = update.name {
            record.name = name;
        }
        if let Some(status) = update.status {
            record.status = status;
        }
        if let Some(location) = update.location {
            record.location = Some(location);
        }
        if let Some(metadata) = update.metadata {
            record.metadata = metadata;
        }
        if let Some(tags) = update.tags {
            record.tags = tags;
        }
        Ok(Some(record.clone()))
    }

    /// 移动资产到新父节点
    async fn move_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<AssetRecord, StorageError> {
        let (_guard, record) = self.lock_subtree(ctx, asset_id).await?;
        let mut map = self.write_map()?;
        let new_parent_path = match new_parent_id {
            Some(parent_id) => {
                let parent = map.get(parent_id).ok_or(StorageError::NotFound)?;
                ensure_owned(ctx, &parent.tenant_id)?;
                // 物化路径即环检测：目标落在自身子树内（含自身）即成环
                if is_ancestor_or_self(&record.path, &parent.path) {
                    return Err(StorageError::CircularReference);
                }
                Some(parent.path.clone())
            }
            None => None,
        };
        let new_path = encode_path(new_parent_path.as_deref(), asset_id)?;
        Self::rewrite_subtree(&mut map, &ctx.tenant_id, &record.path, &new_path);
        let moved = map
            .get_mut(asset_id)
            .ok_or(StorageError::NotFound)?;
        moved.parent_id = new_parent_id.map(str::to_string);
        Ok(moved.clone())
    }

    /// 删除资产（按级联策略处理后代）
    async fn delete_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        policy: CascadePolicy,
    ) -> Result<usize, StorageError> {
        let (_guard, record) = self.lock_subtree(ctx, asset_id).await?;
        let mut map = self.write_map()?;
        let has_children = map
            .values()
            .any(|item| item.tenant_id == ctx.tenant_id && item.parent_id.as_deref() == Some(asset_id));
        match policy {
            CascadePolicy::RejectIfChildren => {
                if has_children {
                    return Err(StorageError::HasChildren);
                }
                map.remove(asset_id);
                Ok(1)
            }
            CascadePolicy::CascadeDelete => {
                let doomed: Vec<String> = map
                    .values()
                    .filter(|item| {
                        item.tenant_id == ctx.tenant_id
                            && is_ancestor_or_self(&record.path, &item.path)
                    })
                    .map(|item| item.asset_id.clone())
                    .collect();
                let count = doomed.len();
                for id in doomed {
                    map.remove(&id);
                }
                Ok(count)
            }
            CascadePolicy::Reparent(target_id) => {
                let target = map.get(&target_id).ok_or(StorageError::NotFound)?;
                ensure_owned(ctx, &target.tenant_id)?;
                if is_ancestor_or_self(&record.path, &target.path) {
                    return Err(StorageError::CircularReference);
                }
                let target_path = target.path.clone();
                let children: Vec<(String, String)> = map
                    .values()
                    .filter(|item| {
                        item.tenant_id == ctx.tenant_id
                            && item.parent_id.as_deref() == Some(asset_id)
                    })
                    .map(|item| (item.asset_id.clone(), item.path.clone()))
                    .collect();
                for (child_id, child_path) in children {
                    let new_child_path = encode_path(Some(&target_path), &child_id)?;
                    Self::rewrite_subtree(&mut map, &ctx.tenant_id, &child_path, &new_child_path);
                    if let Some(child) = map.get_mut(&child_id) {
                        child.parent_id = Some(target_id.clone());
                    }
                }
                map.remove(asset_id);
                Ok(1)
            }
        }
    }

    /// 列出直接子节点
    async fn list_children(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Vec<AssetRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let map = self.read_map()?;
        Self::get_owned(&map, ctx, asset_id)?;
        let mut items: Vec<AssetRecord> = map
            .values()
            .filter(|item| {
                item.tenant_id == ctx.tenant_id && item.parent_id.as_deref() == Some(asset_id)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(items)
    }

    /// 列出全部后代
    async fn list_descendants(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Vec<AssetRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let map = self.read_map()?;
        let record = Self::get_owned(&map, ctx, asset_id)?;
        let mut items: Vec<AssetRecord> = map
            .values()
            .filter(|item| {
                item.tenant_id == ctx.tenant_id && is_strict_ancestor(&record.path, &item.path)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(items)
    }

    /// 列出祖先链（根在前）
    async fn list_ancestors(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Vec<AssetRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let map = self.read_map()?;
        let record = Self::get_owned(&map, ctx, asset_id)?;
        // 路径段即祖先 id 链
        let mut items = Vec::new();
        for segment in record.path.split(domain::path::SEPARATOR) {
            if segment == asset_id {
                break;
            }
            if let Some(ancestor) = map.get(segment) {
                if ancestor.tenant_id == ctx.tenant_id {
                    items.push(ancestor.clone());
                }
            }
        }
        Ok(items)
    }

    /// 列出租户的根资产
    async fn list_roots(&self, ctx: &TenantContext) -> Result<Vec<AssetRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let map = self.read_map()?;
        let mut items: Vec<AssetRecord> = map
            .values()
            .filter(|item| item.tenant_id == ctx.tenant_id && item.parent_id.is_none())
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    /// 按名称/标签/类型检索
    async fn search_assets(
        &self,
        ctx: &TenantContext,
        filter: AssetFilter,
    ) -> Result<Vec<AssetRecord>, StorageError> {
        ensure_tenant(ctx)?;
        let map = self.read_map()?;
        let name_needle = filter.name_contains.map(|n| n.to_lowercase());
        let mut items: Vec<AssetRecord> = map
            .values()
            .filter(|item| item.tenant_id == ctx.tenant_id)
            .filter(|item| match &name_needle {
                Some(needle) => item.name.to_lowercase().contains(needle),
                None => true,
            })
            .filter(|item| match &filter.tag {
                Some(tag) => item.tags.contains(tag),
                None => true,
            })
            .filter(|item| match &filter.asset_type {
                Some(asset_type) => &item.asset_type == asset_type,
                None => true,
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.asset_id.cmp(&b.asset_id)));
        let offset = filter.offset.min(items.len());
        let items = items.split_off(offset);
        let items = if filter.limit > 0 && items.len() > filter.limit {
            items.into_iter().take(filter.limit).collect()
        } else {
            items
        };
        Ok(items)
    }
}
