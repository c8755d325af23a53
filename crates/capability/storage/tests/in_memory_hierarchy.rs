use domain::{AssetStatus, AssetType, CascadePolicy, TenantContext};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use twin_storage::{
    AssetFilter, AssetStore, AssetUpdate, InMemoryAssetStore, NewAsset, StorageError,
    SubtreeLockManager,
};

fn tenant_ctx() -> TenantContext {
    TenantContext::new("tenant-1", "user-1", vec![])
}

fn new_asset(asset_id: &str, parent_id: Option<&str>) -> NewAsset {
    NewAsset {
        asset_id: asset_id.to_string(),
        tenant_id: "tenant-1".to_string(),
        parent_id: parent_id.map(str::to_string),
        name: asset_id.to_string(),
        asset_type: AssetType::Equipment,
        status: AssetStatus::Active,
        location: None,
        metadata: BTreeMap::new(),
        tags: BTreeSet::new(),
    }
}

async fn seed_tree(store: &InMemoryAssetStore) {
    let ctx = tenant_ctx();
    // plant
    // ├── line-1
    // │   ├── pump-1
    // │   └── pump-2
    // └── line-2
    store.create_asset(&ctx, new_asset("plant", None)).await.expect("create");
    store
        .create_asset(&ctx, new_asset("line-1", Some("plant")))
        .await
        .expect("create");
    store
        .create_asset(&ctx, new_asset("line-2", Some("plant")))
        .await
        .expect("create");
    store
        .create_asset(&ctx, new_asset("pump-1", Some("line-1")))
        .await
        .expect("create");
    store
        .create_asset(&ctx, new_asset("pump-2", Some("line-1")))
        .await
        .expect("create");
}

#[tokio::test]
async fn create_derives_path_and_depth() {
    let store = InMemoryAssetStore::new(SubtreeLockManager::new());
    seed_tree(&store).await;
    let ctx = tenant_ctx();

    let plant = store.find_asset(&ctx, "plant").await.expect("find").expect("plant");
    assert_eq!(plant.path, "plant");
    assert_eq!(plant.depth, 0);

    let pump = store.find_asset(&ctx, "pump-1").await.expect("find").expect("pump");
    assert_eq!(pump.path, "plant/line-1/pump-1");
    assert_eq!(pump.depth, 2);
    assert_eq!(pump.parent_id.as_deref(), Some("line-1"));
}

#[tokio::test]
async fn create_rejects_missing_parent_and_bad_segment() {
    let store = InMemoryAssetStore::new(SubtreeLockManager::new());
    let ctx = tenant_ctx();

    let err = store
        .create_asset(&ctx, new_asset("orphan", Some("nope")))
        .await
        .expect_err("missing parent");
    assert!(matches!(err, StorageError::NotFound));

    let err = store
        .create_asset(&ctx, new_asset("bad/id", None))
        .await
        .expect_err("separator in id");
    assert!(matches!(err, StorageError::InvalidSegment(_)));
}

#[tokio::test]
async fn move_rewrites_entire_subtree() {
    let store = InMemoryAssetStore::new(SubtreeLockManager::new());
    seed_tree(&store).await;
    let ctx = tenant_ctx();

    let moved = store
        .move_asset(&ctx, "line-1", Some("line-2"))
        .await
        .expect("move");
    assert_eq!(moved.path, "plant/line-2/line-1");
    assert_eq!(moved.depth, 2);
    assert_eq!(moved.parent_id.as_deref(), Some("line-2"));

    let pump = store.find_asset(&ctx, "pump-1").await.expect("find").expect("pump");
    assert_eq!(pump.path, "plant/line-2/line-1/pump-1");
    assert_eq!(pump.depth, 3);
    // parent_id 不变，只有 path/depth 被改写
    assert_eq!(pump.parent_id.as_deref(), Some("line-1"));
}

#[tokio::test]
async fn move_to_root_promotes_subtree() {
    let store = InMemoryAssetStore::new(SubtreeLockManager::new());
    seed_tree(&store).await;
    let ctx = tenant_ctx();

    let moved = store.move_asset(&ctx, "line-1", None).await.expect("move");
    assert_eq!(moved.path, "line-1");
    assert_eq!(moved.depth, 0);
    assert!(moved.parent_id.is_none());

    let pump = store.find_asset(&ctx, "pump-2").await.expect("find").expect("pump");
    assert_eq!(pump.path, "line-1/pump-2");

    let roots = store.list_roots(&ctx).await.expect("roots");
    assert_eq!(roots.len(), 2);
}

#[tokio::test]
async fn move_into_own_subtree_is_rejected() {
    let store = InMemoryAssetStore::new(SubtreeLockManager::new());
    seed_tree(&store).await;
    let ctx = tenant_ctx();

    let err = store
        .move_asset(&ctx, "line-1", Some("pump-1"))
        .await
        .expect_err("cycle");
    assert!(matches!(err, StorageError::CircularReference));

    let err = store
        .move_asset(&ctx, "line-1", Some("line-1"))
        .await
        .expect_err("self");
    assert!(matches!(err, StorageError::CircularReference));

    // 树保持不变
    let pump = store.find_asset(&ctx, "pump-1").await.expect("find").expect("pump");
    assert_eq!(pump.path, "plant/line-1/pump-1");
}

#[tokio::test]
async fn opposing_concurrent_moves_never_form_cycle() {
    // "a 挂到 b 下"与"b 挂到 a 下"并发执行：最多一个成功，
    // 输掉的一侧必须拿到 CircularReference，最终树无环
    let store = Arc::new(InMemoryAssetStore::new(SubtreeLockManager::new()));
    let ctx = tenant_ctx();
    store.create_asset(&ctx, new_asset("a", None)).await.expect("create");
    store.create_asset(&ctx, new_asset("b", None)).await.expect("create");

    let first = {
        let store = Arc::clone(&store);
        let ctx = ctx.clone();
        tokio::spawn(async move { store.move_asset(&ctx, "a", Some("b")).await })
    };
    let second = {
        let store = Arc::clone(&store);
        let ctx = ctx.clone();
        tokio::spawn(async move { store.move_asset(&ctx, "b", Some("a")).await })
    };
    let first = first.await.expect("join");
    let second = second.await.expect("join");

    let failures = [&first, &second]
        .iter()
        .filter(|result| matches!(result, Err(StorageError::CircularReference)))
        .count();
    assert!(failures >= 1, "at least one side must lose: {first:?} / {second:?}");

    let a = store.find_asset(&ctx, "a").await.expect("find").expect("a");
    let b = store.find_asset(&ctx, "b").await.expect("find").expect("b");
    let shapes = [
        (a.path.as_str(), b.path.as_str()) == ("b/a", "b"),
        (a.path.as_str(), b.path.as_str()) == ("a", "a/b"),
        (a.path.as_str(), b.path.as_str()) == ("a", "b"),
    ];
    assert!(
        shapes.iter().any(|ok| *ok),
        "tree must stay acyclic: a={} b={}",
        a.path,
        b.path
    );
}

#[tokio::test]
async fn delete_reject_if_children() {
    let store = InMemoryAssetStore::new(SubtreeLockManager::new());
    seed_tree(&store).await;
    let ctx = tenant_ctx();

    let err = store
        .delete_asset(&ctx, "line-1", CascadePolicy::RejectIfChildren)
        .await
        .expect_err("has children");
    assert!(matches!(err, StorageError::HasChildren));

    let count = store
        .delete_asset(&ctx, "pump-1", CascadePolicy::RejectIfChildren)
        .await
        .expect("leaf delete");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn delete_cascade_removes_descendants() {
    let store = InMemoryAssetStore::new(SubtreeLockManager::new());
    seed_tree(&store).await;
    let ctx = tenant_ctx();

    let count = store
        .delete_asset(&ctx, "line-1", CascadePolicy::CascadeDelete)
        .await
        .expect("cascade");
    assert_eq!(count, 3);

    assert!(store.find_asset(&ctx, "pump-1").await.expect("find").is_none());
    assert!(store.find_asset(&ctx, "plant").await.expect("find").is_some());
}

#[tokio::test]
async fn delete_reparent_rehomes_children() {
    let store = InMemoryAssetStore::new(SubtreeLockManager::new());
    seed_tree(&store).await;
    let ctx = tenant_ctx();

    store
        .delete_asset(&ctx, "line-1", CascadePolicy::Reparent("line-2".to_string()))
        .await
        .expect("reparent");

    let pump = store.find_asset(&ctx, "pump-1").await.expect("find").expect("pump");
    assert_eq!(pump.parent_id.as_deref(), Some("line-2"));
    assert_eq!(pump.path, "plant/line-2/pump-1");
    assert_eq!(pump.depth, 2);
    assert!(store.find_asset(&ctx, "line-1").await.expect("find").is_none());
}

#[tokio::test]
async fn delete_reparent_into_subtree_is_rejected() {
    let store = InMemoryAssetStore::new(SubtreeLockManager::new());
    seed_tree(&store).await;
    let ctx = tenant_ctx();

    let err = store
        .delete_asset(&ctx, "line-1", CascadePolicy::Reparent("pump-1".to_string()))
        .await
        .expect_err("target inside subtree");
    assert!(matches!(err, StorageError::CircularReference));
}

#[tokio::test]
async fn traversals_follow_path_order() {
    let store = InMemoryAssetStore::new(SubtreeLockManager::new());
    seed_tree(&store).await;
    let ctx = tenant_ctx();

    let children = store.list_children(&ctx, "plant").await.expect("children");
    let ids: Vec<&str> = children.iter().map(|a| a.asset_id.as_str()).collect();
    assert_eq!(ids, vec!["line-1", "line-2"]);

    let descendants = store.list_descendants(&ctx, "plant").await.expect("descendants");
    let ids: Vec<&str> = descendants.iter().map(|a| a.asset_id.as_str()).collect();
    assert_eq!(ids, vec!["line-1", "pump-1", "pump-2", "line-2"]);

    let ancestors = store.list_ancestors(&ctx, "pump-1").await.expect("ancestors");
    let ids: Vec<&str> = ancestors.iter().map(|a| a.asset_id.as_str()).collect();
    assert_eq!(ids, vec!["plant", "line-1"]);
}

#[tokio::test]
async fn update_never_touches_path() {
    let store = InMemoryAssetStore::new(SubtreeLockManager::new());
    seed_tree(&store).await;
    let ctx = tenant_ctx();

    let updated = store
        .update_asset(
            &ctx,
            "pump-1",
            AssetUpdate {
                name: Some("Main Pump".to_string()),
                status: Some(AssetStatus::Maintenance),
                ..Default::default()
            },
        )
        .await
        .expect("update")
        .expect("exists");
    assert_eq!(updated.name, "Main Pump");
    assert_eq!(updated.status, AssetStatus::Maintenance);
    assert_eq!(updated.path, "plant/line-1/pump-1");
    assert_eq!(updated.depth, 2);
}

#[tokio::test]
async fn search_filters_and_paginates() {
    let store = InMemoryAssetStore::new(SubtreeLockManager::new());
    seed_tree(&store).await;
    let ctx = tenant_ctx();

    let hits = store
        .search_assets(
            &ctx,
            AssetFilter {
                name_contains: Some("PUMP".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("search");
    assert_eq!(hits.len(), 2);

    let page = store
        .search_assets(
            &ctx,
            AssetFilter {
                name_contains: Some("pump".to_string()),
                limit: 1,
                offset: 1,
                ..Default::default()
            },
        )
        .await
        .expect("search");
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].asset_id, "pump-2");
}

#[tokio::test]
async fn cross_tenant_access_is_forbidden() {
    let store = InMemoryAssetStore::new(SubtreeLockManager::new());
    seed_tree(&store).await;
    let other = TenantContext::new("tenant-2", "user-2", vec![]);

    let err = store.find_asset(&other, "plant").await.expect_err("foreign");
    assert!(matches!(err, StorageError::Forbidden));

    let err = store
        .move_asset(&other, "line-1", None)
        .await
        .expect_err("foreign move");
    assert!(matches!(err, StorageError::Forbidden));

    // 检索只看到自己租户的数据
    let hits = store
        .search_assets(&other, AssetFilter::default())
        .await
        .expect("search");
    assert!(hits.is_empty());
}
