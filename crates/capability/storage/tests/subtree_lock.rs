use twin_storage::{LockMode, SubtreeLockManager};

#[tokio::test]
async fn disjoint_subtrees_do_not_block() {
    let locks = SubtreeLockManager::new();
    let _a = locks
        .acquire("plant/line-1", LockMode::Write)
        .await
        .expect("acquire");
    let b = locks
        .try_acquire("plant/line-2", LockMode::Write)
        .expect("probe");
    assert!(b.is_some());
}

#[tokio::test]
async fn write_blocks_overlapping_write() {
    let locks = SubtreeLockManager::new();
    let _held = locks
        .acquire("plant/line-1", LockMode::Write)
        .await
        .expect("acquire");

    // 后代前缀
    assert!(locks
        .try_acquire("plant/line-1/pump-1", LockMode::Write)
        .expect("probe")
        .is_none());
    // 祖先前缀
    assert!(locks
        .try_acquire("plant", LockMode::Write)
        .expect("probe")
        .is_none());
    // 兄弟但共享字符串前缀，路径语义上不相交
    assert!(locks
        .try_acquire("plant/line-10", LockMode::Write)
        .expect("probe")
        .is_some());
}

#[tokio::test]
async fn reads_share_but_exclude_writes() {
    let locks = SubtreeLockManager::new();
    let _r1 = locks
        .acquire("plant/line-1", LockMode::Read)
        .await
        .expect("acquire");
    assert!(locks
        .try_acquire("plant/line-1/pump-1", LockMode::Read)
        .expect("probe")
        .is_some());
    assert!(locks
        .try_acquire("plant/line-1", LockMode::Write)
        .expect("probe")
        .is_none());
}

#[tokio::test]
async fn release_wakes_waiters() {
    let locks = SubtreeLockManager::new();
    let held = locks
        .acquire("plant/line-1", LockMode::Write)
        .await
        .expect("acquire");

    let locks_clone = locks.clone();
    let waiter = tokio::spawn(async move {
        locks_clone
            .acquire("plant/line-1", LockMode::Write)
            .await
            .expect("acquire after release")
    });

    tokio::task::yield_now().await;
    drop(held);
    let _guard = waiter.await.expect("join");
}
