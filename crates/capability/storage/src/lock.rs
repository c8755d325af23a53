//! 子树范围锁
//!
//! `path` 索引是层级变更唯一的串行化点。move / 级联删除持有
//! 受影响子树前缀的写锁；进行中的汇总读取持有父路径的读锁。
//! 两次持有冲突，当且仅当一方前缀是另一方的含自身祖先、且至少
//! 一方是写锁。不相交的子树互不阻塞。
//!
//! 实现：持有表 + Notify。获取方在冲突时挂起等待，守卫 Drop 时
//! 移除表项并唤醒全部等待者重试。

use crate::error::StorageError;
use domain::path::is_ancestor_or_self;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// 锁模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

#[derive(Debug)]
struct HeldEntry {
    token: u64,
    prefix: String,
    mode: LockMode,
}

#[derive(Debug, Default)]
struct LockTable {
    next_token: u64,
    held: Vec<HeldEntry>,
}

/// 子树锁管理器（每进程一个，move 与汇总共享）。
#[derive(Debug, Default)]
pub struct SubtreeLockManager {
    table: Mutex<LockTable>,
    released: Notify,
}

impl SubtreeLockManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 获取覆盖 `prefix` 子树的锁；冲突时异步等待。
    pub async fn acquire(
        self: &Arc<Self>,
        prefix: &str,
        mode: LockMode,
    ) -> Result<SubtreeGuard, StorageError> {
        loop {
            // 先注册等待，再检查，避免释放通知丢失
            let released = self.released.notified();
            {
                let mut table = self
                    .table
                    .lock()
                    .map_err(|_| StorageError::backend("subtree lock poisoned"))?;
                let conflict = table.held.iter().any(|entry| {
                    let overlaps = is_ancestor_or_self(&entry.prefix, prefix)
                        || is_ancestor_or_self(prefix, &entry.prefix);
                    overlaps && (entry.mode == LockMode::Write || mode == LockMode::Write)
                });
                if !conflict {
                    table.next_token += 1;
                    let token = table.next_token;
                    table.held.push(HeldEntry {
                        token,
                        prefix: prefix.to_string(),
                        mode,
                    });
                    return Ok(SubtreeGuard {
                        manager: Arc::clone(self),
                        token,
                    });
                }
            }
            released.await;
        }
    }

    /// 非阻塞探测（仅测试使用）。
    pub fn try_acquire(
        self: &Arc<Self>,
        prefix: &str,
        mode: LockMode,
    ) -> Result<Option<SubtreeGuard>, StorageError> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| StorageError::backend("subtree lock poisoned"))?;
        let conflict = table.held.iter().any(|entry| {
            let overlaps = is_ancestor_or_self(&entry.prefix, prefix)
                || is_ancestor_or_self(prefix, &entry.prefix);
            overlaps && (entry.mode == LockMode::Write || mode == LockMode::Write)
        });
        if conflict {
            return Ok(None);
        }
        table.next_token += 1;
        let token = table.next_token;
        table.held.push(HeldEntry {
            token,
            prefix: prefix.to_string(),
            mode,
        });
        Ok(Some(SubtreeGuard {
            manager: Arc::clone(self),
            token,
        }))
    }

    fn release(&self, token: u64) {
        if let Ok(mut table) = self.table.lock() {
            table.held.retain(|entry| entry.token != token);
        }
        self.released.notify_waiters();
    }
}

/// 子树锁守卫（Drop 即释放）。
#[derive(Debug)]
pub struct SubtreeGuard {
    manager: Arc<SubtreeLockManager>,
    token: u64,
}

impl Drop for SubtreeGuard {
    fn drop(&mut self) {
        self.manager.release(self.token);
    }
}
