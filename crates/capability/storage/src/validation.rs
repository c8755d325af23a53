//! 验证辅助函数
//!
//! 提供统一的验证逻辑，确保数据一致性：
//! - ensure_tenant：验证租户 ID 非空
//! - ensure_owned：验证记录归属当前租户（失败返回 Forbidden，
//!   与 NotFound 明确区分，跨租户探测不得伪装成空结果）

use crate::error::StorageError;
use domain::TenantContext;

/// 验证租户 ID 非空
///
/// 确保所有数据访问都有有效的租户上下文。
pub fn ensure_tenant(ctx: &TenantContext) -> Result<(), StorageError> {
    if ctx.tenant_id.is_empty() {
        return Err(StorageError::InvalidInput("tenant_id required".to_string()));
    }
    Ok(())
}

/// 验证记录归属当前租户
pub fn ensure_owned(ctx: &TenantContext, record_tenant_id: &str) -> Result<(), StorageError> {
    ensure_tenant(ctx)?;
    if ctx.tenant_id != record_tenant_id {
        return Err(StorageError::Forbidden);
    }
    Ok(())
}
