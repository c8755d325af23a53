pub mod path;
pub mod types;

pub use types::{
    AggregationMethod, AlarmStatus, AssetStatus, AssetType, CascadePolicy, DataType, FieldSource,
    ScalarValue,
};

/// 租户上下文：所有模块共享的执行上下文。
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: String,
    pub user_id: String,
    pub roles: Vec<String>,
}

impl TenantContext {
    /// 构造显式身份的租户上下文。
    pub fn new(
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        roles: Vec<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            roles,
        }
    }

    /// 系统内部上下文（汇总调度等非用户触发的操作）。
    pub fn system(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: "system".to_string(),
            roles: Vec::new(),
        }
    }
}

impl Default for TenantContext {
    /// 空上下文（仅用于测试或占位）。
    fn default() -> Self {
        Self {
            tenant_id: "".to_string(),
            user_id: "".to_string(),
            roles: Vec::new(),
        }
    }
}
