//! 存储层错误类型
//!
//! 层级引擎的错误分类是 API 契约的一部分，调用方依赖错误种类
//! 区分 404/403/400。因此这里用封闭枚举而不是笼统的消息字符串：
//! - NotFound / Forbidden：实体缺失与跨租户访问（二者必须可区分）
//! - CircularReference / HasChildren：层级变更被拒
//! - DuplicateMapping / DuplicateFieldName：唯一性冲突
//! - UnknownField / InvalidSegment / InvalidInput：输入校验失败
//! - Backend：底层 SQL / Redis / 锁故障

use domain::path::PathError;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("circular reference")]
    CircularReference,
    #[error("asset has children")]
    HasChildren,
    #[error("duplicate mapping")]
    DuplicateMapping,
    #[error("duplicate field name: {0}")]
    DuplicateFieldName(String),
    #[error("unknown field: {name} (known: {known})")]
    UnknownField { name: String, known: String },
    #[error("invalid path segment: {0}")]
    InvalidSegment(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// 底层故障的统一封装。
    pub fn backend(err: impl std::fmt::Display) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound,
            other => StorageError::Backend(other.to_string()),
        }
    }
}

impl From<PathError> for StorageError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::InvalidSegment(segment) => StorageError::InvalidSegment(segment),
        }
    }
}
