//! 物化路径编解码
//!
//! 层级树以物化路径字符串表示（祖先链以 `/` 连接，如
//! `root-id/child-id/leaf-id`）。祖先/后代判定退化为前缀匹配，
//! 移动子树退化为前缀替换。本模块为纯函数，无 I/O、无副作用。

/// 路径段分隔符。
pub const SEPARATOR: char = '/';

/// 路径编码错误。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// 段为空或包含分隔符。
    InvalidSegment(String),
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::InvalidSegment(segment) => write!(f, "invalid path segment: {}", segment),
        }
    }
}

impl std::error::Error for PathError {}

/// 追加一个段：父路径 + 自身 id。
///
/// 父路径为 None 时生成根路径（路径即 id 本身）。
pub fn encode_path(parent_path: Option<&str>, asset_id: &str) -> Result<String, PathError> {
    if asset_id.is_empty() || asset_id.contains(SEPARATOR) {
        return Err(PathError::InvalidSegment(asset_id.to_string()));
    }
    match parent_path {
        Some(parent) if !parent.is_empty() => Ok(format!("{}{}{}", parent, SEPARATOR, asset_id)),
        _ => Ok(asset_id.to_string()),
    }
}

/// 含自身的祖先判定：path 等于 candidate，或以 candidate + `/` 开头。
pub fn is_ancestor_or_self(candidate: &str, path: &str) -> bool {
    path == candidate || is_strict_ancestor(candidate, path)
}

/// 严格祖先判定：path 以 candidate + `/` 开头（不含相等）。
pub fn is_strict_ancestor(candidate: &str, path: &str) -> bool {
    path.len() > candidate.len()
        && path.starts_with(candidate)
        && path.as_bytes()[candidate.len()] == SEPARATOR as u8
}

/// 路径深度：段数减一（根为 0）。
pub fn depth_of(path: &str) -> usize {
    if path.is_empty() {
        return 0;
    }
    path.matches(SEPARATOR).count()
}

/// 前缀替换：path 在 old_prefix 子树内时，替换为 new_prefix。
///
/// 移动子树时对每个后代做一次替换即可，代价与后代数量成正比。
/// path 不在 old_prefix 子树内时返回 None。
pub fn replace_prefix(path: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    if path == old_prefix {
        return Some(new_prefix.to_string());
    }
    if !is_strict_ancestor(old_prefix, path) {
        return None;
    }
    Some(format!("{}{}", new_prefix, &path[old_prefix.len()..]))
}

/// 父路径（根节点返回 None）。
pub fn parent_of(path: &str) -> Option<&str> {
    path.rfind(SEPARATOR).map(|idx| &path[..idx])
}

/// 末段（即节点自身 id）。
pub fn leaf_of(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}
