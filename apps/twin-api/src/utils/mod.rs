//! Handler 共用的输入校验与值转换辅助函数。

pub mod response;

use axum::response::Response;
use domain::{CascadePolicy, ScalarValue};
use response::bad_request_error;

/// 验证必填字段，去除空格并检查非空
pub fn normalize_required(value: String, field: &str) -> Result<String, Response> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(bad_request_error(format!("{field} required")));
    }
    Ok(trimmed.to_string())
}

/// 验证可选字段，如果提供则去除空格并检查非空
pub fn normalize_optional(value: Option<String>, field: &str) -> Result<Option<String>, Response> {
    match value {
        Some(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(bad_request_error(format!("{field} required")));
            }
            Ok(Some(trimmed.to_string()))
        }
        None => Ok(None),
    }
}

/// 解析 ?cascade= 查询参数为删除级联策略。
///
/// 缺省为 reject；reparent 形如 `reparent:{target_id}`。
pub fn parse_cascade(raw: Option<&str>) -> Result<CascadePolicy, Response> {
    match raw {
        None | Some("reject") => Ok(CascadePolicy::RejectIfChildren),
        Some("cascade") => Ok(CascadePolicy::CascadeDelete),
        Some(other) => match other.strip_prefix("reparent:") {
            Some(target) if !target.trim().is_empty() => {
                Ok(CascadePolicy::Reparent(target.trim().to_string()))
            }
            _ => Err(bad_request_error(format!("invalid cascade policy: {other}"))),
        },
    }
}

/// JSON 值 -> 遥测标量（对象与数组不是标量，返回 None）。
pub fn json_to_scalar(value: &serde_json::Value) -> Option<ScalarValue> {
    match value {
        serde_json::Value::Bool(v) => Some(ScalarValue::Bool(*v)),
        serde_json::Value::Number(number) => {
            if let Some(v) = number.as_i64() {
                Some(ScalarValue::I64(v))
            } else {
                number.as_f64().map(ScalarValue::F64)
            }
        }
        serde_json::Value::String(v) => Some(ScalarValue::Text(v.clone())),
        _ => None,
    }
}

/// 遥测标量 -> JSON 值（非有限浮点数降级为 null）。
pub fn scalar_to_json(value: &ScalarValue) -> serde_json::Value {
    match value {
        ScalarValue::F64(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ScalarValue::I64(v) => serde_json::Value::Number((*v).into()),
        ScalarValue::Bool(v) => serde_json::Value::Bool(*v),
        ScalarValue::Text(v) => serde_json::Value::String(v.clone()),
    }
}
