//! 领域枚举与标量值
//!
//! 定义资产层级引擎共享的基础类型：
//! - AssetType / AssetStatus：资产分类与生命周期状态
//! - FieldSource / DataType：字段目录的来源与规范化数据类型
//! - AggregationMethod / AlarmStatus：汇总方法与告警状态
//! - CascadePolicy：删除时的级联策略
//! - ScalarValue：遥测标量值

/// 资产类型。
///
/// 枚举覆盖常见层级节点，`Other` 保留开放扩展空间。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetType {
    Site,
    Building,
    Floor,
    Area,
    Zone,
    Equipment,
    Subsystem,
    Component,
    Sensor,
    Other(String),
}

impl AssetType {
    /// 字符串表示（存储与 DTO 使用）。
    pub fn as_str(&self) -> &str {
        match self {
            AssetType::Site => "site",
            AssetType::Building => "building",
            AssetType::Floor => "floor",
            AssetType::Area => "area",
            AssetType::Zone => "zone",
            AssetType::Equipment => "equipment",
            AssetType::Subsystem => "subsystem",
            AssetType::Component => "component",
            AssetType::Sensor => "sensor",
            AssetType::Other(value) => value.as_str(),
        }
    }

    /// 从字符串解析（未知值归入 Other）。
    pub fn parse(value: &str) -> Self {
        match value {
            "site" => AssetType::Site,
            "building" => AssetType::Building,
            "floor" => AssetType::Floor,
            "area" => AssetType::Area,
            "zone" => AssetType::Zone,
            "equipment" => AssetType::Equipment,
            "subsystem" => AssetType::Subsystem,
            "component" => AssetType::Component,
            "sensor" => AssetType::Sensor,
            other => AssetType::Other(other.to_string()),
        }
    }
}

/// 资产状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetStatus {
    Active,
    Inactive,
    Maintenance,
    Decommissioned,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Active => "active",
            AssetStatus::Inactive => "inactive",
            AssetStatus::Maintenance => "maintenance",
            AssetStatus::Decommissioned => "decommissioned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(AssetStatus::Active),
            "inactive" => Some(AssetStatus::Inactive),
            "maintenance" => Some(AssetStatus::Maintenance),
            "decommissioned" => Some(AssetStatus::Decommissioned),
            _ => None,
        }
    }
}

/// 字段来源（封闭标签变体，禁止在业务逻辑深处分支原始字符串）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    System,
    Schema,
    Custom,
}

impl FieldSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldSource::System => "system",
            FieldSource::Schema => "schema",
            FieldSource::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(FieldSource::System),
            "schema" => Some(FieldSource::Schema),
            "custom" => Some(FieldSource::Custom),
            _ => None,
        }
    }
}

/// 规范化数据类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Number,
    String,
    Boolean,
    Object,
    Array,
    Timestamp,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Number => "number",
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Object => "object",
            DataType::Array => "array",
            DataType::Timestamp => "timestamp",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "number" => Some(DataType::Number),
            "string" => Some(DataType::String),
            "boolean" => Some(DataType::Boolean),
            "object" => Some(DataType::Object),
            "array" => Some(DataType::Array),
            "timestamp" => Some(DataType::Timestamp),
            _ => None,
        }
    }
}

/// 汇总方法。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMethod {
    Last,
    Average,
    Sum,
    Min,
    Max,
    Count,
}

impl AggregationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMethod::Last => "last",
            AggregationMethod::Average => "average",
            AggregationMethod::Sum => "sum",
            AggregationMethod::Min => "min",
            AggregationMethod::Max => "max",
            AggregationMethod::Count => "count",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "last" => Some(AggregationMethod::Last),
            "average" | "avg" => Some(AggregationMethod::Average),
            "sum" => Some(AggregationMethod::Sum),
            "min" => Some(AggregationMethod::Min),
            "max" => Some(AggregationMethod::Max),
            "count" => Some(AggregationMethod::Count),
            _ => None,
        }
    }
}

/// 告警状态（严重程度递增）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlarmStatus {
    Normal,
    Warning,
    Critical,
}

impl AlarmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmStatus::Normal => "normal",
            AlarmStatus::Warning => "warning",
            AlarmStatus::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "normal" => Some(AlarmStatus::Normal),
            "warning" => Some(AlarmStatus::Warning),
            "critical" => Some(AlarmStatus::Critical),
            _ => None,
        }
    }
}

/// 删除级联策略。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadePolicy {
    /// 存在子节点时拒绝删除。
    RejectIfChildren,
    /// 连同全部后代一起删除。
    CascadeDelete,
    /// 将直接子节点移交给目标节点后再删除。
    Reparent(String),
}

/// 遥测标量值。
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    F64(f64),
    I64(i64),
    Bool(bool),
    Text(String),
}

impl ScalarValue {
    /// 数值强制转换（聚合运算使用；非数值返回 None）。
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::F64(v) => Some(*v),
            ScalarValue::I64(v) => Some(*v as f64),
            ScalarValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            ScalarValue::Text(_) => None,
        }
    }
}
