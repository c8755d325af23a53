//! 数据模型
//!
//! 定义所有存储相关的数据模型和更新结构：
//! - 资产模型：AssetRecord, NewAsset, AssetUpdate, AssetFilter
//! - 数据点映射模型：DataPointMappingRecord
//! - 字段映射模型：FieldMappingRecord, FieldMappingEdit
//! - 状态模型：AssetStateRecord
//! - 汇总模型：RollupResultRecord, RollupConfigRecord
//!
//! 约定：
//! - path / depth 由系统维护，调用方不可直接指定（见 NewAsset）
//! - 所有记录携带 tenant_id，存储层负责租户过滤

use domain::{AggregationMethod, AlarmStatus, AssetStatus, AssetType, DataType, FieldSource,
    ScalarValue};
use std::collections::{BTreeMap, BTreeSet};

/// 资产位置（坐标 + 地址，均可缺省）。
#[derive(Debug, Clone, PartialEq)]
pub struct AssetLocation {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
}

/// 资产记录。
///
/// `path` 是物化祖先路径（父路径 + 自身 id），`depth` 根为 0。
/// 二者只能通过 create / move 演化，update 不接受。
#[derive(Debug, Clone)]
pub struct AssetRecord {
    pub asset_id: String,
    pub tenant_id: String,
    pub parent_id: Option<String>,
    pub path: String,
    pub depth: i32,
    pub name: String,
    pub asset_type: AssetType,
    pub status: AssetStatus,
    pub location: Option<AssetLocation>,
    pub metadata: BTreeMap<String, String>,
    pub tags: BTreeSet<String>,
}

/// 资产创建输入（不含 path/depth，由存储层从父节点推导）。
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub asset_id: String,
    pub tenant_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub asset_type: AssetType,
    pub status: AssetStatus,
    pub location: Option<AssetLocation>,
    pub metadata: BTreeMap<String, String>,
    pub tags: BTreeSet<String>,
}

/// 资产更新输入（仅描述性字段）。
#[derive(Debug, Clone, Default)]
pub struct AssetUpdate {
    pub name: Option<String>,
    pub status: Option<AssetStatus>,
    pub location: Option<AssetLocation>,
    pub metadata: Option<BTreeMap<String, String>>,
    pub tags: Option<BTreeSet<String>>,
}

/// 资产检索条件（名称/标签/类型 + 分页）。
#[derive(Debug, Clone, Default)]
pub struct AssetFilter {
    pub name_contains: Option<String>,
    pub tag: Option<String>,
    pub asset_type: Option<AssetType>,
    pub limit: usize,
    pub offset: usize,
}

/// 数据点映射记录。
///
/// 将设备遥测负载中的字段引用（点/方括号路径，如
/// `sensors.temp` 或 `readings[0].value`）绑定到唯一资产。
/// 同一 `(device_id, field_reference)` 在租户内只允许映射一次。
#[derive(Debug, Clone)]
pub struct DataPointMappingRecord {
    pub mapping_id: String,
    pub tenant_id: String,
    pub asset_id: String,
    pub device_id: String,
    pub field_reference: String,
    pub label: String,
    pub unit: Option<String>,
    pub aggregation: AggregationMethod,
    pub rollup_enabled: bool,
    /// 入库前应用的标量公式（如 `value * 0.1 - 40`）。
    pub transform_expression: Option<String>,
    pub warn_low: Option<f64>,
    pub warn_high: Option<f64>,
    pub crit_low: Option<f64>,
    pub crit_high: Option<f64>,
}

/// 字段映射记录（设备类型字段目录）。
///
/// 由 System / Schema / Custom 三个来源合并产生，
/// `(device_type_id, field_name)` 在租户内唯一。
#[derive(Debug, Clone)]
pub struct FieldMappingRecord {
    pub tenant_id: String,
    pub device_type_id: String,
    pub field_name: String,
    pub source: FieldSource,
    pub friendly_name: String,
    pub description: Option<String>,
    pub data_type: DataType,
    pub unit: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub is_queryable: bool,
    pub is_visible: bool,
    pub display_order: i32,
    pub category: Option<String>,
    pub default_aggregation: AggregationMethod,
}

/// 字段映射编辑输入（仅用户可编辑属性）。
#[derive(Debug, Clone, Default)]
pub struct FieldMappingEdit {
    pub friendly_name: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub is_visible: Option<bool>,
    pub display_order: Option<i32>,
    pub category: Option<String>,
    pub default_aggregation: Option<AggregationMethod>,
}

/// 资产当前状态快照。
///
/// `values` 由遥测写入（叶子资产），`calculated_metrics` 由汇总
/// 引擎写入（非叶子资产），除人工覆写外不接受直接编辑。
#[derive(Debug, Clone)]
pub struct AssetStateRecord {
    pub tenant_id: String,
    pub asset_id: String,
    pub values: BTreeMap<String, ScalarValue>,
    pub calculated_metrics: BTreeMap<String, f64>,
    pub alarm_status: AlarmStatus,
    pub alarm_count: i64,
    pub last_updated_at_ms: i64,
}

impl AssetStateRecord {
    /// 尚未收到数据的空快照。
    pub fn empty(tenant_id: impl Into<String>, asset_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            asset_id: asset_id.into(),
            values: BTreeMap::new(),
            calculated_metrics: BTreeMap::new(),
            alarm_status: AlarmStatus::Normal,
            alarm_count: 0,
            last_updated_at_ms: 0,
        }
    }
}

/// 汇总结果记录（只追加时间桶，写入后不再变更）。
#[derive(Debug, Clone)]
pub struct RollupResultRecord {
    pub tenant_id: String,
    pub asset_id: String,
    pub metric_name: String,
    pub bucket_start_ms: i64,
    pub bucket_end_ms: i64,
    pub value: f64,
    pub sample_count: u32,
    pub aggregation: AggregationMethod,
    /// 本桶计算期间有子节点读取失败被剔除。
    pub partial: bool,
}

/// 汇总配置记录。
#[derive(Debug, Clone)]
pub struct RollupConfigRecord {
    pub config_id: String,
    pub tenant_id: String,
    pub asset_id: String,
    pub metric_name: String,
    pub aggregation: AggregationMethod,
    pub interval_seconds: u64,
    pub include_children: bool,
    /// 有值时改用时间窗均值而不是即时快照。
    pub window_seconds: Option<u64>,
    /// 子资产加权系数（缺省按 1 处理）。
    pub weight_factors: BTreeMap<String, f64>,
    pub filter_asset_type: Option<AssetType>,
    pub filter_tag: Option<String>,
    pub enabled: bool,
}
