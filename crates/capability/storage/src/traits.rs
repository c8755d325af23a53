//! 存储接口 Trait 定义
//!
//! 定义所有资源存储的异步接口：
//! - AssetStore：资产层级存储（含 move / 级联删除 / 前缀遍历）
//! - DataPointMappingStore：数据点映射存储
//! - FieldMappingStore：设备类型字段目录存储
//! - AssetStateStore：资产当前状态存储
//! - RollupResultStore：汇总结果存储（只追加）
//! - RollupConfigStore：汇总配置存储
//!
//! 设计原则：
//! - 所有接口显式接收 TenantContext
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use crate::models::{
    AssetFilter, AssetRecord, AssetStateRecord, AssetUpdate, DataPointMappingRecord,
    FieldMappingEdit, FieldMappingRecord, NewAsset, RollupConfigRecord, RollupResultRecord,
};
use async_trait::async_trait;
use domain::{AlarmStatus, CascadePolicy, ScalarValue, TenantContext};
use std::collections::{BTreeMap, HashMap};

/// 资产层级存储接口
///
/// path / depth 由实现维护：create 从父节点推导，move 对整棵子树
/// 做原子前缀替换，update 永远不接受这两个字段。
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// 创建资产（父节点缺失返回 NotFound，跨租户返回 Forbidden）
    async fn create_asset(
        &self,
        ctx: &TenantContext,
        input: NewAsset,
    ) -> Result<AssetRecord, StorageError>;

    /// 查找资产
    async fn find_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Option<AssetRecord>, StorageError>;

    /// 更新描述性字段
    async fn update_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        update: AssetUpdate,
    ) -> Result<Option<AssetRecord>, StorageError>;

    /// 移动资产到新父节点（None 表示提升为根）
    ///
    /// 目标是自身或自身后代时返回 CircularReference；
    /// 整棵子树的 path/depth 原子改写，要么全部生效要么全部回滚。
    async fn move_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<AssetRecord, StorageError>;

    /// 删除资产（按级联策略处理后代）
    async fn delete_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        policy: CascadePolicy,
    ) -> Result<usize, StorageError>;

    /// 列出直接子节点
    async fn list_children(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Vec<AssetRecord>, StorageError>;

    /// 列出全部后代（path 前缀扫描，按 path 排序）
    async fn list_descendants(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Vec<AssetRecord>, StorageError>;

    /// 列出祖先链（根在前）
    async fn list_ancestors(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Vec<AssetRecord>, StorageError>;

    /// 列出租户的根资产
    async fn list_roots(&self, ctx: &TenantContext) -> Result<Vec<AssetRecord>, StorageError>;

    /// 按名称/标签/类型检索（分页）
    async fn search_assets(
        &self,
        ctx: &TenantContext,
        filter: AssetFilter,
    ) -> Result<Vec<AssetRecord>, StorageError>;
}

/// 数据点映射存储接口
///
/// 同一 `(device_id, field_reference)` 租户内只允许绑定一个资产，
/// 重复创建返回 DuplicateMapping。
#[async_trait]
pub trait DataPointMappingStore: Send + Sync {
    /// 创建映射
    async fn create_mapping(
        &self,
        ctx: &TenantContext,
        record: DataPointMappingRecord,
    ) -> Result<DataPointMappingRecord, StorageError>;

    /// 查找映射
    async fn find_mapping(
        &self,
        ctx: &TenantContext,
        mapping_id: &str,
    ) -> Result<Option<DataPointMappingRecord>, StorageError>;

    /// 按设备字段查找映射
    async fn find_for_device_field(
        &self,
        ctx: &TenantContext,
        device_id: &str,
        field_reference: &str,
    ) -> Result<Option<DataPointMappingRecord>, StorageError>;

    /// 列出资产的全部映射
    async fn list_for_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Vec<DataPointMappingRecord>, StorageError>;

    /// 列出设备的全部映射
    async fn list_for_device(
        &self,
        ctx: &TenantContext,
        device_id: &str,
    ) -> Result<Vec<DataPointMappingRecord>, StorageError>;

    /// 批量列出一组资产的映射（供汇总引擎一次取回）
    async fn list_for_assets(
        &self,
        ctx: &TenantContext,
        asset_ids: &[String],
    ) -> Result<Vec<DataPointMappingRecord>, StorageError>;

    /// 删除映射
    async fn delete_mapping(
        &self,
        ctx: &TenantContext,
        mapping_id: &str,
    ) -> Result<bool, StorageError>;
}

/// 字段映射存储接口
///
/// `(device_type_id, field_name)` 租户内唯一；synchronize 只通过
/// insert-if-absent 写入，已有记录（含用户定制）保持不动。
#[async_trait]
pub trait FieldMappingStore: Send + Sync {
    /// 列出设备类型的全部字段映射（按 display_order 排序）
    async fn list_for_device_type(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
    ) -> Result<Vec<FieldMappingRecord>, StorageError>;

    /// 查找字段映射
    async fn find_field(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
        field_name: &str,
    ) -> Result<Option<FieldMappingRecord>, StorageError>;

    /// 插入新字段映射（已存在返回 DuplicateFieldName）
    async fn insert_field(
        &self,
        ctx: &TenantContext,
        record: FieldMappingRecord,
    ) -> Result<FieldMappingRecord, StorageError>;

    /// 更新用户可编辑属性
    async fn update_field(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
        field_name: &str,
        edit: FieldMappingEdit,
    ) -> Result<Option<FieldMappingRecord>, StorageError>;

    /// 级联删除设备类型的全部字段映射（返回删除数量）
    async fn delete_for_device_type(
        &self,
        ctx: &TenantContext,
        device_type_id: &str,
    ) -> Result<usize, StorageError>;
}

/// 资产状态存储接口
///
/// 单个资产的写入按时间序串行化：observed_at 不晚于当前
/// last_updated_at 的写入被拒绝（返回 false），状态始终反映
/// 时间序最新值而不是到达序最新值。
#[async_trait]
pub trait AssetStateStore: Send + Sync {
    /// 合并写入字段值（乱序样本返回 Ok(false)）
    async fn upsert_values(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        values: &BTreeMap<String, ScalarValue>,
        observed_at_ms: i64,
    ) -> Result<bool, StorageError>;

    /// 写入汇总派生指标
    async fn set_calculated_metric(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        metric_name: &str,
        value: f64,
    ) -> Result<(), StorageError>;

    /// 更新告警状态与计数
    async fn set_alarm(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        status: AlarmStatus,
        alarm_count: i64,
    ) -> Result<(), StorageError>;

    /// 读取状态快照
    async fn get_state(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Option<AssetStateRecord>, StorageError>;

    /// 批量读取状态（一次取回，不允许 N 次往返）
    async fn get_bulk_states(
        &self,
        ctx: &TenantContext,
        asset_ids: &[String],
    ) -> Result<HashMap<String, AssetStateRecord>, StorageError>;

    /// 人工覆写（无条件赋值，仅测试与人工修正入口使用）
    async fn override_state(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        values: &BTreeMap<String, ScalarValue>,
        observed_at_ms: i64,
    ) -> Result<(), StorageError>;
}

/// 汇总结果存储接口（只追加）
#[async_trait]
pub trait RollupResultStore: Send + Sync {
    /// 追加一个时间桶；桶已存在时不覆盖，返回 Ok(false)
    async fn append_result(
        &self,
        ctx: &TenantContext,
        record: RollupResultRecord,
    ) -> Result<bool, StorageError>;

    /// 查询时间序列（按 bucket_start 升序）
    async fn query_series(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        metric_name: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<RollupResultRecord>, StorageError>;
}

/// 汇总配置存储接口
#[async_trait]
pub trait RollupConfigStore: Send + Sync {
    /// 创建汇总配置
    async fn create_config(
        &self,
        ctx: &TenantContext,
        record: RollupConfigRecord,
    ) -> Result<RollupConfigRecord, StorageError>;

    /// 查找汇总配置
    async fn find_config(
        &self,
        ctx: &TenantContext,
        config_id: &str,
    ) -> Result<Option<RollupConfigRecord>, StorageError>;

    /// 列出资产的汇总配置
    async fn list_for_asset(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<Vec<RollupConfigRecord>, StorageError>;

    /// 列出全部启用的配置（调度器专用，跨租户；
    /// 调度器逐条以 TenantContext::system 执行）
    async fn list_all_enabled(&self) -> Result<Vec<RollupConfigRecord>, StorageError>;

    /// 删除汇总配置
    async fn delete_config(
        &self,
        ctx: &TenantContext,
        config_id: &str,
    ) -> Result<bool, StorageError>;
}
