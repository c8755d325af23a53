//! 资产状态追踪
//!
//! 设备遥测到资产状态的写入路径：
//! 1. 设备 -> 资产（DeviceAssignmentProvider 解析归属）
//! 2. 字段引用 -> 数据点映射（找不到的字段丢弃并计数）
//! 3. 可选变换表达式求值后按映射标签写入状态存储
//! 4. 乱序样本丢弃（记日志 + 计数，不报错）
//! 5. 告警阈值评估，字段间取最严重状态
//!
//! 读取路径区分"尚无数据"与"不可映射"：有映射无状态的资产
//! 返回空快照，两者都没有才是 NotFound。

pub mod transform;

pub use transform::{Transform, TransformError};

use async_trait::async_trait;
use domain::{AlarmStatus, ScalarValue, TenantContext};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use twin_storage::{
    AssetStateRecord, AssetStateStore, DataPointMappingRecord, DataPointMappingStore, StorageError,
};

/// 状态追踪错误。
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("device {0} is not assigned to an asset")]
    UnassignedDevice(String),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// 设备归属提供者抽象（设备注册是外部系统）。
#[async_trait]
pub trait DeviceAssignmentProvider: Send + Sync {
    async fn asset_for_device(
        &self,
        ctx: &TenantContext,
        device_id: &str,
    ) -> Result<Option<String>, StateError>;
}

/// 一次遥测应用的结果。
#[derive(Debug)]
pub struct ApplyOutcome {
    pub asset_id: String,
    /// 成功写入的字段数（整批乱序丢弃时为 0）。
    pub applied: usize,
    /// 无映射被丢弃的字段数。
    pub dropped_unmapped: usize,
    /// 整批因乱序被丢弃。
    pub dropped_out_of_order: bool,
    pub alarm_status: AlarmStatus,
}

/// 资产状态追踪器。
pub struct StateTracker {
    assignments: Arc<dyn DeviceAssignmentProvider>,
    mappings: Arc<dyn DataPointMappingStore>,
    states: Arc<dyn AssetStateStore>,
}

impl StateTracker {
    pub fn new(
        assignments: Arc<dyn DeviceAssignmentProvider>,
        mappings: Arc<dyn DataPointMappingStore>,
        states: Arc<dyn AssetStateStore>,
    ) -> Self {
        Self {
            assignments,
            mappings,
            states,
        }
    }

    /// 应用一批设备遥测。
    pub async fn apply_telemetry(
        &self,
        ctx: &TenantContext,
        device_id: &str,
        field_values: &BTreeMap<String, ScalarValue>,
        observed_at_ms: i64,
    ) -> Result<ApplyOutcome, StateError> {
        twin_telemetry::record_telemetry_batch();
        twin_telemetry::record_telemetry_values(field_values.len() as u64);

        let asset_id = self
            .assignments
            .asset_for_device(ctx, device_id)
            .await?
            .ok_or_else(|| StateError::UnassignedDevice(device_id.to_string()))?;

        let mut labeled: BTreeMap<String, ScalarValue> = BTreeMap::new();
        let mut matched: Vec<(DataPointMappingRecord, ScalarValue)> = Vec::new();
        let mut dropped_unmapped = 0;
        for (field_reference, value) in field_values {
            let mapping = self
                .mappings
                .find_for_device_field(ctx, device_id, field_reference)
                .await?;
            let Some(mapping) = mapping else {
                dropped_unmapped += 1;
                twin_telemetry::record_dropped_unmapped();
                tracing::debug!(device_id, %field_reference, "unmapped field dropped");
                continue;
            };
            let value = apply_transform(&mapping, value)?;
            labeled.insert(mapping.label.clone(), value.clone());
            matched.push((mapping, value));
        }

        if labeled.is_empty() {
            return Ok(ApplyOutcome {
                asset_id,
                applied: 0,
                dropped_unmapped,
                dropped_out_of_order: false,
                alarm_status: AlarmStatus::Normal,
            });
        }

        let accepted = match self
            .states
            .upsert_values(ctx, &asset_id, &labeled, observed_at_ms)
            .await
        {
            Ok(accepted) => accepted,
            Err(err) => {
                twin_telemetry::record_state_write_failure();
                return Err(err.into());
            }
        };
        if !accepted {
            twin_telemetry::record_dropped_out_of_order();
            tracing::info!(
                device_id,
                %asset_id,
                observed_at_ms,
                "out-of-order sample dropped"
            );
            return Ok(ApplyOutcome {
                asset_id,
                applied: 0,
                dropped_unmapped,
                dropped_out_of_order: true,
                alarm_status: AlarmStatus::Normal,
            });
        }
        twin_telemetry::record_state_write_success();

        let (alarm_status, alarm_count) = evaluate_alarms(&matched);
        self.states
            .set_alarm(ctx, &asset_id, alarm_status, alarm_count)
            .await?;
        if alarm_status > AlarmStatus::Normal {
            twin_telemetry::record_alarm_raised();
            tracing::warn!(
                device_id,
                %asset_id,
                status = alarm_status.as_str(),
                alarm_count,
                "alarm threshold exceeded"
            );
        }

        Ok(ApplyOutcome {
            asset_id,
            applied: labeled.len(),
            dropped_unmapped,
            dropped_out_of_order: false,
            alarm_status,
        })
    }

    /// 读取资产状态快照。
    ///
    /// 有映射无数据返回空快照；既无状态也无映射返回 NotFound。
    pub async fn get_state(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
    ) -> Result<AssetStateRecord, StateError> {
        if let Some(record) = self.states.get_state(ctx, asset_id).await? {
            return Ok(record);
        }
        let mappings = self.mappings.list_for_asset(ctx, asset_id).await?;
        if mappings.is_empty() {
            return Err(StorageError::NotFound.into());
        }
        Ok(AssetStateRecord::empty(&ctx.tenant_id, asset_id))
    }

    /// 批量读取状态（一次取回）。
    pub async fn get_bulk_states(
        &self,
        ctx: &TenantContext,
        asset_ids: &[String],
    ) -> Result<HashMap<String, AssetStateRecord>, StateError> {
        Ok(self.states.get_bulk_states(ctx, asset_ids).await?)
    }

    /// 人工覆写状态（无条件赋值）。
    pub async fn override_state(
        &self,
        ctx: &TenantContext,
        asset_id: &str,
        values: &BTreeMap<String, ScalarValue>,
        observed_at_ms: i64,
    ) -> Result<(), StateError> {
        self.states
            .override_state(ctx, asset_id, values, observed_at_ms)
            .await?;
        tracing::info!(asset_id, user_id = %ctx.user_id, "state manually overridden");
        Ok(())
    }
}

/// 映射的变换表达式只作用于数值，非数值原样通过。
fn apply_transform(
    mapping: &DataPointMappingRecord,
    value: &ScalarValue,
) -> Result<ScalarValue, StateError> {
    let Some(expression) = mapping.transform_expression.as_deref() else {
        return Ok(value.clone());
    };
    let Some(input) = value.as_f64() else {
        return Ok(value.clone());
    };
    let transform = Transform::parse(expression)?;
    Ok(ScalarValue::F64(transform.eval(input)))
}

/// 逐字段评估告警阈值，最严重状态胜出，计数为违例字段数。
fn evaluate_alarms(matched: &[(DataPointMappingRecord, ScalarValue)]) -> (AlarmStatus, i64) {
    let mut worst = AlarmStatus::Normal;
    let mut count = 0;
    for (mapping, value) in matched {
        let Some(v) = value.as_f64() else { continue };
        let critical = mapping.crit_low.map(|low| v < low).unwrap_or(false)
            || mapping.crit_high.map(|high| v > high).unwrap_or(false);
        let warning = mapping.warn_low.map(|low| v < low).unwrap_or(false)
            || mapping.warn_high.map(|high| v > high).unwrap_or(false);
        let status = if critical {
            AlarmStatus::Critical
        } else if warning {
            AlarmStatus::Warning
        } else {
            AlarmStatus::Normal
        };
        if status > AlarmStatus::Normal {
            count += 1;
        }
        if status > worst {
            worst = status;
        }
    }
    (worst, count)
}
