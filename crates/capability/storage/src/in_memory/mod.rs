//! 内存存储实现
//!
//! 基于 RwLock + HashMap 的线程安全实现，用于测试与本地演示。

pub mod asset;
pub mod asset_state;
pub mod data_point_mapping;
pub mod field_mapping;
pub mod rollup_config;
pub mod rollup_result;

pub use asset::InMemoryAssetStore;
pub use asset_state::InMemoryAssetStateStore;
pub use data_point_mapping::InMemoryDataPointMappingStore;
pub use field_mapping::InMemoryFieldMappingStore;
pub use rollup_config::InMemoryRollupConfigStore;
pub use rollup_result::InMemoryRollupResultStore;
