//! Postgres 存储实现
//!
//! 生产环境使用的持久化实现，基于 sqlx 连接池。

pub mod asset;
pub mod data_point_mapping;
pub mod field_mapping;
pub mod rollup_config;
pub mod rollup_result;

pub use asset::PgAssetStore;
pub use data_point_mapping::PgDataPointMappingStore;
pub use field_mapping::PgFieldMappingStore;
pub use rollup_config::PgRollupConfigStore;
pub use rollup_result::PgRollupResultStore;
