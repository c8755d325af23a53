//! # Twin Storage 模块
//!
//! 本模块提供统一的数据存储抽象层，支持多种存储后端实现。
//!
//! ## 架构设计
//!
//! 该模块采用分层架构，遵循以下原则：
//!
//! 1. **接口抽象层** (`traits.rs`)：定义所有资源存储的异步 Trait 接口
//! 2. **数据模型层** (`models.rs`)：定义存储相关的数据结构
//! 3. **错误处理层** (`error.rs`)：统一的存储错误分类
//! 4. **验证辅助层** (`validation.rs`)：多租户作用域验证
//! 5. **连接管理层** (`connection.rs`)：数据库连接池管理
//! 6. **子树锁** (`lock.rs`)：资产子树级读写锁，隔离结构变更与汇总读取
//! 7. **实现层**：
//!    - `in_memory/`：内存存储实现（用于测试和演示）
//!    - `postgres/`：PostgreSQL 存储实现（生产环境使用）
//!    - `redis.rs`：Redis 资产状态实现（热状态缓存）
//!
//! ## 核心特性
//!
//! - **多租户隔离**：所有存储接口都显式接收 `TenantContext`，确保租户数据隔离
//! - **物化路径层级**：资产树以 path 前缀编码，后代查询是一次范围扫描
//! - **类型安全**：使用 Rust 的类型系统和 sqlx 的参数化查询
//! - **异步支持**：基于 Tokio 的异步 I/O，支持高并发场景
//! - **可扩展性**：通过 Trait 接口支持多种存储后端
//!
//! ## 模块说明
//!
//! ### 核心模块
//!
//! - [`models`]：数据模型定义（资产、数据点映射、字段映射、状态、汇总）
//! - [`traits`]：存储接口定义（CRUD + 层级操作 + 时间序写入）
//! - [`error`]：存储错误分类定义
//! - [`validation`]：租户作用域验证函数
//! - [`connection`]：PostgreSQL 连接池管理
//! - [`lock`]：子树级读写锁管理器
//!
//! ### 存储实现
//!
//! - [`in_memory`]：内存存储实现
//!   - 使用 `RwLock<HashMap>` 提供线程安全的内存存储
//!   - 适用于单元测试、集成测试和本地演示
//!
//! - [`postgres`]：PostgreSQL 存储实现
//!   - 使用 sqlx 提供类型安全的数据库访问
//!   - move / 级联删除在事务内完成，path 前缀替换一条 UPDATE 搞定
//!   - 所有 SQL 查询使用参数化，防止 SQL 注入
//!
//! - [`redis`]：Redis 资产状态实现
//!   - 状态整体 JSON 负载存单键，批量读取走 MGET
//!   - 可选 TTL，适合热状态缓存场景
//!
//! ## 多租户安全
//!
//! 所有存储操作都强制通过 `TenantContext` 进行租户隔离：
//!
//! - **租户 ID 验证**：所有查询自动添加 `tenant_id` 过滤条件
//! - **归属校验**：访问前验证记录归属当前租户，越权返回 Forbidden
//! - **错误可区分**：NotFound 与 Forbidden 分开，调用方据此映射 404/403
//!
//! ## 设计约束
//!
//! - **禁止直接 SQL**：Handler 层禁止直接写 SQL，统一通过 storage 层
//! - **显式上下文**：所有数据访问方法必须显式接收 `TenantContext`
//! - **path/depth 只读**：update 永远不接受 path/depth，二者只通过
//!   create / move 演化
//!
//! ## 性能考虑
//!
//! - **连接池**：PostgreSQL 连接池最大连接数为 8，可根据负载调整
//! - **前缀索引**：`(tenant_id, path)` 建有索引，后代查询 O(子树大小)
//! - **批量查询**：状态批量读取一次取回（内存单锁 / Redis MGET / SQL any）

// 模块导出：将子模块的内容导出到 crate 根目录
pub mod connection;
pub mod error;
pub mod in_memory;
pub mod lock;
pub mod models;
pub mod postgres;
pub mod redis;
pub mod traits;
pub mod validation;

// 导出常用类型到 crate 根目录，方便外部引用
pub use connection::*;
pub use error::*;
pub use lock::{LockMode, SubtreeGuard, SubtreeLockManager};
pub use models::*;
pub use redis::RedisAssetStateStore;
pub use traits::*;
pub use validation::*;

// 导出内存存储实现类型
pub use in_memory::{
    InMemoryAssetStateStore, InMemoryAssetStore, InMemoryDataPointMappingStore,
    InMemoryFieldMappingStore, InMemoryRollupConfigStore, InMemoryRollupResultStore,
};

// 导出 PostgreSQL 存储实现类型
pub use postgres::{
    PgAssetStore, PgDataPointMappingStore, PgFieldMappingStore, PgRollupConfigStore,
    PgRollupResultStore,
};
