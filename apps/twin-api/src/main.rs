//! 资产层级引擎 HTTP API 服务器。
//!
//! 启动流程：
//! 1. 加载 .env 与 TWIN_* 环境变量配置
//! 2. 初始化结构化日志
//! 3. 按配置选择存储后端（Postgres/Redis 或内存实现）
//! 4. 组装字段映射解析器、状态追踪器、汇总引擎
//! 5. 启动汇总调度循环与 axum 服务器
//!
//! 优雅退出：ctrl-c 后先停 HTTP，再通过 watch 通道通知调度器
//! 在当前拍边界退出，进行中的桶直接丢弃。

mod handlers;
mod middleware;
mod providers;
mod routes;
mod utils;

use axum::Router;
use providers::{MappingAssignmentProvider, SchemaRegistry, TelemetryBuffer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use twin_config::AppConfig;
use twin_fieldmap::FieldMappingResolver;
use twin_rollup::{RollupEngine, RollupScheduler};
use twin_state::StateTracker;
use twin_storage::{
    AssetStateStore, AssetStore, DataPointMappingStore, FieldMappingStore, InMemoryAssetStateStore,
    InMemoryAssetStore, InMemoryDataPointMappingStore, InMemoryFieldMappingStore,
    InMemoryRollupConfigStore, InMemoryRollupResultStore, PgAssetStore, PgDataPointMappingStore,
    PgFieldMappingStore, PgRollupConfigStore, PgRollupResultStore, RedisAssetStateStore,
    RollupConfigStore, RollupResultStore, SubtreeLockManager, connect_pool,
};
use twin_telemetry::init_tracing;

/// 应用共享状态。
#[derive(Clone)]
pub struct AppState {
    pub assets: Arc<dyn AssetStore>,
    pub mappings: Arc<dyn DataPointMappingStore>,
    pub resolver: Arc<FieldMappingResolver>,
    pub schemas: Arc<SchemaRegistry>,
    pub tracker: Arc<StateTracker>,
    pub history: Arc<TelemetryBuffer>,
    pub rollup_configs: Arc<dyn RollupConfigStore>,
    pub rollup_results: Arc<dyn RollupResultStore>,
    pub scheduler: Arc<RollupScheduler>,
    pub search_default_limit: usize,
    pub search_max_limit: usize,
}

/// 持久层存储集合（按配置选择后端）。
struct Stores {
    assets: Arc<dyn AssetStore>,
    mappings: Arc<dyn DataPointMappingStore>,
    fields: Arc<dyn FieldMappingStore>,
    rollup_results: Arc<dyn RollupResultStore>,
    rollup_configs: Arc<dyn RollupConfigStore>,
}

async fn build_stores(
    config: &AppConfig,
    locks: &Arc<SubtreeLockManager>,
) -> Result<Stores, Box<dyn std::error::Error>> {
    match &config.database_url {
        Some(database_url) => {
            let pool = connect_pool(database_url).await?;
            Ok(Stores {
                assets: Arc::new(PgAssetStore::new(pool.clone(), Arc::clone(locks))),
                mappings: Arc::new(PgDataPointMappingStore::new(pool.clone())),
                fields: Arc::new(PgFieldMappingStore::new(pool.clone())),
                rollup_results: Arc::new(PgRollupResultStore::new(pool.clone())),
                rollup_configs: Arc::new(PgRollupConfigStore::new(pool)),
            })
        }
        None => {
            tracing::info!("TWIN_DATABASE_URL not set, using in-memory stores");
            Ok(Stores {
                assets: Arc::new(InMemoryAssetStore::new(Arc::clone(locks))),
                mappings: Arc::new(InMemoryDataPointMappingStore::new()),
                fields: Arc::new(InMemoryFieldMappingStore::new()),
                rollup_results: Arc::new(InMemoryRollupResultStore::new()),
                rollup_configs: Arc::new(InMemoryRollupConfigStore::new()),
            })
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    let locks = SubtreeLockManager::new();
    let stores = build_stores(&config, &locks).await?;

    let states: Arc<dyn AssetStateStore> = match &config.redis_url {
        Some(redis_url) => Arc::new(RedisAssetStateStore::connect_with_ttl(
            redis_url,
            config.redis_state_ttl_seconds,
        )?),
        None => {
            tracing::info!("TWIN_REDIS_URL not set, using in-memory state store");
            Arc::new(InMemoryAssetStateStore::new())
        }
    };

    let schemas = Arc::new(SchemaRegistry::new());
    let resolver = Arc::new(FieldMappingResolver::new(
        Arc::clone(&stores.fields),
        Arc::clone(&schemas) as Arc<dyn twin_fieldmap::SchemaProvider>,
    ));
    let assignments = Arc::new(MappingAssignmentProvider::new(Arc::clone(&stores.mappings)));
    let tracker = Arc::new(StateTracker::new(
        assignments,
        Arc::clone(&stores.mappings),
        Arc::clone(&states),
    ));
    let history = Arc::new(TelemetryBuffer::new());
    let engine = Arc::new(RollupEngine::new(
        Arc::clone(&stores.assets),
        Arc::clone(&stores.mappings),
        Arc::clone(&states),
        Arc::clone(&stores.rollup_results),
        Arc::clone(&history) as Arc<dyn twin_rollup::TelemetryQuery>,
        Arc::clone(&locks),
    ));
    let scheduler = Arc::new(RollupScheduler::new(
        engine,
        Arc::clone(&stores.rollup_configs),
        Duration::from_secs(config.rollup_tick_seconds.max(1)),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if config.rollup_enabled {
        tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx));
    }

    let state = AppState {
        assets: stores.assets,
        mappings: stores.mappings,
        resolver,
        schemas,
        tracker,
        history,
        rollup_configs: stores.rollup_configs,
        rollup_results: stores.rollup_results,
        scheduler,
        search_default_limit: config.search_default_limit,
        search_max_limit: config.search_max_limit,
    };

    // 所有路由同时挂载在 / 与 /api 前缀下
    let app = Router::new()
        .merge(routes::create_api_router())
        .nest("/api", routes::create_api_router())
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::request_context))
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    tracing::info!(addr = %config.http_addr, "twin-api listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    // HTTP 已停，通知调度器在当前拍边界退出
    let _ = shutdown_tx.send(true);
    Ok(())
}
