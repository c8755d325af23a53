//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub redis_state_ttl_seconds: Option<u64>,
    pub rollup_tick_seconds: u64,
    pub rollup_enabled: bool,
    pub search_default_limit: usize,
    pub search_max_limit: usize,
}

impl AppConfig {
    /// 从环境变量读取配置。
    ///
    /// 未配置 TWIN_DATABASE_URL / TWIN_REDIS_URL 时回退到内存
    /// 存储，用于测试和本地演示。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr =
            env::var("TWIN_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let database_url = read_optional("TWIN_DATABASE_URL");
        let redis_url = read_optional("TWIN_REDIS_URL");
        let redis_state_ttl_seconds =
            read_optional_u64("TWIN_REDIS_STATE_TTL_SECONDS")?.filter(|value| *value > 0);
        let rollup_tick_seconds = read_u64_with_default("TWIN_ROLLUP_TICK_SECONDS", 15)?;
        let rollup_enabled = read_bool_with_default("TWIN_ROLLUP", true);
        let search_default_limit =
            read_u64_with_default("TWIN_SEARCH_DEFAULT_LIMIT", 50)? as usize;
        let search_max_limit = read_u64_with_default("TWIN_SEARCH_MAX_LIMIT", 500)? as usize;

        Ok(Self {
            http_addr,
            database_url,
            redis_url,
            redis_state_ttl_seconds,
            rollup_tick_seconds,
            rollup_enabled,
            search_default_limit,
            search_max_limit,
        })
    }
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_optional_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key.to_string(), value)),
        Err(_) => Ok(None),
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
