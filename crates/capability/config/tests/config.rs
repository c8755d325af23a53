use twin_config::AppConfig;

#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("TWIN_HTTP_ADDR", "127.0.0.1:8081");
        std::env::set_var("TWIN_ROLLUP_TICK_SECONDS", "5");
        std::env::set_var("TWIN_REDIS_STATE_TTL_SECONDS", "0");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.http_addr, "127.0.0.1:8081");
    assert_eq!(config.rollup_tick_seconds, 5);
    // TTL 为 0 等价于不过期
    assert_eq!(config.redis_state_ttl_seconds, None);
    assert_eq!(config.search_default_limit, 50);
    assert_eq!(config.search_max_limit, 500);
    assert!(config.database_url.is_none());
}
