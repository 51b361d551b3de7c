//! 环境变量覆盖配置文件
//!
//! 修改进程环境变量，所以单独放在一个测试二进制中且只有一个测试。

use std::path::PathBuf;
use std::time::Duration;

use lexistream::config::{ConfigManager, ProviderKind};

#[test]
fn test_env_overrides_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("lexistream.toml");
    std::fs::write(
        &config_path,
        r#"
[store]
path = "/tmp/from-file.redb"
hot_cache_size = 64

[lookup]
remote_enabled = true
max_retries = 5
timeout_ms = 9000

[session]
max_in_flight = 3
min_interval_ms = 10
"#,
    )
    .unwrap();

    std::env::set_var("LEXISTREAM_STORE_PATH", "/tmp/from-env.redb");
    std::env::set_var("LEXISTREAM_REMOTE_ENABLED", "false");
    std::env::set_var("LEXISTREAM_REMOTE_TIMEOUT_MS", "1500");
    std::env::set_var("LEXISTREAM_MIN_EVENT_INTERVAL_MS", "75");
    std::env::set_var("LEXISTREAM_LIBRETRANSLATE_URL", "http://localhost:5000/translate");
    std::env::set_var("LEXISTREAM_HOT_CACHE_SIZE", "not-a-number");

    let manager = ConfigManager::load(Some(&config_path)).unwrap();
    let config = manager.get_config();

    assert_eq!(manager.source(), Some(config_path.as_path()));

    // 环境变量优先
    assert_eq!(config.store.path, PathBuf::from("/tmp/from-env.redb"));
    assert!(!config.lookup.remote_enabled);
    assert_eq!(config.lookup.timeout(), Duration::from_millis(1500));
    assert_eq!(config.session.min_interval(), Duration::from_millis(75));

    // 未设置或无效的变量保留文件中的值
    assert_eq!(config.store.hot_cache_size, 64);
    assert_eq!(config.lookup.max_retries, 5);
    assert_eq!(config.session.max_in_flight, 3);

    let libre = config
        .lookup
        .providers
        .iter()
        .find(|p| p.kind == ProviderKind::LibreTranslate)
        .unwrap();
    assert_eq!(libre.api_url, "http://localhost:5000/translate");

    // 只读文件时不应用环境变量
    let plain = ConfigManager::from_file(&config_path).unwrap().into_config();
    assert_eq!(plain.store.path, PathBuf::from("/tmp/from-file.redb"));
    assert!(plain.lookup.remote_enabled);
}
