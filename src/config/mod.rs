//! 配置管理模块
//!
//! 支持配置文件、环境变量和默认值三层来源

pub mod manager;

pub use manager::{
    AppConfig, BuilderConfig, ConfigManager, LookupConfig, ProviderConfig, ProviderKind,
    SessionConfig, StoreConfig,
};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    pub const APP_NAME: &str = "lexistream";

    // 存储
    pub const DEFAULT_STORE_FILE: &str = "dictionary.redb";
    pub const DEFAULT_HOT_CACHE_SIZE: usize = 1000;

    // 远程查询
    pub const DEFAULT_SOURCE_LANG: &str = "es";
    pub const DEFAULT_TARGET_LANG: &str = "en";
    pub const MYMEMORY_API_URL: &str = "https://api.mymemory.translated.net/get";
    pub const LIBRETRANSLATE_API_URL: &str = "https://libretranslate.de/translate";
    pub const LIBRETRANSLATE_MIRROR_URL: &str = "https://translate.fedilab.app/translate";
    pub const LINGVA_API_URL: &str = "https://lingva.garudalinux.org/api/v1";
    pub const SIMPLYTRANSLATE_API_URL: &str = "https://simplytranslate.org/api/translate";
    pub const DEEPL_API_URL: &str = "https://api-free.deepl.com/v2/translate";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_MAX_RETRIES: u32 = 2;
    pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(200);
    pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(2);
    pub const DEFAULT_MAX_REQUESTS_PER_SECOND: f64 = 5.0;

    // 渐进式翻译
    pub const DEFAULT_PLACEHOLDER: &str = "…";
    pub const DEFAULT_MIN_EVENT_INTERVAL: Duration = Duration::from_millis(30);
    pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "lexistream.toml",
        ".lexistream.toml",
        "~/.config/lexistream/config.toml",
        "/etc/lexistream/config.toml",
    ];
}

