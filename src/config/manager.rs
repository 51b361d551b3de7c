//! 配置管理器
//!
//! 加载顺序：`.env` 文件 → 配置文件（TOML 或 JSON）→ 环境变量覆盖 → 校验

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use super::constants;
use crate::dictionary::ConflictPolicy;
use crate::env::{self, EnvVar};
use crate::error::{DictionaryError, DictionaryResult};

/// 应用配置
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub lookup: LookupConfig,
    pub builder: BuilderConfig,
    pub session: SessionConfig,
}

/// 词典存储配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub hot_cache_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            hot_cache_size: constants::DEFAULT_HOT_CACHE_SIZE,
        }
    }
}

/// 远程服务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    MyMemory,
    LibreTranslate,
    Lingva,
    SimplyTranslate,
    /// 需要 `api_key`
    DeepL,
}

/// 单个远程服务
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl ProviderConfig {
    pub fn mymemory() -> Self {
        Self {
            kind: ProviderKind::MyMemory,
            api_url: constants::MYMEMORY_API_URL.to_string(),
            api_key: None,
        }
    }

    pub fn libretranslate(api_url: impl Into<String>) -> Self {
        Self::endpoint(ProviderKind::LibreTranslate, api_url)
    }

    pub fn lingva(api_url: impl Into<String>) -> Self {
        Self::endpoint(ProviderKind::Lingva, api_url)
    }

    pub fn simplytranslate(api_url: impl Into<String>) -> Self {
        Self::endpoint(ProviderKind::SimplyTranslate, api_url)
    }

    pub fn deepl(api_key: impl Into<String>) -> Self {
        Self {
            kind: ProviderKind::DeepL,
            api_url: constants::DEEPL_API_URL.to_string(),
            api_key: Some(api_key.into()),
        }
    }

    fn endpoint(kind: ProviderKind, api_url: impl Into<String>) -> Self {
        Self {
            kind,
            api_url: api_url.into(),
            api_key: None,
        }
    }
}

/// 查询服务配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LookupConfig {
    pub remote_enabled: bool,
    pub source_lang: String,
    pub target_lang: String,

    pub timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub max_requests_per_second: f64,

    /// 按顺序尝试，第一个成功的结果生效。同一类型可以出现多次，
    /// 例如多个 LibreTranslate 实例依次故障转移
    pub providers: Vec<ProviderConfig>,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            remote_enabled: true,
            source_lang: constants::DEFAULT_SOURCE_LANG.to_string(),
            target_lang: constants::DEFAULT_TARGET_LANG.to_string(),

            timeout_ms: constants::DEFAULT_TIMEOUT.as_millis() as u64,
            max_retries: constants::DEFAULT_MAX_RETRIES,
            backoff_base_ms: constants::DEFAULT_BACKOFF_BASE.as_millis() as u64,
            backoff_max_ms: constants::DEFAULT_BACKOFF_MAX.as_millis() as u64,
            max_requests_per_second: constants::DEFAULT_MAX_REQUESTS_PER_SECOND,

            providers: vec![
                ProviderConfig::mymemory(),
                ProviderConfig::libretranslate(constants::LIBRETRANSLATE_API_URL),
                ProviderConfig::libretranslate(constants::LIBRETRANSLATE_MIRROR_URL),
                ProviderConfig::lingva(constants::LINGVA_API_URL),
                ProviderConfig::simplytranslate(constants::SIMPLYTRANSLATE_API_URL),
            ],
        }
    }
}

impl LookupConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 第 `attempt` 次重试前的等待时间：base × 2^attempt，不超过上限
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let millis = self.backoff_base_ms.saturating_mul(factor).min(self.backoff_max_ms);
        Duration::from_millis(millis)
    }

    /// 两次远程请求之间的最小间隔
    pub fn min_request_spacing(&self) -> Duration {
        if self.max_requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / self.max_requests_per_second)
        } else {
            Duration::ZERO
        }
    }
}

/// 构建器配置
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BuilderConfig {
    pub policy: ConflictPolicy,
    /// 把当前存储作为最低优先级的第一个来源
    pub include_live_entries: bool,
    /// 加入内置常用词来源
    pub seed_common_words: bool,
    /// `combine` 默认读取的导出文件
    pub sources: Vec<PathBuf>,
}

/// 渐进式翻译配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    pub placeholder: String,
    pub min_interval_ms: u64,
    pub max_in_flight: usize,
    pub preserve_case: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            placeholder: constants::DEFAULT_PLACEHOLDER.to_string(),
            min_interval_ms: constants::DEFAULT_MIN_EVENT_INTERVAL.as_millis() as u64,
            max_in_flight: constants::DEFAULT_MAX_IN_FLIGHT,
            preserve_case: false,
        }
    }
}

impl SessionConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

impl AppConfig {
    /// 验证配置
    pub fn validate(&self) -> DictionaryResult<()> {
        if self.store.path.as_os_str().is_empty() {
            return Err(DictionaryError::Config("存储路径不能为空".to_string()));
        }

        if self.store.hot_cache_size == 0 {
            return Err(DictionaryError::Config("热缓存容量不能为0".to_string()));
        }

        if self.lookup.timeout_ms == 0 {
            return Err(DictionaryError::Config("远程请求超时不能为0".to_string()));
        }

        if self.lookup.max_requests_per_second <= 0.0 {
            return Err(DictionaryError::Config("请求速率必须大于0".to_string()));
        }

        if self.lookup.backoff_max_ms < self.lookup.backoff_base_ms {
            return Err(DictionaryError::Config(
                "退避上限不能小于退避基数".to_string(),
            ));
        }

        if self.lookup.remote_enabled && self.lookup.providers.is_empty() {
            return Err(DictionaryError::Config(
                "启用远程查询时至少需要一个远程服务".to_string(),
            ));
        }

        if let Some(provider) = self
            .lookup
            .providers
            .iter()
            .find(|p| p.kind == ProviderKind::DeepL && p.api_key.is_none())
        {
            return Err(DictionaryError::Config(format!(
                "DeepL 服务 {} 缺少 api_key",
                provider.api_url
            )));
        }

        if self.session.max_in_flight == 0 {
            return Err(DictionaryError::Config("前瞻并发数不能为0".to_string()));
        }

        if self.session.placeholder.is_empty() {
            return Err(DictionaryError::Config("占位符不能为空".to_string()));
        }

        Ok(())
    }

    /// 应用环境变量覆盖
    ///
    /// 只有显式设置的变量才覆盖，值无效时记录警告并保留原配置。
    pub fn apply_env_overrides(&mut self) {
        fn apply<T, V: EnvVar<T>>(target: &mut T) {
            match V::get_if_set() {
                Some(Ok(value)) => *target = value,
                Some(Err(e)) => tracing::warn!("忽略无效的环境变量: {}", e),
                None => {}
            }
        }

        apply::<PathBuf, env::store::Path>(&mut self.store.path);
        apply::<usize, env::store::HotCacheSize>(&mut self.store.hot_cache_size);

        apply::<bool, env::lookup::RemoteEnabled>(&mut self.lookup.remote_enabled);
        apply::<String, env::lookup::SourceLang>(&mut self.lookup.source_lang);
        apply::<String, env::lookup::TargetLang>(&mut self.lookup.target_lang);
        apply::<u32, env::lookup::MaxRetries>(&mut self.lookup.max_retries);
        apply::<f64, env::lookup::MaxRequestsPerSecond>(
            &mut self.lookup.max_requests_per_second,
        );

        let mut timeout = self.lookup.timeout();
        apply::<Duration, env::lookup::Timeout>(&mut timeout);
        self.lookup.timeout_ms = timeout.as_millis() as u64;

        if let Some(Ok(url)) = env::lookup::LibreTranslateUrl::get_if_set() {
            tracing::info!("环境变量覆盖 LibreTranslate 地址: {}", url);
            match self
                .lookup
                .providers
                .iter_mut()
                .find(|p| p.kind == ProviderKind::LibreTranslate)
            {
                Some(provider) => provider.api_url = url,
                None => self.lookup.providers.push(ProviderConfig::libretranslate(url)),
            }
        }

        let mut interval = self.session.min_interval();
        apply::<Duration, env::session::MinInterval>(&mut interval);
        self.session.min_interval_ms = interval.as_millis() as u64;
        apply::<usize, env::session::MaxInFlight>(&mut self.session.max_in_flight);
    }
}

/// 配置管理器
pub struct ConfigManager {
    config: AppConfig,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// 搜索默认路径加载配置，并应用环境变量覆盖
    pub fn new() -> DictionaryResult<Self> {
        Self::load(None)
    }

    /// 加载配置；`explicit` 优先于 `LEXISTREAM_CONFIG` 与搜索路径
    pub fn load(explicit: Option<&Path>) -> DictionaryResult<Self> {
        Self::load_dotenv();

        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => match env::core::ConfigPath::get_if_set() {
                Some(result) => Some(result.map_err(|e| DictionaryError::Config(e.to_string()))?),
                None => Self::find_config_file(),
            },
        };

        let mut config = match &path {
            Some(path) => {
                tracing::info!("加载配置文件: {}", path.display());
                Self::load_from_file(path)?
            }
            None => {
                tracing::info!("未找到配置文件，使用默认配置");
                AppConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(Self {
            config,
            source: path,
        })
    }

    /// 只读取指定文件，不应用环境变量
    pub fn from_file(path: impl AsRef<Path>) -> DictionaryResult<Self> {
        let path = path.as_ref();
        let config = Self::load_from_file(path)?;
        config.validate()?;

        Ok(Self {
            config,
            source: Some(path.to_path_buf()),
        })
    }

    /// 获取配置
    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    pub fn into_config(self) -> AppConfig {
        self.config
    }

    /// 配置来自哪个文件，`None` 表示使用默认值
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn find_config_file() -> Option<PathBuf> {
        constants::CONFIG_PATHS.iter().find_map(|path| {
            let expanded = shellexpand::tilde(path);
            let candidate = PathBuf::from(expanded.as_ref());
            candidate.exists().then_some(candidate)
        })
    }

    fn load_from_file(path: &Path) -> DictionaryResult<AppConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DictionaryError::Config(format!("读取配置文件失败: {}", e)))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .map_err(|e| DictionaryError::Config(format!("解析JSON配置失败: {}", e)))
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config(path: impl AsRef<Path>) -> DictionaryResult<()> {
        let content = toml::to_string_pretty(&AppConfig::default())
            .map_err(|e| DictionaryError::Config(format!("序列化配置失败: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| DictionaryError::Config(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }
}

/// 平台数据目录下的默认存储位置
pub fn default_store_path() -> PathBuf {
    ProjectDirs::from("", "", constants::APP_NAME)
        .map(|dirs| dirs.data_dir().join(constants::DEFAULT_STORE_FILE))
        .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_STORE_FILE))
}
