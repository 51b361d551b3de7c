//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量访问，配置管理器用它覆盖文件配置

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => {
                if let Some(default) = Self::DEFAULT {
                    Ok(default)
                } else {
                    Err(EnvError {
                        variable: Self::NAME.to_string(),
                        message: "Required environment variable not set".to_string(),
                    })
                }
            }
        }
    }

    /// 仅在变量被显式设置时返回，用于覆盖文件配置
    fn get_if_set() -> Option<EnvResult<T>> {
        env::var(Self::NAME).ok().map(|value| Self::parse(&value))
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "LEXISTREAM_LOG_LEVEL";
        const DEFAULT: Option<String> = None;

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("info".to_string()),
            }
        }
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }

    /// 显式指定配置文件
    pub struct ConfigPath;
    impl EnvVar<PathBuf> for ConfigPath {
        const NAME: &'static str = "LEXISTREAM_CONFIG";
        const DEFAULT: Option<PathBuf> = None;
        const DESCRIPTION: &'static str = "Path to a TOML or JSON configuration file";

        fn parse(value: &str) -> EnvResult<PathBuf> {
            parse_path(value, Self::NAME)
        }
    }
}

/// 词典存储相关环境变量
pub mod store {
    use super::*;

    /// 存储文件路径
    pub struct Path;
    impl EnvVar<PathBuf> for Path {
        const NAME: &'static str = "LEXISTREAM_STORE_PATH";
        const DEFAULT: Option<PathBuf> = None;
        const DESCRIPTION: &'static str = "Location of the canonical dictionary file";

        fn parse(value: &str) -> EnvResult<PathBuf> {
            parse_path(value, Self::NAME)
        }
    }

    /// 热缓存容量
    pub struct HotCacheSize;
    impl EnvVar<usize> for HotCacheSize {
        const NAME: &'static str = "LEXISTREAM_HOT_CACHE_SIZE";
        const DEFAULT: Option<usize> = Some(1000);
        const DESCRIPTION: &'static str = "Number of recently read entries kept in memory";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 1_000_000)
        }
    }
}

/// 远程查询相关环境变量
pub mod lookup {
    use super::*;

    /// 远程查询启用状态
    pub struct RemoteEnabled;
    impl EnvVar<bool> for RemoteEnabled {
        const NAME: &'static str = "LEXISTREAM_REMOTE_ENABLED";
        const DEFAULT: Option<bool> = Some(true);
        const DESCRIPTION: &'static str = "Fall back to online translation for unknown words";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }

    /// 源语言
    pub struct SourceLang;
    impl EnvVar<String> for SourceLang {
        const NAME: &'static str = "LEXISTREAM_SOURCE_LANG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Source language (ISO 639-1 code)";

        fn parse(value: &str) -> EnvResult<String> {
            parse_lang(value, Self::NAME)
        }
    }

    /// 目标语言
    pub struct TargetLang;
    impl EnvVar<String> for TargetLang {
        const NAME: &'static str = "LEXISTREAM_TARGET_LANG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Target language (ISO 639-1 code)";

        fn parse(value: &str) -> EnvResult<String> {
            parse_lang(value, Self::NAME)
        }
    }

    /// 单次远程请求超时
    pub struct Timeout;
    impl EnvVar<Duration> for Timeout {
        const NAME: &'static str = "LEXISTREAM_REMOTE_TIMEOUT_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_secs(5));
        const DESCRIPTION: &'static str = "Timeout of a single remote request in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            let millis = parse_positive_usize(value, Self::NAME, 1, 120_000)?;
            Ok(Duration::from_millis(millis as u64))
        }
    }

    /// 最大重试次数
    pub struct MaxRetries;
    impl EnvVar<u32> for MaxRetries {
        const NAME: &'static str = "LEXISTREAM_REMOTE_MAX_RETRIES";
        const DEFAULT: Option<u32> = Some(2);
        const DESCRIPTION: &'static str = "Retries after a failed remote request";

        fn parse(value: &str) -> EnvResult<u32> {
            let retries = parse_positive_usize(value, Self::NAME, 0, 10)?;
            Ok(retries as u32)
        }
    }

    /// 每秒最大请求数
    pub struct MaxRequestsPerSecond;
    impl EnvVar<f64> for MaxRequestsPerSecond {
        const NAME: &'static str = "LEXISTREAM_MAX_REQUESTS_PER_SECOND";
        const DEFAULT: Option<f64> = Some(5.0);
        const DESCRIPTION: &'static str = "Maximum requests per second to remote services";

        fn parse(value: &str) -> EnvResult<f64> {
            let rate: f64 = value.trim().parse().map_err(|_| EnvError {
                variable: Self::NAME.to_string(),
                message: "Must be a valid number".to_string(),
            })?;

            if rate <= 0.0 {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Rate must be greater than 0".to_string(),
                });
            }

            if rate > 1000.0 {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Rate too high (max 1000 requests/second)".to_string(),
                });
            }

            Ok(rate)
        }
    }

    /// LibreTranslate 实例地址
    pub struct LibreTranslateUrl;
    impl EnvVar<String> for LibreTranslateUrl {
        const NAME: &'static str = "LEXISTREAM_LIBRETRANSLATE_URL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "LibreTranslate endpoint URL";

        fn parse(value: &str) -> EnvResult<String> {
            let url = value.trim();
            if url.starts_with("http://") || url.starts_with("https://") {
                Ok(url.to_string())
            } else {
                Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "API URL must start with http:// or https://".to_string(),
                })
            }
        }
    }
}

/// 渐进式翻译相关环境变量
pub mod session {
    use super::*;

    /// 事件最小间隔
    pub struct MinInterval;
    impl EnvVar<Duration> for MinInterval {
        const NAME: &'static str = "LEXISTREAM_MIN_EVENT_INTERVAL_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(30));
        const DESCRIPTION: &'static str = "Minimum milliseconds between two token updates";

        fn parse(value: &str) -> EnvResult<Duration> {
            let millis = parse_positive_usize(value, Self::NAME, 0, 10_000)?;
            Ok(Duration::from_millis(millis as u64))
        }
    }

    /// 前瞻并发数
    pub struct MaxInFlight;
    impl EnvVar<usize> for MaxInFlight {
        const NAME: &'static str = "LEXISTREAM_MAX_IN_FLIGHT";
        const DEFAULT: Option<usize> = Some(4);
        const DESCRIPTION: &'static str = "Lookups dispatched ahead of the token being applied";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 64)
        }
    }
}

/// 辅助函数
fn parse_bool(value: &str, var_name: &str) -> EnvResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Ok(true),
        "false" | "0" | "no" | "off" | "disabled" => Ok(false),
        _ => Err(EnvError {
            variable: var_name.to_string(),
            message: format!(
                "Invalid boolean value '{}'. Use: true/false, 1/0, yes/no, on/off, enabled/disabled",
                value
            ),
        }),
    }
}

fn parse_positive_usize(value: &str, var_name: &str, min: usize, max: usize) -> EnvResult<usize> {
    let num: usize = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid positive number".to_string(),
    })?;

    if num < min {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is below minimum {}", num, min),
        });
    }

    if num > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} exceeds maximum {}", num, max),
        });
    }

    Ok(num)
}

fn parse_lang(value: &str, var_name: &str) -> EnvResult<String> {
    let lang = value.trim().to_lowercase();
    if lang.len() == 2 && lang.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(lang)
    } else {
        Err(EnvError {
            variable: var_name.to_string(),
            message: "Language code must be 2 characters (ISO 639-1)".to_string(),
        })
    }
}

fn parse_path(value: &str, var_name: &str) -> EnvResult<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: "Path must not be empty".to_string(),
        });
    }
    Ok(PathBuf::from(shellexpand::tilde(trimmed).as_ref()))
}

/// 环境变量文档生成器
pub fn generate_env_docs() -> String {
    fn line<T: fmt::Debug, V: EnvVar<T>>(docs: &mut String) {
        docs.push_str(&format!(
            "- `{}`: {} (default: {:?})\n",
            V::NAME,
            V::DESCRIPTION,
            V::DEFAULT
        ));
    }

    let mut docs = String::new();
    docs.push_str("# Environment Variables\n\n");

    docs.push_str("## Core\n\n");
    line::<String, core::LogLevel>(&mut docs);
    line::<PathBuf, core::ConfigPath>(&mut docs);

    docs.push_str("\n## Store\n\n");
    line::<PathBuf, store::Path>(&mut docs);
    line::<usize, store::HotCacheSize>(&mut docs);

    docs.push_str("\n## Lookup\n\n");
    line::<bool, lookup::RemoteEnabled>(&mut docs);
    line::<String, lookup::SourceLang>(&mut docs);
    line::<String, lookup::TargetLang>(&mut docs);
    line::<Duration, lookup::Timeout>(&mut docs);
    line::<u32, lookup::MaxRetries>(&mut docs);
    line::<f64, lookup::MaxRequestsPerSecond>(&mut docs);
    line::<String, lookup::LibreTranslateUrl>(&mut docs);

    docs.push_str("\n## Session\n\n");
    line::<Duration, session::MinInterval>(&mut docs);
    line::<usize, session::MaxInFlight>(&mut docs);

    docs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(core::LogLevel::parse("DEBUG").unwrap(), "debug");
        assert!(core::LogLevel::parse("verbose").is_err());
    }

    #[test]
    fn test_boolean_parsing() {
        assert!(lookup::RemoteEnabled::parse("true").unwrap());
        assert!(lookup::RemoteEnabled::parse("1").unwrap());
        assert!(lookup::RemoteEnabled::parse("YES").unwrap());
        assert!(!lookup::RemoteEnabled::parse("off").unwrap());
        assert!(!lookup::RemoteEnabled::parse("disabled").unwrap());
        assert!(lookup::RemoteEnabled::parse("maybe").is_err());
    }

    #[test]
    fn test_language_validation() {
        assert_eq!(lookup::SourceLang::parse(" ES ").unwrap(), "es");
        assert!(lookup::TargetLang::parse("eng").is_err());
        assert!(lookup::TargetLang::parse("e1").is_err());
    }

    #[test]
    fn test_numeric_validation() {
        assert_eq!(
            lookup::Timeout::parse("1500").unwrap(),
            Duration::from_millis(1500)
        );
        assert!(lookup::Timeout::parse("0").is_err());
        assert_eq!(lookup::MaxRetries::parse("0").unwrap(), 0);
        assert!(lookup::MaxRetries::parse("11").is_err());
        assert!(lookup::MaxRequestsPerSecond::parse("0.5").is_ok());
        assert!(lookup::MaxRequestsPerSecond::parse("0").is_err());
        assert!(session::MaxInFlight::parse("0").is_err());
        assert_eq!(session::MinInterval::parse("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_url_validation() {
        assert!(lookup::LibreTranslateUrl::parse("http://localhost:5000/translate").is_ok());
        assert!(lookup::LibreTranslateUrl::parse("ftp://example.com").is_err());
    }

    #[test]
    fn test_docs_list_every_variable() {
        let docs = generate_env_docs();
        assert!(docs.contains("LEXISTREAM_STORE_PATH"));
        assert!(docs.contains("LEXISTREAM_MAX_IN_FLIGHT"));
        assert!(docs.contains("LEXISTREAM_LOG_LEVEL"));
    }
}
