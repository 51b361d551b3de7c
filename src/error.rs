//! 统一错误处理
//!
//! 词典存储、构建器与远程翻译三层各自的结构化错误类型。
//! 远程错误只在查询服务内部流转，不会向调用方抛出。

use std::fmt;

use thiserror::Error;

/// 词典层错误（存储、构建、配置）
#[derive(Error, Debug, Clone)]
pub enum DictionaryError {
    /// 底层存储无法打开，重新打开之前所有操作都会失败
    #[error("词典存储不可用: {0}")]
    StoreUnavailable(String),

    /// 事务或表操作失败
    #[error("存储错误: {0}")]
    Storage(String),

    /// 条目序列化失败
    #[error("序列化错误: {0}")]
    Serialization(String),

    /// 文件读写错误
    #[error("IO错误: {0}")]
    Io(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 源记录格式错误（构建器内部计数后跳过）
    #[error("源记录格式错误: {0}")]
    MalformedSourceRecord(String),
}

impl DictionaryError {
    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DictionaryError::StoreUnavailable(_) => ErrorSeverity::Critical,
            DictionaryError::Storage(_) => ErrorSeverity::Error,
            DictionaryError::Serialization(_) => ErrorSeverity::Error,
            DictionaryError::Io(_) => ErrorSeverity::Error,
            DictionaryError::Config(_) => ErrorSeverity::Critical,
            DictionaryError::MalformedSourceRecord(_) => ErrorSeverity::Info,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            DictionaryError::StoreUnavailable(_) => ErrorCategory::Storage,
            DictionaryError::Storage(_) => ErrorCategory::Storage,
            DictionaryError::Serialization(_) => ErrorCategory::Serialization,
            DictionaryError::Io(_) => ErrorCategory::Io,
            DictionaryError::Config(_) => ErrorCategory::Configuration,
            DictionaryError::MalformedSourceRecord(_) => ErrorCategory::Input,
        }
    }
}

/// 远程翻译错误
///
/// 错误状态码、超时与无法解析的响应体一律视为失败，
/// 查询服务据此决定是否重试，最终只体现为 `Origin::Unresolved`。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// 网络不可达或服务返回非成功状态
    #[error("远程服务不可用: {0}")]
    Unavailable(String),

    /// 单次请求超时
    #[error("远程请求超时: {0}")]
    Timeout(String),

    /// 响应体无法解析或为空
    #[error("远程响应格式错误: {0}")]
    Malformed(String),

    /// 服务端限流
    #[error("请求速率过快，已达到限制")]
    RateLimited,
}

impl RemoteError {
    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Unavailable(_) => true,
            RemoteError::Timeout(_) => true,
            RemoteError::RateLimited => true,
            RemoteError::Malformed(_) => false,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RemoteError::Malformed(_) => ErrorSeverity::Error,
            _ => ErrorSeverity::Warning,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            RemoteError::Unavailable(_) => ErrorCategory::Network,
            RemoteError::Timeout(_) => ErrorCategory::Timeout,
            RemoteError::Malformed(_) => ErrorCategory::Parsing,
            RemoteError::RateLimited => ErrorCategory::RateLimit,
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Network,
    RateLimit,
    Input,
    Storage,
    Timeout,
    Parsing,
    Serialization,
    Io,
}

impl From<std::io::Error> for DictionaryError {
    fn from(error: std::io::Error) -> Self {
        DictionaryError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for DictionaryError {
    fn from(error: serde_json::Error) -> Self {
        DictionaryError::Serialization(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for DictionaryError {
    fn from(error: toml::de::Error) -> Self {
        DictionaryError::Config(format!("TOML解析错误: {}", error))
    }
}

impl From<redb::Error> for DictionaryError {
    fn from(error: redb::Error) -> Self {
        DictionaryError::Storage(error.to_string())
    }
}

impl From<redb::TransactionError> for DictionaryError {
    fn from(error: redb::TransactionError) -> Self {
        DictionaryError::Storage(format!("事务错误: {}", error))
    }
}

impl From<redb::TableError> for DictionaryError {
    fn from(error: redb::TableError) -> Self {
        DictionaryError::Storage(format!("表错误: {}", error))
    }
}

impl From<redb::StorageError> for DictionaryError {
    fn from(error: redb::StorageError) -> Self {
        DictionaryError::Storage(error.to_string())
    }
}

impl From<redb::CommitError> for DictionaryError {
    fn from(error: redb::CommitError) -> Self {
        DictionaryError::Storage(format!("提交失败: {}", error))
    }
}

impl From<redb::DatabaseError> for DictionaryError {
    fn from(error: redb::DatabaseError) -> Self {
        DictionaryError::StoreUnavailable(error.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for RemoteError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        RemoteError::Timeout(error.to_string())
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            RemoteError::Timeout(error.to_string())
        } else if error.is_decode() {
            RemoteError::Malformed(error.to_string())
        } else {
            RemoteError::Unavailable(error.to_string())
        }
    }
}

/// 词典层结果类型别名
pub type DictionaryResult<T> = Result<T, DictionaryError>;

/// 远程翻译结果类型别名
pub type RemoteResult<T> = Result<T, RemoteError>;

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录错误并原样返回
    pub fn log_error<T>(error: DictionaryError) -> DictionaryResult<T> {
        match error.severity() {
            ErrorSeverity::Info => tracing::info!("词典信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!("词典警告: {}", error),
            ErrorSeverity::Error => tracing::error!("词典错误: {}", error),
            ErrorSeverity::Critical => tracing::error!("词典严重错误: {}", error),
        }

        Err(error)
    }

    /// 记录远程失败（不返回错误，远程失败只影响来源标记）
    pub fn log_remote_failure(word: &str, error: &RemoteError) {
        match error.severity() {
            ErrorSeverity::Error | ErrorSeverity::Critical => {
                tracing::error!("远程查询 '{}' 失败: {}", word, error)
            }
            _ => tracing::warn!("远程查询 '{}' 失败: {}", word, error),
        }
    }

    pub fn config_error<T: fmt::Display>(msg: T) -> DictionaryError {
        DictionaryError::Config(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_retryability() {
        assert!(RemoteError::Timeout("t".into()).is_retryable());
        assert!(RemoteError::Unavailable("503".into()).is_retryable());
        assert!(RemoteError::RateLimited.is_retryable());
        assert!(!RemoteError::Malformed("{}".into()).is_retryable());
    }

    #[test]
    fn test_severity_and_category() {
        let err = DictionaryError::StoreUnavailable("locked".into());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.category(), ErrorCategory::Storage);

        let err = DictionaryError::MalformedSourceRecord("empty".into());
        assert_eq!(err.severity(), ErrorSeverity::Info);
        assert_eq!(err.category(), ErrorCategory::Input);
    }

    #[test]
    fn test_log_error_returns_the_error() {
        let result: DictionaryResult<u64> =
            helpers::log_error(DictionaryError::Io("disk full".into()));
        match result {
            Err(DictionaryError::Io(msg)) => assert_eq!(msg, "disk full"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
