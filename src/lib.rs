//! # Lexistream Library
//!
//! 基于规范词典的逐词渐进式翻译库。
//!
//! ## 模块组织
//!
//! - `dictionary` - 规范词典：规范化、存储、来源与离线构建
//! - `translation` - 文本切分、单词查询与渐进式翻译会话
//! - `config` - 配置文件加载与环境变量覆盖
//! - `env` - 类型安全的环境变量访问
//! - `error` - 统一错误类型

pub mod config;
pub mod dictionary;
pub mod env;
pub mod error;
pub mod translation;

// Re-export commonly used items for convenience
pub use config::{AppConfig, ConfigManager};
pub use dictionary::{
    BuildReport, ConflictPolicy, DictionaryBuilder, DictionaryEntry, DictionarySource,
    DictionaryStore, Tag,
};
pub use error::{DictionaryError, DictionaryResult, RemoteError, RemoteResult};
pub use translation::{
    segment, LookupResult, LookupService, Origin, ProgressiveTranslator, SessionEvent,
    SessionReport, SessionState,
};
