//! 翻译模块
//!
//! 基于规范词典的逐词渐进式翻译：
//! - **segmenter**: 原文切分为句子与词元
//! - **lookup**: 单词查询服务（存储命中、远程回退、写回、请求合并）
//! - **remote**: 在线翻译服务与限速器
//! - **session**: 渐进式翻译会话
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lexistream::config::{LookupConfig, SessionConfig};
//! use lexistream::dictionary::DictionaryStore;
//! use lexistream::translation::{LookupService, ProgressiveTranslator, SessionEvent};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(DictionaryStore::open("dictionary.redb")?);
//! let lookup = LookupService::from_config(store, LookupConfig::default())?;
//! let translator = ProgressiveTranslator::new(lookup, SessionConfig::default());
//!
//! let (handle, mut events) = translator.start("Papa Francis visitó Roma.");
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::TokenResolved { text, .. } = event {
//!         println!("{}", text);
//!     }
//! }
//! let report = handle.join().await;
//! println!("{}", report.lines.join("\n"));
//! # Ok(())
//! # }
//! ```

// ============================================================================
// 子模块声明
// ============================================================================

/// 单词查询服务
pub mod lookup;

/// 在线翻译服务
pub mod remote;

/// 文本切分
pub mod segmenter;

/// 渐进式翻译会话
pub mod session;

// ============================================================================
// 公共接口导出
// ============================================================================

pub use lookup::{LookupResult, LookupService, LookupStats, LookupStatsSnapshot, Origin};
pub use remote::{
    DeepLTranslator, FallbackChain, LibreTranslateTranslator, LingvaTranslator,
    MyMemoryTranslator, RateLimiter, RemoteTranslator, SimplyTranslateTranslator,
};
pub use segmenter::{segment, tokenize, SentenceUnit, TokenKind, TokenSpan};
pub use session::{
    ProgressiveTranslator, SessionEvent, SessionHandle, SessionReport, SessionState,
    TokenStatus, TokenTranslation, TranslationUnit,
};
