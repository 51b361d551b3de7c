//! 规范词典
//!
//! 规范化规则、数据模型、存储、来源与离线构建器。

pub mod builder;
pub mod normalize;
pub mod source;
pub mod store;
pub mod types;

pub use builder::{BuildReport, ConflictPolicy, DictionaryBuilder};
pub use normalize::{normalize_translation, normalize_word};
pub use source::{common_words, DictionarySource, ExportFileSource, MemorySource, RecordResult};
pub use store::{DictionaryStore, UpsertMode};
pub use types::{DictionaryEntry, SourceRecord, SourceSummary, StoreStats, Tag};
