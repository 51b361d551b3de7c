//! 词典构建器
//!
//! 离线合并多个来源：规范化、去重、按冲突策略裁决，最后整体发布为存储的新一代。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BuilderConfig;
use crate::dictionary::normalize::{normalize_translation, normalize_word};
use crate::dictionary::source::{common_words, DictionarySource, MemorySource};
use crate::dictionary::store::DictionaryStore;
use crate::dictionary::types::{DictionaryEntry, SourceSummary, Tag};
use crate::error::{helpers, DictionaryError, DictionaryResult};

/// 同一规范化单词出现多次时的裁决策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// 标签高者胜出，标签相同时后出现的记录胜出
    #[default]
    TagThenLatest,
    KeepFirst,
    KeepLast,
    /// 标签高者胜出，标签相同时保留先出现的记录
    PreferTag,
}

impl ConflictPolicy {
    /// 新记录是否替换已有记录
    fn replaces(&self, existing: Tag, incoming: Tag) -> bool {
        match self {
            ConflictPolicy::TagThenLatest => incoming >= existing,
            ConflictPolicy::KeepFirst => false,
            ConflictPolicy::KeepLast => true,
            ConflictPolicy::PreferTag => incoming > existing,
        }
    }
}

impl std::str::FromStr for ConflictPolicy {
    type Err = crate::error::DictionaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "tag_then_latest" => Ok(ConflictPolicy::TagThenLatest),
            "keep_first" => Ok(ConflictPolicy::KeepFirst),
            "keep_last" => Ok(ConflictPolicy::KeepLast),
            "prefer_tag" => Ok(ConflictPolicy::PreferTag),
            other => Err(helpers::config_error(format!(
                "未知冲突策略 '{}'",
                other
            ))),
        }
    }
}

/// 构建报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub total_source_records: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub conflicts_resolved: usize,
    /// 发布到存储的不同单词数
    pub published: usize,
    pub generation: u64,
    pub sources: Vec<SourceSummary>,
}

/// 词典构建器
pub struct DictionaryBuilder {
    store: Arc<DictionaryStore>,
    config: BuilderConfig,
}

impl DictionaryBuilder {
    pub fn new(store: Arc<DictionaryStore>, config: BuilderConfig) -> Self {
        Self { store, config }
    }

    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// 合并所有来源并原子发布
    ///
    /// 来源顺序即优先顺序：启用时当前存储排在最前，内置常用词其次，然后是调用方给出的来源。
    /// 格式错误的单条记录只计入 `rejected`；来源无法读取或存储出错会中止构建，
    /// 已发布的数据保持不变。没有任何来源时拒绝发布。
    pub fn build(&self, sources: &[&dyn DictionarySource]) -> DictionaryResult<BuildReport> {
        let mut prelude: Vec<MemorySource> = Vec::new();
        if self.config.include_live_entries {
            prelude.push(MemorySource::from_entries("live", self.store.export_all()?));
        }
        if self.config.seed_common_words {
            prelude.push(common_words());
        }

        let ordered: Vec<&dyn DictionarySource> = prelude
            .iter()
            .map(|s| s as &dyn DictionarySource)
            .chain(sources.iter().copied())
            .collect();

        if ordered.is_empty() {
            return Err(helpers::config_error("没有可用的词典来源，拒绝发布空词典"));
        }

        tracing::info!(
            "开始构建词典: {} 个来源, 策略 {:?}",
            ordered.len(),
            self.config.policy
        );

        let started_at = Utc::now();
        let mut staging: BTreeMap<String, DictionaryEntry> = BTreeMap::new();
        let mut report = BuildReport::default();

        for source in ordered {
            let summary = self.merge_source(source, &mut staging, &mut report, started_at)?;
            tracing::info!(
                "来源 '{}': {} 条记录, 接受 {}, 拒绝 {}",
                summary.name,
                summary.records,
                summary.accepted,
                summary.rejected
            );
            report.sources.push(summary);
        }

        let entries: Vec<DictionaryEntry> = staging.into_values().collect();
        report.published = entries.len();
        report.generation = self.store.publish(&entries, &report.sources)?;

        tracing::info!(
            "词典构建完成: 共 {} 条记录, 接受 {}, 拒绝 {}, 冲突 {}, 发布 {}",
            report.total_source_records,
            report.accepted,
            report.rejected,
            report.conflicts_resolved,
            report.published
        );

        Ok(report)
    }

    fn merge_source(
        &self,
        source: &dyn DictionarySource,
        staging: &mut BTreeMap<String, DictionaryEntry>,
        report: &mut BuildReport,
        built_at: DateTime<Utc>,
    ) -> DictionaryResult<SourceSummary> {
        let mut summary = SourceSummary {
            name: source.name().to_string(),
            records: 0,
            accepted: 0,
            rejected: 0,
            built_at,
        };

        for record in source.records() {
            summary.records += 1;
            report.total_source_records += 1;

            let record = match record {
                Ok(record) => record,
                Err(DictionaryError::MalformedSourceRecord(reason)) => {
                    tracing::debug!("跳过来源 '{}' 的记录: {}", summary.name, reason);
                    summary.rejected += 1;
                    report.rejected += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!("读取来源 '{}' 失败，中止构建: {}", summary.name, e);
                    return Err(e);
                }
            };

            let (Some(word), Some(translation)) = (
                normalize_word(&record.word),
                normalize_translation(&record.translation),
            ) else {
                tracing::debug!(
                    "跳过规范化后为空的记录: '{}' -> '{}'",
                    record.word,
                    record.translation
                );
                summary.rejected += 1;
                report.rejected += 1;
                continue;
            };

            summary.accepted += 1;
            report.accepted += 1;

            let incoming = DictionaryEntry {
                normalized_word: word,
                translation,
                tag: record.source_tag,
                updated_at: built_at,
            };

            match staging.get_mut(&incoming.normalized_word) {
                Some(existing) => {
                    report.conflicts_resolved += 1;
                    if self.config.policy.replaces(existing.tag, incoming.tag) {
                        tracing::debug!(
                            "冲突 '{}': '{}' ({}) 替换 '{}' ({})",
                            incoming.normalized_word,
                            incoming.translation,
                            incoming.tag,
                            existing.translation,
                            existing.tag
                        );
                        *existing = incoming;
                    }
                }
                None => {
                    staging.insert(incoming.normalized_word.clone(), incoming);
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_decisions() {
        use ConflictPolicy::*;

        assert!(TagThenLatest.replaces(Tag::Rare, Tag::Common));
        assert!(TagThenLatest.replaces(Tag::Rare, Tag::Rare));
        assert!(!TagThenLatest.replaces(Tag::Common, Tag::Unverified));

        assert!(PreferTag.replaces(Tag::Unverified, Tag::Rare));
        assert!(!PreferTag.replaces(Tag::Rare, Tag::Rare));

        assert!(!KeepFirst.replaces(Tag::Unverified, Tag::Common));
        assert!(KeepLast.replaces(Tag::Common, Tag::Unverified));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("keep-first".parse::<ConflictPolicy>().unwrap(), ConflictPolicy::KeepFirst);
        assert_eq!("PREFER_TAG".parse::<ConflictPolicy>().unwrap(), ConflictPolicy::PreferTag);
        assert!("newest".parse::<ConflictPolicy>().is_err());
    }
}
