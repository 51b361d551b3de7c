//! 词典数据模型

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DictionaryError;

/// 词条可信度标签
///
/// 变体顺序即优先级：`Common > Rare > Unverified`，派生的 `Ord` 直接用于冲突裁决。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    /// 远程查询写回或来源未经核实
    Unverified,
    Rare,
    Common,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Common => "common",
            Tag::Rare => "rare",
            Tag::Unverified => "unverified",
        }
    }

    pub fn all() -> [Tag; 3] {
        [Tag::Common, Tag::Rare, Tag::Unverified]
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tag {
    type Err = DictionaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "common" => Ok(Tag::Common),
            "rare" => Ok(Tag::Rare),
            "unverified" => Ok(Tag::Unverified),
            other => Err(DictionaryError::MalformedSourceRecord(format!(
                "未知标签 '{}'",
                other
            ))),
        }
    }
}

/// 规范词典中的一条权威记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub normalized_word: String,
    pub translation: String,
    pub tag: Tag,
    pub updated_at: DateTime<Utc>,
}

impl DictionaryEntry {
    /// 创建条目，时间戳取当前时间
    ///
    /// 调用方负责传入已规范化的单词与译文。
    pub fn new(normalized_word: String, translation: String, tag: Tag) -> Self {
        Self {
            normalized_word,
            translation,
            tag,
            updated_at: Utc::now(),
        }
    }

    /// 导出格式的一行：`word\ttranslation\ttag\ttimestamp`
    pub fn to_export_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.normalized_word,
            self.translation,
            self.tag,
            self.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }

    /// 解析导出格式的一行
    pub fn from_export_line(line: &str) -> Result<Self, DictionaryError> {
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() != 4 {
            return Err(DictionaryError::MalformedSourceRecord(format!(
                "期望4列，实际 {} 列",
                parts.len()
            )));
        }

        let updated_at = DateTime::parse_from_rfc3339(parts[3].trim())
            .map_err(|e| DictionaryError::MalformedSourceRecord(format!("时间戳无效: {}", e)))?
            .with_timezone(&Utc);

        Ok(Self {
            normalized_word: parts[0].to_string(),
            translation: parts[1].to_string(),
            tag: parts[2].parse()?,
            updated_at,
        })
    }
}

/// 构建器的原始输入记录，规范化后即丢弃
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub word: String,
    pub translation: String,
    pub source_tag: Tag,
}

impl SourceRecord {
    pub fn new(word: impl Into<String>, translation: impl Into<String>, source_tag: Tag) -> Self {
        Self {
            word: word.into(),
            translation: translation.into(),
            source_tag,
        }
    }
}

/// 某个来源在一次构建中的贡献
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub name: String,
    pub records: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub built_at: DateTime<Utc>,
}

/// 存储统计
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub entries: usize,
    pub common: usize,
    pub rare: usize,
    pub unverified: usize,
    pub generation: u64,
    pub sources: Vec<SourceSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_priority_order() {
        assert!(Tag::Common > Tag::Rare);
        assert!(Tag::Rare > Tag::Unverified);
        assert_eq!(Tag::all().iter().max(), Some(&Tag::Common));
    }

    #[test]
    fn test_tag_parsing() {
        assert_eq!("Common".parse::<Tag>().unwrap(), Tag::Common);
        assert_eq!(" rare ".parse::<Tag>().unwrap(), Tag::Rare);
        assert!("official".parse::<Tag>().is_err());
    }

    #[test]
    fn test_export_line_parses_back() {
        let entry = DictionaryEntry::new("gato".into(), "cat".into(), Tag::Common);
        let line = entry.to_export_line();
        assert!(line.starts_with("gato\tcat\tcommon\t"));

        let parsed = DictionaryEntry::from_export_line(&line).unwrap();
        assert_eq!(parsed.normalized_word, "gato");
        assert_eq!(parsed.tag, Tag::Common);
        assert_eq!(parsed.updated_at.timestamp(), entry.updated_at.timestamp());
    }

    #[test]
    fn test_export_line_rejects_wrong_columns() {
        assert!(DictionaryEntry::from_export_line("gato\tcat").is_err());
        assert!(DictionaryEntry::from_export_line("gato\tcat\tcommon\tyesterday").is_err());
    }
}
