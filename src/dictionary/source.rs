//! 词典来源
//!
//! 构建器只认识 `DictionarySource` 这一种接口，各种第三方格式的解析都在接口之外完成。
//! 这里只提供内存来源、本项目自己的导出文件来源和内置常用词来源。

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::dictionary::types::{DictionaryEntry, SourceRecord, Tag};
use crate::error::{DictionaryError, DictionaryResult};

/// 来源产出的单条记录，格式错误的记录以 `Err` 形式交给构建器计数
pub type RecordResult = DictionaryResult<SourceRecord>;

/// 词典来源协作者
pub trait DictionarySource {
    /// 来源名称，用于构建报告与来源统计
    fn name(&self) -> &str;

    /// 依次产出原始记录
    fn records(&self) -> Box<dyn Iterator<Item = RecordResult> + '_>;
}

/// 内存来源
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    records: Vec<RecordResult>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, records: Vec<SourceRecord>) -> Self {
        Self {
            name: name.into(),
            records: records.into_iter().map(Ok).collect(),
        }
    }

    /// 由 (单词, 译文) 对构建，统一使用同一个标签
    pub fn from_pairs(name: impl Into<String>, tag: Tag, pairs: &[(&str, &str)]) -> Self {
        let records = pairs
            .iter()
            .map(|(word, translation)| SourceRecord::new(*word, *translation, tag))
            .collect();
        Self::new(name, records)
    }

    /// 把现有词条作为来源，用于在重建时保留当前内容
    pub fn from_entries(name: impl Into<String>, entries: Vec<DictionaryEntry>) -> Self {
        let records = entries
            .into_iter()
            .map(|e| SourceRecord::new(e.normalized_word, e.translation, e.tag))
            .collect();
        Self::new(name, records)
    }

    /// 追加一条格式错误的记录
    pub fn with_malformed(mut self, reason: impl Into<String>) -> Self {
        self.records
            .push(Err(DictionaryError::MalformedSourceRecord(reason.into())));
        self
    }
}

impl DictionarySource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn records(&self) -> Box<dyn Iterator<Item = RecordResult> + '_> {
        Box::new(self.records.iter().cloned())
    }
}

/// 读取本项目导出的制表符分隔文件
///
/// 四列行 `word\ttranslation\ttag\ttimestamp` 按原标签读取；
/// 两列行 `word\ttranslation` 使用默认标签。空行与 `#` 注释行跳过。
#[derive(Debug, Clone)]
pub struct ExportFileSource {
    name: String,
    path: PathBuf,
    default_tag: Tag,
}

impl ExportFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Self {
            name,
            path,
            default_tag: Tag::Unverified,
        }
    }

    pub fn with_default_tag(mut self, tag: Tag) -> Self {
        self.default_tag = tag;
        self
    }

    fn parse_line(&self, line: &str) -> RecordResult {
        let parts: Vec<&str> = line.split('\t').collect();
        match parts.len() {
            2 => Ok(SourceRecord::new(parts[0], parts[1], self.default_tag)),
            4 => {
                let entry = DictionaryEntry::from_export_line(line)?;
                Ok(SourceRecord::new(
                    entry.normalized_word,
                    entry.translation,
                    entry.tag,
                ))
            }
            n => Err(DictionaryError::MalformedSourceRecord(format!(
                "{}: 无法识别的 {} 列记录",
                self.name, n
            ))),
        }
    }
}

impl DictionarySource for ExportFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn records(&self) -> Box<dyn Iterator<Item = RecordResult> + '_> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) => {
                let err = DictionaryError::Io(format!("{}: {}", self.path.display(), e));
                return Box::new(std::iter::once(Err(err)));
            }
        };

        let lines = BufReader::new(file).lines().filter_map(move |line| match line {
            Ok(line) => {
                let trimmed = line.trim_end_matches(['\r', '\n']);
                if trimmed.trim().is_empty() || trimmed.starts_with('#') {
                    None
                } else {
                    Some(self.parse_line(trimmed))
                }
            }
            Err(e) => Some(Err(DictionaryError::Io(e.to_string()))),
        });

        Box::new(lines)
    }
}

/// 内置常用词来源，标签为 common
pub fn common_words() -> MemorySource {
    MemorySource::from_pairs(
        "built-in",
        Tag::Common,
        &[
            ("hola", "hello"),
            ("adiós", "goodbye"),
            ("gracias", "thank you"),
            ("sí", "yes"),
            ("no", "no"),
            ("bien", "good"),
            ("mal", "bad"),
            ("casa", "house"),
            ("perro", "dog"),
            ("gato", "cat"),
            ("hombre", "man"),
            ("mujer", "woman"),
            ("niño", "boy"),
            ("niña", "girl"),
            ("amigo", "friend"),
            ("familia", "family"),
            ("comida", "food"),
            ("agua", "water"),
            ("pan", "bread"),
            ("café", "coffee"),
            ("grande", "big"),
            ("pequeño", "small"),
            ("bueno", "good"),
            ("nuevo", "new"),
            ("viejo", "old"),
            ("bonito", "pretty"),
            ("día", "day"),
            ("noche", "night"),
            ("semana", "week"),
            ("año", "year"),
            ("hoy", "today"),
            ("ayer", "yesterday"),
            ("padre", "father"),
            ("madre", "mother"),
            ("hermano", "brother"),
            ("hermana", "sister"),
            ("vida", "life"),
            ("trabajo", "work"),
            ("escuela", "school"),
            ("ciudad", "city"),
            ("país", "country"),
            ("mundo", "world"),
            ("libro", "book"),
            ("líder", "leader"),
            ("de", "of"),
            ("la", "the"),
            ("el", "the"),
            ("y", "and"),
            ("en", "in"),
            ("con", "with"),
            ("para", "for"),
            ("uno", "one"),
            ("dos", "two"),
            ("tres", "three"),
        ],
    )
}
