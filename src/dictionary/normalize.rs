//! 词条规范化
//!
//! 构建器、存储与查询服务共用同一套规则，保证同一个词在三处得到相同的键。

use std::sync::OnceLock;

use regex::Regex;

/// 上游词典格式常见的包裹符号（开, 闭）
const WRAPPING_PAIRS: &[(char, char)] = &[
    ('*', '*'),
    ('_', '_'),
    ('"', '"'),
    ('\'', '\''),
    ('‘', '’'),
    ('“', '”'),
    ('«', '»'),
    ('(', ')'),
    ('[', ']'),
];

/// 残留在词尾的标点
const TRAILING_ARTIFACTS: &[char] = &['.', ',', ';', ':'];

fn markup_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("静态正则表达式"))
}

fn whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("静态正则表达式"))
}

/// 规范化源语言单词
///
/// 小写、去除标记与包裹符号、合并空白。保留变音符号和词内撇号。
/// 结果为空时返回 `None`。
pub fn normalize_word(raw: &str) -> Option<String> {
    normalize_text(raw)
}

/// 规范化译文，规则与单词相同
pub fn normalize_translation(raw: &str) -> Option<String> {
    normalize_text(raw)
}

fn normalize_text(raw: &str) -> Option<String> {
    let without_markup = markup_regex().replace_all(raw, " ");
    let collapsed = whitespace_regex().replace_all(&without_markup, " ");
    let mut text = collapsed.trim().to_lowercase();

    loop {
        let stripped = strip_artifacts(&text);
        if stripped == text {
            break;
        }
        text = stripped;
    }

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// 去掉一层包裹符号和词尾残留标点
fn strip_artifacts(text: &str) -> String {
    let mut current = text.trim_end_matches(TRAILING_ARTIFACTS).trim();

    for &(open, close) in WRAPPING_PAIRS {
        if current.chars().count() >= 2 && current.starts_with(open) && current.ends_with(close) {
            current = current[open.len_utf8()..current.len() - close.len_utf8()].trim();
            break;
        }
    }

    current.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_normalization() {
        assert_eq!(normalize_word("  Gato "), Some("gato".to_string()));
        assert_eq!(normalize_word("VISITÓ"), Some("visitó".to_string()));
        assert_eq!(normalize_word("niño"), Some("niño".to_string()));
    }

    #[test]
    fn test_strips_markup_and_emphasis() {
        assert_eq!(normalize_translation("<b>cat</b>"), Some("cat".to_string()));
        assert_eq!(normalize_translation("*cat*"), Some("cat".to_string()));
        assert_eq!(normalize_translation("\"cat\""), Some("cat".to_string()));
        assert_eq!(normalize_translation("«_cat_»"), Some("cat".to_string()));
        assert_eq!(normalize_translation("cat."), Some("cat".to_string()));
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(
            normalize_translation("thank \t  you\n"),
            Some("thank you".to_string())
        );
    }

    #[test]
    fn test_keeps_internal_apostrophes() {
        assert_eq!(normalize_word("d'Artagnan"), Some("d'artagnan".to_string()));
        assert_eq!(normalize_word("'tis"), Some("'tis".to_string()));
    }

    #[test]
    fn test_empty_after_normalization() {
        assert_eq!(normalize_word(""), None);
        assert_eq!(normalize_word("   "), None);
        assert_eq!(normalize_word("<i></i>"), None);
        assert_eq!(normalize_translation("\"\""), None);
        assert_eq!(normalize_translation("..."), None);
    }
}
