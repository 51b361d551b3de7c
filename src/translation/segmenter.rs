//! 文本切分
//!
//! 把原始文本切成有序的句子单元，每个句子再切成单词和标点。纯函数，无副作用。

use std::sync::OnceLock;

use regex::Regex;

/// 词元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Word,
    Punct,
}

/// 句子中的一个词元
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenSpan {
    pub text: String,
    pub kind: TokenKind,
}

impl TokenSpan {
    pub fn is_word(&self) -> bool {
        self.kind == TokenKind::Word
    }
}

/// 一个句子
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SentenceUnit {
    tokens: Vec<TokenSpan>,
}

impl SentenceUnit {
    pub fn tokens(&self) -> &[TokenSpan] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.tokens.iter().filter(|t| t.is_word()).count()
    }

    /// 词元以单个空格连接
    pub fn joined(&self) -> String {
        self.tokens
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// 单词：字母与组合附加符号的连续串，字母之间允许撇号；其余非空白字符各自成为标点
fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?P<word>[\p{L}\p{M}]+(?:['’][\p{L}\p{M}]+)*)|(?P<punct>\S)")
            .expect("静态正则表达式")
    })
}

const SENTENCE_ENDINGS: &[char] = &['.', '!', '?'];
const OPENING_PUNCTUATION: &[char] = &['¿', '¡', '"', '\'', '(', '[', '«', '“'];

/// 切分文本
///
/// 句子边界：句末标点串后接空白且下一个字符是大写字母或开引号类标点，或者一个及以上的换行。
/// 去除首尾空白后为空的句子被丢弃。同样的输入总是得到同样的结构。
pub fn segment(raw_text: &str) -> Vec<SentenceUnit> {
    split_sentences(raw_text)
        .into_iter()
        .filter_map(|sentence| {
            let tokens = tokenize(sentence);
            (!tokens.is_empty()).then_some(SentenceUnit { tokens })
        })
        .collect()
}

/// 切分单个句子的词元
pub fn tokenize(sentence: &str) -> Vec<TokenSpan> {
    token_regex()
        .captures_iter(sentence)
        .filter_map(|caps| {
            if let Some(word) = caps.name("word") {
                Some(TokenSpan {
                    text: word.as_str().to_string(),
                    kind: TokenKind::Word,
                })
            } else {
                caps.name("punct").map(|punct| TokenSpan {
                    text: punct.as_str().to_string(),
                    kind: TokenKind::Punct,
                })
            }
        })
        .collect()
}

fn split_sentences(text: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];

        if c == '\n' {
            push_trimmed(&mut sentences, &text[start..offset]);
            while i < chars.len() && chars[i].1 == '\n' {
                i += 1;
            }
            start = chars.get(i).map(|(o, _)| *o).unwrap_or(text.len());
            continue;
        }

        if SENTENCE_ENDINGS.contains(&c) {
            let mut end = i;
            while end < chars.len() && SENTENCE_ENDINGS.contains(&chars[end].1) {
                end += 1;
            }

            let mut next = end;
            while next < chars.len() && chars[next].1.is_whitespace() && chars[next].1 != '\n' {
                next += 1;
            }

            let has_space = next > end;
            let opens_sentence = chars
                .get(next)
                .map(|(_, n)| n.is_uppercase() || OPENING_PUNCTUATION.contains(n))
                .unwrap_or(false);

            if has_space && opens_sentence {
                let end_offset = chars[end].0;
                push_trimmed(&mut sentences, &text[start..end_offset]);
                start = chars[next].0;
                i = next;
                continue;
            }

            i = end;
            continue;
        }

        i += 1;
    }

    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn push_trimmed<'a>(sentences: &mut Vec<&'a str>, piece: &'a str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        sentences.push(piece);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(unit: &SentenceUnit) -> Vec<&str> {
        unit.tokens().iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_splits_on_sentence_end_before_capital() {
        let units = segment("Papa Francis visitó Roma. Fue bonito!");
        assert_eq!(units.len(), 2);
        assert_eq!(texts(&units[0]), vec!["Papa", "Francis", "visitó", "Roma", "."]);
        assert_eq!(texts(&units[1]), vec!["Fue", "bonito", "!"]);
    }

    #[test]
    fn test_no_split_before_lowercase() {
        let units = segment("Son las 3 p.m. en punto.");
        assert_eq!(units.len(), 1);
    }

    #[test]
    fn test_opening_punctuation_starts_sentence() {
        let units = segment("Hola. ¿Qué tal? «Bien», dijo.");
        assert_eq!(units.len(), 3);
        assert_eq!(texts(&units[1]), vec!["¿", "Qué", "tal", "?"]);
        assert_eq!(units[2].tokens()[0].text, "«");
    }

    #[test]
    fn test_newlines_are_boundaries() {
        let units = segment("primera línea\n\n\nsegunda línea\ntercera");
        assert_eq!(units.len(), 3);
        assert_eq!(units[2].joined(), "tercera");
    }

    #[test]
    fn test_ellipsis_and_repeated_marks_stay_together() {
        let units = segment("¡¿Qué?! Nada...");
        assert_eq!(units.len(), 2);
        assert_eq!(texts(&units[0]), vec!["¡", "¿", "Qué", "?", "!"]);
        assert_eq!(texts(&units[1]), vec!["Nada", ".", ".", "."]);
    }

    #[test]
    fn test_word_rules() {
        let tokens = tokenize("d'Artagnan l’eau niño 'tis x2");
        let words: Vec<(&str, TokenKind)> =
            tokens.iter().map(|t| (t.text.as_str(), t.kind)).collect();
        assert_eq!(
            words,
            vec![
                ("d'Artagnan", TokenKind::Word),
                ("l’eau", TokenKind::Word),
                ("niño", TokenKind::Word),
                ("'", TokenKind::Punct),
                ("tis", TokenKind::Word),
                ("x", TokenKind::Word),
                ("2", TokenKind::Punct),
            ]
        );
    }

    #[test]
    fn test_combining_marks_stay_in_word() {
        let decomposed = "nin\u{0303}o";
        let tokens = tokenize(decomposed);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, decomposed);
    }

    #[test]
    fn test_blank_input() {
        assert!(segment("").is_empty());
        assert!(segment(" \n\n \t").is_empty());
    }
}
