//! 文本切分集成测试

use lexistream::translation::{segment, tokenize, TokenKind};

const SAMPLES: &[&str] = &[
    "Papa Francis visitó Roma. Fue bonito!",
    "¿Dónde está la biblioteca? Está cerca.\nGracias, señor.",
    "El niño dijo: «¡Mañana iremos al mar!» Y se fue...",
    "l'home d'aquí   va\tvenir (ahir) [sí]",
    "",
];

#[test]
fn test_segmentation_is_deterministic() {
    for text in SAMPLES {
        assert_eq!(segment(text), segment(text), "{:?}", text);
    }
}

#[test]
fn test_joined_tokens_preserve_sequence() {
    for text in SAMPLES {
        let from_units: Vec<String> = segment(text)
            .iter()
            .flat_map(|unit| unit.tokens().iter().map(|t| t.text.clone()))
            .collect();
        let from_text: Vec<String> = tokenize(text).into_iter().map(|t| t.text).collect();
        assert_eq!(from_units, from_text, "{:?}", text);

        for unit in segment(text) {
            let rejoined: Vec<String> = unit.joined().split(' ').map(str::to_string).collect();
            let texts: Vec<String> = unit.tokens().iter().map(|t| t.text.clone()).collect();
            assert_eq!(rejoined, texts);
        }
    }
}

#[test]
fn test_mixed_sentence_structure() {
    let units = segment("¿Dónde está la biblioteca? Está cerca.\nGracias, señor.");

    let joined: Vec<String> = units.iter().map(|u| u.joined()).collect();
    assert_eq!(
        joined,
        vec![
            "¿ Dónde está la biblioteca ?",
            "Está cerca .",
            "Gracias , señor .",
        ]
    );
    assert_eq!(units[0].word_count(), 4);
}

#[test]
fn test_every_non_space_char_is_kept() {
    let text = "El niño dijo: «¡Mañana iremos al mar!» Y se fue...";
    let kept: String = segment(text)
        .iter()
        .flat_map(|unit| unit.tokens().iter().map(|t| t.text.clone()))
        .collect();
    let expected: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    assert_eq!(kept, expected);

    let punct = segment(text)
        .iter()
        .flat_map(|unit| unit.tokens().to_vec())
        .filter(|t| t.kind == TokenKind::Punct)
        .count();
    assert_eq!(punct, 8);
}
