//! Разбиение текста на фразы по знакам конца предложения.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Фраза: всё до первой серии завершающих знаков включительно
    static ref PHRASE: Regex = Regex::new(r"[^.!?。！？…]+[.!?。！？…]*").unwrap();
}

/// Splits raw text into trimmed phrases in document order.
///
/// Terminal punctuation stays attached to its phrase. Text after the last
/// terminator becomes the final phrase; whitespace-only pieces are dropped.
pub fn split_phrases(text: &str) -> Vec<String> {
    PHRASE
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .filter(|phrase| !phrase.is_empty())
        .map(str::to_string)
        .collect()
}

/// Total number of characters used by the proportional estimator.
pub fn char_count(phrase: &str) -> usize {
    phrase.chars().count()
}
