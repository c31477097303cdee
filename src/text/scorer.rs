//! # Dictation scoring
//!
//! Compares a learner's typed answer with the reference phrase.
//!
//! Words are aligned by position: word `i` of the answer is compared with
//! word `i` of the reference. Reference phrases are one sentence long and
//! learners mostly mistype words rather than drop them, so positional
//! alignment is enough here.
//!
//! ```rust
//! use phrase_practice::text::scorer::TextScorer;
//!
//! let scorer = TextScorer::default();
//! let result = scorer.score("the quick brown fx", "The quick brown fox");
//! assert_eq!(result.score, 88);
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strsim::levenshtein;

use crate::config::ScoringConfig;

lazy_static! {
    static ref PUNCTUATION: Regex =
        Regex::new(r#"[.,!?;:"'“”‘’«»()\[\]{}¡¿…–—-]"#).unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Classification of one aligned word position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Match,
    Close,
    Wrong,
    Extra,
    Missing,
}

/// One aligned position of the answer against the reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffToken {
    pub kind: DiffKind,
    pub user_word: Option<String>,
    pub reference_word: Option<String>,
}

/// Result of scoring one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    /// 0..=100
    pub score: u32,
    pub is_exact_match: bool,
    pub diff: Vec<DiffToken>,
}

impl ScoreResult {
    /// Result recorded when the learner skips a phrase: every reference word missing.
    pub fn skipped(reference: &str) -> Self {
        let diff = tokenize(&normalize(reference))
            .into_iter()
            .map(|word| DiffToken {
                kind: DiffKind::Missing,
                user_word: None,
                reference_word: Some(word.to_string()),
            })
            .collect();

        Self {
            score: 0,
            is_exact_match: false,
            diff,
        }
    }
}

/// Lowercases, strips punctuation and collapses whitespace.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lowered, "");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

fn tokenize(normalized: &str) -> Vec<&str> {
    normalized.split(' ').filter(|w| !w.is_empty()).collect()
}

/// Scores answers using positional word alignment with typo tolerance.
#[derive(Debug, Clone, Default)]
pub struct TextScorer {
    config: ScoringConfig,
}

impl TextScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, answer: &str, reference: &str) -> ScoreResult {
        let user = normalize(answer);
        let expected = normalize(reference);
        let reference_words = tokenize(&expected);

        if user == expected {
            let diff = reference_words
                .iter()
                .map(|word| DiffToken {
                    kind: DiffKind::Match,
                    user_word: Some(word.to_string()),
                    reference_word: Some(word.to_string()),
                })
                .collect();
            return ScoreResult {
                score: 100,
                is_exact_match: true,
                diff,
            };
        }

        // Эталон из одной пунктуации, а ответ не пустой
        if reference_words.is_empty() {
            return ScoreResult {
                score: 0,
                is_exact_match: false,
                diff: Vec::new(),
            };
        }

        let user_words = tokenize(&user);
        let positions = user_words.len().max(reference_words.len());
        let mut diff = Vec::with_capacity(positions);
        let mut credit = 0.0;

        for i in 0..positions {
            let token = match (user_words.get(i), reference_words.get(i)) {
                (Some(&got), Some(&want)) => {
                    let kind = if got == want {
                        credit += 1.0;
                        DiffKind::Match
                    } else if levenshtein(got, want) <= self.config.close_max_distance {
                        credit += self.config.close_credit;
                        DiffKind::Close
                    } else {
                        DiffKind::Wrong
                    };
                    DiffToken {
                        kind,
                        user_word: Some(got.to_string()),
                        reference_word: Some(want.to_string()),
                    }
                }
                (Some(&got), None) => DiffToken {
                    kind: DiffKind::Extra,
                    user_word: Some(got.to_string()),
                    reference_word: None,
                },
                (None, Some(&want)) => DiffToken {
                    kind: DiffKind::Missing,
                    user_word: None,
                    reference_word: Some(want.to_string()),
                },
                (None, None) => unreachable!("position beyond both word lists"),
            };
            diff.push(token);
        }

        let score = (100.0 * credit / reference_words.len() as f64).round().min(100.0) as u32;

        ScoreResult {
            score,
            is_exact_match: false,
            diff,
        }
    }
}
