//! Sentence segmentation
//!
//! Unicode (UAX #29) sentence boundaries, repaired where a boundary was
//! placed right after a known abbreviation or an initial ("Mr. Smith",
//! "J. Doe"). Abbreviations that are also ordinary words only hold a
//! boundary open in the context they are used in: capitalized titles
//! ("Gen. Smith", "St. Louis") and numeric references ("No. 5", "Jan. 5").

use std::collections::HashSet;

use kgx_core::SentenceSplitter;
use unicode_segmentation::UnicodeSegmentation;

/// Never end a sentence
const DEFAULT_ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "mt", "capt", "lt", "sgt", "hon", "vs", "e.g",
    "i.e", "u.s", "u.k",
];

/// Titles; abbreviations only when written capitalized
const TITLE_ABBREVIATIONS: &[&str] = &["st", "gen", "gov", "sen", "rep", "col", "rev"];

/// Abbreviations only when a number follows
const NUMERIC_ABBREVIATIONS: &[&str] = &[
    "no", "fig", "vol", "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep", "sept", "oct",
    "nov", "dec",
];

fn word_set(words: &[&str]) -> HashSet<String> {
    words.iter().map(|s| s.to_string()).collect()
}

/// Rule-based sentence splitter
#[derive(Debug, Clone)]
pub struct RuleBasedSplitter {
    abbreviations: HashSet<String>,
    titles: HashSet<String>,
    numeric: HashSet<String>,
}

impl RuleBasedSplitter {
    /// Create a splitter with the default English abbreviation lists
    pub fn new() -> Self {
        Self {
            abbreviations: word_set(DEFAULT_ABBREVIATIONS),
            titles: word_set(TITLE_ABBREVIATIONS),
            numeric: word_set(NUMERIC_ABBREVIATIONS),
        }
    }

    /// Add unconditional abbreviations (without the final period,
    /// case-insensitive)
    pub fn with_abbreviations<I, S>(mut self, abbreviations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.abbreviations
            .extend(abbreviations.into_iter().map(|a| a.as_ref().to_lowercase()));
        self
    }

    /// Whether `chunk` ends with an abbreviation rather than a sentence,
    /// given the text that follows it
    fn ends_with_abbreviation(&self, chunk: &str, next: Option<&str>) -> bool {
        let Some(last_word) = chunk.split_whitespace().last() else {
            return false;
        };
        let Some(stem) = last_word.strip_suffix('.') else {
            return false;
        };
        let stem = stem.trim_start_matches(|c: char| !c.is_alphanumeric());

        let mut chars = stem.chars();
        let first = chars.next();
        if matches!((first, chars.next()), (Some(c), None) if c.is_uppercase()) {
            return true;
        }

        let lower = stem.to_lowercase();
        if self.abbreviations.contains(&lower) {
            return true;
        }
        if self.titles.contains(&lower) {
            return first.is_some_and(char::is_uppercase);
        }
        if self.numeric.contains(&lower) {
            return next
                .and_then(|n| n.trim_start().chars().next())
                .is_some_and(|c| c.is_ascii_digit());
        }
        false
    }
}

impl Default for RuleBasedSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl SentenceSplitter for RuleBasedSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut current = String::new();
        let mut chunks = text.split_sentence_bounds().peekable();

        while let Some(chunk) = chunks.next() {
            current.push_str(chunk);
            if !self.ends_with_abbreviation(current.trim_end(), chunks.peek().copied()) {
                let sentence = current.trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                current.clear();
            }
        }

        let rest = current.trim();
        if !rest.is_empty() {
            sentences.push(rest.to_string());
        }

        sentences
    }
}
