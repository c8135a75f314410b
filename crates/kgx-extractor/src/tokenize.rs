//! Whitespace-preserving tokenizer
//!
//! Splits text into word and punctuation tokens, each carrying the
//! whitespace that follows it, so that concatenating the tokens'
//! `text_with_ws` reproduces the input exactly.

use kgx_core::Token;
use once_cell::sync::Lazy;
use regex::Regex;

// Words (with inner apostrophes, e.g. "John's") or single non-space symbols
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\w+(?:['’]\w+)*|[^\w\s]").expect("token pattern is valid")
});

/// Tokenize `text`.
///
/// Leading whitespace, if any, is kept on an empty first token.
pub fn tokenize(text: &str) -> Vec<Token> {
    let matches: Vec<_> = TOKEN_RE.find_iter(text).collect();
    let mut tokens = Vec::with_capacity(matches.len() + 1);

    let first_start = matches.first().map_or(text.len(), |m| m.start());
    if first_start > 0 {
        tokens.push(Token::new(0, "", &text[..first_start]));
    }

    for (i, mat) in matches.iter().enumerate() {
        let ws_end = matches.get(i + 1).map_or(text.len(), |next| next.start());
        tokens.push(Token::new(
            tokens.len(),
            mat.as_str(),
            &text[mat.end()..ws_end],
        ));
    }

    tokens
}
