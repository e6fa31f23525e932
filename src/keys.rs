//! Reversible escaping of subject ids and coordinate keys.
//!
//! Stored keys may not contain `. $ # [ ] /`. Each of those, and the escape
//! character `@` itself, is replaced by a two-character `@x` sequence.

use thiserror::Error;

const ESCAPE: char = '@';

/// (raw, code) pairs. The escape character maps to itself.
const TABLE: [(char, char); 7] = [
    ('@', '@'),
    ('.', 'd'),
    ('$', 's'),
    ('#', 'h'),
    ('[', 'l'),
    (']', 'r'),
    ('/', 'f'),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("Dangling escape character at end of key {0:?}")]
    Dangling(String),
    #[error("Unknown escape sequence @{code} in key {key:?}")]
    UnknownSequence { key: String, code: char },
}

/// Escape `raw` so it is safe to use as a storage key.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match TABLE.iter().find(|(r, _)| *r == c) {
            Some((_, code)) => {
                out.push(ESCAPE);
                out.push(*code);
            }
            None => out.push(c),
        }
    }
    out
}

/// Reverse [`escape`].
pub fn unescape(key: &str) -> Result<String, KeyError> {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars();
    while let Some(c) = chars.next() {
        if c != ESCAPE {
            out.push(c);
            continue;
        }
        let code = chars
            .next()
            .ok_or_else(|| KeyError::Dangling(key.to_string()))?;
        let (raw, _) = TABLE
            .iter()
            .find(|(_, k)| *k == code)
            .ok_or_else(|| KeyError::UnknownSequence {
                key: key.to_string(),
                code,
            })?;
        out.push(*raw);
    }
    Ok(out)
}
