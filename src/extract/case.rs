//! Balanced `CASE...END` extraction.
//!
//! A character-level scan rather than a token walk: quote state is tracked
//! so keywords inside string literals are ignored, paren depth is tracked so
//! keywords inside call arguments are ignored, and `CASE`/`END` only count
//! on exact word boundaries — an identifier like `FARE_SEASN_END_DATE` must
//! never terminate the construct early.

use regex::Regex;

use super::ParsedConstruct;

/// Quote state of the scan cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    Normal,
    InSingleQuote,
    InDoubleQuote,
}

/// True when the bytes around `[pos, pos + len)` form an exact word
/// boundary: edge of input, or a character that is not alphanumeric and
/// not an underscore.
fn word_at(bytes: &[u8], pos: usize, word: &[u8]) -> bool {
    if pos + word.len() > bytes.len() {
        return false;
    }
    if !bytes[pos..pos + word.len()].eq_ignore_ascii_case(word) {
        return false;
    }
    let before_ok = pos == 0 || {
        let b = bytes[pos - 1];
        !(b.is_ascii_alphanumeric() || b == b'_')
    };
    let after_ok = pos + word.len() >= bytes.len() || {
        let b = bytes[pos + word.len()];
        !(b.is_ascii_alphanumeric() || b == b'_')
    };
    before_ok && after_ok
}

/// Extract the balanced `CASE...END` construct beginning at `start`,
/// absorbing a trailing `AS <alias>` when present.
///
/// Returns `None` when `start` does not sit on a `CASE` keyword or the
/// input ends before the depth counter returns to zero — the caller treats
/// that as "not found" and resumes scanning past the start position.
pub fn case_construct(text: &str, start: usize) -> Option<ParsedConstruct> {
    let bytes = text.as_bytes();
    if !word_at(bytes, start, b"CASE") {
        return None;
    }

    let mut depth = 1usize;
    let mut parens = 0i32;
    let mut quotes = QuoteState::Normal;
    let mut pos = start + 4;

    while pos < bytes.len() {
        let b = bytes[pos];

        match quotes {
            QuoteState::InSingleQuote => {
                if b == b'\'' {
                    // Doubled quote is an escape, not a terminator.
                    if pos + 1 < bytes.len() && bytes[pos + 1] == b'\'' {
                        pos += 2;
                        continue;
                    }
                    quotes = QuoteState::Normal;
                }
                pos += 1;
                continue;
            }
            QuoteState::InDoubleQuote => {
                if b == b'"' {
                    if pos + 1 < bytes.len() && bytes[pos + 1] == b'"' {
                        pos += 2;
                        continue;
                    }
                    quotes = QuoteState::Normal;
                }
                pos += 1;
                continue;
            }
            QuoteState::Normal => {}
        }

        match b {
            b'\'' => {
                quotes = QuoteState::InSingleQuote;
                pos += 1;
                continue;
            }
            b'"' => {
                quotes = QuoteState::InDoubleQuote;
                pos += 1;
                continue;
            }
            b'(' => parens += 1,
            b')' => parens -= 1,
            _ => {}
        }

        if parens == 0 {
            if word_at(bytes, pos, b"CASE") {
                depth += 1;
                pos += 4;
                continue;
            }
            if word_at(bytes, pos, b"END") {
                depth -= 1;
                if depth == 0 {
                    let end = absorb_alias(text, pos + 3);
                    return Some(ParsedConstruct::from_span(text, start, end));
                }
                pos += 3;
                continue;
            }
        }

        pos += 1;
    }

    None
}

/// Extend `end` past a trailing `AS <alias>` when one follows immediately.
fn absorb_alias(text: &str, end: usize) -> usize {
    let alias = Regex::new(r"^\s*(?i:AS)\s+(?:[A-Za-z_][A-Za-z0-9_]*|'(?:[^']|'')*')").unwrap();
    match alias.find(&text[end..]) {
        Some(m) => end + m.end(),
        None => end,
    }
}
