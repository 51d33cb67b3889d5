//! Construct extraction over the token stream.
//!
//! Pulls complete, correctly balanced function calls and `CASE...END`
//! expressions out of arbitrary SQL text without a full SQL grammar. Spans
//! are always verbatim substrings of the source; a construct is only ever
//! returned once its nesting depth returns to zero. Anything unbalanced is
//! abandoned at its start position and scanning resumes past it.

pub mod case;
pub mod cast;
pub mod transforms;

use tracing::warn;

use crate::token::{SqlTokenizer, Token, TokenKind};

/// A verbatim, balance-guaranteed span of source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConstruct {
    /// Byte offset of the first character of the span.
    pub start: usize,
    /// Byte offset one past the last character of the span.
    pub end: usize,
    /// The verbatim source text between `start` and `end`.
    pub text: String,
}

impl ParsedConstruct {
    fn from_span(source: &str, start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            text: source[start..end].to_string(),
        }
    }
}

/// Extractor for balanced function calls and `CASE` expressions.
pub struct ConstructExtractor {
    tokenizer: SqlTokenizer,
}

impl Default for ConstructExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructExtractor {
    pub fn new() -> Self {
        Self {
            tokenizer: SqlTokenizer::new(),
        }
    }

    pub(crate) fn tokenize(&self, sql: &str) -> Vec<Token> {
        self.tokenizer.tokenize(sql)
    }

    /// Extract every complete function call and `CASE` expression from
    /// `sql`, in source order.
    pub fn extract(&self, sql: &str) -> Vec<ParsedConstruct> {
        let tokens = self.tokenizer.tokenize(sql);
        let mut constructs = Vec::new();
        let mut i = 0;

        while tokens[i].kind != TokenKind::Eof {
            match tokens[i].kind {
                TokenKind::Function if tokens[i + 1].kind == TokenKind::LParen => {
                    // TRIM spans are extracted verbatim like any other call,
                    // which is what preserves its LEADING/TRAILING/BOTH ...
                    // FROM sub-syntax unmodified.
                    if let Some((construct, next)) = self.function_span(sql, &tokens, i) {
                        constructs.push(construct);
                        i = next;
                    } else {
                        warn!(offset = tokens[i].offset, name = %tokens[i].text,
                              "abandoning unbalanced function call");
                        i += 1;
                    }
                }
                TokenKind::Keyword if tokens[i].is_word("CASE") => {
                    if let Some(construct) = case::case_construct(sql, tokens[i].offset) {
                        let end = construct.end;
                        constructs.push(construct);
                        // Resume at the first token past the construct.
                        while tokens[i].kind != TokenKind::Eof && tokens[i].offset < end {
                            i += 1;
                        }
                    } else {
                        warn!(offset = tokens[i].offset, "abandoning unbalanced CASE");
                        i += 1;
                    }
                }
                _ => i += 1,
            }
        }

        constructs
    }

    /// Match a function call starting at token `i` by tracking paren depth
    /// until it returns to zero. Returns the construct and the index of the
    /// first token after it, or `None` when the input ends first.
    fn function_span(
        &self,
        sql: &str,
        tokens: &[Token],
        i: usize,
    ) -> Option<(ParsedConstruct, usize)> {
        let start = tokens[i].offset;
        let mut depth = 0usize;
        let mut j = i + 1;

        while tokens[j].kind != TokenKind::Eof {
            match tokens[j].kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        let end = tokens[j].end();
                        return Some((ParsedConstruct::from_span(sql, start, end), j + 1));
                    }
                }
                _ => {}
            }
            j += 1;
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn texts(sql: &str) -> Vec<String> {
        ConstructExtractor::new()
            .extract(sql)
            .into_iter()
            .map(|c| c.text)
            .collect()
    }

    #[test]
    fn test_simple_function_span() {
        assert_eq!(texts("SELECT COUNT(*) FROM t"), vec!["COUNT(*)"]);
    }

    #[test]
    fn test_nested_function_is_one_span() {
        let sql = "SELECT IFNULL(MAX(LENGTH(name)), 0) FROM t";
        assert_eq!(texts(sql), vec!["IFNULL(MAX(LENGTH(name)), 0)"]);
    }

    #[test]
    fn test_function_without_paren_is_skipped() {
        // "YEAR" used as a bare column name is not a call.
        assert_eq!(texts("SELECT YEAR FROM t"), Vec::<String>::new());
    }

    #[test]
    fn test_trim_from_syntax_preserved() {
        let sql = "SELECT TRIM(LEADING '0' FROM acct_no) FROM t";
        assert_eq!(texts(sql), vec!["TRIM(LEADING '0' FROM acct_no)"]);
    }

    #[test]
    fn test_unbalanced_call_abandoned() {
        // Missing close paren: nothing is returned, nothing panics.
        assert_eq!(texts("SELECT SUM(a + b FROM t"), Vec::<String>::new());
    }

    #[test]
    fn test_balance_invariant() {
        let sql =
            "SELECT CONCAT(a, IFNULL(b, '(n/a)')), REPLACE(c, 'it''s', '') FROM t WHERE COUNT(*) > 0";
        let constructs = ConstructExtractor::new().extract(sql);
        assert!(!constructs.is_empty());
        for construct in constructs {
            let opens = construct.text.matches('(').count();
            let closes = construct.text.matches(')').count();
            assert_eq!(opens, closes, "unbalanced parens: {}", construct.text);
            // A doubled '' escape contributes two quote characters, so
            // every balanced span holds an even quote count.
            let quotes = construct.text.matches('\'').count();
            assert_eq!(quotes % 2, 0, "odd quote count: {}", construct.text);
        }
    }

    #[test]
    fn test_case_and_function_in_source_order() {
        let sql = "SELECT UPPER(a), CASE WHEN b = 1 THEN 'x' END FROM t";
        let found = texts(sql);
        assert_eq!(found[0], "UPPER(a)");
        assert_eq!(found[1], "CASE WHEN b = 1 THEN 'x' END");
    }

    #[test]
    fn test_parens_inside_string_do_not_unbalance() {
        let sql = "SELECT REPLACE(col, '(', '') FROM t";
        assert_eq!(texts(sql), vec!["REPLACE(col, '(', '')"]);
    }
}
