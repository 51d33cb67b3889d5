//! Auxiliary whole-text transforms built on the token stream.
//!
//! Both transforms collect spans in a single pass and apply replacements
//! back-to-front so earlier offsets stay valid.

use regex::Regex;

use super::ConstructExtractor;
use crate::token::TokenKind;

impl ConstructExtractor {
    /// Replace every depth-balanced `(SELECT ...)` span with the literal
    /// `1`, flattening subqueries so downstream pattern analysis sees only
    /// the enclosing statement shape.
    pub fn redact_subqueries(&self, sql: &str) -> String {
        let tokens = self.tokenize(sql);
        let mut spans: Vec<(usize, usize)> = Vec::new();
        let mut i = 0;

        while tokens[i].kind != TokenKind::Eof {
            if tokens[i].kind == TokenKind::LParen
                && tokens[i + 1].kind == TokenKind::Keyword
                && tokens[i + 1].is_word("SELECT")
            {
                let start = tokens[i].offset;
                let mut depth = 1usize;
                let mut j = i + 1;
                while tokens[j].kind != TokenKind::Eof {
                    match tokens[j].kind {
                        TokenKind::LParen => depth += 1,
                        TokenKind::RParen => {
                            depth -= 1;
                            if depth == 0 {
                                spans.push((start, tokens[j].end()));
                                break;
                            }
                        }
                        _ => {}
                    }
                    j += 1;
                }
                // On an unbalanced span, j rests on Eof and the outer loop
                // terminates there.
                i = if tokens[j].kind == TokenKind::Eof { j } else { j + 1 };
            } else {
                i += 1;
            }
        }

        let mut result = sql.to_string();
        for (start, end) in spans.into_iter().rev() {
            result.replace_range(start..end, "1");
        }
        result
    }

    /// Remove `AS <name-or-string>` alias spans that are not nested inside
    /// an unclosed call, then tidy the whitespace the removals leave
    /// behind. Aliases inside parens (a `CAST` result type, a mid-call
    /// `AS`) are left for the CAST repair pass to judge.
    pub fn strip_aliases(&self, sql: &str) -> String {
        let tokens = self.tokenize(sql);
        let mut spans: Vec<(usize, usize)> = Vec::new();
        let mut depth = 0usize;
        let mut i = 0;

        while tokens[i].kind != TokenKind::Eof {
            match tokens[i].kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => depth = depth.saturating_sub(1),
                TokenKind::Keyword if depth == 0 && tokens[i].is_word("AS") => {
                    let next = &tokens[i + 1];
                    if matches!(next.kind, TokenKind::Identifier | TokenKind::String) {
                        spans.push((tokens[i].offset, next.end()));
                        i += 2;
                        continue;
                    }
                }
                _ => {}
            }
            i += 1;
        }

        let mut result = sql.to_string();
        for (start, end) in spans.into_iter().rev() {
            result.replace_range(start..end, "");
        }

        let squeeze = Regex::new(r"\s+").unwrap();
        let commas = Regex::new(r"\s*,\s*").unwrap();
        let result = squeeze.replace_all(&result, " ");
        commas.replace_all(&result, ", ").trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_subquery_redacted_to_one() {
        let extractor = ConstructExtractor::new();
        let sql = "SELECT a, (SELECT MAX(b) FROM u WHERE u.id = t.id) FROM t";
        assert_eq!(extractor.redact_subqueries(sql), "SELECT a, 1 FROM t");
    }

    #[test]
    fn test_nested_subquery_redacted_as_outer_span() {
        let extractor = ConstructExtractor::new();
        let sql = "WHERE x IN (SELECT id FROM (SELECT id FROM u) v)";
        assert_eq!(extractor.redact_subqueries(sql), "WHERE x IN 1");
    }

    #[test]
    fn test_plain_parens_untouched() {
        let extractor = ConstructExtractor::new();
        let sql = "WHERE (a = 1 OR b = 2)";
        assert_eq!(extractor.redact_subqueries(sql), sql);
    }

    #[test]
    fn test_aliases_removed() {
        let extractor = ConstructExtractor::new();
        let sql = "SELECT a AS col_a, b AS 'col b' FROM t";
        assert_eq!(extractor.strip_aliases(sql), "SELECT a, b FROM t");
    }

    #[test]
    fn test_cast_result_type_survives_alias_strip() {
        let extractor = ConstructExtractor::new();
        let sql = "SELECT CAST(a AS CHAR(10)) AS col_a FROM t";
        assert_eq!(
            extractor.strip_aliases(sql),
            "SELECT CAST(a AS CHAR(10)) FROM t"
        );
    }
}
