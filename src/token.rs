//! Lexical scanner for raw SQL text.
//!
//! A single left-to-right pass over an ordered table of patterns, first
//! match wins. The scanner is deliberately permissive: it never errors,
//! unrecognized characters are skipped, and comments/whitespace are
//! consumed but dropped from the output. It exists to feed the construct
//! extractor, not to validate SQL.

use regex::Regex;

/// Kind of a scanned token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier matching the known SQL function set.
    Function,
    /// Identifier matching the known SQL keyword set.
    Keyword,
    Identifier,
    String,
    Number,
    Operator,
    LParen,
    RParen,
    Comma,
    /// Appended exactly once at the end of every scan.
    Eof,
}

/// A single token with its verbatim text and byte offset in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub offset: usize,
}

impl Token {
    /// Byte offset one past the end of this token's text.
    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }

    /// Case-insensitive comparison against an expected word.
    pub fn is_word(&self, word: &str) -> bool {
        self.text.eq_ignore_ascii_case(word)
    }
}

/// SQL function names recognized across the MySQL/Oracle/PostgreSQL
/// dialects the converted mappers come from.
const FUNCTIONS: &[&str] = &[
    "CONCAT", "SUBSTRING", "SUBSTR", "UPPER", "LOWER", "TRIM", "LTRIM", "RTRIM",
    "REPLACE", "LENGTH", "CHAR_LENGTH", "LEFT", "RIGHT", "REVERSE",
    "LOCATE", "INSTR", "POSITION", "LPAD", "RPAD", "REPEAT", "SPACE",
    "INITCAP", "TRANSLATE", "ASCII", "CHR", "SOUNDEX", "REGEXP_REPLACE",
    "SUM", "COUNT", "AVG", "MAX", "MIN", "ROUND", "CEIL", "CEILING", "FLOOR",
    "GROUP_CONCAT",
    "ABS", "MOD", "POWER", "SQRT", "SIGN", "GREATEST", "LEAST",
    "DATE_FORMAT", "STR_TO_DATE", "DATE_ADD", "DATE_SUB", "DATEDIFF",
    "YEAR", "MONTH", "DAY", "HOUR", "MINUTE", "SECOND", "DAYOFWEEK",
    "UNIX_TIMESTAMP", "FROM_UNIXTIME", "TIME_FORMAT", "NOW", "CURDATE",
    "IFNULL", "ISNULL", "COALESCE", "NULLIF", "NVL", "NVL2",
    "CAST", "CONVERT", "TO_NUMBER", "TO_CHAR", "TO_DATE",
];

/// SQL keywords, including the TRIM sub-syntax words LEADING/TRAILING/BOTH.
const KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "ORDER", "BY", "HAVING",
    "CASE", "WHEN", "THEN", "ELSE", "END", "AS", "AND", "OR", "NOT",
    "IN", "EXISTS", "BETWEEN", "LIKE", "IS", "NULL", "TRUE", "FALSE",
    "DISTINCT", "ALL", "INNER", "LEFT", "RIGHT", "OUTER", "JOIN", "ON",
    "UNION", "INTERSECT", "EXCEPT", "INTERVAL",
    "LEADING", "TRAILING", "BOTH",
];

/// Returns true if `word` is a known SQL function name.
pub fn is_function_name(word: &str) -> bool {
    FUNCTIONS.iter().any(|f| f.eq_ignore_ascii_case(word))
}

/// Returns true if `word` is a known SQL keyword.
pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

/// Tokenizer holding the ordered, pre-compiled pattern table.
///
/// Order matters: comments must be tried before the generic operator run
/// (`--` and `/*` would otherwise scan as operators), strings before
/// identifiers, and the dot before the operator run so qualified names
/// produce a single-character operator token.
pub struct SqlTokenizer {
    patterns: Vec<(Regex, Option<TokenKind>)>,
}

impl Default for SqlTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlTokenizer {
    /// Create a tokenizer with the fixed pattern table.
    pub fn new() -> Self {
        let table: &[(&str, Option<TokenKind>)] = &[
            (r"(?s)^/\*.*?\*/", None),
            (r"^--[^\n]*", None),
            (r"^'(?:[^']|'')*'", Some(TokenKind::String)),
            (r#"^"(?:[^"]|"")*""#, Some(TokenKind::String)),
            (r"^\d+\.?\d*", Some(TokenKind::Number)),
            (r"^[A-Za-z_][A-Za-z0-9_]*", Some(TokenKind::Identifier)),
            (r"^\(", Some(TokenKind::LParen)),
            (r"^\)", Some(TokenKind::RParen)),
            (r"^,", Some(TokenKind::Comma)),
            (r"^\.", Some(TokenKind::Operator)),
            (r"^[+\-*/=<>!]+", Some(TokenKind::Operator)),
            (r"^\s+", None),
        ];

        Self {
            patterns: table
                .iter()
                .map(|(pat, kind)| (Regex::new(pat).unwrap(), *kind))
                .collect(),
        }
    }

    /// Scan `text` into tokens. Always succeeds; always ends with `Eof`.
    pub fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut pos = 0;

        while pos < text.len() {
            let rest = &text[pos..];
            let mut matched = false;

            for (pattern, kind) in &self.patterns {
                if let Some(m) = pattern.find(rest) {
                    if let Some(kind) = kind {
                        let value = m.as_str();
                        let kind = match kind {
                            TokenKind::Identifier if is_function_name(value) => {
                                TokenKind::Function
                            }
                            TokenKind::Identifier if is_keyword(value) => TokenKind::Keyword,
                            other => *other,
                        };
                        tokens.push(Token {
                            kind,
                            text: value.to_string(),
                            offset: pos,
                        });
                    }
                    pos += m.end();
                    matched = true;
                    break;
                }
            }

            if !matched {
                // Unrecognized character: skip it silently.
                let width = rest.chars().next().map(char::len_utf8).unwrap_or(1);
                pos += width;
            }
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            text: String::new(),
            offset: text.len(),
        });
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(text: &str) -> Vec<TokenKind> {
        SqlTokenizer::new()
            .tokenize(text)
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_select_tokens() {
        let tokens = SqlTokenizer::new().tokenize("SELECT a, b FROM t");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["SELECT", "a", ",", "b", "FROM", "t", ""]);
        assert_eq!(tokens[0].kind, TokenKind::Keyword);
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn test_function_reclassification() {
        let tokens = SqlTokenizer::new().tokenize("ifnull(x, 0)");
        assert_eq!(tokens[0].kind, TokenKind::Function);
        assert_eq!(tokens[0].text, "ifnull");
    }

    #[test]
    fn test_comments_and_whitespace_dropped() {
        assert_eq!(
            kinds("a /* block */ -- line\n b"),
            vec![TokenKind::Identifier, TokenKind::Identifier, TokenKind::Eof]
        );
    }

    #[test]
    fn test_string_with_doubled_quote_escape() {
        let tokens = SqlTokenizer::new().tokenize("'it''s' = x");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].text, "'it''s'");
    }

    #[test]
    fn test_comment_precedes_operator_match() {
        // "--" must scan as a comment, never as an operator run.
        assert_eq!(kinds("-- trailing"), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_unrecognized_characters_skipped() {
        let tokens = SqlTokenizer::new().tokenize("a ; b # c");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c", ""]);
    }

    #[test]
    fn test_offsets_are_byte_positions() {
        let tokens = SqlTokenizer::new().tokenize("ab  cd");
        assert_eq!(tokens[0].offset, 0);
        assert_eq!(tokens[1].offset, 4);
        assert_eq!(tokens[1].end(), 6);
    }

    #[test]
    fn test_number_and_operator_run() {
        let tokens = SqlTokenizer::new().tokenize("x >= 1.5");
        assert_eq!(tokens[1].kind, TokenKind::Operator);
        assert_eq!(tokens[1].text, ">=");
        assert_eq!(tokens[2].kind, TokenKind::Number);
        assert_eq!(tokens[2].text, "1.5");
    }
}
