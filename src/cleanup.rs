//! Stateless boundary utilities run before and after directive
//! evaluation.
//!
//! [`normalize`] prepares raw mapper text for the evaluator: XML comments
//! go, CDATA wrappers are unwrapped to their payload, and the XML
//! entities mapper files use for comparison operators are decoded.
//! [`finalize`] tidies evaluator output: any leftover markup from the
//! fixed tag vocabulary is dropped and whitespace is collapsed to single
//! spaces.

use std::sync::OnceLock;

use regex::Regex;

fn re_comment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").unwrap())
}

fn re_cdata() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").unwrap())
}

fn re_leftover_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Only the known vocabulary is stripped. A generic <[^>]+> sweep
    // would also eat comparison text like `a < b AND c > d`, breaking
    // idempotence on already-resolved SQL.
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)</?(?:if|choose|when|otherwise|foreach|where|set|trim|include|bind|selectKey|select|insert|update|delete|sql|mapper)\b(?:[^>"']|"[^"]*"|'[^']*')*>"#,
        )
        .unwrap()
    })
}

fn re_whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Prepare raw template text for evaluation: strip XML comments, unwrap
/// CDATA sections, and decode the XML entities used to escape comparison
/// operators inside mapper files. `&amp;` decodes last so it cannot
/// manufacture new entities.
pub fn normalize(text: &str) -> String {
    let step = re_comment().replace_all(text, "");
    let step = re_cdata().replace_all(&step, "$1");
    step.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Tidy evaluator output: drop any leftover tags from the directive
/// vocabulary, collapse whitespace runs to single spaces, and trim.
pub fn finalize(sql: &str) -> String {
    let step = re_leftover_tag().replace_all(sql, " ");
    re_whitespace().replace_all(&step, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cdata_unwrapped() {
        assert_eq!(
            normalize("WHERE a <![CDATA[ <= ]]> 5"),
            "WHERE a  <=  5"
        );
    }

    #[test]
    fn test_entities_decoded_amp_last() {
        assert_eq!(normalize("a &lt; b &amp;&amp; c &gt; d"), "a < b && c > d");
        // &amp;lt; must become the literal text &lt;, not <.
        assert_eq!(normalize("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_comments_stripped() {
        assert_eq!(
            normalize("SELECT 1 <!-- converted\nfrom legacy --> FROM t"),
            "SELECT 1  FROM t"
        );
    }

    #[test]
    fn test_finalize_strips_known_tags_only() {
        assert_eq!(
            finalize("<select id=\"q\"> SELECT a </select>"),
            "SELECT a"
        );
        // Comparison text is not markup.
        assert_eq!(finalize("a < b AND c > d"), "a < b AND c > d");
    }

    #[test]
    fn test_finalize_collapses_whitespace() {
        assert_eq!(finalize("  SELECT   a\n\tFROM t  "), "SELECT a FROM t");
    }

    #[test]
    fn test_finalize_idempotent_on_clean_sql() {
        let sql = "SELECT a, b FROM t WHERE c = 'TEST'";
        assert_eq!(finalize(sql), sql);
    }
}
