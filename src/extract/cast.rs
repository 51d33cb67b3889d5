//! CAST repair post-pass.
//!
//! Converted mappers routinely carry two kinds of broken `CAST`: a missing
//! result type (`CAST(expr)`), and an `AS` that was dragged inside a nested
//! call by a mis-ported three-argument `SUBSTRING`
//! (`CAST(SUBSTRING(col,1,3 AS CHAR))`). Repair synthesizes the missing
//! outer `AS <type>` and strips any stray inner `AS` so only the outer,
//! result-type `AS` remains.

/// Result type synthesized when a `CAST` has none.
const DEFAULT_CAST_TYPE: &str = "CHAR(255)";

/// Repair one balanced `CAST(...)` construct, returning well-formed
/// `CAST(expression AS type)` text. Non-CAST input is returned unchanged.
pub fn repair_cast(construct: &str) -> String {
    let trimmed = construct.trim();
    if !trimmed.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("CAST")) {
        return construct.to_string();
    }
    let Some(open) = trimmed.find('(') else {
        return construct.to_string();
    };
    if !trimmed.ends_with(')') {
        return construct.to_string();
    }

    let inner = &trimmed[open + 1..trimmed.len() - 1];

    match find_outermost_as(inner) {
        Some(as_pos) => {
            let expression = strip_inner_as(inner[..as_pos].trim());
            let data_type = inner[as_pos + 2..].trim();
            format!("CAST({} AS {})", expression, data_type)
        }
        None => {
            let expression = strip_inner_as(inner.trim());
            format!("CAST({} AS {})", expression, DEFAULT_CAST_TYPE)
        }
    }
}

/// Byte position of the outermost `AS` keyword — depth zero, outside
/// string literals, exact word boundary — or `None`.
fn find_outermost_as(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut i = 0;

    while i + 1 < bytes.len() {
        let b = bytes[i];
        if in_string {
            if b == b'\'' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match b {
            b'\'' => in_string = true,
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {
                if depth == 0
                    && bytes[i..i + 2].eq_ignore_ascii_case(b"AS")
                    && (i == 0 || !bytes[i - 1].is_ascii_alphanumeric())
                    && (i + 2 >= bytes.len() || !bytes[i + 2].is_ascii_alphanumeric())
                {
                    return Some(i);
                }
            }
        }
        i += 1;
    }

    None
}

/// Remove stray `AS <type>` clauses that ended up inside a nested call,
/// e.g. `SUBSTRING(col,1,3 AS CHAR)` becomes `SUBSTRING(col,1,3)`.
///
/// Each removed span runs from the whitespace before `AS` up to the next
/// comma, close paren, or quote, and `AS` inside string literals is left
/// alone.
fn strip_inner_as(expression: &str) -> String {
    let bytes = expression.as_bytes();
    let mut remove: Vec<(usize, usize)> = Vec::new();
    let mut in_string = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if b == b'\'' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if b == b'\'' {
            in_string = true;
            i += 1;
            continue;
        }
        if i + 2 <= bytes.len()
            && bytes[i..i + 2].eq_ignore_ascii_case(b"AS")
            && i > 0
            && bytes[i - 1].is_ascii_whitespace()
            && (i + 2 == bytes.len() || bytes[i + 2].is_ascii_whitespace())
        {
            let mut start = i;
            while start > 0 && bytes[start - 1].is_ascii_whitespace() {
                start -= 1;
            }
            let mut j = i + 2;
            while j < bytes.len() && !matches!(bytes[j], b',' | b')' | b'\'') {
                j += 1;
            }
            remove.push((start, j));
            i = j;
            continue;
        }
        i += 1;
    }

    if remove.is_empty() {
        return expression.to_string();
    }
    let mut out = String::with_capacity(expression.len());
    let mut last = 0;
    for (start, end) in remove {
        out.push_str(&expression[last..start]);
        last = end;
    }
    out.push_str(&expression[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_as_synthesized() {
        assert_eq!(repair_cast("CAST(col)"), "CAST(col AS CHAR(255))");
    }

    #[test]
    fn test_well_formed_cast_kept() {
        assert_eq!(
            repair_cast("CAST(col AS VARCHAR(10))"),
            "CAST(col AS VARCHAR(10))"
        );
    }

    #[test]
    fn test_misported_substring_repaired() {
        // Inner AS removed, outer result type synthesized.
        assert_eq!(
            repair_cast("CAST(SUBSTRING(col,1,3 AS CHAR))"),
            "CAST(SUBSTRING(col,1,3) AS CHAR(255))"
        );
    }

    #[test]
    fn test_inner_as_stripped_when_outer_exists() {
        assert_eq!(
            repair_cast("CAST(SUBSTRING(col,1,3 AS CHAR) AS VARCHAR(10))"),
            "CAST(SUBSTRING(col,1,3) AS VARCHAR(10))"
        );
    }

    #[test]
    fn test_as_inside_string_not_outer() {
        assert_eq!(
            repair_cast("CAST(CONCAT(a, ' AS '))"),
            "CAST(CONCAT(a, ' AS ') AS CHAR(255))"
        );
    }

    #[test]
    fn test_non_cast_input_unchanged() {
        assert_eq!(repair_cast("SUM(a)"), "SUM(a)");
    }
}
