//! Directive condition evaluation.
//!
//! Conditions are the OGNL-ish `test="..."` expressions carried by `if`
//! and `when` directives. The grammar actually seen in converted mappers
//! is small: null checks, empty-string checks, quoted and numeric
//! comparisons, `.contains(...)`, `.size() > 0`, and bare names, joined
//! by `and`/`or`. Anything outside that set evaluates to true so a
//! malformed condition widens the output instead of silently dropping a
//! clause.

use regex::Regex;
use tracing::warn;

use crate::catalog::SampleValue;

/// Result of evaluating one condition expression. Parameter consumption
/// is observed by the `lookup` callback, not reported here.
#[derive(Debug, Default)]
pub struct ConditionOutcome {
    pub result: bool,
    /// Atoms that matched no known shape and defaulted to true.
    pub unrecognized: Vec<String>,
}

pub struct ConditionEvaluator {
    re_or: Regex,
    re_and: Regex,
    re_ne_null: Regex,
    re_eq_null: Regex,
    re_ne_empty: Regex,
    re_eq_empty: Regex,
    re_cmp_str: Regex,
    re_cmp_num: Regex,
    re_contains: Regex,
    re_size: Regex,
    re_bare: Regex,
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self {
            re_or: Regex::new(r"(?i)\s+or\s+").unwrap(),
            re_and: Regex::new(r"(?i)\s+and\s+").unwrap(),
            re_ne_null: Regex::new(r"^(\w+)\s*!=\s*null$").unwrap(),
            re_eq_null: Regex::new(r"^(\w+)\s*==\s*null$").unwrap(),
            re_ne_empty: Regex::new(r"^(\w+)\s*!=\s*''$").unwrap(),
            re_eq_empty: Regex::new(r"^(\w+)\s*==\s*''$").unwrap(),
            re_cmp_str: Regex::new(r"^(\w+)\s*(==|!=|>=|<=|>|<)\s*'([^']*)'$").unwrap(),
            re_cmp_num: Regex::new(r"^(\w+)\s*(==|!=|>=|<=|>|<)\s*(-?\d+)$").unwrap(),
            re_contains: Regex::new(r"^(\w+)\.contains\(").unwrap(),
            re_size: Regex::new(r"^(\w+)\.size\(\)\s*>\s*0$").unwrap(),
            re_bare: Regex::new(r"^(\w+)$").unwrap(),
        }
    }

    /// Evaluate `condition` against `lookup`, which maps a parameter name
    /// to its sample value (or `None` when the parameter is absent).
    pub fn evaluate<F>(&self, condition: &str, mut lookup: F) -> ConditionOutcome
    where
        F: FnMut(&str) -> Option<SampleValue>,
    {
        let mut outcome = ConditionOutcome::default();

        // OR at the top, AND within each clause. Parenthesized grouping
        // does not occur in practice and falls through to the
        // unrecognized-atom default.
        let mut any_clause = false;
        for clause in self.re_or.split(condition) {
            let mut all_atoms = true;
            for atom in self.re_and.split(clause) {
                if !self.atom(atom.trim(), &mut lookup, &mut outcome) {
                    all_atoms = false;
                }
            }
            if all_atoms {
                any_clause = true;
            }
        }

        outcome.result = any_clause;
        outcome
    }

    fn atom<F>(&self, atom: &str, lookup: &mut F, outcome: &mut ConditionOutcome) -> bool
    where
        F: FnMut(&str) -> Option<SampleValue>,
    {
        if let Some(cap) = self.re_ne_null.captures(atom) {
            return lookup(&cap[1]).is_some();
        }
        if let Some(cap) = self.re_eq_null.captures(atom) {
            return lookup(&cap[1]).is_none();
        }
        if let Some(cap) = self.re_ne_empty.captures(atom) {
            return lookup(&cap[1]).is_some_and(|v| v.is_truthy());
        }
        if let Some(cap) = self.re_eq_empty.captures(atom) {
            return !lookup(&cap[1]).is_some_and(|v| v.is_truthy());
        }
        if let Some(cap) = self.re_cmp_str.captures(atom) {
            let actual = lookup(&cap[1]).map(|v| v.as_comparable());
            return match actual {
                Some(actual) => compare(&actual, &cap[2], &cap[3]),
                None => false,
            };
        }
        if let Some(cap) = self.re_cmp_num.captures(atom) {
            let actual = lookup(&cap[1]).map(|v| v.as_comparable());
            return match actual {
                Some(actual) => compare(&actual, &cap[2], &cap[3]),
                None => false,
            };
        }
        if self.re_contains.is_match(atom) {
            // Membership against a sample value is not meaningful; keep
            // the guarded clause.
            return true;
        }
        if let Some(cap) = self.re_size.captures(atom) {
            return lookup(&cap[1]).is_some_and(|v| v.is_truthy());
        }
        if let Some(cap) = self.re_bare.captures(atom) {
            return lookup(&cap[1]).is_some_and(|v| v.is_truthy());
        }

        warn!(atom, "unrecognized condition atom, defaulting to true");
        outcome.unrecognized.push(atom.to_string());
        true
    }
}

/// Values always compare as strings, numbers included. `"10" >= '9'` is
/// false under this ordering; conditions that need numeric meaning are
/// written against values whose string order agrees.
fn compare(actual: &str, op: &str, expected: &str) -> bool {
    apply(op, actual.cmp(expected))
}

fn apply(op: &str, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        "==" => ordering == Equal,
        "!=" => ordering != Equal,
        ">" => ordering == Greater,
        ">=" => ordering != Less,
        "<" => ordering == Less,
        "<=" => ordering != Greater,
        _ => false,
    }
}
