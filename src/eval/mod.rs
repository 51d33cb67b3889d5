//! Directive evaluation: template text in, executable SQL out.
//!
//! The evaluator interprets the fixed directive vocabulary — `if`,
//! `choose`/`when`/`otherwise`, `foreach`, `where`, `set`, `trim`,
//! `include` — against a parameter environment, then substitutes the
//! remaining `#{...}` and `${...}` markers from the catalog. Directives
//! nested inside surviving bodies are handled by re-running the pass
//! sequence until a fixed point, with a hard iteration cap so adversarial
//! input cannot loop forever.
//!
//! Resolution never fails on content: malformed markup, unrecognizable
//! conditions, and unknown parameters all degrade to usable SQL and are
//! reported as anomalies on the [`Resolution`].

pub mod conditions;

use std::collections::HashMap;

use regex::{NoExpand, Regex};
use tracing::{debug, warn};

use crate::catalog::{
    parse_bind_expression, ParameterCatalog, ParameterRef, SampleValue, UsageContext,
};
use crate::cleanup;
use conditions::ConditionEvaluator;

/// Caller-supplied parameter values for strict-mode resolution.
pub type ParameterEnv = HashMap<String, SampleValue>;

/// What kind of content problem was recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyKind {
    /// A directive open tag with no matching close.
    MalformedConstruct,
    /// A condition atom that matched no known shape and defaulted to true.
    UnresolvableCondition,
    /// A marker whose parameter was absent from the supplied environment.
    UnknownParameter,
}

/// One recovered content problem, located by byte offset into the
/// working text at the time it was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub offset: usize,
    pub detail: String,
}

/// The outcome of one resolution run: always usable SQL, plus the
/// parameters consumed (first-use order) and any recovered anomalies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub sql: String,
    pub parameters: Vec<String>,
    pub anomalies: Vec<Anomaly>,
}

/// Directive vocabulary handled by the pass loop, in application order.
const DIRECTIVE_TAGS: &[&str] = &[
    "include",
    "foreach",
    "if",
    "choose",
    "when",
    "otherwise",
    "where",
    "set",
    "trim",
];

/// Upper bound on fixed-point passes over the template.
const MAX_PASSES: usize = 10;

struct TagPattern {
    open: Regex,
    close: Regex,
}

/// A located directive element: the full construct span, its raw
/// attribute text, and the body between open and close tags.
struct Element {
    start: usize,
    end: usize,
    attrs: String,
    body: String,
}

enum TagSearch {
    Found(Element),
    /// Open tag at `start..end` with no matching close.
    Dangling {
        start: usize,
        end: usize,
    },
    None,
}

/// Shared mutable state threaded through one resolution run.
struct EvalContext<'a> {
    catalog: &'a mut ParameterCatalog,
    /// `Some` selects strict mode: values come only from this map and
    /// misses surface as [`AnomalyKind::UnknownParameter`].
    env: Option<&'a ParameterEnv>,
    used: Vec<String>,
    anomalies: Vec<Anomaly>,
}

impl EvalContext<'_> {
    fn touch(&mut self, name: &str) {
        if !self.used.iter().any(|u| u.eq_ignore_ascii_case(name)) {
            self.used.push(name.to_string());
        }
    }

    /// Value for condition evaluation. Strict mode reports absence as
    /// `None` so presence checks can fail; auto-learn mode always has a
    /// value to offer.
    fn lookup(&mut self, name: &str) -> Option<SampleValue> {
        let value = match self.env {
            Some(env) => env_get(env, name),
            None => match self.catalog.get(name) {
                Some(entry) => Some(entry.sample_value.clone()),
                None => Some(
                    self.catalog
                        .learn(&ParameterRef::new(name, UsageContext::Condition)),
                ),
            },
        };
        // A name only counts as consumed once a value was actually
        // supplied for it; probing an absent name is not consumption.
        if value.is_some() {
            self.touch(name);
        }
        value
    }

    /// Value for marker substitution. Substitution must always produce
    /// something, so a strict-mode miss falls back to a learned sample
    /// and is recorded as an anomaly.
    fn substitute(&mut self, param: &ParameterRef, offset: usize) -> SampleValue {
        if let Some(env) = self.env {
            if let Some(value) = env_get(env, &param.name) {
                return value;
            }
            self.anomalies.push(Anomaly {
                kind: AnomalyKind::UnknownParameter,
                offset,
                detail: param.name.clone(),
            });
        }
        self.catalog.learn(param)
    }
}

fn env_get(env: &ParameterEnv, name: &str) -> Option<SampleValue> {
    env.get(name).cloned().or_else(|| {
        env.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    })
}

pub struct DirectiveEvaluator {
    conditions: ConditionEvaluator,
    tags: HashMap<&'static str, TagPattern>,
    re_bind: Regex,
    re_literal: Regex,
    re_attr_double: Regex,
    re_attr_single: Regex,
    re_leading_and_or: Regex,
    re_trailing_comma: Regex,
}

impl Default for DirectiveEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectiveEvaluator {
    pub fn new() -> Self {
        let mut tags = HashMap::new();
        for tag in DIRECTIVE_TAGS {
            // Attribute values may carry a raw > (entity-decoded test
            // expressions), so the open pattern skips quoted runs whole.
            let open =
                Regex::new(&format!(r#"(?i)<{tag}\b(?:[^>"']|"[^"]*"|'[^']*')*>"#)).unwrap();
            let close = Regex::new(&format!(r"(?i)</{tag}\s*>")).unwrap();
            tags.insert(*tag, TagPattern { open, close });
        }
        Self {
            conditions: ConditionEvaluator::new(),
            tags,
            re_bind: Regex::new(r"#\{([^}]+)\}").unwrap(),
            re_literal: Regex::new(r"\$\{([^}]+)\}").unwrap(),
            re_attr_double: Regex::new(r#"(\w+)\s*=\s*"([^"]*)""#).unwrap(),
            re_attr_single: Regex::new(r"(\w+)\s*=\s*'([^']*)'").unwrap(),
            re_leading_and_or: Regex::new(r"^(?i:AND|OR)\b\s*").unwrap(),
            re_trailing_comma: Regex::new(r",\s*$").unwrap(),
        }
    }

    /// Resolve `template` in auto-learn mode: every parameter reference
    /// gets a sample value from the catalog, learning new names as they
    /// appear.
    pub fn resolve(&self, catalog: &mut ParameterCatalog, template: &str) -> Resolution {
        let normalized = cleanup::normalize(template);
        // Learn every reference up front so usage contexts (bind type
        // hints, foreach collections) shape the inferred samples before
        // any condition consults them.
        for param in catalog.extract(&normalized) {
            catalog.learn(&param);
        }
        let mut ctx = EvalContext {
            catalog,
            env: None,
            used: Vec::new(),
            anomalies: Vec::new(),
        };
        let sql = self.run(&normalized, &mut ctx);
        Resolution {
            sql,
            parameters: ctx.used,
            anomalies: ctx.anomalies,
        }
    }

    /// Resolve `template` against a caller-supplied environment. Only
    /// names present in `env` count as present for condition checks;
    /// markers for absent names still substitute (from the catalog) but
    /// are reported as [`AnomalyKind::UnknownParameter`].
    pub fn resolve_with_env(
        &self,
        catalog: &mut ParameterCatalog,
        template: &str,
        env: &ParameterEnv,
    ) -> Resolution {
        let normalized = cleanup::normalize(template);
        let mut ctx = EvalContext {
            catalog,
            env: Some(env),
            used: Vec::new(),
            anomalies: Vec::new(),
        };
        let sql = self.run(&normalized, &mut ctx);
        Resolution {
            sql,
            parameters: ctx.used,
            anomalies: ctx.anomalies,
        }
    }

    fn run(&self, text: &str, ctx: &mut EvalContext) -> String {
        let mut sql = text.to_string();

        for pass in 1..=MAX_PASSES {
            let before = sql.clone();
            sql = self.apply_includes(sql, ctx);
            sql = self.apply_foreach(sql, ctx);
            sql = self.apply_if(sql, ctx);
            sql = self.apply_choose(sql, ctx);
            sql = self.apply_where(sql, ctx);
            sql = self.apply_set(sql, ctx);
            sql = self.apply_trim(sql, ctx);
            if sql == before {
                debug!(pass, "directive fixed point reached");
                break;
            }
            if pass == MAX_PASSES {
                warn!(pass, "directive pass cap hit, emitting partial resolution");
            }
        }

        let sql = self.substitute_markers(&sql, ctx);
        cleanup::finalize(&sql)
    }

    /// Locate the first `tag` element, pairing open and close tags with a
    /// depth counter so same-kind nesting resolves to the outermost span.
    fn find_element(&self, text: &str, tag: &str) -> TagSearch {
        let pat = &self.tags[tag];
        let Some(open) = pat.open.find(text) else {
            return TagSearch::None;
        };
        if open.as_str().ends_with("/>") {
            return TagSearch::Found(Element {
                start: open.start(),
                end: open.end(),
                attrs: attr_text(open.as_str(), tag),
                body: String::new(),
            });
        }

        let mut depth = 1usize;
        let mut pos = open.end();
        loop {
            let Some(close) = pat.close.find_at(text, pos) else {
                return TagSearch::Dangling {
                    start: open.start(),
                    end: open.end(),
                };
            };
            match pat.open.find_at(text, pos) {
                Some(inner) if inner.start() < close.start() => {
                    if !inner.as_str().ends_with("/>") {
                        depth += 1;
                    }
                    pos = inner.end();
                }
                _ => {
                    depth -= 1;
                    pos = close.end();
                    if depth == 0 {
                        return TagSearch::Found(Element {
                            start: open.start(),
                            end: close.end(),
                            attrs: attr_text(open.as_str(), tag),
                            body: text[open.end()..close.start()].to_string(),
                        });
                    }
                }
            }
        }
    }

    fn parse_attrs(&self, raw: &str) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        for cap in self.re_attr_double.captures_iter(raw) {
            attrs.insert(cap[1].to_ascii_lowercase(), cap[2].to_string());
        }
        for cap in self.re_attr_single.captures_iter(raw) {
            attrs
                .entry(cap[1].to_ascii_lowercase())
                .or_insert_with(|| cap[2].to_string());
        }
        attrs
    }

    /// Evaluate a `test` attribute, recording any unrecognized atoms.
    /// A missing attribute counts as unresolvable and defaults to true.
    fn test_passes(&self, attrs: &HashMap<String, String>, offset: usize, ctx: &mut EvalContext) -> bool {
        let Some(test) = attrs.get("test") else {
            ctx.anomalies.push(Anomaly {
                kind: AnomalyKind::UnresolvableCondition,
                offset,
                detail: "missing test attribute".to_string(),
            });
            return true;
        };
        let outcome = self.conditions.evaluate(test, |name| ctx.lookup(name));
        for atom in outcome.unrecognized {
            ctx.anomalies.push(Anomaly {
                kind: AnomalyKind::UnresolvableCondition,
                offset,
                detail: atom,
            });
        }
        outcome.result
    }

    fn dangling(&self, sql: &mut String, tag: &str, start: usize, end: usize, ctx: &mut EvalContext) {
        warn!(tag, offset = start, "open directive tag with no matching close");
        ctx.anomalies.push(Anomaly {
            kind: AnomalyKind::MalformedConstruct,
            offset: start,
            detail: format!("unclosed <{tag}>"),
        });
        sql.replace_range(start..end, "");
    }

    /// Include targets are expected already inlined upstream, so every
    /// `include` reference resolves to nothing.
    fn apply_includes(&self, mut sql: String, ctx: &mut EvalContext) -> String {
        loop {
            match self.find_element(&sql, "include") {
                TagSearch::Found(el) => sql.replace_range(el.start..el.end, ""),
                TagSearch::Dangling { start, end } => {
                    self.dangling(&mut sql, "include", start, end, ctx)
                }
                TagSearch::None => return sql,
            }
        }
    }

    fn apply_if(&self, mut sql: String, ctx: &mut EvalContext) -> String {
        loop {
            match self.find_element(&sql, "if") {
                TagSearch::Found(el) => {
                    let attrs = self.parse_attrs(&el.attrs);
                    let replacement = if self.test_passes(&attrs, el.start, ctx) {
                        el.body
                    } else {
                        String::new()
                    };
                    sql.replace_range(el.start..el.end, &replacement);
                }
                TagSearch::Dangling { start, end } => self.dangling(&mut sql, "if", start, end, ctx),
                TagSearch::None => return sql,
            }
        }
    }

    fn apply_choose(&self, mut sql: String, ctx: &mut EvalContext) -> String {
        loop {
            match self.find_element(&sql, "choose") {
                TagSearch::Found(el) => {
                    let replacement = self.pick_branch(&el.body, el.start, ctx);
                    sql.replace_range(el.start..el.end, &replacement);
                }
                TagSearch::Dangling { start, end } => {
                    self.dangling(&mut sql, "choose", start, end, ctx)
                }
                TagSearch::None => return sql,
            }
        }
    }

    /// First true `when` wins, else `otherwise`, else nothing.
    fn pick_branch(&self, body: &str, offset: usize, ctx: &mut EvalContext) -> String {
        let mut pos = 0;
        while let TagSearch::Found(when) = self.find_element(&body[pos..], "when") {
            let attrs = self.parse_attrs(&when.attrs);
            if self.test_passes(&attrs, offset, ctx) {
                return when.body;
            }
            pos += when.end;
        }

        match self.find_element(body, "otherwise") {
            TagSearch::Found(other) => other.body,
            _ => String::new(),
        }
    }

    fn apply_foreach(&self, mut sql: String, ctx: &mut EvalContext) -> String {
        loop {
            match self.find_element(&sql, "foreach") {
                TagSearch::Found(el) => {
                    let replacement = self.render_foreach(&el, ctx);
                    sql.replace_range(el.start..el.end, &replacement);
                }
                TagSearch::Dangling { start, end } => {
                    self.dangling(&mut sql, "foreach", start, end, ctx)
                }
                TagSearch::None => return sql,
            }
        }
    }

    fn render_foreach(&self, el: &Element, ctx: &mut EvalContext) -> String {
        let attrs = self.parse_attrs(&el.attrs);
        let item = attrs.get("item").map_or("item", String::as_str);
        let separator = attrs.get("separator").map_or(",", String::as_str);
        let open = attrs.get("open").map_or("(", String::as_str);
        let close = attrs.get("close").map_or(")", String::as_str);

        let elements: Vec<String> = match attrs.get("collection") {
            Some(name) => {
                // lookup records consumption on a hit; an unresolved
                // collection must not land in the used set.
                match ctx.lookup(name) {
                    Some(SampleValue::List(items)) => items.into_iter().take(3).collect(),
                    Some(value) => vec![value.render_literal()],
                    None => {
                        ctx.anomalies.push(Anomaly {
                            kind: AnomalyKind::UnknownParameter,
                            offset: el.start,
                            detail: name.clone(),
                        });
                        vec!["TEST".to_string(); 3]
                    }
                }
            }
            None => {
                ctx.anomalies.push(Anomaly {
                    kind: AnomalyKind::MalformedConstruct,
                    offset: el.start,
                    detail: "foreach without collection attribute".to_string(),
                });
                vec!["TEST".to_string(); 3]
            }
        };

        // Item markers carry the alias, so the patterns are built per
        // element. The alias is escaped; attribute text never reaches the
        // regex compiler raw.
        let alias = regex::escape(item);
        let bind = Regex::new(&format!(r"#\{{\s*{alias}\s*(?:,[^}}]*)?\}}")).unwrap();
        let literal = Regex::new(&format!(r"\$\{{\s*{alias}\s*\}}")).unwrap();

        let rendered: Vec<String> = elements
            .iter()
            .map(|element| {
                let quoted = SampleValue::Text(element.clone()).render_bind();
                let step = bind.replace_all(&el.body, NoExpand(&quoted));
                literal
                    .replace_all(&step, NoExpand(element))
                    .trim()
                    .to_string()
            })
            .collect();

        format!("{}{}{}", open, rendered.join(separator), close)
    }

    /// `<where>`: strip one leading AND/OR and prefix WHERE; an empty
    /// body still emits `WHERE 1=1` so surrounding SQL stays valid.
    fn apply_where(&self, mut sql: String, ctx: &mut EvalContext) -> String {
        loop {
            match self.find_element(&sql, "where") {
                TagSearch::Found(el) => {
                    let body = el.body.trim();
                    let replacement = if body.is_empty() {
                        "WHERE 1=1".to_string()
                    } else {
                        format!("WHERE {}", self.re_leading_and_or.replace(body, ""))
                    };
                    sql.replace_range(el.start..el.end, &replacement);
                }
                TagSearch::Dangling { start, end } => {
                    self.dangling(&mut sql, "where", start, end, ctx)
                }
                TagSearch::None => return sql,
            }
        }
    }

    /// `<set>`: strip one trailing comma and prefix SET.
    fn apply_set(&self, mut sql: String, ctx: &mut EvalContext) -> String {
        loop {
            match self.find_element(&sql, "set") {
                TagSearch::Found(el) => {
                    let body = el.body.trim();
                    let replacement = if body.is_empty() {
                        "SET".to_string()
                    } else {
                        format!("SET {}", self.re_trailing_comma.replace(body, ""))
                    };
                    sql.replace_range(el.start..el.end, &replacement);
                }
                TagSearch::Dangling { start, end } => self.dangling(&mut sql, "set", start, end, ctx),
                TagSearch::None => return sql,
            }
        }
    }

    /// `<trim>`: the general form behind `where` and `set` — optional
    /// prefix/suffix plus pipe-separated override lists stripped from the
    /// body edges.
    fn apply_trim(&self, mut sql: String, ctx: &mut EvalContext) -> String {
        loop {
            match self.find_element(&sql, "trim") {
                TagSearch::Found(el) => {
                    let attrs = self.parse_attrs(&el.attrs);
                    let replacement = render_trim(&attrs, &el.body);
                    sql.replace_range(el.start..el.end, &replacement);
                }
                TagSearch::Dangling { start, end } => {
                    self.dangling(&mut sql, "trim", start, end, ctx)
                }
                TagSearch::None => return sql,
            }
        }
    }

    /// Final pass: substitute every remaining bind and literal marker.
    fn substitute_markers(&self, sql: &str, ctx: &mut EvalContext) -> String {
        let step = replace_markers(&self.re_bind, sql, |raw, offset| {
            let param = parse_bind_expression(raw)?;
            let value = ctx.substitute(&param, offset);
            ctx.touch(&param.name);
            Some(value.render_bind())
        });
        replace_markers(&self.re_literal, &step, |raw, offset| {
            let name = raw.trim();
            if name.is_empty() {
                return None;
            }
            let param = ParameterRef::new(name, UsageContext::Literal);
            let value = ctx.substitute(&param, offset);
            ctx.touch(name);
            Some(value.render_literal())
        })
    }
}

/// Attribute text of a matched open tag: everything between the tag name
/// and the closing `>` (or `/>`).
fn attr_text(open_tag: &str, tag: &str) -> String {
    open_tag[1 + tag.len()..]
        .trim_end_matches('>')
        .trim_end_matches('/')
        .to_string()
}

fn render_trim(attrs: &HashMap<String, String>, body: &str) -> String {
    let mut body = body.trim().to_string();

    if let Some(overrides) = attrs.get("prefixoverrides") {
        for candidate in overrides.split('|') {
            let candidate = candidate.trim();
            if !candidate.is_empty() && starts_with_ignore_case(&body, candidate) {
                body = body[candidate.len()..].trim_start().to_string();
                break;
            }
        }
    }
    if let Some(overrides) = attrs.get("suffixoverrides") {
        for candidate in overrides.split('|') {
            let candidate = candidate.trim();
            if !candidate.is_empty() && ends_with_ignore_case(&body, candidate) {
                body = body[..body.len() - candidate.len()].trim_end().to_string();
                break;
            }
        }
    }

    if body.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    if let Some(prefix) = attrs.get("prefix") {
        if !prefix.is_empty() {
            out.push_str(prefix);
            out.push(' ');
        }
    }
    out.push_str(&body);
    if let Some(suffix) = attrs.get("suffix") {
        if !suffix.is_empty() {
            out.push(' ');
            out.push_str(suffix);
        }
    }
    out
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len() && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

fn ends_with_ignore_case(text: &str, suffix: &str) -> bool {
    text.len() >= suffix.len()
        && text.as_bytes()[text.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes())
}

/// Rebuild `text` with every `pattern` match replaced via `substitute`.
/// Returning `None` keeps the original marker text.
fn replace_markers<F>(pattern: &Regex, text: &str, mut substitute: F) -> String
where
    F: FnMut(&str, usize) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for cap in pattern.captures_iter(text) {
        let whole = cap.get(0).unwrap();
        out.push_str(&text[last..whole.start()]);
        match substitute(&cap[1], whole.start()) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    out.push_str(&text[last..]);
    out
}
