//! Parameter catalog: extraction, learning, and persistence.
//!
//! The catalog scans template text for every way a parameter can appear —
//! `#{name[,jdbcType=TYPE]}` binds, `${name}` literals, identifiers inside
//! directive test conditions, and `foreach` collection names — and
//! remembers one plausible sample value per name. Once a sample value is
//! assigned it is never changed; only the type hint may be refined and the
//! occurrence count bumped, so repeated runs over an evolving template set
//! stay reproducible.

pub mod infer;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DynSqlError, DynSqlResult};

/// Broad value category attached to each learned parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValueCategory {
    Number,
    String,
    Date,
    Boolean,
    List,
}

/// A concrete sample value. Numbers render bare, text renders quoted,
/// lists expand element-wise inside `foreach`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Number(i64),
    Text(String),
    List(Vec<String>),
}

impl SampleValue {
    /// Render as a typed SQL literal for a `#{...}` bind position.
    pub fn render_bind(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => quote_sql(s),
            Self::List(items) => {
                let quoted: Vec<String> = items.iter().map(|s| quote_sql(s)).collect();
                format!("({})", quoted.join(", "))
            }
        }
    }

    /// Render as raw text for a `${...}` literal position.
    pub fn render_literal(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
            Self::List(items) => items.join(", "),
        }
    }

    /// Raw comparable form used by condition evaluation.
    pub fn as_comparable(&self) -> String {
        self.render_literal()
    }

    /// Truthiness for bare-name conditions: present, non-empty text,
    /// non-empty list.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Number(_) => true,
            Self::Text(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
        }
    }
}

/// Quote a string as a SQL literal, doubling embedded quotes.
fn quote_sql(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// How a parameter reference appears in template text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageContext {
    /// `#{name}` bind marker.
    Bind,
    /// `${name}` raw text substitution.
    Literal,
    /// Identifier inside a directive `test="..."` condition.
    Condition,
    /// `foreach` collection attribute.
    Collection,
}

/// A transient parameter reference derived from one scan of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterRef {
    pub name: String,
    pub jdbc_type: Option<String>,
    pub usage: UsageContext,
}

impl ParameterRef {
    pub fn new(name: impl Into<String>, usage: UsageContext) -> Self {
        Self {
            name: name.into(),
            jdbc_type: None,
            usage,
        }
    }
}

/// One learned parameter. Owned exclusively by the catalog and mutated
/// only through [`ParameterCatalog::learn`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Parameter name with its first-seen casing preserved.
    pub name: String,
    pub category: ValueCategory,
    pub sample_value: SampleValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jdbc_type: Option<String>,
    pub occurrence_count: u32,
    pub first_seen: DateTime<Utc>,
}

/// On-disk shape of the catalog store.
#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    comment: String,
    parameters: BTreeMap<String, CatalogEntry>,
}

/// Identifiers that appear in test conditions but are never parameters.
const RESERVED_WORDS: &[&str] = &[
    "null", "and", "or", "not", "true", "false", "eq", "ne", "lt", "le", "gt", "ge", "contains",
    "size", "empty", "length",
];

/// Learned, persisted parameter-to-sample-value mapping.
///
/// Lifecycle is explicit: [`load`](Self::load) (or
/// [`in_memory`](Self::in_memory)), any number of
/// [`learn`](Self::learn) calls, then [`flush`](Self::flush). Learning is
/// infallible and purely in-memory; `flush` is the only fallible step and
/// rewrites the whole store, so a failed flush can simply be retried.
pub struct ParameterCatalog {
    path: Option<PathBuf>,
    entries: BTreeMap<String, CatalogEntry>,
    dirty: bool,
    re_bind: Regex,
    re_literal: Regex,
    re_test: Regex,
    re_ident: Regex,
    re_collection: Regex,
}

impl Default for ParameterCatalog {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl ParameterCatalog {
    /// An unpersisted catalog; `flush` is a no-op.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: BTreeMap::new(),
            dirty: false,
            re_bind: Regex::new(r"#\{([^}]+)\}").unwrap(),
            re_literal: Regex::new(r"\$\{([^}]+)\}").unwrap(),
            re_test: Regex::new(r#"(?i)test\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap(),
            re_ident: Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap(),
            re_collection: Regex::new(r#"(?i)<foreach[^>]*collection\s*=\s*"([^"]+)""#).unwrap(),
        }
    }

    /// Load the catalog from `path`. A missing file yields an empty
    /// catalog bound to that path; a present but undecodable file is a
    /// retryable error.
    pub fn load(path: impl AsRef<Path>) -> DynSqlResult<Self> {
        let path = path.as_ref();
        let mut catalog = Self::in_memory();
        catalog.path = Some(path.to_path_buf());

        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let doc: StoreDocument = serde_json::from_str(&raw)
                    .map_err(|e| DynSqlError::catalog_format(path, e))?;
                catalog.entries = doc.parameters;
                debug!(path = %path.display(), entries = catalog.entries.len(), "catalog loaded");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no catalog store yet, starting empty");
            }
            Err(e) => return Err(DynSqlError::catalog_io(path, e)),
        }

        Ok(catalog)
    }

    /// Find every parameter reference in `text`, de-duplicated by name
    /// with the first usage context winning.
    pub fn extract(&self, text: &str) -> Vec<ParameterRef> {
        let mut refs: Vec<ParameterRef> = Vec::new();
        let mut push = |r: ParameterRef| {
            if !refs.iter().any(|p| p.name.eq_ignore_ascii_case(&r.name)) {
                refs.push(r);
            }
        };

        for cap in self.re_bind.captures_iter(text) {
            if let Some(param) = parse_bind_expression(&cap[1]) {
                push(param);
            }
        }

        for cap in self.re_literal.captures_iter(text) {
            let name = cap[1].trim().to_string();
            if !name.is_empty() {
                push(ParameterRef::new(name, UsageContext::Literal));
            }
        }

        for cap in self.re_test.captures_iter(text) {
            let condition = cap.get(1).or_else(|| cap.get(2)).map_or("", |m| m.as_str());
            for ident in self.re_ident.find_iter(condition) {
                let word = ident.as_str();
                if !RESERVED_WORDS.iter().any(|r| r.eq_ignore_ascii_case(word)) {
                    push(ParameterRef::new(word, UsageContext::Condition));
                }
            }
        }

        for cap in self.re_collection.captures_iter(text) {
            push(ParameterRef::new(cap[1].to_string(), UsageContext::Collection));
        }

        refs
    }

    /// Return the sample value for `param`, learning it first if unseen.
    ///
    /// For a known name the stored sample is returned untouched; a newly
    /// supplied jdbcType refines the stored hint and the occurrence count
    /// is bumped. For a new name the sample is inferred deterministically
    /// and the catalog is marked dirty for the next flush.
    pub fn learn(&mut self, param: &ParameterRef) -> SampleValue {
        let key = param.name.to_ascii_lowercase();

        if let Some(entry) = self.entries.get_mut(&key) {
            if entry.jdbc_type.is_none() && param.jdbc_type.is_some() {
                entry.jdbc_type = param.jdbc_type.clone();
                self.dirty = true;
            }
            entry.occurrence_count += 1;
            self.dirty = true;
            return entry.sample_value.clone();
        }

        let (category, sample_value) = infer::infer(param);
        info!(name = %param.name, ?category, sample = %sample_value.render_literal(),
              "learned new parameter");
        self.entries.insert(
            key,
            CatalogEntry {
                name: param.name.clone(),
                category,
                sample_value: sample_value.clone(),
                jdbc_type: param.jdbc_type.clone(),
                occurrence_count: 1,
                first_seen: Utc::now(),
            },
        );
        self.dirty = true;
        sample_value
    }

    /// Look up an entry by case-insensitive name.
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(&name.to_ascii_lowercase())
    }

    /// Pre-seed an entry, e.g. from an externally supplied environment.
    /// An existing sample value is never overwritten.
    pub fn seed(&mut self, name: &str, category: ValueCategory, sample_value: SampleValue) {
        let key = name.to_ascii_lowercase();
        if self.entries.contains_key(&key) {
            return;
        }
        self.entries.insert(
            key,
            CatalogEntry {
                name: name.to_string(),
                category,
                sample_value,
                jdbc_type: None,
                occurrence_count: 0,
                first_seen: Utc::now(),
            },
        );
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite the whole store. Idempotent; a no-op when nothing changed
    /// or the catalog is in-memory only. The in-memory state survives a
    /// failed flush, so callers may retry.
    pub fn flush(&mut self) -> DynSqlResult<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        let doc = StoreDocument {
            comment: "Learned parameter samples - generated and updated automatically".to_string(),
            parameters: self.entries.clone(),
        };
        let raw = serde_json::to_string_pretty(&doc)
            .map_err(|e| DynSqlError::catalog_format(&path, e))?;
        std::fs::write(&path, raw).map_err(|e| DynSqlError::catalog_io(&path, e))?;

        self.dirty = false;
        debug!(path = %path.display(), entries = self.entries.len(), "catalog flushed");
        Ok(())
    }
}

/// Parse the inside of a `#{...}` marker: `name[,jdbcType=TYPE][,...]`.
pub(crate) fn parse_bind_expression(raw: &str) -> Option<ParameterRef> {
    let mut parts = raw.split(',').map(str::trim);
    let name = parts.next()?.to_string();
    if name.is_empty() {
        return None;
    }

    let mut jdbc_type = None;
    for part in parts {
        if let Some(value) = part
            .strip_prefix("jdbcType=")
            .or_else(|| part.strip_prefix("jdbctype="))
        {
            jdbc_type = Some(value.trim().to_string());
        }
    }

    Some(ParameterRef {
        name,
        jdbc_type,
        usage: UsageContext::Bind,
    })
}
