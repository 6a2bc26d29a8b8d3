//! Core data models for concordia.
//!
//! These types are shared across all concordia crates and mirror the
//! server's view of query operations, history entries, paradigmatic
//! queries and background tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// =============================================================================
// OPERATION TYPES
// =============================================================================

/// Kind-specific parameter bag of an operation.
///
/// A `BTreeMap` keeps key order stable so equal bags compare and
/// serialize identically.
pub type FormArgs = BTreeMap<String, JsonValue>;

/// Kind of a query operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Initial concordance query (CQL)
    Query,
    /// Positive or negative filter over a concordance
    Filter,
    /// Concordance sort
    Sort,
    /// Random sample of concordance lines
    Sample,
    /// Shuffle of concordance lines
    Shuffle,
    /// Sub-hits reduction (one hit per matching span)
    Subhits,
    /// Set combination of sub-query frequency lists
    Paradigmatic,
    /// Word list over an attribute
    Wordlist,
    /// Keyword extraction against a reference corpus
    Keywords,
}

impl OperationKind {
    /// All kinds, in declaration order.
    pub const ALL: [OperationKind; 9] = [
        OperationKind::Query,
        OperationKind::Filter,
        OperationKind::Sort,
        OperationKind::Sample,
        OperationKind::Shuffle,
        OperationKind::Subhits,
        OperationKind::Paradigmatic,
        OperationKind::Wordlist,
        OperationKind::Keywords,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Filter => "filter",
            OperationKind::Sort => "sort",
            OperationKind::Sample => "sample",
            OperationKind::Shuffle => "shuffle",
            OperationKind::Subhits => "subhits",
            OperationKind::Paradigmatic => "paradigmatic",
            OperationKind::Wordlist => "wordlist",
            OperationKind::Keywords => "keywords",
        }
    }

    /// Whether an operation of this kind may start a chain.
    pub fn is_root(&self) -> bool {
        matches!(
            self,
            OperationKind::Query
                | OperationKind::Paradigmatic
                | OperationKind::Wordlist
                | OperationKind::Keywords
        )
    }

    /// Whether this kind transforms a concordance produced by a `query` root.
    pub fn is_concordance_step(&self) -> bool {
        matches!(
            self,
            OperationKind::Filter
                | OperationKind::Sort
                | OperationKind::Sample
                | OperationKind::Shuffle
                | OperationKind::Subhits
        )
    }

    /// History category of a chain rooted at this kind.
    ///
    /// Non-root kinds never root a chain; they report the concordance
    /// category they operate on.
    pub fn supertype(&self) -> Supertype {
        match self {
            OperationKind::Paradigmatic => Supertype::ParadigmaticQuery,
            OperationKind::Wordlist | OperationKind::Keywords => Supertype::WordList,
            _ => Supertype::Concordance,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        OperationKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown operation kind: {}", s)))
    }
}

/// Opaque, server-assigned identifier of a persisted operation.
///
/// Restricted to URL-safe characters so it can travel in query strings
/// and history links without escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PersistedId(String);

impl PersistedId {
    /// Prefix marking a persisted id in a `q` URL parameter.
    pub const URL_PREFIX: char = '~';

    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidInput("persisted id is empty".to_string()));
        }
        if let Some(bad) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(Error::InvalidInput(format!(
                "persisted id {:?} contains non URL-safe character {:?}",
                id, bad
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render as a `q` parameter value, e.g. `~a1B2`.
    pub fn to_url_param(&self) -> String {
        format!("{}{}", Self::URL_PREFIX, self.0)
    }

    /// Parse a `q` parameter value produced by [`PersistedId::to_url_param`].
    pub fn from_url_param(param: &str) -> Result<Self> {
        match param.strip_prefix(Self::URL_PREFIX) {
            Some(id) => Self::new(id),
            None => Err(Error::InvalidInput(format!(
                "not a persisted query reference: {}",
                param
            ))),
        }
    }
}

impl fmt::Display for PersistedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PersistedId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<PersistedId> for String {
    fn from(id: PersistedId) -> Self {
        id.0
    }
}

/// One step of a corpus investigation.
///
/// Once `persisted_id` is assigned it never changes; submitting different
/// form arguments goes through [`QueryOperation::revise`], which yields a
/// new, unpersisted operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOperation {
    pub kind: OperationKind,
    pub form_args: FormArgs,
    /// Number of result items, known once the step has been computed.
    pub result_size: Option<u64>,
    persisted_id: Option<PersistedId>,
    pub created_at: DateTime<Utc>,
}

impl QueryOperation {
    /// Create a new, not yet submitted operation.
    pub fn new(kind: OperationKind, form_args: FormArgs) -> Self {
        Self {
            kind,
            form_args,
            result_size: None,
            persisted_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn persisted_id(&self) -> Option<&PersistedId> {
        self.persisted_id.as_ref()
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted_id.is_some()
    }

    /// Attach the id assigned by the operation store.
    ///
    /// Re-assigning the same id is accepted; a different id is rejected.
    pub fn with_persisted_id(mut self, id: PersistedId) -> Result<Self> {
        match &self.persisted_id {
            Some(existing) if *existing != id => {
                Err(Error::AlreadyPersisted(existing.to_string()))
            }
            _ => {
                self.persisted_id = Some(id);
                Ok(self)
            }
        }
    }

    pub fn with_result_size(mut self, size: u64) -> Self {
        self.result_size = Some(size);
        self
    }

    /// New unpersisted operation of the same kind with different arguments.
    pub fn revise(&self, form_args: FormArgs) -> Self {
        Self::new(self.kind, form_args)
    }

    /// Same kind and same arguments, ignoring persistence and timing.
    pub fn same_query(&self, other: &QueryOperation) -> bool {
        self.kind == other.kind && self.form_args == other.form_args
    }

    /// Generated human-readable description used as default history label.
    pub fn describe(&self) -> String {
        describe_args(self.kind, &self.form_args)
    }
}

/// Operation descriptor as stored by the persisted-operation store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedOperation {
    pub id: PersistedId,
    pub kind: OperationKind,
    pub form_args: FormArgs,
    #[serde(default)]
    pub predecessor_id: Option<PersistedId>,
    #[serde(default)]
    pub result_size: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl PersistedOperation {
    /// Materialize the stored descriptor as a chain operation.
    pub fn to_operation(&self) -> QueryOperation {
        QueryOperation {
            kind: self.kind,
            form_args: self.form_args.clone(),
            result_size: self.result_size,
            persisted_id: Some(self.id.clone()),
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}

fn arg_text(args: &FormArgs, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match args.get(*k) {
        Some(JsonValue::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn describe_args(kind: OperationKind, args: &FormArgs) -> String {
    let detail = match kind {
        OperationKind::Query => arg_text(args, &["cql", "query"]),
        OperationKind::Filter => arg_text(args, &["cql", "query"]).map(|q| {
            if args.get("negative") == Some(&JsonValue::Bool(true)) {
                format!("not {}", q)
            } else {
                q
            }
        }),
        OperationKind::Sort => arg_text(args, &["sortKey"]),
        OperationKind::Sample => arg_text(args, &["rlines"]).map(|n| format!("{} lines", n)),
        OperationKind::Shuffle | OperationKind::Subhits => None,
        OperationKind::Paradigmatic => {
            let attr = arg_text(args, &["attr"]).unwrap_or_default();
            let subs = match args.get("subqueries") {
                Some(JsonValue::Array(items)) => items
                    .iter()
                    .filter_map(|item| {
                        let cql = item.get("cql")?.as_str()?;
                        let negated = item
                            .get("negated")
                            .and_then(JsonValue::as_bool)
                            .unwrap_or(false);
                        Some(if negated {
                            format!("!{}", cql)
                        } else {
                            cql.to_string()
                        })
                    })
                    .collect::<Vec<_>>(),
                _ => Vec::new(),
            };
            Some(format!("{} [{}]", attr, subs.join(", ")).trim().to_string())
        }
        OperationKind::Wordlist | OperationKind::Keywords => {
            let attr = arg_text(args, &["attr"]);
            let pattern = arg_text(args, &["pattern"]);
            match (attr, pattern) {
                (Some(a), Some(p)) => Some(format!("{} ~ {}", a, p)),
                (a, p) => a.or(p),
            }
        }
    };
    match detail {
        Some(d) if !d.is_empty() => format!("{}: {}", kind, d),
        _ => kind.to_string(),
    }
}

// =============================================================================
// HISTORY TYPES
// =============================================================================

/// User-facing history category, derived from a chain's root operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Supertype {
    Concordance,
    ParadigmaticQuery,
    WordList,
}

impl Supertype {
    /// Value used in the history API `supertype` filter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Supertype::Concordance => "concordance",
            Supertype::ParadigmaticQuery => "paradigmatic_query",
            Supertype::WordList => "word_list",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Supertype::Concordance => "concordance",
            Supertype::ParadigmaticQuery => "paradigmatic query",
            Supertype::WordList => "word list",
        }
    }
}

impl fmt::Display for Supertype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Supertype {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "concordance" | "conc" => Ok(Supertype::Concordance),
            "paradigmatic_query" | "paradigmatic query" | "pquery" => {
                Ok(Supertype::ParadigmaticQuery)
            }
            "word_list" | "word list" | "wlist" => Ok(Supertype::WordList),
            _ => Err(Error::InvalidInput(format!("unknown supertype: {}", s))),
        }
    }
}

/// One entry of the query history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Server-assigned entry id.
    pub id: String,
    /// Persisted id of the chain tail this entry reopens.
    pub query_id: PersistedId,
    /// Kind of the chain root; determines the supertype.
    pub root_kind: OperationKind,
    /// Kind and arguments of the recorded operation, for the description.
    pub kind: OperationKind,
    #[serde(default)]
    pub form_args: FormArgs,
    /// User-supplied name.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn supertype(&self) -> Supertype {
        self.root_kind.supertype()
    }

    /// Generated description of the recorded operation.
    pub fn description(&self) -> String {
        describe_args(self.kind, &self.form_args)
    }

    /// Label if the user set one, otherwise the generated description.
    pub fn display_label(&self) -> String {
        match &self.label {
            Some(label) if !label.trim().is_empty() => label.clone(),
            _ => self.description(),
        }
    }
}

/// Payload for recording a new history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHistoryEntry {
    pub query_id: PersistedId,
    pub root_kind: OperationKind,
    pub kind: OperationKind,
    pub form_args: FormArgs,
}

/// Filter and page selection for history listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryFilter {
    pub supertype: Option<Supertype>,
    /// `true` lists archived entries only; `false` lists unarchived only.
    pub archived_only: bool,
    /// Case-insensitive substring of the label or description.
    pub query_contains: Option<String>,
    /// 1-based page number.
    pub page: usize,
    pub page_size: usize,
}

impl Default for HistoryFilter {
    fn default() -> Self {
        Self {
            supertype: None,
            archived_only: false,
            query_contains: None,
            page: 1,
            page_size: crate::defaults::HISTORY_PAGE_SIZE,
        }
    }
}

impl HistoryFilter {
    pub fn with_supertype(mut self, supertype: Supertype) -> Self {
        self.supertype = Some(supertype);
        self
    }

    pub fn with_archived_only(mut self, archived_only: bool) -> Self {
        self.archived_only = archived_only;
        self
    }

    pub fn with_query_contains(mut self, needle: impl Into<String>) -> Self {
        self.query_contains = Some(needle.into());
        self
    }

    pub fn with_page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.page == 0 {
            return Err(Error::InvalidInput("history page is 1-based".to_string()));
        }
        if self.page_size == 0 || self.page_size > crate::defaults::HISTORY_MAX_PAGE_SIZE {
            return Err(Error::InvalidInput(format!(
                "history page size must be within 1..={}",
                crate::defaults::HISTORY_MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }

    /// Whether `entry` belongs in a listing with this filter (paging aside).
    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        if entry.deleted || entry.archived != self.archived_only {
            return false;
        }
        if let Some(supertype) = self.supertype {
            if entry.supertype() != supertype {
                return false;
            }
        }
        match &self.query_contains {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                entry.display_label().to_lowercase().contains(&needle)
                    || entry.description().to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }
}

/// One page of history entries, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    /// Total matching entries across all pages.
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub has_more: bool,
}

// =============================================================================
// PARADIGMATIC QUERY TYPES
// =============================================================================

/// One sub-query of a paradigmatic query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubQueryItem {
    pub cql: String,
    /// Items below this frequency in the sub-query's own list are dropped
    /// before combination. Ignored for negated sub-queries.
    pub min_freq: u64,
    /// Defines an exclusion set instead of a requirement.
    #[serde(default)]
    pub negated: bool,
}

impl SubQueryItem {
    pub fn required(cql: impl Into<String>, min_freq: u64) -> Self {
        Self {
            cql: cql.into(),
            min_freq,
            negated: false,
        }
    }

    pub fn excluded(cql: impl Into<String>) -> Self {
        Self {
            cql: cql.into(),
            min_freq: crate::defaults::PQUERY_MIN_FREQ,
            negated: true,
        }
    }
}

/// A complete paradigmatic query definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PQuerySpec {
    pub corpus: String,
    /// Attribute whose values are combined (e.g. `word`, `lemma`).
    pub attr: String,
    pub subqueries: Vec<SubQueryItem>,
}

impl PQuerySpec {
    pub fn new(corpus: impl Into<String>, attr: impl Into<String>) -> Self {
        Self {
            corpus: corpus.into(),
            attr: attr.into(),
            subqueries: Vec::new(),
        }
    }

    pub fn with_subquery(mut self, item: SubQueryItem) -> Self {
        self.subqueries.push(item);
        self
    }

    /// Reject definitions that cannot be evaluated, before any remote call.
    pub fn validate(&self) -> Result<()> {
        if self.corpus.trim().is_empty() {
            return Err(Error::InvalidInput("corpus is required".to_string()));
        }
        if self.attr.trim().is_empty() {
            return Err(Error::InvalidInput("attribute is required".to_string()));
        }
        if let Some(i) = self.subqueries.iter().position(|s| s.cql.trim().is_empty()) {
            return Err(Error::InvalidInput(format!("sub-query {} has no CQL", i)));
        }
        if !self.subqueries.iter().any(|s| !s.negated) {
            return Err(Error::InvalidCombination(
                "at least one sub-query must be non-negated".to_string(),
            ));
        }
        Ok(())
    }

    /// Form arguments recorded for the `paradigmatic` chain operation.
    pub fn to_form_args(&self) -> FormArgs {
        let mut args = FormArgs::new();
        args.insert("corpus".to_string(), JsonValue::from(self.corpus.clone()));
        args.insert("attr".to_string(), JsonValue::from(self.attr.clone()));
        args.insert(
            "subqueries".to_string(),
            serde_json::to_value(&self.subqueries).unwrap_or(JsonValue::Null),
        );
        args
    }

    /// Inverse of [`PQuerySpec::to_form_args`].
    pub fn from_form_args(args: &FormArgs) -> Result<Self> {
        let corpus = arg_text(args, &["corpus"])
            .ok_or_else(|| Error::InvalidInput("missing corpus".to_string()))?;
        let attr = arg_text(args, &["attr"])
            .ok_or_else(|| Error::InvalidInput("missing attr".to_string()))?;
        let subqueries = match args.get("subqueries") {
            Some(v) => serde_json::from_value(v.clone())?,
            None => Vec::new(),
        };
        Ok(Self {
            corpus,
            attr,
            subqueries,
        })
    }
}

/// One `(value, freq)` pair of a frequency list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FreqItem {
    pub value: String,
    pub freq: u64,
}

impl FreqItem {
    pub fn new(value: impl Into<String>, freq: u64) -> Self {
        Self {
            value: value.into(),
            freq,
        }
    }
}

/// Request for one frequency list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FreqRequest {
    pub corpus: String,
    pub attr: String,
    pub cql: String,
}

/// Frequency list, or a handle to the background task computing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FreqOutcome {
    Ready { items: Vec<FreqItem> },
    Pending { task: TaskHandle },
}

/// One row of a combined paradigmatic result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParadigmaticResultRow {
    pub value: String,
    /// Frequencies aligned with the sub-query list; 0 where absent.
    pub per_subquery_freq: Vec<u64>,
    /// Sum over non-negated sub-queries.
    pub total_freq: u64,
}

// =============================================================================
// BACKGROUND TASK TYPES
// =============================================================================

/// Handle of a server-side background task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle {
    pub task_id: String,
}

/// Status of a background task as reported by the status feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Finished,
    Failed,
}

/// One row of the task status feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub task_id: String,
    pub status: TaskStatus,
    /// Where to fetch the result once `Finished`.
    #[serde(default)]
    pub result_ref: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(pairs: &[(&str, JsonValue)]) -> FormArgs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_operation_kind_roundtrip_str() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.as_str().parse::<OperationKind>().unwrap(), kind);
        }
        assert!("merge".parse::<OperationKind>().is_err());
    }

    #[test]
    fn test_operation_kind_serialization() {
        let json = serde_json::to_string(&OperationKind::Subhits).unwrap();
        assert_eq!(json, "\"subhits\"");
        let parsed: OperationKind = serde_json::from_str("\"wordlist\"").unwrap();
        assert_eq!(parsed, OperationKind::Wordlist);
    }

    #[test]
    fn test_root_kinds() {
        let roots: Vec<_> = OperationKind::ALL
            .iter()
            .filter(|k| k.is_root())
            .copied()
            .collect();
        assert_eq!(
            roots,
            vec![
                OperationKind::Query,
                OperationKind::Paradigmatic,
                OperationKind::Wordlist,
                OperationKind::Keywords
            ]
        );
        for kind in OperationKind::ALL {
            assert_ne!(kind.is_root(), kind.is_concordance_step());
        }
    }

    #[test]
    fn test_supertype_buckets() {
        assert_eq!(OperationKind::Query.supertype(), Supertype::Concordance);
        assert_eq!(
            OperationKind::Paradigmatic.supertype(),
            Supertype::ParadigmaticQuery
        );
        assert_eq!(OperationKind::Wordlist.supertype(), Supertype::WordList);
        assert_eq!(OperationKind::Keywords.supertype(), Supertype::WordList);
    }

    #[test]
    fn test_supertype_parse_and_display() {
        assert_eq!(
            "paradigmatic_query".parse::<Supertype>().unwrap(),
            Supertype::ParadigmaticQuery
        );
        assert_eq!("wlist".parse::<Supertype>().unwrap(), Supertype::WordList);
        assert_eq!(Supertype::ParadigmaticQuery.to_string(), "paradigmatic query");
        assert!("notes".parse::<Supertype>().is_err());
    }

    #[test]
    fn test_persisted_id_validation() {
        assert!(PersistedId::new("aB3_x-9").is_ok());
        assert!(PersistedId::new("").is_err());
        assert!(PersistedId::new("a/b").is_err());
        assert!(PersistedId::new("a b").is_err());
        assert!(PersistedId::new("zażółć").is_err());
    }

    #[test]
    fn test_persisted_id_url_param() {
        let id = PersistedId::new("Xy12").unwrap();
        assert_eq!(id.to_url_param(), "~Xy12");
        assert_eq!(PersistedId::from_url_param("~Xy12").unwrap(), id);
        assert!(PersistedId::from_url_param("Xy12").is_err());
    }

    #[test]
    fn test_persisted_id_deserialize_rejects_unsafe() {
        let ok: PersistedId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(ok.as_str(), "abc");
        assert!(serde_json::from_str::<PersistedId>("\"a?b\"").is_err());
    }

    #[test]
    fn test_persisted_id_is_immutable() {
        let op = QueryOperation::new(OperationKind::Query, FormArgs::new());
        let id = PersistedId::new("q1").unwrap();
        let op = op.with_persisted_id(id.clone()).unwrap();
        // same id again is fine
        let op = op.with_persisted_id(id.clone()).unwrap();
        let err = op
            .clone()
            .with_persisted_id(PersistedId::new("q2").unwrap())
            .unwrap_err();
        assert_eq!(err, Error::AlreadyPersisted("q1".to_string()));
        assert_eq!(op.persisted_id(), Some(&id));
    }

    #[test]
    fn test_revise_creates_new_unpersisted_operation() {
        let original = QueryOperation::new(
            OperationKind::Query,
            args(&[("cql", json!("[word=\"dog\"]"))]),
        )
        .with_persisted_id(PersistedId::new("q1").unwrap())
        .unwrap()
        .with_result_size(120);

        let revised = original.revise(args(&[("cql", json!("[word=\"cat\"]"))]));
        assert_eq!(revised.kind, OperationKind::Query);
        assert!(!revised.is_persisted());
        assert_eq!(revised.result_size, None);
        assert!(!revised.same_query(&original));
        assert_eq!(original.persisted_id().unwrap().as_str(), "q1");
    }

    #[test]
    fn test_describe_operations() {
        let q = QueryOperation::new(
            OperationKind::Query,
            args(&[("cql", json!("[word=\"e.*\"]"))]),
        );
        assert_eq!(q.describe(), "query: [word=\"e.*\"]");

        let f = QueryOperation::new(
            OperationKind::Filter,
            args(&[("cql", json!("[tag=\"N.*\"]")), ("negative", json!(true))]),
        );
        assert_eq!(f.describe(), "filter: not [tag=\"N.*\"]");

        let s = QueryOperation::new(OperationKind::Sample, args(&[("rlines", json!(250))]));
        assert_eq!(s.describe(), "sample: 250 lines");

        let sh = QueryOperation::new(OperationKind::Shuffle, FormArgs::new());
        assert_eq!(sh.describe(), "shuffle");

        let wl = QueryOperation::new(
            OperationKind::Wordlist,
            args(&[("attr", json!("lemma")), ("pattern", json!("^ex"))]),
        );
        assert_eq!(wl.describe(), "wordlist: lemma ~ ^ex");
    }

    #[test]
    fn test_describe_paradigmatic() {
        let spec = PQuerySpec::new("syn2020", "word")
            .with_subquery(SubQueryItem::required("[word=\"e.*\"]", 1))
            .with_subquery(SubQueryItem::excluded("[tag=\"V.*\"]"));
        let op = QueryOperation::new(OperationKind::Paradigmatic, spec.to_form_args());
        assert_eq!(
            op.describe(),
            "paradigmatic: word [[word=\"e.*\"], ![tag=\"V.*\"]]"
        );
    }

    #[test]
    fn test_pquery_spec_validation() {
        let empty_corpus = PQuerySpec::new("", "word")
            .with_subquery(SubQueryItem::required("[word=\"a\"]", 1));
        assert!(matches!(
            empty_corpus.validate(),
            Err(Error::InvalidInput(_))
        ));

        let all_negated =
            PQuerySpec::new("c", "word").with_subquery(SubQueryItem::excluded("[tag=\"V.*\"]"));
        assert!(matches!(
            all_negated.validate(),
            Err(Error::InvalidCombination(_))
        ));

        let no_subqueries = PQuerySpec::new("c", "word");
        assert!(matches!(
            no_subqueries.validate(),
            Err(Error::InvalidCombination(_))
        ));

        let ok = PQuerySpec::new("c", "word")
            .with_subquery(SubQueryItem::required("[word=\"a.*\"]", 1))
            .with_subquery(SubQueryItem::excluded("[tag=\"V.*\"]"));
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_pquery_spec_form_args_inverse() {
        let spec = PQuerySpec::new("c", "lemma")
            .with_subquery(SubQueryItem::required("[word=\"a.*\"]", 3))
            .with_subquery(SubQueryItem::excluded("[tag=\"V.*\"]"));
        let back = PQuerySpec::from_form_args(&spec.to_form_args()).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn test_history_entry_display_label() {
        let mut entry = HistoryEntry {
            id: "h1".to_string(),
            query_id: PersistedId::new("q1").unwrap(),
            root_kind: OperationKind::Query,
            kind: OperationKind::Sort,
            form_args: args(&[("sortKey", json!("lemma/i"))]),
            label: None,
            archived: false,
            deleted: false,
            created_at: Utc::now(),
        };
        assert_eq!(entry.display_label(), "sort: lemma/i");
        entry.label = Some("my sort".to_string());
        assert_eq!(entry.display_label(), "my sort");
        entry.label = Some("   ".to_string());
        assert_eq!(entry.display_label(), "sort: lemma/i");
        assert_eq!(entry.supertype(), Supertype::Concordance);
    }

    #[test]
    fn test_history_filter_matches() {
        let entry = HistoryEntry {
            id: "h1".to_string(),
            query_id: PersistedId::new("q1").unwrap(),
            root_kind: OperationKind::Wordlist,
            kind: OperationKind::Wordlist,
            form_args: args(&[("attr", json!("lemma")), ("pattern", json!("^ex"))]),
            label: None,
            archived: false,
            deleted: false,
            created_at: Utc::now(),
        };
        assert!(HistoryFilter::default().matches(&entry));
        assert!(HistoryFilter::default()
            .with_supertype(Supertype::WordList)
            .matches(&entry));
        assert!(!HistoryFilter::default()
            .with_supertype(Supertype::Concordance)
            .matches(&entry));
        assert!(!HistoryFilter::default()
            .with_archived_only(true)
            .matches(&entry));
        assert!(HistoryFilter::default()
            .with_query_contains("LEMMA")
            .matches(&entry));
        assert!(!HistoryFilter::default()
            .with_query_contains("tag")
            .matches(&entry));

        let deleted = HistoryEntry {
            deleted: true,
            ..entry
        };
        assert!(!HistoryFilter::default().matches(&deleted));
    }

    #[test]
    fn test_history_filter_validate() {
        assert!(HistoryFilter::default().validate().is_ok());
        assert!(HistoryFilter::default().with_page(0, 10).validate().is_err());
        assert!(HistoryFilter::default().with_page(1, 0).validate().is_err());
        assert!(HistoryFilter::default()
            .with_page(1, crate::defaults::HISTORY_MAX_PAGE_SIZE + 1)
            .validate()
            .is_err());
    }

    #[test]
    fn test_freq_outcome_serialization() {
        let ready = FreqOutcome::Ready {
            items: vec![FreqItem::new("dog", 3)],
        };
        let json = serde_json::to_value(&ready).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["items"][0]["value"], "dog");

        let pending: FreqOutcome =
            serde_json::from_value(json!({"status": "pending", "task": {"task_id": "t9"}}))
                .unwrap();
        assert_eq!(
            pending,
            FreqOutcome::Pending {
                task: TaskHandle {
                    task_id: "t9".to_string()
                }
            }
        );
    }

    #[test]
    fn test_task_status_serialization() {
        let info: TaskInfo = serde_json::from_value(json!({
            "task_id": "t1",
            "status": "finished",
            "result_ref": "r1"
        }))
        .unwrap();
        assert_eq!(info.status, TaskStatus::Finished);
        assert_eq!(info.result_ref.as_deref(), Some("r1"));
        assert_eq!(info.error, None);
    }
}
