//! Types for the ingestion engine

use crate::error::IngestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Identifier of the listing collection (a complex number)
///
/// Immutable for the lifetime of a run. Only ASCII alphanumerics, `-` and
/// `_` are accepted since the id becomes a URL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct IngestionTarget(String);

impl IngestionTarget {
    /// Validates and wraps a target id
    pub fn parse(raw: &str) -> Result<Self, IngestError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IngestError::invalid_input("target id is empty"));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(IngestError::invalid_input(format!(
                "target id '{}' contains unsupported characters",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IngestionTarget {
    type Error = IngestError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<IngestionTarget> for String {
    fn from(target: IngestionTarget) -> Self {
        target.0
    }
}

impl From<u64> for IngestionTarget {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for IngestionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque key/value filters passed through verbatim to the endpoint
pub type FilterParams = BTreeMap<String, String>;

/// Caller supplied request authorization (headers and cookies)
///
/// The engine never inspects the values, it only forwards them.
#[derive(Clone, Default)]
pub struct AuthContext {
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
}

impl AuthContext {
    /// Creates an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds a cookie
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    /// Value of the `Cookie` header, if any cookie is set
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

// Values are credentials; only names are printed.
impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field(
                "headers",
                &self.headers.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            )
            .field(
                "cookies",
                &self.cookies.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// One page request, built per loop iteration
#[derive(Debug, Clone)]
pub struct PageRequest {
    /// Listing collection
    pub target: IngestionTarget,
    /// 1-based page index
    pub page_index: u32,
    /// Filters merged over the default superset
    pub filters: FilterParams,
}

/// One raw listing record, as returned by the source
///
/// No key is guaranteed; every accessor returns a neutral default when the
/// field is absent or has an unexpected type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    /// Wraps an existing JSON object
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Raw field access
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Field as text; numbers and booleans are rendered, everything else is ""
    pub fn text(&self, key: &str) -> String {
        match self.0.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }

    /// Field as a number; numeric strings are accepted
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.0.get(key) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }

    /// Field as an ordered list of strings
    ///
    /// A scalar string is treated as a one-element list.
    pub fn string_list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

impl From<Value> for RawRecord {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self(fields),
            _ => Self::default(),
        }
    }
}

/// Parsed page of the listing endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResult {
    /// Records of this page, in source order
    pub records: Vec<RawRecord>,
    /// Whether the source reports more pages
    pub has_more: bool,
}

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminationReason {
    /// A page came back with no records
    NoMoreRecords,
    /// The requested page limit was fetched
    PageLimitReached,
    /// The source reported no further pages
    SourceExhausted,
    /// A page fetch failed
    FetchFailed,
    /// The caller cancelled the run
    Cancelled,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::NoMoreRecords => "no_more_records",
            TerminationReason::PageLimitReached => "page_limit_reached",
            TerminationReason::SourceExhausted => "source_exhausted",
            TerminationReason::FetchFailed => "fetch_failed",
            TerminationReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Fetching { page: u32 },
    Draining { reason: TerminationReason },
    Done { reason: TerminationReason },
}

/// Bookkeeping of one ingestion run
///
/// Mutated only by the engine while the run is live. The termination reason
/// is set exactly once, after which the run is read-only.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionRun {
    id: Uuid,
    target: IngestionTarget,
    max_pages: u32,
    pages_fetched: u32,
    total_records: usize,
    started_at: DateTime<Utc>,
    last_success_at: Option<DateTime<Utc>>,
    termination_reason: Option<TerminationReason>,
}

impl IngestionRun {
    pub(crate) fn start(target: IngestionTarget, max_pages: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            max_pages,
            pages_fetched: 0,
            total_records: 0,
            started_at: Utc::now(),
            last_success_at: None,
            termination_reason: None,
        }
    }

    pub(crate) fn record_page(&mut self, records: usize) {
        debug_assert!(self.termination_reason.is_none());
        self.pages_fetched += 1;
        self.total_records += records;
        self.last_success_at = Some(Utc::now());
    }

    pub(crate) fn finish(&mut self, reason: TerminationReason) {
        debug_assert!(self.termination_reason.is_none(), "run terminated twice");
        if self.termination_reason.is_none() {
            self.termination_reason = Some(reason);
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target(&self) -> &IngestionTarget {
        &self.target
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    pub fn total_records(&self) -> usize {
        self.total_records
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_success_at(&self) -> Option<DateTime<Utc>> {
        self.last_success_at
    }

    /// `None` only while the run is live
    pub fn termination_reason(&self) -> Option<TerminationReason> {
        self.termination_reason
    }

    pub fn is_finished(&self) -> bool {
        self.termination_reason.is_some()
    }
}

/// Final operator-facing status of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStatus {
    pub pages_fetched: u32,
    pub total_records: usize,
    pub termination_reason: TerminationReason,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pages, {} records ({})",
            self.pages_fetched, self.total_records, self.termination_reason
        )
    }
}

/// Progress notifications emitted by the engine
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestEvent {
    /// A page was fetched and appended
    PageFetched {
        run_id: Uuid,
        target: IngestionTarget,
        page_index: u32,
        max_pages: u32,
        records_this_page: usize,
        total_records: usize,
        state: RunState,
        timestamp: DateTime<Utc>,
    },

    /// The run stopped; emitted exactly once per run
    RunCompleted {
        run_id: Uuid,
        target: IngestionTarget,
        pages_fetched: u32,
        total_records: usize,
        termination_reason: TerminationReason,
        error: Option<String>,
        #[serde(skip)]
        records: Arc<Vec<RawRecord>>,
        timestamp: DateTime<Utc>,
    },
}

impl IngestEvent {
    /// Get the run ID
    pub fn run_id(&self) -> Uuid {
        match self {
            IngestEvent::PageFetched { run_id, .. } => *run_id,
            IngestEvent::RunCompleted { run_id, .. } => *run_id,
        }
    }

    /// Get the event type as string
    pub fn event_type(&self) -> &'static str {
        match self {
            IngestEvent::PageFetched { .. } => "PAGE_FETCHED",
            IngestEvent::RunCompleted { .. } => "RUN_COMPLETED",
        }
    }
}

impl fmt::Display for IngestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestEvent::PageFetched {
                target,
                page_index,
                max_pages,
                records_this_page,
                ..
            } => write!(
                f,
                "[{}] page {}/{}: {} records",
                target, page_index, max_pages, records_this_page
            ),
            IngestEvent::RunCompleted {
                target,
                total_records,
                termination_reason,
                ..
            } => write!(
                f,
                "[{}] finished with {} records ({})",
                target, total_records, termination_reason
            ),
        }
    }
}
