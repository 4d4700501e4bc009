//! Core domain types for MeetNews enrichment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for task message payloads.
pub const MESSAGE_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// TaskId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for task identifiers (time-sortable, assigned at enqueue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a new time-sortable task identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// CandidateItem
// ---------------------------------------------------------------------------

/// A news article moving through the pipeline.
///
/// The body text is serialized as `original` so persisted `news_items`
/// keep the column format the web layer already reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateItem {
    /// Source URL.
    pub url: String,
    /// Article headline.
    #[serde(default)]
    pub title: Option<String>,
    /// Extracted article body.
    #[serde(default, rename = "original", alias = "text")]
    pub text: Option<String>,
    /// Condensed body, set once summarization succeeds.
    #[serde(default)]
    pub summary: Option<String>,
}

impl CandidateItem {
    /// Build a freshly fetched item (no summary yet).
    pub fn new(url: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: Some(title.into()),
            text: Some(text.into()),
            summary: None,
        }
    }

    /// Body text, or `""` when missing.
    pub fn text_str(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// True when the item carries non-blank body text.
    pub fn has_text(&self) -> bool {
        !self.text_str().trim().is_empty()
    }

    /// True when both title and text are present and non-blank.
    pub fn is_complete(&self) -> bool {
        self.has_text()
            && self
                .title
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// Task payloads
// ---------------------------------------------------------------------------

/// Payload of the orchestrator (`process_news`) task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessNewsRequest {
    /// Payload schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Record (meeting) to enrich.
    pub record_id: i64,
    /// Owner of the record.
    pub owner_id: i64,
    /// Summary the candidates are ranked against.
    pub summary_text: String,
    /// Keywords used to search for candidates.
    pub keywords: Vec<String>,
}

impl ProcessNewsRequest {
    pub fn new(record_id: i64, owner_id: i64, summary_text: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            version: MESSAGE_SCHEMA_VERSION,
            record_id,
            owner_id,
            summary_text: summary_text.into(),
            keywords,
        }
    }
}

/// Payload of the similarity ranking (`rank_similarity`) task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRequest {
    /// Payload schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Text the candidates are compared against.
    pub query_text: String,
    /// Candidates in fetch order.
    pub candidates: Vec<CandidateItem>,
    /// Number of items to keep.
    pub top_k: usize,
}

impl RankRequest {
    pub fn new(query_text: impl Into<String>, candidates: Vec<CandidateItem>, top_k: usize) -> Self {
        Self {
            version: MESSAGE_SCHEMA_VERSION,
            query_text: query_text.into(),
            candidates,
            top_k,
        }
    }
}

fn default_version() -> u32 {
    MESSAGE_SCHEMA_VERSION
}

// ---------------------------------------------------------------------------
// RankingMode
// ---------------------------------------------------------------------------

/// How the persisted selection was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMode {
    /// Ordered by semantic similarity to the summary.
    Similarity,
    /// Ranking was unavailable; first items in fetch order.
    Fallback,
}

impl RankingMode {
    /// Value stored in the `news_ranking` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Similarity => "similarity",
            Self::Fallback => "fallback",
        }
    }
}

impl std::str::FromStr for RankingMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "similarity" => Ok(Self::Similarity),
            "fallback" => Ok(Self::Fallback),
            other => Err(format!("unknown ranking mode: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// MeetingRecord
// ---------------------------------------------------------------------------

/// A stored meeting record, as read back from storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingRecord {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub created_dt: DateTime<Utc>,
    pub original_meeting: String,
    pub summary_meeting: Option<String>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    /// Enrichment result; `None` while pending, after a clear, or on early exit.
    #[serde(default)]
    pub news_items: Option<Vec<CandidateItem>>,
    #[serde(default)]
    pub news_ranking: Option<RankingMode>,
    /// When the record was last handed to a worker; `None` while pending.
    #[serde(default)]
    pub news_queued_at: Option<DateTime<Utc>>,
}

/// A row of the per-owner meeting listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingSummaryRow {
    pub id: i64,
    pub title: String,
    pub created_dt: DateTime<Utc>,
}

/// Fields needed to store a new meeting record.
#[derive(Debug, Clone)]
pub struct NewMeeting {
    pub user_id: i64,
    pub title: String,
    pub original_meeting: String,
    pub summary_meeting: String,
    pub keywords: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_roundtrip() {
        let id = TaskId::new();
        let s = id.to_string();
        let parsed: TaskId = s.parse().expect("parse TaskId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn candidate_item_uses_original_field() {
        let item = CandidateItem::new("https://news.example.com/a", "Headline", "Body text");
        let json = serde_json::to_value(&item).expect("serialize");
        assert_eq!(json["original"], "Body text");
        assert!(json["summary"].is_null());

        let parsed: CandidateItem =
            serde_json::from_str(r#"{"url":"u","title":"t","text":"body"}"#).expect("alias");
        assert_eq!(parsed.text.as_deref(), Some("body"));
    }

    #[test]
    fn completeness_requires_title_and_text() {
        let mut item = CandidateItem::new("u", "t", "body");
        assert!(item.is_complete());
        item.title = Some("   ".into());
        assert!(!item.is_complete());
        item.title = Some("t".into());
        item.text = None;
        assert!(!item.is_complete());
        assert!(!item.has_text());
    }

    #[test]
    fn process_news_request_defaults_version() {
        let json = r#"{"record_id":7,"owner_id":1,"summary_text":"s","keywords":["a"]}"#;
        let req: ProcessNewsRequest = serde_json::from_str(json).expect("deserialize");
        assert_eq!(req.version, MESSAGE_SCHEMA_VERSION);
        assert_eq!(req.record_id, 7);
    }

    #[test]
    fn ranking_mode_strings() {
        assert_eq!(RankingMode::Fallback.as_str(), "fallback");
        assert_eq!("similarity".parse::<RankingMode>(), Ok(RankingMode::Similarity));
        assert!("other".parse::<RankingMode>().is_err());
    }
}
