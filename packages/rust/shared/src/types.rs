//! Core domain types for the transcript corpus.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HansardError;

/// `retrieved_at` value for transcripts that have never been fetched.
///
/// Older than any `last_modified` the index reports, so new records are always due.
pub const EPOCH_SENTINEL: &str = "2000-01-01";

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// One document location observed in a shard of the remote index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Unique document location.
    pub location: String,
    /// The shard this entry was last observed in.
    pub source_partition: String,
    /// Remote-reported change date (ISO 8601, date granularity).
    pub last_modified: String,
}

/// Process-wide refresh bookkeeping for the discovery crawler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlCheckpoint {
    pub last_refresh_time: DateTime<Utc>,
    pub last_full_refresh_time: DateTime<Utc>,
}

impl CrawlCheckpoint {
    /// A fresh checkpoint with both reference points at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_refresh_time: now,
            last_full_refresh_time: now,
        }
    }

    /// The date at or before which a shard no longer needs refreshing.
    ///
    /// Index dates carry no time component, so the margin backs off a few days
    /// from the last refresh.
    pub fn refresh_cutoff(&self, margin_days: i64) -> NaiveDate {
        (self.last_refresh_time - Duration::days(margin_days)).date_naive()
    }

    /// The checkpoint after a completed refresh pass at `now`.
    pub fn refreshed(self, now: DateTime<Utc>) -> Self {
        Self {
            last_refresh_time: now,
            ..self
        }
    }
}

// ---------------------------------------------------------------------------
// Retrieval
// ---------------------------------------------------------------------------

/// The two transcript markup formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkupDialect {
    /// Modern tree-structured XML.
    Xml,
    /// Legacy SGML that must be repaired before it parses.
    Legacy,
}

impl MarkupDialect {
    /// Storage label for this dialect.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Legacy => "sgml",
        }
    }
}

impl fmt::Display for MarkupDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarkupDialect {
    type Err = HansardError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "xml" => Ok(Self::Xml),
            "sgml" | "legacy" => Ok(Self::Legacy),
            other => Err(HansardError::validation(format!(
                "unknown markup dialect: {other}"
            ))),
        }
    }
}

/// Per-document retrieval state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptRecord {
    pub location: String,
    pub last_modified: String,
    /// [`EPOCH_SENTINEL`] until the first successful fetch, RFC 3339 afterwards.
    pub retrieved_at: String,
    pub reference_page: Option<String>,
    pub pdf_link: Option<String>,
    pub markup_link: Option<String>,
    pub markup_dialect: Option<MarkupDialect>,
    /// `None` when the fetch happened but the content could not be resolved.
    pub raw_markup: Option<String>,
}

impl TranscriptRecord {
    /// A record is due for retrieval while its last fetch predates the remote change.
    pub fn is_due(&self) -> bool {
        self.retrieved_at.as_str() < self.last_modified.as_str()
    }
}

/// A stale transcript awaiting retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueTranscript {
    pub location: String,
    pub last_modified: String,
}

/// Everything one successful retrieval writes back to its record.
#[derive(Debug, Clone)]
pub struct RetrievedTranscript {
    pub location: String,
    pub retrieved_at: DateTime<Utc>,
    pub reference_page: String,
    pub pdf_link: Option<String>,
    pub markup_link: String,
    pub dialect: MarkupDialect,
    pub markup: Option<String>,
}

/// A transcript ready for normalization.
#[derive(Debug, Clone)]
pub struct StoredMarkup {
    pub location: String,
    pub pdf_link: Option<String>,
    pub dialect: MarkupDialect,
    pub markup: String,
}

// ---------------------------------------------------------------------------
// Corpus rows
// ---------------------------------------------------------------------------

/// One normalized sitting-day transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub session_id: i64,
    pub location: String,
    pub pdf_link: Option<String>,
    pub date: Option<String>,
    pub chamber: Option<String>,
}

/// A run of paragraphs sharing one computed debate title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Debate {
    pub debate_id: i64,
    pub session_id: i64,
    pub debate_no: i64,
    pub title: String,
}

/// One leaf text-bearing element of a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paragraph {
    pub para_id: i64,
    pub session_id: i64,
    pub sequence_number: i64,
    pub speaker_id: Option<String>,
    pub debate_id: i64,
    pub fragment_number: i64,
    pub fragment_type: Option<String>,
    pub text: String,
}

/// A structural tag that was open when a paragraph was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnclosingContextTag {
    pub session_id: i64,
    pub sequence_number: i64,
    pub tag: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn dialect_roundtrip() {
        for dialect in [MarkupDialect::Xml, MarkupDialect::Legacy] {
            let parsed: MarkupDialect = dialect.as_str().parse().expect("parse dialect");
            assert_eq!(parsed, dialect);
        }
        assert!("html".parse::<MarkupDialect>().is_err());
    }

    #[test]
    fn refresh_cutoff_backs_off_margin() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 1, 30, 0).unwrap();
        let checkpoint = CrawlCheckpoint::new(now);
        assert_eq!(
            checkpoint.refresh_cutoff(3),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
    }

    #[test]
    fn refreshed_keeps_full_refresh_time() {
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let checkpoint = CrawlCheckpoint::new(first).refreshed(later);
        assert_eq!(checkpoint.last_refresh_time, later);
        assert_eq!(checkpoint.last_full_refresh_time, first);
    }

    #[test]
    fn due_compares_against_sentinel() {
        let mut record = TranscriptRecord {
            location: "https://example.com/a".into(),
            last_modified: "2024-05-01".into(),
            retrieved_at: EPOCH_SENTINEL.into(),
            reference_page: None,
            pdf_link: None,
            markup_link: None,
            markup_dialect: None,
            raw_markup: None,
        };
        assert!(record.is_due());

        record.retrieved_at = "2024-05-02T10:00:00+00:00".into();
        assert!(!record.is_due());
    }
}
