//! Search criteria and results.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::index::MessageRecord;

/// Default page size.
pub const DEFAULT_LIMIT: usize = 100;

/// Filters for [`ArchiveReader::search`](super::ArchiveReader::search).
///
/// Text filters are case-insensitive substring matches. `to` matches either
/// the `To` or the `Cc` header. Date bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Substring of the subject.
    pub subject: Option<String>,
    /// Substring of the sender.
    pub from: Option<String>,
    /// Substring of any recipient.
    pub to: Option<String>,
    /// First day to include.
    pub date_from: Option<NaiveDate>,
    /// Last day to include.
    pub date_to: Option<NaiveDate>,
    /// Restrict to one account directory.
    pub account: Option<String>,
    /// Hits to skip.
    pub offset: usize,
    /// Maximum hits returned.
    pub limit: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            subject: None,
            from: None,
            to: None,
            date_from: None,
            date_to: None,
            account: None,
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl SearchQuery {
    /// Whether at least one filter is set.
    #[must_use]
    pub const fn has_criteria(&self) -> bool {
        self.subject.is_some()
            || self.from.is_some()
            || self.to.is_some()
            || self.date_from.is_some()
            || self.date_to.is_some()
            || self.account.is_some()
    }

    /// Whether `date` falls inside the range.
    #[must_use]
    pub fn includes_date(&self, date: NaiveDate) -> bool {
        self.date_from.is_none_or(|from| date >= from) && self.date_to.is_none_or(|to| date <= to)
    }

    /// Whether a record passes the text filters.
    #[must_use]
    pub fn matches(&self, record: &MessageRecord) -> bool {
        let subject_ok = self
            .subject
            .as_deref()
            .is_none_or(|s| contains_ignore_case(&record.subject, s));
        let from_ok = self
            .from
            .as_deref()
            .is_none_or(|s| contains_ignore_case(&record.from, s));
        let to_ok = self.to.as_deref().is_none_or(|s| {
            contains_ignore_case(&record.to, s) || contains_ignore_case(&record.cc, s)
        });
        subject_ok && from_ok && to_ok
    }
}

/// One matching message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Account directory name.
    pub account: String,
    /// Archived day.
    pub date: NaiveDate,
    /// Index record.
    pub message: MessageRecord,
}

/// One page of hits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
    /// Matches before pagination.
    pub total: usize,
    /// The requested page, newest day first.
    pub hits: Vec<SearchHit>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record() -> MessageRecord {
        MessageRecord::from_raw(
            "INBOX",
            1,
            "1_a.eml",
            b"From: Mario Rossi <mario@pec.it>\r\nTo: ufficio@pec.it\r\nCc: Contabilita <conti@pec.it>\r\nSubject: Fattura Gennaio\r\n\r\n",
        )
    }

    #[test]
    fn test_text_filters_ignore_case() {
        let query = SearchQuery {
            subject: Some("fattura".into()),
            from: Some("ROSSI".into()),
            ..SearchQuery::default()
        };
        assert!(query.matches(&record()));

        let miss = SearchQuery {
            subject: Some("nota".into()),
            ..SearchQuery::default()
        };
        assert!(!miss.matches(&record()));
    }

    #[test]
    fn test_recipient_matches_cc() {
        let query = SearchQuery {
            to: Some("conti@".into()),
            ..SearchQuery::default()
        };
        assert!(query.matches(&record()));
    }

    #[test]
    fn test_date_bounds_inclusive() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        let query = SearchQuery {
            date_from: Some(day(14)),
            date_to: Some(day(16)),
            ..SearchQuery::default()
        };
        assert!(query.includes_date(day(14)));
        assert!(query.includes_date(day(16)));
        assert!(!query.includes_date(day(17)));
        assert!(query.has_criteria());
        assert!(!SearchQuery::default().has_criteria());
    }
}
