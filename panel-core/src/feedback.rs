//! Feedback records, their lifecycle status, and the per-session mapping.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// One interviewer's feedback on one candidate.
///
/// Empty strings mean "not given". `submitted` only ever moves from
/// `false` to `true`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub candidate_name: String,
    pub overall_rating: String,
    pub overall_notes: String,
    pub criteria_ratings: BTreeMap<String, String>,
    pub criteria_notes: BTreeMap<String, String>,
    /// ISO-8601 local time of the last write.
    pub timestamp: String,
    pub submitted: bool,
}

impl FeedbackRecord {
    pub fn status(&self) -> FeedbackStatus {
        FeedbackStatus::of(self)
    }

    pub fn criterion_rating(&self, criterion: &str) -> &str {
        self.criteria_ratings
            .get(criterion)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn criterion_notes(&self, criterion: &str) -> &str {
        self.criteria_notes
            .get(criterion)
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Lifecycle of a feedback record: `NotStarted -> InProgress -> Submitted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    Submitted,
    InProgress,
    NotStarted,
}

impl FeedbackStatus {
    /// Classify a record. Submission dominates; otherwise any non-empty field
    /// means the record has been started. Whitespace and the sentinel rating
    /// count as non-empty.
    pub fn of(record: &FeedbackRecord) -> Self {
        if record.submitted {
            return Self::Submitted;
        }
        let started = !record.overall_rating.is_empty()
            || !record.overall_notes.is_empty()
            || record.criteria_ratings.values().any(|v| !v.is_empty())
            || record.criteria_notes.values().any(|v| !v.is_empty());
        if started {
            Self::InProgress
        } else {
            Self::NotStarted
        }
    }

    /// Classify a possibly missing record; a missing record has not started.
    pub fn of_entry(record: Option<&FeedbackRecord>) -> Self {
        record.map(Self::of).unwrap_or(Self::NotStarted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::InProgress => "in_progress",
            Self::NotStarted => "not_started",
        }
    }

    /// Label shown in the candidate selector and the completion matrix.
    pub fn label(self) -> &'static str {
        match self {
            Self::Submitted => "✅ Submitted",
            Self::InProgress => "📝 In Progress",
            Self::NotStarted => "❌ Not Started",
        }
    }
}

impl fmt::Display for FeedbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// interviewer -> candidate id -> record.
///
/// Owned by one session. Alongside the records it tracks, per key, the
/// timestamp last known to be in the store, which serves as the version for
/// conditional saves.
#[derive(Debug, Clone, Default)]
pub struct FeedbackMapping {
    records: BTreeMap<String, BTreeMap<String, FeedbackRecord>>,
    durable: HashMap<(String, String), String>,
}

impl FeedbackMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, interviewer: &str, candidate_id: &str) -> Option<&FeedbackRecord> {
        self.records.get(interviewer)?.get(candidate_id)
    }

    pub fn get_mut(&mut self, interviewer: &str, candidate_id: &str) -> Option<&mut FeedbackRecord> {
        self.records.get_mut(interviewer)?.get_mut(candidate_id)
    }

    /// The record for a pair, creating an empty draft if there is none.
    pub fn entry(&mut self, interviewer: &str, candidate_id: &str) -> &mut FeedbackRecord {
        self.records
            .entry(interviewer.to_string())
            .or_default()
            .entry(candidate_id.to_string())
            .or_default()
    }

    pub fn insert(
        &mut self,
        interviewer: &str,
        candidate_id: &str,
        record: FeedbackRecord,
    ) -> Option<FeedbackRecord> {
        self.records
            .entry(interviewer.to_string())
            .or_default()
            .insert(candidate_id.to_string(), record)
    }

    pub fn status(&self, interviewer: &str, candidate_id: &str) -> FeedbackStatus {
        FeedbackStatus::of_entry(self.get(interviewer, candidate_id))
    }

    /// All records of one interviewer, keyed by candidate id.
    pub fn interviewer(&self, interviewer: &str) -> Option<&BTreeMap<String, FeedbackRecord>> {
        self.records.get(interviewer)
    }

    /// Interviewers with at least one record, ascending.
    pub fn interviewers(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Every record as `(interviewer, candidate_id, record)`, ordered by
    /// interviewer then candidate id.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &FeedbackRecord)> {
        self.records.iter().flat_map(|(interviewer, by_candidate)| {
            by_candidate
                .iter()
                .map(move |(cid, record)| (interviewer.as_str(), cid.as_str(), record))
        })
    }

    pub fn len(&self) -> usize {
        self.records.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Timestamp of this pair as last read from or written to the store.
    pub fn durable_timestamp(&self, interviewer: &str, candidate_id: &str) -> Option<&str> {
        self.durable
            .get(&(interviewer.to_string(), candidate_id.to_string()))
            .map(String::as_str)
    }

    pub fn mark_durable(&mut self, interviewer: &str, candidate_id: &str, timestamp: String) {
        self.durable
            .insert((interviewer.to_string(), candidate_id.to_string()), timestamp);
    }
}
