//! Feedback store adapter.
//!
//! Translates between a [`FeedbackMapping`] and the rows of a
//! [`SheetClient`] table. `load` is a full scan; `save` is a single-row
//! upsert keyed by (interviewer, candidate id).
//!
//! # Table layout
//!
//! Row 1 is the header: the fixed columns, then one `CriteriaRating_<name>`
//! column per criterion, then one `CriteriaNotes_<name>` column per
//! criterion, both in rubric order. Every later row is one record.
//!
//! # Concurrency
//!
//! `save` is last-writer-wins: two sessions saving the same pair at the
//! same time may silently overwrite one another. `save_if_unchanged`
//! compares the stored `Timestamp` against the one the session last saw and
//! fails with [`StoreError::Conflict`] instead.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::feedback::{FeedbackMapping, FeedbackRecord};
use crate::sheet::{CellRange, CellValue, SheetClient, SheetError};

/// Columns every table starts with, in order.
/// Name of the worksheet the feedback table lives in.
pub const FEEDBACK_WORKSHEET: &str = "Feedback";

pub const FIXED_HEADERS: [&str; 7] = [
    "Interviewer",
    "Candidate_ID",
    "Candidate_Name",
    "Submitted",
    "Overall_Rating",
    "Overall_Notes",
    "Timestamp",
];

pub const RATING_COLUMN_PREFIX: &str = "CriteriaRating_";
pub const NOTES_COLUMN_PREFIX: &str = "CriteriaNotes_";

const INTERVIEWER_COLUMN: usize = 0;
const CANDIDATE_ID_COLUMN: usize = 1;
const TIMESTAMP_COLUMN: usize = 6;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store kept reporting the transient unavailable condition.
    #[error("feedback store unavailable after {attempts} attempts: {source}")]
    Unavailable {
        attempts: u32,
        #[source]
        source: SheetError,
    },

    #[error(transparent)]
    Sheet(#[from] SheetError),

    /// Another session wrote this pair since it was last read.
    #[error(
        "feedback for {interviewer}/{candidate_id} was changed elsewhere \
         (expected timestamp '{expected}', found '{found}'); reload and try again"
    )]
    Conflict {
        interviewer: String,
        candidate_id: String,
        expected: String,
        found: String,
    },
}

impl StoreError {
    /// Whether the same operation may succeed later without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Conflict { .. })
    }
}

/// Bounded fixed-delay retry for reads that hit the unavailable condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(2))
    }
}

/// The full header row for a criterion list.
pub fn canonical_header(criteria: &[String]) -> Vec<String> {
    let mut header: Vec<String> = FIXED_HEADERS.iter().map(|h| h.to_string()).collect();
    header.extend(criteria.iter().map(|c| format!("{}{}", RATING_COLUMN_PREFIX, c)));
    header.extend(criteria.iter().map(|c| format!("{}{}", NOTES_COLUMN_PREFIX, c)));
    header
}

fn cell_text(row: &[CellValue], column: Option<usize>) -> String {
    column
        .and_then(|i| row.get(i))
        .map(CellValue::as_text)
        .unwrap_or_default()
}

/// Length of a row ignoring trailing empty cells.
fn used_width(row: &[CellValue]) -> usize {
    row.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1)
}

/// Where each expected column sits in the stored header.
struct ColumnMap {
    interviewer: Option<usize>,
    candidate_id: Option<usize>,
    candidate_name: Option<usize>,
    submitted: Option<usize>,
    overall_rating: Option<usize>,
    overall_notes: Option<usize>,
    timestamp: Option<usize>,
    ratings: Vec<(String, Option<usize>)>,
    notes: Vec<(String, Option<usize>)>,
}

impl ColumnMap {
    fn new(header: &[CellValue], criteria: &[String]) -> Self {
        let names: Vec<String> = header.iter().map(CellValue::as_text).collect();
        let position = |name: &str| names.iter().position(|h| h == name);
        Self {
            interviewer: position("Interviewer"),
            candidate_id: position("Candidate_ID"),
            candidate_name: position("Candidate_Name"),
            submitted: position("Submitted"),
            overall_rating: position("Overall_Rating"),
            overall_notes: position("Overall_Notes"),
            timestamp: position("Timestamp"),
            ratings: criteria
                .iter()
                .map(|c| (c.clone(), position(&format!("{}{}", RATING_COLUMN_PREFIX, c))))
                .collect(),
            notes: criteria
                .iter()
                .map(|c| (c.clone(), position(&format!("{}{}", NOTES_COLUMN_PREFIX, c))))
                .collect(),
        }
    }

    fn record(&self, row: &[CellValue]) -> FeedbackRecord {
        let submitted = self
            .submitted
            .and_then(|i| row.get(i))
            .map(CellValue::as_bool)
            .unwrap_or(false);
        FeedbackRecord {
            candidate_name: cell_text(row, self.candidate_name),
            overall_rating: cell_text(row, self.overall_rating),
            overall_notes: cell_text(row, self.overall_notes),
            criteria_ratings: self
                .ratings
                .iter()
                .filter(|(_, column)| column.is_some())
                .map(|(name, column)| (name.clone(), cell_text(row, *column)))
                .collect(),
            criteria_notes: self
                .notes
                .iter()
                .filter(|(_, column)| column.is_some())
                .map(|(name, column)| (name.clone(), cell_text(row, *column)))
                .collect(),
            timestamp: cell_text(row, self.timestamp),
            submitted,
        }
    }
}

/// Synchronizes feedback records with the external row store.
///
/// The criterion list is the explicit column schema: `load` looks up exactly
/// those columns and ignores any others.
pub struct FeedbackStore {
    sheet: Arc<dyn SheetClient>,
    criteria: Vec<String>,
    retry: RetryPolicy,
}

impl FeedbackStore {
    pub fn new(sheet: Arc<dyn SheetClient>, criteria: Vec<String>) -> Self {
        Self {
            sheet,
            criteria,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn criteria(&self) -> &[String] {
        &self.criteria
    }

    pub fn header(&self) -> Vec<String> {
        canonical_header(&self.criteria)
    }

    /// Read every row, retrying only the unavailable condition.
    async fn read_all(&self) -> Result<Vec<Vec<CellValue>>, StoreError> {
        let mut attempt = 1;
        loop {
            match self.sheet.get_all_values().await {
                Ok(rows) => return Ok(rows),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    warn!(
                        "Feedback store unavailable (attempt {}/{}), retrying in {:?}: {}",
                        attempt, self.retry.max_attempts, self.retry.delay, e
                    );
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(StoreError::Unavailable {
                        attempts: attempt,
                        source: e,
                    })
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Read the whole table into a fresh mapping.
    ///
    /// Rows without an interviewer or candidate id are skipped. When a pair
    /// appears more than once, the later row wins.
    pub async fn load(&self) -> Result<FeedbackMapping, StoreError> {
        let values = self.read_all().await?;
        let mut mapping = FeedbackMapping::new();

        let mut rows = values.into_iter();
        let Some(header) = rows.next() else {
            info!("Feedback store is empty");
            return Ok(mapping);
        };
        let columns = ColumnMap::new(&header, &self.criteria);

        let mut skipped = 0usize;
        for row in rows {
            let interviewer = cell_text(&row, columns.interviewer);
            let candidate_id = cell_text(&row, columns.candidate_id);
            if interviewer.is_empty() || candidate_id.is_empty() {
                skipped += 1;
                continue;
            }
            let record = columns.record(&row);
            mapping.mark_durable(&interviewer, &candidate_id, record.timestamp.clone());
            mapping.insert(&interviewer, &candidate_id, record);
        }

        if skipped > 0 {
            debug!("Skipped {} feedback rows without interviewer or candidate", skipped);
        }
        info!("Loaded {} feedback records from store", mapping.len());
        Ok(mapping)
    }

    /// Upsert the record for one pair, last writer wins. A pair with no
    /// record is written as an empty draft.
    pub async fn save(
        &self,
        mapping: &mut FeedbackMapping,
        interviewer: &str,
        candidate_id: &str,
    ) -> Result<(), StoreError> {
        let record = mapping
            .get(interviewer, candidate_id)
            .cloned()
            .unwrap_or_default();
        self.upsert(interviewer, candidate_id, &record, None).await?;
        mapping.mark_durable(interviewer, candidate_id, record.timestamp);
        Ok(())
    }

    /// Like [`save`](Self::save), but refuses to overwrite a row whose
    /// `Timestamp` differs from the one this mapping last read or wrote.
    pub async fn save_if_unchanged(
        &self,
        mapping: &mut FeedbackMapping,
        interviewer: &str,
        candidate_id: &str,
    ) -> Result<(), StoreError> {
        let record = mapping
            .get(interviewer, candidate_id)
            .cloned()
            .unwrap_or_default();
        let expected = mapping
            .durable_timestamp(interviewer, candidate_id)
            .unwrap_or("")
            .to_string();
        self.upsert(interviewer, candidate_id, &record, Some(&expected))
            .await?;
        mapping.mark_durable(interviewer, candidate_id, record.timestamp);
        Ok(())
    }

    /// Replace one pair in `mapping` with what the store holds now and
    /// expect that version on the next conditional save. This is how a
    /// session recovers from [`StoreError::Conflict`]; its unsaved change
    /// to the pair is dropped.
    pub async fn reload_entry(
        &self,
        mapping: &mut FeedbackMapping,
        interviewer: &str,
        candidate_id: &str,
    ) -> Result<(), StoreError> {
        let stored = self.load().await?;
        let record = stored
            .get(interviewer, candidate_id)
            .cloned()
            .unwrap_or_default();
        mapping.mark_durable(interviewer, candidate_id, record.timestamp.clone());
        mapping.insert(interviewer, candidate_id, record);
        Ok(())
    }

    fn row_values(
        &self,
        interviewer: &str,
        candidate_id: &str,
        record: &FeedbackRecord,
    ) -> Vec<CellValue> {
        let mut row = vec![
            CellValue::from(interviewer),
            CellValue::from(candidate_id),
            CellValue::from(record.candidate_name.as_str()),
            CellValue::Bool(record.submitted),
            CellValue::from(record.overall_rating.as_str()),
            CellValue::from(record.overall_notes.as_str()),
            CellValue::from(record.timestamp.as_str()),
        ];
        row.extend(
            self.criteria
                .iter()
                .map(|c| CellValue::from(record.criterion_rating(c))),
        );
        row.extend(
            self.criteria
                .iter()
                .map(|c| CellValue::from(record.criterion_notes(c))),
        );
        row
    }

    async fn upsert(
        &self,
        interviewer: &str,
        candidate_id: &str,
        record: &FeedbackRecord,
        expected_timestamp: Option<&str>,
    ) -> Result<(), StoreError> {
        let header: Vec<CellValue> = self.header().into_iter().map(CellValue::from).collect();
        let width = header.len();
        let values = self.read_all().await?;

        match values.first() {
            None => {
                info!("Writing feedback header to empty store");
                self.sheet.insert_row(header, 1).await?;
            }
            Some(existing) if existing[..used_width(existing)] != header[..] => {
                info!("Feedback header differs from rubric, rewriting row 1");
                // Clear leftover cells of a wider previous header.
                let span = width.max(existing.len());
                let mut padded = header;
                padded.resize(span, CellValue::Empty);
                self.sheet
                    .update(CellRange::row_span(1, span), vec![padded])
                    .await?;
            }
            Some(_) => {}
        }

        let existing = values.iter().enumerate().skip(1).find(|(_, row)| {
            cell_text(row, Some(INTERVIEWER_COLUMN)) == interviewer
                && cell_text(row, Some(CANDIDATE_ID_COLUMN)) == candidate_id
        });

        if let Some(expected) = expected_timestamp {
            let found = existing
                .map(|(_, row)| cell_text(row, Some(TIMESTAMP_COLUMN)))
                .unwrap_or_default();
            if found != expected {
                warn!(
                    "Refusing to overwrite feedback for {}/{}: stored timestamp changed",
                    interviewer, candidate_id
                );
                return Err(StoreError::Conflict {
                    interviewer: interviewer.to_string(),
                    candidate_id: candidate_id.to_string(),
                    expected: expected.to_string(),
                    found,
                });
            }
        }

        let mut row = self.row_values(interviewer, candidate_id, record);
        match existing {
            Some((index, old)) => {
                let row_number = index + 1;
                let span = width.max(old.len());
                row.resize(span, CellValue::Empty);
                debug!(
                    "Updating feedback row {} for {}/{}",
                    row_number, interviewer, candidate_id
                );
                self.sheet
                    .update(CellRange::row_span(row_number, span), vec![row])
                    .await?;
            }
            None => {
                debug!("Appending feedback row for {}/{}", interviewer, candidate_id);
                self.sheet.append_row(row).await?;
            }
        }
        Ok(())
    }
}
