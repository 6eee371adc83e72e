//! Feedback form controller.
//!
//! Per (interviewer, candidate) a record moves `not started -> in progress
//! -> submitted`. Opening a form hands out either the submitted record,
//! read-only, or a [`DraftForm`] that is the only way to edit or submit.
//! Every edit is saved right away; a failed save leaves the session's
//! mapping ahead of the store.

use std::collections::BTreeMap;

use panel_core::{
    now_iso, FeedbackMapping, FeedbackRecord, FeedbackStore, PanelConfig, StoreError,
};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum FormError {
    #[error("unknown candidate '{0}'")]
    UnknownCandidate(String),

    #[error("unknown criterion '{0}'")]
    UnknownCriterion(String),

    #[error("unknown form field '{0}'")]
    UnknownField(String),

    #[error("'{0}' is not a rating option")]
    InvalidRating(String),

    #[error("feedback for this candidate has already been submitted")]
    AlreadySubmitted,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The single value an edit changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormField {
    OverallRating,
    OverallNotes,
    CriterionRating(String),
    CriterionNotes(String),
}

impl FormField {
    /// Field names as posted by the panel page.
    pub fn parse(field: &str, criterion: Option<&str>) -> Result<Self, FormError> {
        let named = || {
            criterion
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .ok_or_else(|| FormError::UnknownCriterion(String::new()))
        };
        match field {
            "overall_rating" => Ok(Self::OverallRating),
            "overall_notes" => Ok(Self::OverallNotes),
            "criterion_rating" => Ok(Self::CriterionRating(named()?)),
            "criterion_notes" => Ok(Self::CriterionNotes(named()?)),
            other => Err(FormError::UnknownField(other.to_string())),
        }
    }
}

/// What the controller needs besides the session's mapping.
#[derive(Clone, Copy)]
pub struct FormContext<'a> {
    pub panel: &'a PanelConfig,
    pub store: &'a FeedbackStore,
    /// Use conditional saves that refuse to overwrite concurrent changes.
    pub conflict_detection: bool,
}

pub enum OpenedForm<'a> {
    Submitted(&'a FeedbackRecord),
    Draft(DraftForm<'a>),
}

/// Open the form for `candidate_id`. A draft is created in the mapping if
/// none exists yet; it is not saved until the first edit.
pub fn open<'a>(
    ctx: FormContext<'a>,
    mapping: &'a mut FeedbackMapping,
    interviewer: &str,
    candidate_id: &str,
) -> Result<OpenedForm<'a>, FormError> {
    if ctx.panel.candidate(candidate_id).is_none() {
        return Err(FormError::UnknownCandidate(candidate_id.to_string()));
    }

    let submitted = mapping
        .get(interviewer, candidate_id)
        .is_some_and(|r| r.submitted);
    if submitted {
        let record = mapping
            .get(interviewer, candidate_id)
            .ok_or_else(|| FormError::UnknownCandidate(candidate_id.to_string()))?;
        return Ok(OpenedForm::Submitted(record));
    }

    mapping.entry(interviewer, candidate_id);
    Ok(OpenedForm::Draft(DraftForm {
        ctx,
        mapping,
        interviewer: interviewer.to_string(),
        candidate_id: candidate_id.to_string(),
    }))
}

static EMPTY_RECORD: FeedbackRecord = FeedbackRecord {
    candidate_name: String::new(),
    overall_rating: String::new(),
    overall_notes: String::new(),
    criteria_ratings: BTreeMap::new(),
    criteria_notes: BTreeMap::new(),
    timestamp: String::new(),
    submitted: false,
};

/// An editable, not yet submitted record.
pub struct DraftForm<'a> {
    ctx: FormContext<'a>,
    mapping: &'a mut FeedbackMapping,
    interviewer: String,
    candidate_id: String,
}

impl<'a> DraftForm<'a> {
    pub fn record(&self) -> &FeedbackRecord {
        self.mapping
            .get(&self.interviewer, &self.candidate_id)
            .unwrap_or(&EMPTY_RECORD)
    }

    fn validate(&self, field: &FormField, value: &str) -> Result<(), FormError> {
        let panel = self.ctx.panel;
        match field {
            FormField::CriterionRating(c) | FormField::CriterionNotes(c)
                if panel.criterion(c).is_none() =>
            {
                return Err(FormError::UnknownCriterion(c.clone()));
            }
            _ => {}
        }
        match field {
            FormField::OverallRating | FormField::CriterionRating(_)
                if !panel.rating_options.contains(value) =>
            {
                Err(FormError::InvalidRating(value.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Set one field, stamp the record and save it.
    pub async fn edit(&mut self, field: FormField, value: String) -> Result<(), FormError> {
        self.validate(&field, &value)?;

        let candidate_name = self.ctx.panel.candidate_name(&self.candidate_id);
        let record = self.mapping.entry(&self.interviewer, &self.candidate_id);
        if record.submitted {
            return Err(FormError::AlreadySubmitted);
        }
        match field {
            FormField::OverallRating => record.overall_rating = value,
            FormField::OverallNotes => record.overall_notes = value,
            FormField::CriterionRating(c) => {
                record.criteria_ratings.insert(c, value);
            }
            FormField::CriterionNotes(c) => {
                record.criteria_notes.insert(c, value);
            }
        }
        record.candidate_name = candidate_name;
        record.timestamp = now_iso();

        self.persist().await
    }

    /// Mark the record submitted and save it. The draft is gone afterwards.
    pub async fn submit(mut self) -> Result<(), FormError> {
        let candidate_name = self.ctx.panel.candidate_name(&self.candidate_id);
        let record = self.mapping.entry(&self.interviewer, &self.candidate_id);
        record.submitted = true;
        record.candidate_name = candidate_name;
        record.timestamp = now_iso();

        self.persist().await?;
        info!(
            "Feedback submitted by '{}' for candidate {}",
            self.interviewer, self.candidate_id
        );
        Ok(())
    }

    /// Save the record. A conflicting save replaces the pair with the
    /// stored version, so reloading the page shows it and the next edit
    /// saves on top of it.
    async fn persist(&mut self) -> Result<(), FormError> {
        let store = self.ctx.store;
        if !self.ctx.conflict_detection {
            store
                .save(self.mapping, &self.interviewer, &self.candidate_id)
                .await?;
            return Ok(());
        }

        let saved = store
            .save_if_unchanged(self.mapping, &self.interviewer, &self.candidate_id)
            .await;
        match saved {
            Err(conflict @ StoreError::Conflict { .. }) => {
                if let Err(e) = store
                    .reload_entry(self.mapping, &self.interviewer, &self.candidate_id)
                    .await
                {
                    warn!(
                        "Could not reload feedback for '{}' on candidate {} after a conflict: {}",
                        self.interviewer, self.candidate_id, e
                    );
                }
                Err(conflict.into())
            }
            other => Ok(other?),
        }
    }
}
