//! Data shown on the admin dashboard.

use panel_core::{completion_matrix, feedback_table, FeedbackMapping, FeedbackStatus, PanelConfig, Table};
use serde::Serialize;

/// Completion counts over every (panelist, candidate) pair.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct CompletionSummary {
    pub panelists: usize,
    pub candidates: usize,
    pub submitted: usize,
    pub in_progress: usize,
    pub not_started: usize,
}

/// Full dashboard data for rendering.
#[derive(Debug, Serialize)]
pub struct DashboardData {
    pub version: String,
    pub summary: CompletionSummary,
    pub completion_matrix: Table,
    pub feedback: Table,
}

impl DashboardData {
    pub fn new(panel: &PanelConfig, mapping: &FeedbackMapping, version: String) -> Self {
        let mut summary = CompletionSummary {
            candidates: panel.candidates.len(),
            ..Default::default()
        };

        for panelist in panel.panelists() {
            summary.panelists += 1;
            for candidate in &panel.candidates {
                match mapping.status(panelist, &candidate.id) {
                    FeedbackStatus::Submitted => summary.submitted += 1,
                    FeedbackStatus::InProgress => summary.in_progress += 1,
                    FeedbackStatus::NotStarted => summary.not_started += 1,
                }
            }
        }

        Self {
            version,
            summary,
            completion_matrix: completion_matrix(panel, mapping),
            feedback: feedback_table(panel, mapping),
        }
    }
}
