//! Admin reporting: completion matrix, flattened feedback table and the
//! per-candidate and per-interviewer summaries.
//!
//! Everything here is a pure function of the panel configuration and a
//! feedback mapping. Results are neutral [`Table`]s so the same data feeds
//! the HTML dashboard, the JSON API and the workbook export.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::config::{PanelConfig, RatingScale};
use crate::feedback::{FeedbackMapping, FeedbackRecord, FeedbackStatus};
use crate::timestamp::format_timestamp;

pub const ALL_FEEDBACK_SHEET: &str = "All_Feedback";
pub const CANDIDATE_SUMMARY_SHEET: &str = "Candidate_Summary";
pub const INTERVIEWER_SUMMARY_SHEET: &str = "Interviewer_Summary";
pub const COMPLETION_MATRIX: &str = "Completion_Matrix";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TableCell {
    Empty,
    Number(f64),
    Text(String),
}

impl TableCell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for TableCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Number(n) if n.fract() == 0.0 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for TableCell {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for TableCell {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<usize> for TableCell {
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl From<Option<f64>> for TableCell {
    fn from(n: Option<f64>) -> Self {
        n.map_or(Self::Empty, Self::Number)
    }
}

/// A named grid of cells with a header row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<TableCell>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at `row` in the column called `column`.
    pub fn cell(&self, row: usize, column: &str) -> Option<&TableCell> {
        let index = self.column(column)?;
        self.rows.get(row)?.get(index)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Mean scored rank of the configured criteria that carry a scored rating.
///
/// The sentinel and labels not on the scale are ignored. `None` when no
/// criterion is scored.
pub fn criteria_average(
    ratings: &BTreeMap<String, String>,
    criteria: &[String],
    scale: &RatingScale,
) -> Option<f64> {
    let ranks: Vec<usize> = criteria
        .iter()
        .filter_map(|c| ratings.get(c))
        .filter_map(|label| scale.rank(label))
        .collect();
    if ranks.is_empty() {
        return None;
    }
    let sum: usize = ranks.iter().sum();
    Some(round2(sum as f64 / ranks.len() as f64))
}

/// Interviewer x candidate grid of statuses and last-modified times.
///
/// Columns: `Interviewer`, then per candidate in roster order `<name>` and
/// `<name> Last Modified At`. One row per panelist, admins excluded.
pub fn completion_matrix(panel: &PanelConfig, mapping: &FeedbackMapping) -> Table {
    let mut columns = vec!["Interviewer".to_string()];
    for candidate in &panel.candidates {
        columns.push(candidate.name.clone());
        columns.push(format!("{} Last Modified At", candidate.name));
    }
    let mut table = Table::new(COMPLETION_MATRIX, columns);

    for panelist in panel.panelists() {
        let mut row = vec![TableCell::from(panelist)];
        for candidate in &panel.candidates {
            let record = mapping.get(panelist, &candidate.id);
            row.push(FeedbackStatus::of_entry(record).label().into());
            let modified = record.map(|r| format_timestamp(&r.timestamp)).unwrap_or_default();
            row.push(modified.into());
        }
        table.rows.push(row);
    }
    table
}

/// One submitted record with its display name and criteria average.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRow<'a> {
    pub candidate_name: String,
    pub interviewer: &'a str,
    pub candidate_id: &'a str,
    #[serde(skip)]
    pub record: &'a FeedbackRecord,
    pub criteria_average: Option<f64>,
}

/// Submitted records sorted by (candidate name, interviewer).
pub fn submitted_rows<'a>(panel: &PanelConfig, mapping: &'a FeedbackMapping) -> Vec<FeedbackRow<'a>> {
    let criteria = panel.criterion_names();
    let mut rows: Vec<FeedbackRow<'a>> = mapping
        .iter()
        .filter(|(_, _, record)| record.submitted)
        .map(|(interviewer, candidate_id, record)| FeedbackRow {
            candidate_name: panel.candidate_name(candidate_id),
            interviewer,
            candidate_id,
            record,
            criteria_average: criteria_average(
                &record.criteria_ratings,
                &criteria,
                &panel.rating_options,
            ),
        })
        .collect();
    rows.sort_by(|a, b| {
        (a.candidate_name.as_str(), a.interviewer).cmp(&(b.candidate_name.as_str(), b.interviewer))
    });
    rows
}

/// Every submitted record as one flat row.
pub fn feedback_table(panel: &PanelConfig, mapping: &FeedbackMapping) -> Table {
    let criteria = panel.criterion_names();
    let mut columns: Vec<String> = [
        "Candidate_Name",
        "Interviewer",
        "Candidate_ID",
        "Overall_Rating",
        "Overall_Notes",
        "Last_Modified_At",
        "Criteria_Avg_Rating",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();
    for criterion in &criteria {
        columns.push(format!("{}_Rating", criterion));
        columns.push(format!("{}_Notes", criterion));
    }
    let mut table = Table::new(ALL_FEEDBACK_SHEET, columns);

    for row in submitted_rows(panel, mapping) {
        let record = row.record;
        let mut cells = vec![
            TableCell::from(row.candidate_name.as_str()),
            row.interviewer.into(),
            row.candidate_id.into(),
            record.overall_rating.as_str().into(),
            record.overall_notes.as_str().into(),
            format_timestamp(&record.timestamp).into(),
            row.criteria_average.into(),
        ];
        for criterion in &criteria {
            cells.push(record.criterion_rating(criterion).into());
            cells.push(record.criterion_notes(criterion).into());
        }
        table.rows.push(cells);
    }
    table
}

/// Per-candidate counts over submitted records, candidates in table order.
pub fn candidate_summary(panel: &PanelConfig, mapping: &FeedbackMapping) -> Table {
    let scale = &panel.rating_options;
    let criteria = panel.criterion_names();

    let mut columns = vec![
        "Candidate_Name".to_string(),
        "Count_Submitted_Reviews".to_string(),
    ];
    columns.extend(scale.scored().iter().map(|r| format!("Overall_Count_{}", r)));
    columns.push("Overall_Notes".to_string());
    columns.push("Avg_Of_Interviewer_Avg".to_string());
    for criterion in &criteria {
        columns.extend(
            scale
                .scored()
                .iter()
                .map(|r| format!("{}_Count_{}", criterion, r)),
        );
    }
    let mut table = Table::new(CANDIDATE_SUMMARY_SHEET, columns);

    let rows = submitted_rows(panel, mapping);
    let mut groups: Vec<(&str, Vec<&FeedbackRow<'_>>)> = Vec::new();
    for row in &rows {
        match groups.last_mut() {
            Some((name, group)) if *name == row.candidate_name => group.push(row),
            _ => groups.push((row.candidate_name.as_str(), vec![row])),
        }
    }

    for (name, group) in groups {
        let mut cells = vec![TableCell::from(name), group.len().into()];
        for label in scale.scored() {
            let count = group
                .iter()
                .filter(|r| &r.record.overall_rating == label)
                .count();
            cells.push(count.into());
        }
        let notes: Vec<&str> = group
            .iter()
            .map(|r| r.record.overall_notes.as_str())
            .filter(|n| !n.is_empty())
            .collect();
        cells.push(notes.join("; ").into());

        let averages: Vec<f64> = group.iter().filter_map(|r| r.criteria_average).collect();
        let mean = (!averages.is_empty())
            .then(|| round2(averages.iter().sum::<f64>() / averages.len() as f64));
        cells.push(mean.into());

        for criterion in &criteria {
            for label in scale.scored() {
                let count = group
                    .iter()
                    .filter(|r| r.record.criterion_rating(criterion) == label)
                    .count();
                cells.push(count.into());
            }
        }
        table.rows.push(cells);
    }
    table
}

/// Per-interviewer counts, interviewers ascending.
///
/// Lists every interviewer with at least one submitted or in-progress
/// record. `Count_Started_Reviews` counts in-progress records; the overall
/// rating counts cover submitted records only.
pub fn interviewer_summary(panel: &PanelConfig, mapping: &FeedbackMapping) -> Table {
    let scale = &panel.rating_options;
    let mut columns = vec![
        "Interviewer".to_string(),
        "Count_Submitted_Reviews".to_string(),
        "Count_Started_Reviews".to_string(),
    ];
    columns.extend(
        scale
            .scored()
            .iter()
            .map(|r| format!("Count_Overall_Rating_{}", r)),
    );
    let mut table = Table::new(INTERVIEWER_SUMMARY_SHEET, columns);

    for interviewer in mapping.interviewers() {
        let Some(records) = mapping.interviewer(interviewer) else {
            continue;
        };
        let submitted: Vec<&FeedbackRecord> = records.values().filter(|r| r.submitted).collect();
        let started = records
            .values()
            .filter(|r| r.status() == FeedbackStatus::InProgress)
            .count();
        if submitted.is_empty() && started == 0 {
            continue;
        }

        let mut cells = vec![
            TableCell::from(interviewer),
            submitted.len().into(),
            started.into(),
        ];
        for label in scale.scored() {
            let count = submitted
                .iter()
                .filter(|r| &r.overall_rating == label)
                .count();
            cells.push(count.into());
        }
        table.rows.push(cells);
    }
    table
}

/// The tables that make up an export: the feedback table always, the
/// summaries only when something has been submitted.
pub fn export_tables(panel: &PanelConfig, mapping: &FeedbackMapping) -> Vec<Table> {
    let feedback = feedback_table(panel, mapping);
    if feedback.is_empty() {
        return vec![feedback];
    }
    vec![
        feedback,
        candidate_summary(panel, mapping),
        interviewer_summary(panel, mapping),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_panel;

    fn ratings(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn criteria() -> Vec<String> {
        vec!["A".to_string(), "B".to_string()]
    }

    fn submitted(overall: &str, notes: &str, research: &str, ops: &str, ts: &str) -> FeedbackRecord {
        FeedbackRecord {
            overall_rating: overall.to_string(),
            overall_notes: notes.to_string(),
            criteria_ratings: ratings(&[("User research", research), ("Research ops", ops)]),
            timestamp: ts.to_string(),
            submitted: true,
            ..Default::default()
        }
    }

    fn sample_mapping() -> FeedbackMapping {
        let mut mapping = FeedbackMapping::new();
        mapping.insert(
            "bob",
            "1",
            submitted("Strong", "solid", "Strong", "Low", "2025-07-01T10:00:00"),
        );
        mapping.insert(
            "alice",
            "1",
            submitted("Low", "", "Moderate", "I can't tell", "2025-07-01T11:30:00.123456"),
        );
        mapping.insert(
            "alice",
            "2",
            FeedbackRecord {
                overall_notes: "halfway".to_string(),
                timestamp: "2025-07-02T08:00:00".to_string(),
                ..Default::default()
            },
        );
        mapping.insert(
            "alice",
            "9",
            submitted("Moderate", "ghost", "I can't tell", "", "2025-07-03T08:00:00"),
        );
        mapping
    }

    #[test]
    fn test_criteria_average_ranks_scored_labels() {
        let scale = RatingScale::default();
        assert_eq!(
            criteria_average(&ratings(&[("A", "I can't tell"), ("B", "Low")]), &criteria(), &scale),
            Some(0.0)
        );
        assert_eq!(
            criteria_average(&ratings(&[("A", "Strong"), ("B", "Exceptional")]), &criteria(), &scale),
            Some(2.5)
        );
        assert_eq!(
            criteria_average(&ratings(&[("A", "I can't tell")]), &criteria(), &scale),
            None
        );
    }

    #[test]
    fn test_criteria_average_ignores_unknown_and_unconfigured() {
        let scale = RatingScale::default();
        let three: Vec<String> = vec!["A".into(), "B".into(), "C".into()];
        assert_eq!(
            criteria_average(
                &ratings(&[("A", "Great"), ("B", "Moderate"), ("Z", "Exceptional")]),
                &three,
                &scale
            ),
            Some(1.0)
        );
        assert_eq!(
            criteria_average(&ratings(&[("A", "Low"), ("B", "Low"), ("C", "Moderate")]), &three, &scale),
            Some(0.33)
        );
    }

    #[test]
    fn test_completion_matrix() {
        let panel = sample_panel();
        let table = completion_matrix(&panel, &sample_mapping());

        assert_eq!(
            table.columns,
            vec![
                "Interviewer",
                "Anne",
                "Anne Last Modified At",
                "Maria Paula",
                "Maria Paula Last Modified At"
            ]
        );
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.cell(0, "Interviewer"), Some(&TableCell::from("alice")));
        assert_eq!(table.cell(0, "Anne"), Some(&TableCell::from("✅ Submitted")));
        assert_eq!(
            table.cell(0, "Anne Last Modified At"),
            Some(&TableCell::from("07/01/25 11:30"))
        );
        assert_eq!(table.cell(0, "Maria Paula"), Some(&TableCell::from("📝 In Progress")));
        assert_eq!(table.cell(1, "Maria Paula"), Some(&TableCell::from("❌ Not Started")));
        assert_eq!(
            table.cell(1, "Maria Paula Last Modified At"),
            Some(&TableCell::from(""))
        );
    }

    #[test]
    fn test_feedback_table_sorted_and_submitted_only() {
        let panel = sample_panel();
        let table = feedback_table(&panel, &sample_mapping());

        assert_eq!(&table.columns[..7], &[
            "Candidate_Name",
            "Interviewer",
            "Candidate_ID",
            "Overall_Rating",
            "Overall_Notes",
            "Last_Modified_At",
            "Criteria_Avg_Rating",
        ]);
        assert_eq!(
            &table.columns[7..],
            &[
                "User research_Rating",
                "User research_Notes",
                "Research ops_Rating",
                "Research ops_Notes"
            ]
        );

        let order: Vec<(String, String)> = (0..table.rows.len())
            .map(|i| {
                (
                    table.cell(i, "Candidate_Name").unwrap().to_string(),
                    table.cell(i, "Interviewer").unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(
            order,
            vec![
                ("Anne".to_string(), "alice".to_string()),
                ("Anne".to_string(), "bob".to_string()),
                ("Unknown_9".to_string(), "alice".to_string()),
            ]
        );
        assert_eq!(table.cell(0, "Criteria_Avg_Rating"), Some(&TableCell::Number(1.0)));
        assert_eq!(table.cell(1, "Criteria_Avg_Rating"), Some(&TableCell::Number(1.0)));
        assert_eq!(table.cell(2, "Criteria_Avg_Rating"), Some(&TableCell::Empty));
        assert_eq!(
            table.cell(0, "Last_Modified_At"),
            Some(&TableCell::from("07/01/25 11:30"))
        );
    }

    #[test]
    fn test_candidate_summary() {
        let panel = sample_panel();
        let table = candidate_summary(&panel, &sample_mapping());

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.cell(0, "Candidate_Name"), Some(&TableCell::from("Anne")));
        assert_eq!(table.cell(0, "Count_Submitted_Reviews"), Some(&TableCell::Number(2.0)));
        assert_eq!(table.cell(0, "Overall_Count_Low"), Some(&TableCell::Number(1.0)));
        assert_eq!(table.cell(0, "Overall_Count_Strong"), Some(&TableCell::Number(1.0)));
        assert_eq!(table.cell(0, "Overall_Count_Exceptional"), Some(&TableCell::Number(0.0)));
        assert_eq!(table.cell(0, "Overall_Notes"), Some(&TableCell::from("solid")));
        assert_eq!(table.cell(0, "Avg_Of_Interviewer_Avg"), Some(&TableCell::Number(1.0)));
        assert_eq!(
            table.cell(0, "User research_Count_Moderate"),
            Some(&TableCell::Number(1.0))
        );
        assert_eq!(table.cell(0, "Research ops_Count_Low"), Some(&TableCell::Number(1.0)));
        assert!(table.column("Overall_Count_I can't tell").is_none());

        assert_eq!(table.cell(1, "Candidate_Name"), Some(&TableCell::from("Unknown_9")));
        assert_eq!(table.cell(1, "Avg_Of_Interviewer_Avg"), Some(&TableCell::Empty));
    }

    #[test]
    fn test_interviewer_summary_counts_in_progress() {
        let panel = sample_panel();
        let mut mapping = sample_mapping();
        mapping.insert("carol", "1", FeedbackRecord::default());
        let table = interviewer_summary(&panel, &mapping);

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.cell(0, "Interviewer"), Some(&TableCell::from("alice")));
        assert_eq!(table.cell(0, "Count_Submitted_Reviews"), Some(&TableCell::Number(2.0)));
        assert_eq!(table.cell(0, "Count_Started_Reviews"), Some(&TableCell::Number(1.0)));
        assert_eq!(table.cell(0, "Count_Overall_Rating_Low"), Some(&TableCell::Number(1.0)));
        assert_eq!(
            table.cell(0, "Count_Overall_Rating_Moderate"),
            Some(&TableCell::Number(1.0))
        );
        assert_eq!(table.cell(1, "Interviewer"), Some(&TableCell::from("bob")));
        assert_eq!(table.cell(1, "Count_Started_Reviews"), Some(&TableCell::Number(0.0)));
    }

    #[test]
    fn test_export_tables_skip_summaries_without_submissions() {
        let panel = sample_panel();
        let mut mapping = FeedbackMapping::new();
        mapping.entry("alice", "1").overall_notes = "draft".to_string();

        let tables = export_tables(&panel, &mapping);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, ALL_FEEDBACK_SHEET);
        assert!(tables[0].is_empty());

        let names: Vec<String> = export_tables(&panel, &sample_mapping())
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(
            names,
            vec![ALL_FEEDBACK_SHEET, CANDIDATE_SUMMARY_SHEET, INTERVIEWER_SUMMARY_SHEET]
        );
    }

    #[test]
    fn test_table_json_shape() {
        let mut table = Table::new("T", vec!["a".into(), "b".into(), "c".into()]);
        table
            .rows
            .push(vec![TableCell::from("x"), TableCell::Number(1.5), TableCell::Empty]);
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "T", "columns": ["a", "b", "c"], "rows": [["x", 1.5, null]]})
        );
    }
}
