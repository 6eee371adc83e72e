//! Workbook export of the admin report tables.

use rust_xlsxwriter::{Format, Workbook, XlsxError};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::PanelConfig;
use crate::feedback::FeedbackMapping;
use crate::report::{export_tables, Table, TableCell};

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to build workbook: {0}")]
    Workbook(#[from] XlsxError),

    #[error("table '{0}' does not fit in a worksheet")]
    TooLarge(String),
}

/// Most characters a single xlsx cell can hold.
pub const MAX_CELL_CHARS: usize = 32_767;

/// Clip text to what one cell can hold.
fn fit_cell<'a>(text: &'a str, sheet: &str) -> &'a str {
    match text.char_indices().nth(MAX_CELL_CHARS) {
        Some((cut, _)) => {
            warn!(
                "Truncating a {}-character cell in sheet '{}' to {} characters",
                text.chars().count(),
                sheet,
                MAX_CELL_CHARS
            );
            &text[..cut]
        }
        None => text,
    }
}

/// Render the tables as worksheets, one per table, in order.
pub fn tables_to_xlsx(tables: &[Table]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    for table in tables {
        let too_large = || ExportError::TooLarge(table.name.clone());
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&table.name)?;

        for (col, name) in table.columns.iter().enumerate() {
            let col = u16::try_from(col).map_err(|_| too_large())?;
            worksheet.write_string_with_format(0, col, name, &header)?;
        }
        for (row_index, row) in table.rows.iter().enumerate() {
            let row_number = u32::try_from(row_index + 1).map_err(|_| too_large())?;
            for (col, cell) in row.iter().enumerate() {
                let col = u16::try_from(col).map_err(|_| too_large())?;
                match cell {
                    TableCell::Empty => {}
                    TableCell::Number(n) => {
                        worksheet.write_number(row_number, col, *n)?;
                    }
                    TableCell::Text(s) => {
                        worksheet.write_string(row_number, col, fit_cell(s, &table.name))?;
                    }
                }
            }
        }
        worksheet.set_freeze_panes(1, 0)?;
        worksheet.autofit();
    }

    Ok(workbook.save_to_buffer()?)
}

/// Build the export workbook for a mapping.
pub fn export_workbook(panel: &PanelConfig, mapping: &FeedbackMapping) -> Result<Vec<u8>, ExportError> {
    let tables = export_tables(panel, mapping);
    let bytes = tables_to_xlsx(&tables)?;
    info!(
        "Exported {} sheets ({} feedback rows, {} bytes)",
        tables.len(),
        tables.first().map_or(0, |t| t.rows.len()),
        bytes.len()
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_panel;
    use crate::feedback::FeedbackRecord;

    #[test]
    fn test_workbook_is_a_zip_container() {
        let panel = sample_panel();
        let mut mapping = FeedbackMapping::new();
        mapping.insert(
            "alice",
            "1",
            FeedbackRecord {
                overall_rating: "Strong".to_string(),
                timestamp: "2025-07-01T10:00:00".to_string(),
                submitted: true,
                ..Default::default()
            },
        );

        let bytes = export_workbook(&panel, &mapping).unwrap();
        assert!(bytes.starts_with(b"PK\x03\x04"));
    }

    #[test]
    fn test_empty_export_still_has_feedback_sheet() {
        let panel = sample_panel();
        let bytes = export_workbook(&panel, &FeedbackMapping::new()).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn test_oversized_cell_is_truncated() {
        let mut table = Table::new("All_Feedback", vec!["Overall_Notes".to_string()]);
        table
            .rows
            .push(vec![TableCell::from("é".repeat(MAX_CELL_CHARS + 10))]);
        let bytes = tables_to_xlsx(&[table]).unwrap();
        assert!(bytes.starts_with(b"PK\x03\x04"));

        let long = "ab".repeat(MAX_CELL_CHARS);
        assert_eq!(fit_cell(&long, "t").chars().count(), MAX_CELL_CHARS);
        assert_eq!(fit_cell("short", "t"), "short");
    }

    #[test]
    fn test_invalid_sheet_name_is_reported() {
        let table = Table::new("bad/name", vec!["a".to_string()]);
        let err = tables_to_xlsx(&[table]).unwrap_err();
        assert!(matches!(err, ExportError::Workbook(_)));
    }
}
