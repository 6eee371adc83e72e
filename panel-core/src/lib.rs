pub mod config;
pub mod credentials;
pub mod export;
pub mod feedback;
pub mod report;
pub mod sheet;
pub mod store;
pub mod timestamp;

pub use config::{
    Candidate, ConfigError, Credential, Criterion, LoginSettings, PanelConfig, RatingScale,
    SessionSettings,
};
pub use credentials::{hash_password, verify_password, HashError};
pub use export::{export_workbook, tables_to_xlsx, ExportError, XLSX_CONTENT_TYPE};
pub use feedback::{FeedbackMapping, FeedbackRecord, FeedbackStatus};
pub use report::{
    candidate_summary, completion_matrix, criteria_average, export_tables, feedback_table,
    interviewer_summary, submitted_rows, FeedbackRow, Table, TableCell,
};
pub use sheet::{CellRange, CellRef, CellValue, InMemorySheet, SheetClient, SheetError, SqliteSheet};
pub use store::{canonical_header, FeedbackStore, RetryPolicy, StoreError, FEEDBACK_WORKSHEET};
pub use timestamp::{export_file_name, format_timestamp, now_iso, parse_timestamp};
