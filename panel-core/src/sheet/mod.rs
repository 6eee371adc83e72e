//! Row-store abstraction for the feedback table.
//!
//! The store is a single spreadsheet-like table of cells addressed with A1
//! ranges. `SheetClient` is the narrow interface the feedback adapter
//! needs; implementations provide the actual backend (in-memory, SQLite).

mod memory;
mod sqlite;

pub use memory::InMemorySheet;
pub use sqlite::SqliteSheet;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors a row store can report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SheetError {
    /// The backend is temporarily unable to serve the request (the
    /// "service unavailable" condition). Reads may be retried.
    #[error("store unavailable during {operation}: {message}")]
    Unavailable { operation: String, message: String },

    #[error("store failure during {operation}: {message}")]
    Storage { operation: String, message: String },

    #[error("invalid cell range '{0}'")]
    InvalidRange(String),
}

impl SheetError {
    pub fn unavailable(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// A single cell value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Text rendering as a spreadsheet shows it: booleans as `TRUE`/`FALSE`,
    /// integral numbers without a fractional part.
    pub fn as_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    /// Strict boolean: text equal to "true" in any case, or a truthy native
    /// value. Everything else is false.
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Empty => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::Text(s) => s.eq_ignore_ascii_case("true"),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Spreadsheet column letters for a 1-based column index: 1 -> `A`,
/// 26 -> `Z`, 27 -> `AA`.
pub fn column_letter(mut column: usize) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push(b'A' + rem as u8);
        column = (column - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Inverse of [`column_letter`]. `None` for anything but ASCII letters.
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    letters.chars().try_fold(0usize, |acc, c| {
        if c.is_ascii_alphabetic() {
            let value = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
            acc.checked_mul(26)?.checked_add(value)
        } else {
            None
        }
    })
}

/// A single cell address, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub row: usize,
    pub column: usize,
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letter(self.column), self.row)
    }
}

impl FromStr for CellRef {
    type Err = SheetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| SheetError::InvalidRange(s.to_string()))?;
        let (letters, digits) = s.split_at(split);
        let column = column_index(letters).ok_or_else(|| SheetError::InvalidRange(s.to_string()))?;
        let row: usize = digits
            .parse()
            .map_err(|_| SheetError::InvalidRange(s.to_string()))?;
        if row == 0 {
            return Err(SheetError::InvalidRange(s.to_string()));
        }
        Ok(Self { row, column })
    }
}

/// A rectangular A1 range such as `A2:J2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub start: CellRef,
    pub end: CellRef,
}

impl CellRange {
    /// The range covering `width` cells of one row, starting at column A.
    pub fn row_span(row: usize, width: usize) -> Self {
        Self {
            start: CellRef { row, column: 1 },
            end: CellRef {
                row,
                column: width.max(1),
            },
        }
    }

    pub fn rows(&self) -> usize {
        self.end.row - self.start.row + 1
    }

    pub fn columns(&self) -> usize {
        self.end.column - self.start.column + 1
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl FromStr for CellRange {
    type Err = SheetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = match s.split_once(':') {
            Some((a, b)) => (a.parse::<CellRef>()?, b.parse::<CellRef>()?),
            None => {
                let cell = s.parse::<CellRef>()?;
                (cell, cell)
            }
        };
        if end.row < start.row || end.column < start.column {
            return Err(SheetError::InvalidRange(s.to_string()));
        }
        Ok(Self { start, end })
    }
}

/// Narrow interface to a spreadsheet-like table.
///
/// Row and column numbers are 1-based; row 1 holds the headers by
/// convention of the callers, not of the store.
#[async_trait]
pub trait SheetClient: Send + Sync {
    /// Every row, first row first. Rows may have differing lengths.
    async fn get_all_values(&self) -> Result<Vec<Vec<CellValue>>, SheetError>;

    /// Insert a row so that it becomes row `index`, shifting later rows down.
    async fn insert_row(&self, values: Vec<CellValue>, index: usize) -> Result<(), SheetError>;

    /// Overwrite the cells of `range` with `rows`. Values beyond the range
    /// are ignored; missing values leave the cell untouched.
    async fn update(&self, range: CellRange, rows: Vec<Vec<CellValue>>) -> Result<(), SheetError>;

    /// Add a row after the last row.
    async fn append_row(&self, values: Vec<CellValue>) -> Result<(), SheetError>;
}

/// Write `values` over `row` starting at `start_column` (1-based), padding
/// the row with empty cells as needed. Shared by the backends.
pub(crate) fn write_cells(row: &mut Vec<CellValue>, start_column: usize, values: &[CellValue]) {
    let needed = start_column - 1 + values.len();
    if row.len() < needed {
        row.resize(needed, CellValue::Empty);
    }
    for (offset, value) in values.iter().enumerate() {
        row[start_column - 1 + offset] = value.clone();
    }
}

/// Clip an update payload to the shape of its range.
pub(crate) fn clip_to_range(range: &CellRange, rows: Vec<Vec<CellValue>>) -> Vec<Vec<CellValue>> {
    rows.into_iter()
        .take(range.rows())
        .map(|mut row| {
            row.truncate(range.columns());
            row
        })
        .collect()
}
