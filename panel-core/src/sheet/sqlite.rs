//! SQLite implementation of `SheetClient`.
//!
//! Each row of a named worksheet is stored as a JSON array of cells, keyed by
//! its 1-based row number. This keeps the spreadsheet access pattern (header
//! row, positional columns, whole-row rewrites) while surviving restarts.
//!
//! # Schema Versioning
//!
//! A `schema_version` table tracks the schema. To change the schema,
//! increment `CURRENT_SCHEMA_VERSION` and add a step to `run_migrations()`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction};
use tracing::warn;

use super::{clip_to_range, write_cells, CellRange, CellValue, SheetClient, SheetError};

const CURRENT_SCHEMA_VERSION: i64 = 1;

/// SQLite-backed row store.
///
/// Synchronous rusqlite calls run on `tokio::task::spawn_blocking`.
pub struct SqliteSheet {
    conn: Arc<Mutex<Connection>>,
    worksheet: String,
}

/// Busy and locked databases are the transient condition callers may retry;
/// everything else is a hard storage failure.
fn sheet_error(operation: &str, err: rusqlite::Error) -> SheetError {
    match &err {
        rusqlite::Error::SqliteFailure(code, _)
            if matches!(code.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            SheetError::unavailable(operation, err.to_string())
        }
        _ => SheetError::storage(operation, err.to_string()),
    }
}

fn decode_row(json: &str) -> Result<Vec<CellValue>, SheetError> {
    serde_json::from_str(json).map_err(|e| SheetError::storage("decode row", e.to_string()))
}

fn encode_row(row: &[CellValue]) -> Result<String, SheetError> {
    serde_json::to_string(row).map_err(|e| SheetError::storage("encode row", e.to_string()))
}

fn last_row(tx: &Transaction<'_>, worksheet: &str) -> Result<usize, SheetError> {
    let max: i64 = tx
        .query_row(
            "SELECT COALESCE(MAX(row_number), 0) FROM sheet_rows WHERE worksheet = ?1",
            params![worksheet],
            |row| row.get(0),
        )
        .map_err(|e| sheet_error("find last row", e))?;
    Ok(max.max(0) as usize)
}

impl SqliteSheet {
    /// Open (or create) the store at `path` and address the worksheet named
    /// `worksheet` inside it.
    ///
    /// The database is configured with `journal_mode = WAL`,
    /// `synchronous = FULL` and a 5 second busy timeout.
    pub fn open<P: AsRef<Path>>(path: P, worksheet: &str) -> Result<Self, SheetError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";

        if !is_in_memory {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        SheetError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref).map_err(|e| sheet_error("open database", e))?;

        // Feedback notes are personal data; keep the file private (Unix only).
        #[cfg(unix)]
        if !is_in_memory {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = std::fs::set_permissions(path_ref, permissions) {
                warn!("Failed to set restrictive permissions on store file: {}", e);
            }
        }

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| sheet_error("set journal_mode", e))?;
        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));
        if !journal_mode_ok {
            return Err(SheetError::storage(
                "configure journal_mode",
                format!(
                    "SQLite returned '{}' instead of 'wal'; the store needs WAL mode",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| sheet_error("configure database", e))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| sheet_error("get schema version", e))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            worksheet: worksheet.to_string(),
        })
    }

    /// A private in-memory database, for tests and dry runs.
    pub fn open_in_memory(worksheet: &str) -> Result<Self, SheetError> {
        Self::open(":memory:", worksheet)
    }

    pub fn worksheet(&self) -> &str {
        &self.worksheet
    }

    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), SheetError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(SheetError::storage(
                "schema version",
                format!(
                    "store schema version {} is newer than supported version {}",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }
        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS sheet_rows (
                    worksheet TEXT NOT NULL,
                    row_number INTEGER NOT NULL,
                    cells_json TEXT NOT NULL,
                    PRIMARY KEY (worksheet, row_number)
                );
                "#,
            )
            .map_err(|e| sheet_error("migration v1", e))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| sheet_error("update schema version", e))?;

        Ok(())
    }

    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, SheetError>
    where
        F: FnOnce(&mut Connection, &str) -> Result<T, SheetError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        let worksheet = self.worksheet.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| SheetError::storage(operation, "connection lock poisoned"))?;
            f(&mut conn, &worksheet)
        })
        .await
        .map_err(|e| SheetError::storage(operation, e.to_string()))?
    }
}

#[async_trait]
impl SheetClient for SqliteSheet {
    async fn get_all_values(&self) -> Result<Vec<Vec<CellValue>>, SheetError> {
        self.with_conn("get_all_values", |conn, worksheet| {
            let mut stmt = conn
                .prepare(
                    "SELECT row_number, cells_json FROM sheet_rows
                     WHERE worksheet = ?1 ORDER BY row_number",
                )
                .map_err(|e| sheet_error("get_all_values", e))?;
            let stored = stmt
                .query_map(params![worksheet], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|e| sheet_error("get_all_values", e))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| sheet_error("get_all_values", e))?;

            let mut rows: Vec<Vec<CellValue>> = Vec::with_capacity(stored.len());
            for (row_number, json) in stored {
                // Rows written past the end leave gaps; they read back empty.
                while (rows.len() as i64) < row_number - 1 {
                    rows.push(Vec::new());
                }
                rows.push(decode_row(&json)?);
            }
            Ok(rows)
        })
        .await
    }

    async fn insert_row(&self, values: Vec<CellValue>, index: usize) -> Result<(), SheetError> {
        if index == 0 {
            return Err(SheetError::InvalidRange(format!("row {}", index)));
        }
        let json = encode_row(&values)?;
        self.with_conn("insert_row", move |conn, worksheet| {
            let tx = conn.transaction().map_err(|e| sheet_error("insert_row", e))?;
            let at = index.min(last_row(&tx, worksheet)? + 1) as i64;
            // Two passes through negative numbers keep the primary key unique
            // while every following row moves down by one.
            tx.execute(
                "UPDATE sheet_rows SET row_number = -(row_number + 1)
                 WHERE worksheet = ?1 AND row_number >= ?2",
                params![worksheet, at],
            )
            .map_err(|e| sheet_error("insert_row", e))?;
            tx.execute(
                "UPDATE sheet_rows SET row_number = -row_number
                 WHERE worksheet = ?1 AND row_number < 0",
                params![worksheet],
            )
            .map_err(|e| sheet_error("insert_row", e))?;
            tx.execute(
                "INSERT INTO sheet_rows (worksheet, row_number, cells_json) VALUES (?1, ?2, ?3)",
                params![worksheet, at, json],
            )
            .map_err(|e| sheet_error("insert_row", e))?;
            tx.commit().map_err(|e| sheet_error("insert_row", e))
        })
        .await
    }

    async fn update(&self, range: CellRange, rows: Vec<Vec<CellValue>>) -> Result<(), SheetError> {
        let rows = clip_to_range(&range, rows);
        self.with_conn("update", move |conn, worksheet| {
            let tx = conn.transaction().map_err(|e| sheet_error("update", e))?;
            for (offset, values) in rows.iter().enumerate() {
                let row_number = (range.start.row + offset) as i64;
                let existing: Option<String> = tx
                    .query_row(
                        "SELECT cells_json FROM sheet_rows
                         WHERE worksheet = ?1 AND row_number = ?2",
                        params![worksheet, row_number],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(|e| sheet_error("update", e))?;
                let mut row = match existing {
                    Some(json) => decode_row(&json)?,
                    None => Vec::new(),
                };
                write_cells(&mut row, range.start.column, values);
                tx.execute(
                    "INSERT OR REPLACE INTO sheet_rows (worksheet, row_number, cells_json)
                     VALUES (?1, ?2, ?3)",
                    params![worksheet, row_number, encode_row(&row)?],
                )
                .map_err(|e| sheet_error("update", e))?;
            }
            tx.commit().map_err(|e| sheet_error("update", e))
        })
        .await
    }

    async fn append_row(&self, values: Vec<CellValue>) -> Result<(), SheetError> {
        let json = encode_row(&values)?;
        self.with_conn("append_row", move |conn, worksheet| {
            let tx = conn.transaction().map_err(|e| sheet_error("append_row", e))?;
            let next = (last_row(&tx, worksheet)? + 1) as i64;
            tx.execute(
                "INSERT INTO sheet_rows (worksheet, row_number, cells_json) VALUES (?1, ?2, ?3)",
                params![worksheet, next, json],
            )
            .map_err(|e| sheet_error("append_row", e))?;
            tx.commit().map_err(|e| sheet_error("append_row", e))
        })
        .await
    }
}
