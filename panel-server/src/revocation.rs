//! Logged-out sessions.
//!
//! A session cookie stays validly signed until it expires, so logging out
//! records the session id here. The ids live in their own worksheet next to
//! the feedback table (one row per id: `session_id`, `expires_at` in unix
//! seconds) and are read once at startup, so a logout survives a restart.

use std::collections::HashMap;
use std::sync::Arc;

use panel_core::{CellValue, SheetClient, SheetError};
use tokio::sync::RwLock;
use tracing::{debug, info};

pub struct RevokedSessions {
    sheet: Arc<dyn SheetClient>,
    /// session id -> expiry of its cookie
    revoked: RwLock<HashMap<String, i64>>,
}

impl RevokedSessions {
    /// Read the revoked ids, skipping those whose cookie has expired by
    /// `now` (unix seconds) and so can no longer be replayed.
    pub async fn load(sheet: Arc<dyn SheetClient>, now: i64) -> Result<Self, SheetError> {
        let rows = sheet.get_all_values().await?;
        let total = rows.len();
        let revoked: HashMap<String, i64> = rows
            .iter()
            .filter_map(|row| {
                let session_id = row.first()?.as_text();
                let expires_at = row.get(1)?.as_text().parse::<i64>().ok()?;
                (!session_id.is_empty() && expires_at > now).then_some((session_id, expires_at))
            })
            .collect();
        info!(
            "Loaded {} revoked sessions ({} expired or unreadable rows ignored)",
            revoked.len(),
            total - revoked.len()
        );
        Ok(Self {
            sheet,
            revoked: RwLock::new(revoked),
        })
    }

    pub async fn is_revoked(&self, session_id: &str) -> bool {
        self.revoked.read().await.contains_key(session_id)
    }

    /// Revoke a session whose cookie expires at `expires_at`. The id is
    /// refused in memory even when writing it to the store fails.
    pub async fn revoke(&self, session_id: &str, expires_at: i64) -> Result<(), SheetError> {
        let newly_revoked = self
            .revoked
            .write()
            .await
            .insert(session_id.to_string(), expires_at)
            .is_none();
        if !newly_revoked {
            debug!("Session already revoked");
            return Ok(());
        }
        self.sheet
            .append_row(vec![
                CellValue::from(session_id),
                CellValue::from(expires_at.to_string()),
            ])
            .await
    }

    pub async fn len(&self) -> usize {
        self.revoked.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
