//! Admin dashboard: completion matrix, submitted feedback and the workbook
//! export. Only accounts listed in `admin_users` may use it.

pub mod handlers;
pub mod types;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::AppState;

pub fn dashboard_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin", get(handlers::get_admin_dashboard))
        .route("/admin/export", get(handlers::export_workbook_download))
}
