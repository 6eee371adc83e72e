//! HTTP handlers for the admin dashboard.
//!
//! Both handlers reload the feedback from the store into the admin's
//! session first, so the dashboard reflects what every interviewer has
//! saved so far.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use chrono::Local;
use std::sync::Arc;
use tokio::sync::MutexGuard;
use tracing::error;

use panel_core::{export_file_name, export_workbook, XLSX_CONTENT_TYPE};

use super::types::DashboardData;
use crate::auth::current_session;
use crate::pages::{escape_html, fill_template, render_table};
use crate::session::{Session, SessionHandle};
use crate::{store_error_response, unauthenticated, wants_html, AppState};

const ADMIN_HTML_TEMPLATE: &str = include_str!("admin.html");

/// Resolve the caller's session and make sure it belongs to an admin.
#[allow(clippy::result_large_err)]
async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<SessionHandle, Response> {
    let handle = match current_session(state, headers).await {
        Ok(Some(handle)) => handle,
        Ok(None) => return Err(unauthenticated(headers)),
        Err(e) => return Err(store_error_response(&e)),
    };
    let is_admin = handle.lock().await.is_admin;
    if !is_admin {
        return Err((StatusCode::FORBIDDEN, "Admin access required").into_response());
    }
    Ok(handle)
}

/// Replace the session's mapping with a fresh read of the store.
async fn reload<'a>(
    state: &AppState,
    handle: &'a SessionHandle,
) -> Result<MutexGuard<'a, Session>, Response> {
    let mut session = handle.lock().await;
    match state.store.load().await {
        Ok(feedback) => {
            session.feedback = feedback;
            Ok(session)
        }
        Err(e) => {
            error!("Failed to reload feedback for admin dashboard: {}", e);
            Err(store_error_response(&e))
        }
    }
}

/// Handler: GET /admin
///
/// Completion matrix and feedback table, as HTML or JSON depending on the
/// Accept header.
pub async fn get_admin_dashboard(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let handle = match require_admin(&state, &headers).await {
        Ok(handle) => handle,
        Err(response) => return response,
    };
    let session = match reload(&state, &handle).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let data = DashboardData::new(&state.panel, &session.feedback, crate::get_app_version());

    if wants_html(&headers) {
        return Html(generate_admin_html(&data)).into_response();
    }
    Json(data).into_response()
}

fn generate_admin_html(data: &DashboardData) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let feedback = if data.feedback.is_empty() {
        "<p>No submitted feedback yet.</p>".to_string()
    } else {
        format!(
            "<p class=\"caption\">Only submitted feedback is listed.</p>\
             <div class=\"scroll\">{}</div>\
             <h3>Export to Excel</h3>\
             <p class=\"caption\">The workbook contains three sheets: all submitted feedback, \
             a summary by candidate with numeric averages, and a summary by interviewer.</p>\
             <a class=\"export\" href=\"/admin/export\">Download as Excel</a>",
            render_table(&data.feedback)
        )
    };

    fill_template(
        ADMIN_HTML_TEMPLATE,
        &[
            ("panelists", &data.summary.panelists.to_string()),
            ("candidates", &data.summary.candidates.to_string()),
            ("submitted", &data.summary.submitted.to_string()),
            ("in_progress", &data.summary.in_progress.to_string()),
            ("not_started", &data.summary.not_started.to_string()),
            ("completion_matrix", &render_table(&data.completion_matrix)),
            ("feedback", &feedback),
            ("version", &escape_html(&data.version)),
            ("timestamp", &timestamp),
        ],
    )
}

/// Handler: GET /admin/export
///
/// Download the feedback workbook.
pub async fn export_workbook_download(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let handle = match require_admin(&state, &headers).await {
        Ok(handle) => handle,
        Err(response) => return response,
    };
    let session = match reload(&state, &handle).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let bytes = match export_workbook(&state.panel, &session.feedback) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to build export workbook: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to build workbook").into_response();
        }
    };
    let filename = export_file_name(Local::now().naive_local());

    (
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response()
}
