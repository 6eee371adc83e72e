pub mod auth;
pub mod config;
pub mod dashboard;
pub mod form;
pub mod pages;
pub mod panel;
pub mod revocation;
pub mod session;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use axum::{
    http::{header, HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Json, Redirect, Response},
    routing::get,
    Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use panel_core::{FeedbackStore, PanelConfig, StoreError};

use auth::{CookieSigner, LoginThrottle};
use form::FormContext;
use revocation::RevokedSessions;
use session::SessionStore;

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Commit hashes are shown abbreviated to this many characters.
const VERSION_HASH_LEN: usize = 8;

fn abbreviate_hash(hash: &str) -> String {
    hash.chars().take(VERSION_HASH_LEN).collect()
}

/// Version shown in page footers and `/health`: the commit the deployment
/// was built from (`PANEL_GIT_HASH`), else the one cargo built, else
/// `unknown`.
pub fn get_app_version() -> String {
    option_env!("PANEL_GIT_HASH")
        .filter(|hash| !hash.is_empty())
        .or(built_info::GIT_COMMIT_HASH)
        .map(abbreviate_hash)
        .unwrap_or_else(|| "unknown".to_string())
}

pub struct AppState {
    pub panel: PanelConfig,
    pub store: FeedbackStore,
    pub sessions: SessionStore,
    pub revoked: RevokedSessions,
    pub signer: CookieSigner,
    pub throttle: LoginThrottle,
    pub conflict_detection: bool,
}

impl AppState {
    pub fn new(
        panel: PanelConfig,
        store: FeedbackStore,
        revoked: RevokedSessions,
        signer: CookieSigner,
        conflict_detection: bool,
    ) -> Self {
        let throttle = LoginThrottle::new(panel.login.max_attempts, panel.login.lockout_minutes);
        Self {
            panel,
            store,
            sessions: SessionStore::new(),
            revoked,
            signer,
            throttle,
            conflict_detection,
        }
    }

    pub fn form_context(&self) -> FormContext<'_> {
        FormContext {
            panel: &self.panel,
            store: &self.store,
            conflict_detection: self.conflict_detection,
        }
    }
}

/// Whether the client prefers an HTML response.
pub fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.to_lowercase().contains("text/html"))
}

/// Response for a request without a valid session: browsers go to the
/// login page, API clients get 401.
pub fn unauthenticated(headers: &HeaderMap) -> Response {
    if wants_html(headers) {
        return Redirect::to("/login").into_response();
    }
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "status": "error", "error": "Not logged in" })),
    )
        .into_response()
}

pub fn store_error_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::Conflict { .. } => StatusCode::CONFLICT,
        StoreError::Sheet(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn store_error_response(e: &StoreError) -> Response {
    (store_error_status(e), e.to_string()).into_response()
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "interview-panel",
        "version": get_app_version(),
    }))
}

pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(panel::panel_router())
        .merge(dashboard::dashboard_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth::enforce_app_expiry,
                )),
        )
        .with_state(state)
}
