//! Interviewer-facing routes: login, logout, the panel page and the
//! feedback autosave/submit endpoints.

use axum::{
    extract::{Form, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use panel_core::{verify_password, StoreError};

use crate::auth::{
    clear_cookie_header, current_session, session_token, set_cookie_header, SessionToken,
};
use crate::form::{self, FormError, FormField, OpenedForm};
use crate::pages::{encode_query_value, render_login, render_panel, FormView, PanelPage};
use crate::session::Session;
use crate::{store_error_response, store_error_status, unauthenticated, AppState};

const INVALID_CREDENTIALS: &str = "Username/password is incorrect";

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PanelQuery {
    pub candidate: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FieldForm {
    pub field: String,
    #[serde(default)]
    pub criterion: Option<String>,
    #[serde(default)]
    pub value: String,
}

fn form_error_status(e: &FormError) -> StatusCode {
    match e {
        FormError::UnknownCandidate(_) => StatusCode::NOT_FOUND,
        FormError::UnknownCriterion(_)
        | FormError::UnknownField(_)
        | FormError::InvalidRating(_) => StatusCode::BAD_REQUEST,
        FormError::AlreadySubmitted => StatusCode::CONFLICT,
        FormError::Store(e) => store_error_status(e),
    }
}

fn form_error_json(e: &FormError) -> Response {
    (
        form_error_status(e),
        Json(json!({ "status": "error", "error": e.to_string() })),
    )
        .into_response()
}

/// Handler: GET /login
pub async fn login_page(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if session_token(&state, &headers).await.is_some() {
        return Redirect::to("/").into_response();
    }
    Html(render_login(None, &crate::get_app_version())).into_response()
}

/// Handler: POST /login
///
/// The throttle is consulted before the password is checked, so a locked
/// account gets no further password checks.
pub async fn login_submit(
    State(state): State<Arc<AppState>>,
    Form(login): Form<LoginForm>,
) -> Response {
    let version = crate::get_app_version();
    let now = Utc::now();

    if let Err(message) = state.throttle.check(&login.username, now).await {
        warn!("Refusing login for locked account '{}'", login.username);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Html(render_login(Some(&message), &version)),
        )
            .into_response();
    }

    let stored_hash = state
        .panel
        .credential(&login.username)
        .map(|c| c.password_hash.clone());
    let password = login.password;
    let valid = match stored_hash {
        Some(hash) => tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .unwrap_or(false),
        None => false,
    };
    if !valid {
        state.throttle.record_failure(&login.username, now).await;
        info!("Failed login for '{}'", login.username);
        return (
            StatusCode::UNAUTHORIZED,
            Html(render_login(Some(INVALID_CREDENTIALS), &version)),
        )
            .into_response();
    }
    state.throttle.record_success(&login.username).await;

    let feedback = match state.store.load().await {
        Ok(feedback) => feedback,
        Err(e) => {
            error!("Failed to load feedback at login: {}", e);
            return store_error_response(&e);
        }
    };
    let is_admin = state.panel.is_admin(&login.username);
    let session_id = state
        .sessions
        .create(Session {
            username: login.username.clone(),
            is_admin,
            feedback,
        })
        .await;

    let settings = &state.panel.session;
    let lifetime = Duration::days(i64::from(settings.expiry_days));
    let cookie = state.signer.sign(&SessionToken {
        session_id,
        username: login.username.clone(),
        expires_at: (now + lifetime).timestamp(),
    });
    info!("'{}' logged in", login.username);

    let target = if is_admin { "/admin" } else { "/" };
    (
        [(
            header::SET_COOKIE,
            set_cookie_header(&settings.cookie_name, &cookie, lifetime.num_seconds()),
        )],
        Redirect::to(target),
    )
        .into_response()
}

/// Handler: POST /logout
pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&state, &headers).await {
        state.sessions.remove(&token.session_id).await;
        if let Err(e) = state.revoked.revoke(&token.session_id, token.expires_at).await {
            error!("Failed to persist logout of '{}': {}", token.username, e);
        }
        info!("'{}' logged out", token.username);
    }
    (
        [(
            header::SET_COOKIE,
            clear_cookie_header(&state.panel.session.cookie_name),
        )],
        Redirect::to("/login"),
    )
        .into_response()
}

/// Handler: GET /
///
/// Candidate selector, the selected candidate's form (or the submitted
/// feedback, read-only) and, once submitted, everyone's feedback for that
/// candidate.
pub async fn panel_page(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<PanelQuery>,
) -> Response {
    let handle = match current_session(&state, &headers).await {
        Ok(Some(handle)) => handle,
        Ok(None) => return Redirect::to("/login").into_response(),
        Err(e) => return store_error_response(&e),
    };
    let mut guard = handle.lock().await;
    if guard.is_admin {
        return Redirect::to("/admin").into_response();
    }

    let panel = &state.panel;
    let selected_id = match query.candidate {
        Some(id) => id,
        None => match panel.candidates.first() {
            Some(c) => c.id.clone(),
            None => return (StatusCode::NOT_FOUND, "No candidates configured").into_response(),
        },
    };

    let session = &mut *guard;
    let username = session.username.clone();
    let view = match form::open(
        state.form_context(),
        &mut session.feedback,
        &username,
        &selected_id,
    ) {
        Ok(OpenedForm::Submitted(record)) => FormView::ReadOnly(record.clone()),
        Ok(OpenedForm::Draft(draft)) => FormView::Editable(draft.record().clone()),
        Err(e) => return (form_error_status(&e), e.to_string()).into_response(),
    };
    let Some(selected) = panel.candidate(&selected_id) else {
        return (StatusCode::NOT_FOUND, "Unknown candidate").into_response();
    };

    let display_name = panel
        .credential(&username)
        .map(|c| c.name.as_str())
        .unwrap_or(username.as_str());
    let version = crate::get_app_version();
    let page = PanelPage {
        panel,
        username: &username,
        display_name,
        feedback: &session.feedback,
        selected,
        view,
        version: &version,
    };
    Html(render_panel(&page)).into_response()
}

/// Handler: POST /feedback/{candidate_id}/field
///
/// Set one field of the caller's draft and save it. Responds with the
/// record's new status.
pub async fn save_field(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(candidate_id): Path<String>,
    Form(input): Form<FieldForm>,
) -> Response {
    let handle = match current_session(&state, &headers).await {
        Ok(Some(handle)) => handle,
        Ok(None) => return unauthenticated(&headers),
        Err(e) => return form_error_json(&FormError::Store(e)),
    };
    let mut guard = handle.lock().await;
    if guard.is_admin {
        return (StatusCode::FORBIDDEN, "Admins do not give feedback").into_response();
    }

    let field = match FormField::parse(&input.field, input.criterion.as_deref()) {
        Ok(field) => field,
        Err(e) => return form_error_json(&e),
    };

    let session = &mut *guard;
    let username = session.username.clone();
    let mut draft = match form::open(
        state.form_context(),
        &mut session.feedback,
        &username,
        &candidate_id,
    ) {
        Ok(OpenedForm::Draft(draft)) => draft,
        Ok(OpenedForm::Submitted(_)) => return form_error_json(&FormError::AlreadySubmitted),
        Err(e) => return form_error_json(&e),
    };

    if let Err(e) = draft.edit(field, input.value).await {
        log_form_error(&username, &candidate_id, &e);
        return form_error_json(&e);
    }
    let record = draft.record();
    Json(json!({
        "status": record.status(),
        "timestamp": record.timestamp,
    }))
    .into_response()
}

/// Handler: POST /feedback/{candidate_id}/submit
pub async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(candidate_id): Path<String>,
) -> Response {
    let handle = match current_session(&state, &headers).await {
        Ok(Some(handle)) => handle,
        Ok(None) => return unauthenticated(&headers),
        Err(e) => return store_error_response(&e),
    };
    let mut guard = handle.lock().await;
    if guard.is_admin {
        return (StatusCode::FORBIDDEN, "Admins do not give feedback").into_response();
    }

    let session = &mut *guard;
    let username = session.username.clone();
    let draft = match form::open(
        state.form_context(),
        &mut session.feedback,
        &username,
        &candidate_id,
    ) {
        Ok(OpenedForm::Draft(draft)) => draft,
        Ok(OpenedForm::Submitted(_)) => {
            let e = FormError::AlreadySubmitted;
            return (form_error_status(&e), e.to_string()).into_response();
        }
        Err(e) => return (form_error_status(&e), e.to_string()).into_response(),
    };

    if let Err(e) = draft.submit().await {
        log_form_error(&username, &candidate_id, &e);
        return (form_error_status(&e), e.to_string()).into_response();
    }
    Redirect::to(&format!("/?candidate={}", encode_query_value(&candidate_id))).into_response()
}

fn log_form_error(username: &str, candidate_id: &str, e: &FormError) {
    match e {
        FormError::Store(StoreError::Conflict { .. }) => {
            warn!("Save conflict for '{}' on candidate {}: {}", username, candidate_id, e)
        }
        FormError::Store(_) => {
            error!("Failed to save feedback for '{}' on candidate {}: {}", username, candidate_id, e)
        }
        _ => {}
    }
}

pub fn panel_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(panel_page))
        .route("/login", get(login_page).post(login_submit))
        .route("/logout", post(logout))
        .route("/feedback/{candidate_id}/field", post(save_field))
        .route("/feedback/{candidate_id}/submit", post(submit_feedback))
}
