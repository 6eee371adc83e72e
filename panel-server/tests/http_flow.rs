//! End-to-end flows through the router with an in-memory row store.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use tower::ServiceExt;

use panel_core::{
    hash_password, CellValue, FeedbackStore, InMemorySheet, PanelConfig, RetryPolicy,
    XLSX_CONTENT_TYPE,
};
use panel_server::auth::CookieSigner;
use panel_server::revocation::RevokedSessions;
use panel_server::{app_router, AppState};

const COOKIE_KEY: &str = "test-cookie-key-0123456789";

fn panel_toml(extra: &str) -> String {
    let alice = hash_password("alice-pw").unwrap();
    let bob = hash_password("bob-pw").unwrap();
    let admin = hash_password("admin-pw").unwrap();
    format!(
        r#"
{extra}
admin_users = ["admin"]

[[candidates]]
id = "1"
name = "Anne"

[[candidates]]
id = "2"
name = "Maria Paula"

[[criteria]]
name = "User research"
prompts = ["Design and conduct mixed method studies."]

[[criteria]]
name = "Research ops"
prompts = ["Tracking and managing participant pools."]

[[credentials]]
username = "alice"
name = "Alice"
password_hash = "{alice}"

[[credentials]]
username = "bob"
name = "Bob"
password_hash = "{bob}"

[[credentials]]
username = "admin"
name = "Admin"
password_hash = "{admin}"

[login]
max_attempts = 2
lockout_minutes = 15
"#
    )
}

/// Everything that outlives a server process: the panel file and both
/// worksheets of the store.
#[derive(Clone)]
struct Backend {
    panel: PanelConfig,
    feedback: Arc<InMemorySheet>,
    revoked: Arc<InMemorySheet>,
    conflict_detection: bool,
}

impl Backend {
    fn new(extra: &str) -> Self {
        Self {
            panel: PanelConfig::from_toml_str(&panel_toml(extra)).unwrap(),
            feedback: Arc::new(InMemorySheet::new()),
            revoked: Arc::new(InMemorySheet::new()),
            conflict_detection: false,
        }
    }

    /// Start a server over this backend with an empty session table.
    async fn start(&self) -> Router {
        let store = FeedbackStore::new(self.feedback.clone(), self.panel.criterion_names())
            .with_retry_policy(RetryPolicy::new(2, Duration::ZERO));
        let revoked = RevokedSessions::load(self.revoked.clone(), Utc::now().timestamp())
            .await
            .unwrap();
        let signer = CookieSigner::new(COOKIE_KEY).unwrap();
        app_router(Arc::new(AppState::new(
            self.panel.clone(),
            store,
            revoked,
            signer,
            self.conflict_detection,
        )))
    }
}

async fn test_app(extra: &str) -> (Router, Backend) {
    let backend = Backend::new(extra);
    (backend.start().await, backend)
}

async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

fn post_form(uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::post(uri).header(
        header::CONTENT_TYPE,
        "application/x-www-form-urlencoded",
    );
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

async fn login_attempt(app: &Router, username: &str, password: &str) -> Response<Body> {
    send(
        app,
        post_form(
            "/login",
            None,
            &format!("username={}&password={}", username, password),
        ),
    )
    .await
}

/// Log in and return the `name=value` part of the session cookie.
async fn login(app: &Router, username: &str, password: &str) -> String {
    let response = login_attempt(app, username, password).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = test_app("").await;
    let response = send(&app, get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_anonymous_panel_redirects_to_login() {
    let (app, _) = test_app("").await;
    let response = send(&app, get("/", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");

    let response = send(
        &app,
        post_form("/feedback/1/field", None, "field=overall_notes&value=x"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let (app, _) = test_app("").await;
    let response = login_attempt(&app, "alice", "nope").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert!(body_text(response).await.contains("Username/password is incorrect"));

    let response = login_attempt(&app, "mallory", "alice-pw").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_is_throttled_after_failures() {
    let (app, _) = test_app("").await;
    for _ in 0..2 {
        let response = login_attempt(&app, "alice", "nope").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // Locked even with the right password.
    let response = login_attempt(&app, "alice", "alice-pw").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(body_text(response)
        .await
        .contains("Too many login attempts. Please try again in 15 minutes."));

    // Other accounts are unaffected.
    login(&app, "bob", "bob-pw").await;
}

#[tokio::test]
async fn test_autosave_then_submit() {
    let (app, backend) = test_app("").await;
    let cookie = login(&app, "alice", "alice-pw").await;

    let response = send(&app, get("/?candidate=2", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Maria Paula"));

    let response = send(
        &app,
        post_form(
            "/feedback/2/field",
            Some(&cookie),
            "field=overall_rating&value=Strong",
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "in_progress");

    let response = send(
        &app,
        post_form(
            "/feedback/2/field",
            Some(&cookie),
            "field=criterion_rating&criterion=User+research&value=Exceptional",
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Saved right away: header plus one row.
    let rows = backend.feedback.snapshot().await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][0], CellValue::from("alice"));

    let response = send(&app, post_form("/feedback/2/submit", Some(&cookie), "")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/?candidate=2");

    let response = send(
        &app,
        post_form(
            "/feedback/2/field",
            Some(&cookie),
            "field=overall_notes&value=changed my mind",
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = send(&app, post_form("/feedback/2/submit", Some(&cookie), "")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_invalid_edits_are_rejected() {
    let (app, backend) = test_app("").await;
    let cookie = login(&app, "alice", "alice-pw").await;

    let cases = [
        ("/feedback/1/field", "field=overall_rating&value=Superb", StatusCode::BAD_REQUEST),
        (
            "/feedback/1/field",
            "field=criterion_notes&criterion=Charisma&value=x",
            StatusCode::BAD_REQUEST,
        ),
        ("/feedback/1/field", "field=shoe_size&value=9", StatusCode::BAD_REQUEST),
        ("/feedback/9/field", "field=overall_notes&value=x", StatusCode::NOT_FOUND),
    ];
    for (uri, body, expected) in cases {
        let response = send(&app, post_form(uri, Some(&cookie), body)).await;
        assert_eq!(response.status(), expected, "{} {}", uri, body);
        assert_eq!(body_json(response).await["status"], "error");
    }
    assert!(backend.feedback.snapshot().await.len() <= 1);
}

#[tokio::test]
async fn test_session_survives_restart() {
    let (app, backend) = test_app("").await;
    let cookie = login(&app, "alice", "alice-pw").await;
    let response = send(
        &app,
        post_form(
            "/feedback/1/field",
            Some(&cookie),
            "field=overall_notes&value=Clear+thinker",
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Same store and key, empty session table.
    let restarted = backend.start().await;
    let response = send(&restarted, get("/?candidate=1", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Clear thinker"));
}

#[tokio::test]
async fn test_logout_ends_session() {
    let (app, backend) = test_app("").await;
    let cookie = login(&app, "alice", "alice-pw").await;
    let response = send(&app, post_form("/logout", Some(&cookie), "")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let cleared = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));

    // The old cookie is still validly signed but no longer accepted.
    let response = send(&app, get("/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");
    let response = send(
        &app,
        post_form(
            "/feedback/1/field",
            Some(&cookie),
            "field=overall_notes&value=x",
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(backend.revoked.snapshot().await.len(), 1);

    // Nor after a restart.
    let restarted = backend.start().await;
    let response = send(&restarted, get("/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");

    // A fresh login works.
    let cookie = login(&restarted, "alice", "alice-pw").await;
    let response = send(&restarted, get("/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_conflicting_tab_recovers_after_refresh() {
    let mut backend = Backend::new("");
    backend.conflict_detection = true;
    let app = backend.start().await;
    let tab_one = login(&app, "alice", "alice-pw").await;
    let tab_two = login(&app, "alice", "alice-pw").await;

    let response = send(
        &app,
        post_form(
            "/feedback/1/field",
            Some(&tab_one),
            "field=overall_notes&value=from+tab+one",
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &app,
        post_form(
            "/feedback/1/field",
            Some(&tab_two),
            "field=overall_rating&value=Low",
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // The losing tab now shows what was stored and can keep editing.
    let response = send(&app, get("/?candidate=1", Some(&tab_two))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("from tab one"));

    let response = send(
        &app,
        post_form(
            "/feedback/1/field",
            Some(&tab_two),
            "field=overall_rating&value=Strong",
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let rows = backend.feedback.snapshot().await;
    assert_eq!(rows.len(), 2);
    assert!(rows[1].contains(&CellValue::from("from tab one")));
    assert!(rows[1].contains(&CellValue::from("Strong")));
}

#[tokio::test]
async fn test_admin_dashboard_and_export() {
    let (app, _) = test_app("").await;
    let alice = login(&app, "alice", "alice-pw").await;
    send(
        &app,
        post_form(
            "/feedback/1/field",
            Some(&alice),
            "field=overall_rating&value=Moderate",
        ),
    )
    .await;
    send(&app, post_form("/feedback/1/submit", Some(&alice), "")).await;

    // Interviewers cannot see the dashboard.
    let response = send(&app, get("/admin", Some(&alice))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let admin = login(&app, "admin", "admin-pw").await;
    let response = send(&app, get("/", Some(&admin))).await;
    assert_eq!(response.headers()[header::LOCATION], "/admin");

    let response = send(&app, get("/admin", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let data = body_json(response).await;
    assert_eq!(data["summary"]["submitted"], 1);
    assert_eq!(data["summary"]["not_started"], 3);
    assert_eq!(data["feedback"]["rows"].as_array().unwrap().len(), 1);

    // Admins do not give feedback.
    let response = send(
        &app,
        post_form(
            "/feedback/1/field",
            Some(&admin),
            "field=overall_notes&value=x",
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&app, get("/admin/export", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], XLSX_CONTENT_TYPE);
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"interview_feedback_"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    // xlsx is a zip archive
    assert_eq!(&bytes[..2], b"PK");
}

#[tokio::test]
async fn test_dashboard_sees_other_sessions_saves() {
    let (app, _) = test_app("").await;
    let admin = login(&app, "admin", "admin-pw").await;
    let response = send(&app, get("/admin", Some(&admin))).await;
    assert_eq!(body_json(response).await["summary"]["in_progress"], 0);

    let bob = login(&app, "bob", "bob-pw").await;
    send(
        &app,
        post_form("/feedback/2/field", Some(&bob), "field=overall_notes&value=x"),
    )
    .await;

    let response = send(&app, get("/admin", Some(&admin))).await;
    assert_eq!(body_json(response).await["summary"]["in_progress"], 1);
}

#[tokio::test]
async fn test_expired_application_refuses_everything() {
    let (app, _) = test_app("app_expires_at = \"2000-01-01T00:00:00\"").await;
    for uri in ["/health", "/login", "/admin"] {
        let response = send(&app, get(uri, None)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_text(response).await,
            "This application has expired and is no longer accessible."
        );
    }
}
