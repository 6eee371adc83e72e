//! Access gate: signed session cookies, login throttling and application
//! expiry.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Local, NaiveDateTime, Utc};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use panel_core::StoreError;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::session::{Session, SessionHandle};
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const EXPIRED_MESSAGE: &str = "This application has expired and is no longer accessible.";

/// Contents of a session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub session_id: String,
    pub username: String,
    /// Unix seconds after which the token is no longer accepted.
    pub expires_at: i64,
}

/// Signs and verifies session cookie values.
///
/// Wire form: `<session_id>.<base64url(username)>.<expires_at>.<hex hmac>`,
/// where the HMAC-SHA256 covers everything before the last dot.
#[derive(Clone)]
pub struct CookieSigner {
    mac: HmacSha256,
}

impl CookieSigner {
    pub fn new(key: &str) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(key.as_bytes())?,
        })
    }

    pub fn sign(&self, token: &SessionToken) -> String {
        let payload = format!(
            "{}.{}.{}",
            token.session_id,
            URL_SAFE_NO_PAD.encode(token.username.as_bytes()),
            token.expires_at
        );
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        format!("{}.{}", payload, signature)
    }

    /// Parse a cookie value. `None` when it is malformed, tampered with or
    /// expired at `now` (unix seconds).
    pub fn verify(&self, value: &str, now: i64) -> Option<SessionToken> {
        let (payload, signature_hex) = value.rsplit_once('.')?;
        let signature = hex::decode(signature_hex).ok()?;

        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        // Constant-time comparison
        mac.verify_slice(&signature).ok()?;

        let mut parts = payload.split('.');
        let session_id = parts.next()?.to_string();
        let username = URL_SAFE_NO_PAD.decode(parts.next()?).ok()?;
        let username = String::from_utf8(username).ok()?;
        let expires_at: i64 = parts.next()?.parse().ok()?;
        if parts.next().is_some() || expires_at <= now {
            return None;
        }

        Some(SessionToken {
            session_id,
            username,
            expires_at,
        })
    }
}

/// Value of cookie `name` from the request headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

pub fn set_cookie_header(name: &str, value: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name, value, max_age_secs
    )
}

pub fn clear_cookie_header(name: &str) -> String {
    set_cookie_header(name, "", 0)
}

#[derive(Debug, Clone, Copy)]
struct LoginAttempts {
    failures: u32,
    last_failure: DateTime<Utc>,
}

/// Per-username failed login counter.
///
/// A username is locked once it has `max_attempts` failures and the last one
/// was less than the lockout window ago. A successful login resets it.
pub struct LoginThrottle {
    max_attempts: u32,
    lockout: Duration,
    attempts: Mutex<HashMap<String, LoginAttempts>>,
}

impl LoginThrottle {
    pub fn new(max_attempts: u32, lockout_minutes: u32) -> Self {
        Self {
            max_attempts,
            lockout: Duration::minutes(i64::from(lockout_minutes)),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Err with the message to show when `username` is locked out.
    pub async fn check(&self, username: &str, now: DateTime<Utc>) -> Result<(), String> {
        let attempts = self.attempts.lock().await;
        match attempts.get(username) {
            Some(a) if a.failures >= self.max_attempts && now - a.last_failure < self.lockout => {
                Err(format!(
                    "Too many login attempts. Please try again in {} minutes.",
                    self.lockout.num_minutes()
                ))
            }
            _ => Ok(()),
        }
    }

    pub async fn record_failure(&self, username: &str, now: DateTime<Utc>) {
        let mut attempts = self.attempts.lock().await;
        let entry = attempts.entry(username.to_string()).or_insert(LoginAttempts {
            failures: 0,
            last_failure: now,
        });
        // A failure after the window has passed starts a fresh count.
        if now - entry.last_failure >= self.lockout {
            entry.failures = 0;
        }
        entry.failures += 1;
        entry.last_failure = now;
        if entry.failures >= self.max_attempts {
            warn!("Login for '{}' locked after {} failures", username, entry.failures);
        }
    }

    pub async fn record_success(&self, username: &str) {
        self.attempts.lock().await.remove(username);
    }
}

/// The verified session cookie of a request, if any. Cookies of
/// logged-out sessions are not accepted.
pub async fn session_token(state: &AppState, headers: &HeaderMap) -> Option<SessionToken> {
    let value = cookie_value(headers, &state.panel.session.cookie_name)?;
    let token = state.signer.verify(&value, Utc::now().timestamp())?;
    // Accounts removed from the panel file lose access immediately.
    state.panel.credential(&token.username)?;
    if state.revoked.is_revoked(&token.session_id).await {
        debug!("Refusing cookie of logged-out session for '{}'", token.username);
        return None;
    }
    Some(token)
}

/// The session a request belongs to, or `None` when it is not logged in.
///
/// A valid cookie whose session is unknown (the server restarted since
/// login) gets a fresh session with the mapping loaded from the store.
/// Logged-out sessions are never restored.
pub async fn current_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<SessionHandle>, StoreError> {
    let Some(token) = session_token(state, headers).await else {
        return Ok(None);
    };
    if let Some(handle) = state.sessions.get(&token.session_id).await {
        return Ok(Some(handle));
    }

    let feedback = state.store.load().await?;
    info!("Restoring session for '{}'", token.username);
    let session = Session {
        is_admin: state.panel.is_admin(&token.username),
        username: token.username,
        feedback,
    };
    Ok(Some(state.sessions.insert(token.session_id, session).await))
}

/// Whether the application has passed its configured expiry.
pub fn is_expired(expires_at: Option<NaiveDateTime>, now: NaiveDateTime) -> bool {
    expires_at.is_some_and(|at| now > at)
}

/// Refuse every request once the application has expired.
pub async fn enforce_app_expiry(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if is_expired(state.panel.app_expires_at, Local::now().naive_local()) {
        return (StatusCode::FORBIDDEN, EXPIRED_MESSAGE).into_response();
    }
    next.run(request).await
}
