//! Panel configuration: candidate roster, rubric, rating scale and accounts.
//!
//! The panel file is TOML. Everything except the roster and the rubric has a
//! default that mirrors a typical single-round interview deployment.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Deserialize;
use thiserror::Error;

/// Rating labels used when the panel file does not override them.
pub const DEFAULT_RATING_OPTIONS: [&str; 5] =
    ["I can't tell", "Low", "Moderate", "Strong", "Exceptional"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse panel file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid panel configuration: {0}")]
    Invalid(String),
}

/// A candidate being interviewed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub name: String,
}

/// One rubric dimension and the prompts shown to interviewers for it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Criterion {
    pub name: String,
    #[serde(default)]
    pub prompts: Vec<String>,
}

/// Ordered rating labels. The first label is the sentinel ("no assessment")
/// and carries no score; the rest score 0, 1, 2, ... in order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<String>")]
pub struct RatingScale {
    options: Vec<String>,
}

impl RatingScale {
    pub fn new(options: Vec<String>) -> Result<Self, ConfigError> {
        if options.len() < 2 {
            return Err(ConfigError::Invalid(
                "rating_options needs a sentinel and at least one scored label".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = options.iter().find(|o| !seen.insert(o.as_str())) {
            return Err(ConfigError::Invalid(format!(
                "duplicate rating option '{}'",
                dup
            )));
        }
        Ok(Self { options })
    }

    /// All labels, sentinel first.
    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn sentinel(&self) -> &str {
        &self.options[0]
    }

    /// Labels that carry a score, in rank order.
    pub fn scored(&self) -> &[String] {
        &self.options[1..]
    }

    pub fn contains(&self, label: &str) -> bool {
        self.options.iter().any(|o| o == label)
    }

    /// 0-based rank among the scored labels. `None` for the sentinel and for
    /// labels that are not on the scale.
    pub fn rank(&self, label: &str) -> Option<usize> {
        self.scored().iter().position(|o| o == label)
    }
}

impl Default for RatingScale {
    fn default() -> Self {
        Self {
            options: DEFAULT_RATING_OPTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TryFrom<Vec<String>> for RatingScale {
    type Error = ConfigError;

    fn try_from(options: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(options)
    }
}

/// A login account. `password_hash` is an argon2 PHC string.
#[derive(Clone, Deserialize)]
pub struct Credential {
    pub username: String,
    pub name: String,
    pub password_hash: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("name", &self.name)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_expiry_days")]
    pub expiry_days: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            expiry_days: default_expiry_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_lockout_minutes")]
    pub lockout_minutes: u32,
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            lockout_minutes: default_lockout_minutes(),
        }
    }
}

fn default_cookie_name() -> String {
    "interview_panel_cookie".to_string()
}

fn default_expiry_days() -> u32 {
    1
}

fn default_max_attempts() -> u32 {
    5
}

fn default_lockout_minutes() -> u32 {
    15
}

fn default_admin_users() -> Vec<String> {
    vec!["admin".to_string()]
}

/// Everything the panel needs to know about who is rated, on what, and by whom.
#[derive(Debug, Clone, Deserialize)]
pub struct PanelConfig {
    /// Local time after which the service refuses all requests.
    /// Written as a quoted string, e.g. `"2025-08-01T00:00:00"`.
    #[serde(default)]
    pub app_expires_at: Option<NaiveDateTime>,
    #[serde(default = "default_admin_users")]
    pub admin_users: Vec<String>,
    #[serde(default)]
    pub rating_options: RatingScale,
    pub candidates: Vec<Candidate>,
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub credentials: Vec<Credential>,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub login: LoginSettings,
}

impl PanelConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.candidates.is_empty() {
            return Err(ConfigError::Invalid("no candidates configured".to_string()));
        }
        if self.criteria.is_empty() {
            return Err(ConfigError::Invalid("no criteria configured".to_string()));
        }

        let mut ids = HashSet::new();
        for candidate in &self.candidates {
            if candidate.id.trim().is_empty() {
                return Err(ConfigError::Invalid("candidate with empty id".to_string()));
            }
            if !ids.insert(candidate.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate candidate id '{}'",
                    candidate.id
                )));
            }
        }

        let mut names = HashSet::new();
        for criterion in &self.criteria {
            if !names.insert(criterion.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate criterion '{}'",
                    criterion.name
                )));
            }
        }

        let mut usernames = HashSet::new();
        for credential in &self.credentials {
            if !usernames.insert(credential.username.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate username '{}'",
                    credential.username
                )));
            }
        }

        Ok(())
    }

    /// Criterion names in rubric order. This is the explicit column schema
    /// of the feedback table.
    pub fn criterion_names(&self) -> Vec<String> {
        self.criteria.iter().map(|c| c.name.clone()).collect()
    }

    pub fn criterion(&self, name: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.name == name)
    }

    pub fn candidate(&self, id: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    /// Display name for a candidate id, `Unknown_<id>` when not on the roster.
    pub fn candidate_name(&self, id: &str) -> String {
        self.candidate(id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| format!("Unknown_{}", id))
    }

    pub fn credential(&self, username: &str) -> Option<&Credential> {
        self.credentials.iter().find(|c| c.username == username)
    }

    pub fn is_admin(&self, username: &str) -> bool {
        self.admin_users.iter().any(|u| u == username)
    }

    /// Usernames of interviewers (every account that is not an admin), in
    /// configured order.
    pub fn panelists(&self) -> impl Iterator<Item = &str> {
        self.credentials
            .iter()
            .map(|c| c.username.as_str())
            .filter(|u| !self.is_admin(u))
    }
}
