//! Shared fixtures for unit tests.

use panel_core::PanelConfig;

const SAMPLE_PANEL: &str = r#"
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
password_hash = "unused"

[[credentials]]
username = "admin"
name = "Admin"
password_hash = "unused"

[[credentials]]
username = "bob"
name = "Bob"
password_hash = "unused"
"#;

pub fn sample_panel() -> PanelConfig {
    PanelConfig::from_toml_str(SAMPLE_PANEL).unwrap()
}
