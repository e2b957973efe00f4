//! Provider configuration, loaded once from YAML at startup.
//!
//! The front-end file is a list of provider entries. The back-end file is a
//! single entry or a list; the back-end manager decides whether exactly one
//! of them is activated. Labels are lower-cased on load.

use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// A user allowed to talk to a front-end provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedUser {
    pub id: i64,
    pub name: String,
}

/// Configuration for one front-end provider.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrontendConfig {
    pub label: String,
    pub is_activated: bool,
    /// API token of the chat platform.
    pub token: String,
    pub authorized_users: Vec<AuthorizedUser>,
    /// Override of the platform API base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Long-poll timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_timeout: Option<u64>,
}

impl std::fmt::Debug for FrontendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontendConfig")
            .field("label", &self.label)
            .field("is_activated", &self.is_activated)
            .field("token", &"[REDACTED]")
            .field("authorized_users", &self.authorized_users)
            .finish_non_exhaustive()
    }
}

/// Configuration for one back-end provider.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    pub label: String,
    #[serde(default = "activated_by_default")]
    pub is_activated: bool,
    /// Service API URL.
    #[serde(default)]
    pub url: String,
    /// Service API version.
    #[serde(default)]
    pub version: String,
    /// Service API key.
    #[serde(default)]
    pub token: String,
    #[serde(rename = "assistantID", default)]
    pub assistant_id: String,
    /// Identifies this deployment to the service. A random one is used when absent.
    #[serde(rename = "userID", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("label", &self.label)
            .field("is_activated", &self.is_activated)
            .field("url", &self.url)
            .field("version", &self.version)
            .field("token", &"[REDACTED]")
            .field("assistant_id", &self.assistant_id)
            .finish_non_exhaustive()
    }
}

fn activated_by_default() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Parse front-end provider entries from YAML text.
pub fn parse_frontend(yaml: &str) -> Result<Vec<FrontendConfig>> {
    let mut configs: Vec<FrontendConfig> = serde_yaml::from_str(yaml)?;
    for config in &mut configs {
        config.label = normalize_label(&config.label);
    }
    Ok(configs)
}

/// Parse back-end provider entries from YAML text.
pub fn parse_backend(yaml: &str) -> Result<Vec<BackendConfig>> {
    let parsed: OneOrMany<BackendConfig> = serde_yaml::from_str(yaml)?;
    let mut configs: Vec<BackendConfig> = parsed.into();
    for config in &mut configs {
        config.label = normalize_label(&config.label);
    }
    Ok(configs)
}

pub fn load_frontend(path: &Path) -> Result<Vec<FrontendConfig>> {
    tracing::info!(filename = %path.display(), "parsing frontend config file");
    parse_frontend(&std::fs::read_to_string(path)?)
}

pub fn load_backend(path: &Path) -> Result<Vec<BackendConfig>> {
    tracing::info!(filename = %path.display(), "parsing backend config file");
    parse_backend(&std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const FRONTEND_YAML: &str = r#"
- label: Telegram
  isActivated: true
  token: "123:abc"
  authorizedUsers:
    - id: 42
      name: bob
- label: messenger
  isActivated: false
"#;

    #[test]
    fn parses_frontend_list() {
        let configs = parse_frontend(FRONTEND_YAML).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].label, "telegram");
        assert!(configs[0].is_activated);
        assert_eq!(configs[0].token, "123:abc");
        assert_eq!(
            configs[0].authorized_users,
            vec![AuthorizedUser {
                id: 42,
                name: "bob".to_string()
            }]
        );
        assert!(!configs[1].is_activated);
        assert!(configs[1].authorized_users.is_empty());
        assert_eq!(configs[1].poll_timeout, None);
    }

    #[test]
    fn parses_single_backend() {
        let yaml = r#"
label: WATSON
url: https://api.example.com/assistant
version: "2019-02-28"
token: secret
assistantID: abc-123
userID: 67e55044-10b1-426f-9247-bb680e5fe0c8
"#;
        let configs = parse_backend(yaml).unwrap();
        assert_eq!(configs.len(), 1);
        let config = &configs[0];
        assert_eq!(config.label, "watson");
        assert!(config.is_activated);
        assert_eq!(config.assistant_id, "abc-123");
        assert_eq!(
            config.user_id.unwrap().to_string(),
            "67e55044-10b1-426f-9247-bb680e5fe0c8"
        );
    }

    #[test]
    fn parses_backend_list() {
        let yaml = r#"
- label: watson
  isActivated: false
- label: dialogflow
"#;
        let configs = parse_backend(yaml).unwrap();
        assert_eq!(configs.len(), 2);
        assert!(!configs[0].is_activated);
        assert!(configs[1].is_activated);
        assert!(configs[1].user_id.is_none());
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let result = parse_frontend("- label: [unterminated");
        assert!(matches!(result, Err(Error::Yaml(_))));
    }

    #[test]
    fn debug_redacts_token() {
        let configs = parse_frontend(FRONTEND_YAML).unwrap();
        let debug = format!("{:?}", configs[0]);
        assert!(!debug.contains("123:abc"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frontend.yaml");
        std::fs::write(&path, FRONTEND_YAML).unwrap();

        let configs = load_frontend(&path).unwrap();
        assert_eq!(configs[0].label, "telegram");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_backend(&dir.path().join("missing.yaml"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
