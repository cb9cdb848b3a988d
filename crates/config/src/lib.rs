//! Configuration for the on-call notifier.
//!
//! The notifier reads a JSON document (by default `./config.json`) describing
//! which Opsgenie schedules to report and how the Mattermost message should
//! look, plus three credentials taken from the environment:
//!
//! - `OPSGENIE_API_KEY`: Opsgenie API key
//! - `MATTERMOST_API_KEY`: Mattermost token used for user lookups
//! - `MATTERMOST_WEBHOOK_URL`: incoming webhook receiving the message
//!
//! [`Settings::load`] validates both sources in a single pass and reports
//! every problem at once.
//!
//! # Example document
//!
//! ```json
//! {
//!   "schedules": { "ops_schedule": "Operations" },
//!   "title": ["Who is on call this week", "On call next week"],
//!   "titleLink": ["https://wiki.example.com/oncall"],
//!   "siteurl": "https://chat.example.com",
//!   "resolution": "alias_table",
//!   "aliases": { "jane.doe": "jdoe" }
//! }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod credentials;
pub mod error;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use credentials::Credentials;
pub use error::{ConfigError, Problems};

/// Default Opsgenie API endpoint (use `https://api.eu.opsgenie.com` for EU accounts).
pub const DEFAULT_OPSGENIE_URL: &str = "https://api.opsgenie.com";

/// Default attachment color for card messages.
pub const DEFAULT_COLOR: &str = "#ff0000";

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// How raw on-call identifiers become display identities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// Show the identifiers exactly as the scheduling service returned them
    Email,
    /// Look each identifier up in Mattermost and show `@username`
    #[default]
    RemoteLookup,
    /// Normalize the identifier and map it through the alias table
    AliasTable,
}

/// Shape of the Mattermost message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStyle {
    /// Markdown text only, one line per schedule
    Text,
    /// Headline plus an attachment with one field per schedule
    #[default]
    Card,
}

/// Whether schedules share one message or each get their own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    #[default]
    Combined,
    PerSchedule,
}

/// The JSON configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifierConfig {
    /// Opsgenie schedule name -> display name
    #[serde(default)]
    pub schedules: BTreeMap<String, String>,

    /// Titles for this week and next week, in that order
    #[serde(default, rename = "title")]
    pub titles: Vec<String>,

    /// Title links for this week and next week, in that order
    #[serde(default, rename = "titleLink")]
    pub title_links: Vec<String>,

    /// Name the webhook posts as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Avatar the webhook posts with
    #[serde(default, rename = "iconurl", skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,

    /// Mattermost server, used for user lookups and channel membership
    #[serde(default, rename = "siteurl", skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,

    /// Normalized identifier -> preferred display identity
    #[serde(default)]
    pub aliases: HashMap<String, String>,

    #[serde(default)]
    pub resolution: ResolutionMode,

    #[serde(default)]
    pub style: MessageStyle,

    #[serde(default)]
    pub delivery: Delivery,

    /// Add resolved on-call users to the webhook's channel
    #[serde(default)]
    pub auto_subscribe: bool,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default = "default_opsgenie_url")]
    pub opsgenie_url: String,
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

fn default_opsgenie_url() -> String {
    DEFAULT_OPSGENIE_URL.to_string()
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            schedules: BTreeMap::new(),
            titles: Vec::new(),
            title_links: Vec::new(),
            username: None,
            icon_url: None,
            site_url: None,
            aliases: HashMap::new(),
            resolution: ResolutionMode::default(),
            style: MessageStyle::default(),
            delivery: Delivery::default(),
            auto_subscribe: false,
            color: default_color(),
            opsgenie_url: default_opsgenie_url(),
        }
    }
}

impl NotifierConfig {
    /// Load the document from a JSON file.
    ///
    /// # Errors
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        debug!(
            path = %path.display(),
            schedules = config.schedules.len(),
            resolution = ?config.resolution,
            "Loaded notifier config"
        );

        Ok(config)
    }

    /// Record every problem with this document in `problems`.
    pub fn check(&self, problems: &mut Problems) {
        if self.schedules.is_empty() {
            problems.push("no schedules configured");
        }
        for (name, display) in &self.schedules {
            if name.trim().is_empty() {
                problems.push("schedule with an empty name");
            }
            if display.trim().is_empty() {
                problems.push(format!("schedule {name} has an empty display name"));
            }
        }

        if self.titles.len() > 2 {
            problems.push(format!(
                "title takes at most two entries (this week, next week), got {}",
                self.titles.len()
            ));
        }
        if self.title_links.len() > 2 {
            problems.push(format!(
                "titleLink takes at most two entries (this week, next week), got {}",
                self.title_links.len()
            ));
        }

        let needs_site = self.resolution == ResolutionMode::RemoteLookup || self.auto_subscribe;
        match self.site_url.as_deref().map(str::trim) {
            None | Some("") if needs_site => {
                problems.push("siteurl not set in the config");
            }
            Some(url) if !url.is_empty() && !is_http_url(url) => {
                problems.push(format!("siteurl is not a valid http(s) URL: {url}"));
            }
            _ => {}
        }

        if self.auto_subscribe && self.resolution != ResolutionMode::RemoteLookup {
            problems.push("autoSubscribe requires the remote_lookup resolution mode");
        }

        if !is_http_url(&self.opsgenie_url) {
            problems.push(format!(
                "opsgenieUrl is not a valid http(s) URL: {}",
                self.opsgenie_url
            ));
        }
    }

    /// The Mattermost server URL, if one is configured.
    #[must_use]
    pub fn site_url(&self) -> Option<&str> {
        self.site_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// A validated configuration document together with its credentials.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: NotifierConfig,
    pub credentials: Credentials,
}

impl Settings {
    /// Load the document at `path` and the credentials provided by `lookup`,
    /// validating both in one pass.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] listing every problem found, including
    /// an unreadable or malformed document.
    pub fn load<F>(path: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut problems = Problems::new();

        let credentials = Credentials::collect(lookup, &mut problems);

        let config = match NotifierConfig::from_path(path) {
            Ok(config) => {
                config.check(&mut problems);
                Some(config)
            }
            Err(e) => {
                problems.push(e.to_string());
                None
            }
        };

        problems.into_result()?;

        match (config, credentials) {
            (Some(config), Some(credentials)) => Ok(Self {
                config,
                credentials,
            }),
            _ => Err(ConfigError::Invalid(Problems::new())),
        }
    }
}

/// Whether `value` parses as an absolute http or https URL.
#[must_use]
pub fn is_http_url(value: &str) -> bool {
    url::Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ORIGINAL_FORMAT: &str = r#"{
        "schedules": { "opsA": "Team A", "opsB": "Team B" },
        "title": ["this week's title", "next week one"],
        "titleLink": ["https://wiki.example.com/oncall"],
        "username": "bot",
        "iconurl": "https://example.com/icon.png",
        "siteurl": "https://chat.example.com"
    }"#;

    fn env(name: &str) -> Option<String> {
        match name {
            credentials::ENV_OPSGENIE_API_KEY => Some("genie".to_string()),
            credentials::ENV_MATTERMOST_API_KEY => Some("token".to_string()),
            credentials::ENV_MATTERMOST_WEBHOOK_URL => {
                Some("https://chat.example.com/hooks/xyz".to_string())
            }
            _ => None,
        }
    }

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parses_original_document_format() {
        let config: NotifierConfig = serde_json::from_str(ORIGINAL_FORMAT).unwrap();

        assert_eq!(config.schedules.len(), 2);
        assert_eq!(config.schedules["opsA"], "Team A");
        assert_eq!(config.titles[1], "next week one");
        assert_eq!(config.title_links.len(), 1);
        assert_eq!(config.username.as_deref(), Some("bot"));
        assert_eq!(config.site_url(), Some("https://chat.example.com"));
        assert_eq!(config.resolution, ResolutionMode::RemoteLookup);
        assert_eq!(config.style, MessageStyle::Card);
        assert_eq!(config.delivery, Delivery::Combined);
        assert_eq!(config.color, DEFAULT_COLOR);
        assert_eq!(config.opsgenie_url, DEFAULT_OPSGENIE_URL);
    }

    #[test]
    fn test_parses_strategy_switches() {
        let config: NotifierConfig = serde_json::from_str(
            r#"{
                "schedules": { "opsA": "Team A" },
                "resolution": "alias_table",
                "style": "text",
                "delivery": "per_schedule",
                "aliases": { "jane.doe": "jdoe" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.resolution, ResolutionMode::AliasTable);
        assert_eq!(config.style, MessageStyle::Text);
        assert_eq!(config.delivery, Delivery::PerSchedule);
        assert_eq!(config.aliases["jane.doe"], "jdoe");
    }

    #[test]
    fn test_site_url_only_required_for_remote_lookup() {
        let mut config = NotifierConfig {
            schedules: BTreeMap::from([("opsA".to_string(), "Team A".to_string())]),
            resolution: ResolutionMode::AliasTable,
            ..NotifierConfig::default()
        };
        let mut problems = Problems::new();
        config.check(&mut problems);
        assert!(problems.is_empty());

        config.resolution = ResolutionMode::RemoteLookup;
        let mut problems = Problems::new();
        config.check(&mut problems);
        assert_eq!(problems.iter().collect::<Vec<_>>(), vec!["siteurl not set in the config"]);
    }

    #[test]
    fn test_check_collects_every_problem() {
        let config = NotifierConfig {
            titles: vec!["a".into(), "b".into(), "c".into()],
            auto_subscribe: true,
            resolution: ResolutionMode::Email,
            site_url: Some("ftp://chat".to_string()),
            ..NotifierConfig::default()
        };
        let mut problems = Problems::new();
        config.check(&mut problems);

        assert_eq!(problems.len(), 4);
    }

    #[test]
    fn test_settings_load() {
        let file = write_config(ORIGINAL_FORMAT);
        let settings = Settings::load(file.path(), env).unwrap();

        assert_eq!(settings.config.schedules.len(), 2);
        assert_eq!(settings.credentials.opsgenie_api_key, "genie");
    }

    #[test]
    fn test_settings_load_reports_config_and_credentials_together() {
        let file = write_config("{ not json");
        let err = Settings::load(file.path(), |_| None).unwrap_err();

        let ConfigError::Invalid(problems) = err else {
            panic!("expected aggregated error");
        };
        assert_eq!(problems.len(), 4);
        assert!(problems.iter().any(|p| p.contains("failed to parse")));
    }

    #[test]
    fn test_settings_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(&dir.path().join("missing.json"), env).unwrap_err();

        let ConfigError::Invalid(problems) = err else {
            panic!("expected aggregated error");
        };
        assert_eq!(problems.len(), 1);
        assert!(problems.iter().next().unwrap().contains("failed to read"));
    }

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url("https://chat.example.com/hooks/abc"));
        assert!(is_http_url("http://localhost:8065"));
        assert!(!is_http_url("chat.example.com"));
        assert!(!is_http_url("mailto:ops@example.com"));
    }
}
