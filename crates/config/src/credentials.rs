//! Access tokens and the delivery webhook.
//!
//! Credentials are read once at the edge of the program through a lookup
//! function and then passed around as plain values, so nothing below the
//! binary touches the process environment.

use std::fmt;

use crate::error::Problems;

/// Environment variable holding the Opsgenie API key.
pub const ENV_OPSGENIE_API_KEY: &str = "OPSGENIE_API_KEY";

/// Environment variable holding the Mattermost personal access or bot token.
pub const ENV_MATTERMOST_API_KEY: &str = "MATTERMOST_API_KEY";

/// Environment variable holding the Mattermost incoming webhook URL.
pub const ENV_MATTERMOST_WEBHOOK_URL: &str = "MATTERMOST_WEBHOOK_URL";

/// Pre-issued tokens and the destination webhook.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub opsgenie_api_key: String,
    pub mattermost_token: String,
    pub webhook_url: String,
}

impl Credentials {
    /// Collect credentials through `lookup`, recording every missing or
    /// malformed value in `problems`.
    ///
    /// Returns `None` when at least one value is unusable.
    pub fn collect<F>(lookup: F, problems: &mut Problems) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut required = |name: &str| -> Option<String> {
            let value = lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
            if value.is_none() {
                problems.push(format!("{name} environment variable not set"));
            }
            value
        };

        let opsgenie_api_key = required(ENV_OPSGENIE_API_KEY);
        let mattermost_token = required(ENV_MATTERMOST_API_KEY);
        let webhook_url = required(ENV_MATTERMOST_WEBHOOK_URL);

        let webhook_url = webhook_url.filter(|url| {
            let valid = crate::is_http_url(url);
            if !valid {
                problems.push(format!(
                    "{ENV_MATTERMOST_WEBHOOK_URL} is not a valid http(s) URL: {url}"
                ));
            }
            valid
        });

        Some(Self {
            opsgenie_api_key: opsgenie_api_key?,
            mattermost_token: mattermost_token?,
            webhook_url: webhook_url?,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("opsgenie_api_key", &"<redacted>")
            .field("mattermost_token", &"<redacted>")
            .field("webhook_url", &self.webhook_url)
            .finish()
    }
}
