//! Mattermost integration.
//!
//! - [`MattermostChannel`] posts on-call messages to an incoming webhook,
//!   either as plain markdown or as a card with one field per schedule.
//! - [`MattermostClient`] talks to the REST API v4 with a personal access or
//!   bot token: user lookup by email, incoming hook lookup and channel
//!   membership.

use std::fmt::Write;
use std::time::Duration;

use async_trait::async_trait;
use config::MessageStyle;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ChannelMembership, ChatUser, NotifyChannel, UserDirectory};
use crate::error::ChannelError;
use crate::message::OnCallMessage;

/// Request timeout for every Mattermost call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SERVICE: &str = "Mattermost";

/// Incoming webhook notification channel.
pub struct MattermostChannel {
    webhook_url: String,
    client: reqwest::Client,
    style: MessageStyle,
    username: Option<String>,
    icon_url: Option<String>,
    color: String,
}

impl MattermostChannel {
    /// Create a channel posting to `webhook_url`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(webhook_url: impl Into<String>, style: MessageStyle) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            webhook_url: webhook_url.into(),
            client,
            style,
            username: None,
            icon_url: None,
            color: config::DEFAULT_COLOR.to_string(),
        })
    }

    /// Post as `username` instead of the webhook's default.
    #[must_use]
    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }

    /// Post with `icon_url` as avatar.
    #[must_use]
    pub fn with_icon_url(mut self, icon_url: Option<String>) -> Self {
        self.icon_url = icon_url;
        self
    }

    /// Attachment color for card messages.
    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Format a message as a webhook payload.
    #[must_use]
    pub fn render(&self, message: &OnCallMessage) -> WebhookPayload {
        let headline = message.headline();

        let (text, attachments) = match self.style {
            MessageStyle::Text => {
                let mut text = headline;
                for entry in &message.entries {
                    let _ = write!(text, "\n**{}**: {}", entry.schedule, entry.value());
                }
                (text, vec![])
            }
            MessageStyle::Card => {
                let fields = message
                    .entries
                    .iter()
                    .map(|entry| AttachmentField {
                        title: entry.schedule.clone(),
                        value: entry.value(),
                        short: true,
                    })
                    .collect();

                let attachment = Attachment {
                    fallback: message.title.clone(),
                    color: self.color.clone(),
                    fields,
                };
                (headline, vec![attachment])
            }
        };

        WebhookPayload {
            username: self.username.clone(),
            icon_url: self.icon_url.clone(),
            text,
            attachments,
        }
    }
}

#[async_trait]
impl NotifyChannel for MattermostChannel {
    fn name(&self) -> &'static str {
        "mattermost"
    }

    async fn send(&self, message: &OnCallMessage) -> Result<(), ChannelError> {
        let payload = self.render(message);

        debug!(
            channel = "mattermost",
            title = %message.title,
            entries = message.entries.len(),
            "Sending notification"
        );

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if response.status().is_success() {
            debug!(channel = "mattermost", "Notification sent successfully");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            warn!(
                channel = "mattermost",
                status = %status,
                body = %body,
                "Mattermost webhook request failed"
            );

            Err(ChannelError::Api {
                service: SERVICE,
                status,
                body,
            })
        }
    }
}

/// Mattermost REST API v4 client.
#[derive(Debug, Clone)]
pub struct MattermostClient {
    site_url: Url,
    client: reqwest::Client,
}

impl MattermostClient {
    /// Create a client for the server at `site_url` authenticating with `token`.
    ///
    /// # Errors
    /// Returns error if the URL or token is malformed, or the HTTP client
    /// fails to build.
    pub fn new(site_url: &str, token: &str) -> Result<Self, ChannelError> {
        let site_url = Url::parse(site_url).map_err(|e| {
            ChannelError::Other(format!("invalid Mattermost site URL {site_url}: {e}"))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ChannelError::Other("invalid Mattermost token".to_string()))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        debug!(site_url = %site_url, "Mattermost client initialized");

        Ok(Self { site_url, client })
    }

    /// Absolute URL of an API path such as `users/email/x`.
    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/api/v4/{path}",
            self.site_url.as_str().trim_end_matches('/')
        )
    }

    async fn error_for(response: reqwest::Response) -> ChannelError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        ChannelError::Api {
            service: SERVICE,
            status,
            body,
        }
    }
}

#[async_trait]
impl UserDirectory for MattermostClient {
    async fn user_by_email(&self, email: &str) -> Result<ChatUser, ChannelError> {
        let url = self.api_url(&format!("users/email/{}", urlencoding::encode(email)));
        let response = self.client.get(url).send().await?;

        match response.status() {
            status if status.is_success() => Ok(response.json::<ChatUser>().await?),
            StatusCode::NOT_FOUND => Err(ChannelError::UserNotFound(email.to_string())),
            _ => Err(Self::error_for(response).await),
        }
    }
}

#[async_trait]
impl ChannelMembership for MattermostClient {
    async fn channel_for_webhook(&self, webhook_url: &str) -> Result<String, ChannelError> {
        let hook_id = hook_id_from_webhook(webhook_url)?;
        let url = self.api_url(&format!("hooks/incoming/{}", urlencoding::encode(&hook_id)));
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let hook: IncomingHook = response.json().await?;
        debug!(hook_id = %hook_id, channel_id = %hook.channel_id, "Resolved webhook channel");
        Ok(hook.channel_id)
    }

    async fn add_member(&self, channel_id: &str, user_id: &str) -> Result<(), ChannelError> {
        let url = self.api_url(&format!("channels/{}/members", urlencoding::encode(channel_id)));
        let response = self
            .client
            .post(url)
            .json(&AddMember { user_id })
            .send()
            .await?;

        if response.status().is_success() {
            debug!(channel_id, user_id, "Added channel member");
            Ok(())
        } else {
            Err(Self::error_for(response).await)
        }
    }
}

/// Id of an incoming webhook URL of the form `<site>/hooks/<id>`.
///
/// # Errors
/// Returns [`ChannelError::InvalidWebhook`] for anything else.
pub fn hook_id_from_webhook(webhook_url: &str) -> Result<String, ChannelError> {
    let invalid = || ChannelError::InvalidWebhook(webhook_url.to_string());
    let url = Url::parse(webhook_url).map_err(|_| invalid())?;
    let mut segments: Vec<&str> = url
        .path_segments()
        .ok_or_else(invalid)?
        .filter(|s| !s.is_empty())
        .collect();

    let id = segments.pop().ok_or_else(invalid)?;
    if segments.last() == Some(&"hooks") {
        Ok(id.to_string())
    } else {
        Err(invalid())
    }
}

// =============================================================================
// Mattermost API types
// =============================================================================

/// Body posted to an incoming webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub fallback: String,
    pub color: String,
    pub fields: Vec<AttachmentField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

#[derive(Debug, Deserialize)]
struct IncomingHook {
    channel_id: String,
}

#[derive(Debug, Serialize)]
struct AddMember<'a> {
    user_id: &'a str,
}
