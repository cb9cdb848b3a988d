//! Opsgenie (Atlassian) schedule integration.
//!
//! Queries the on-call participants of a schedule, addressed by name, at an
//! arbitrary instant through the Schedule API:
//!
//! `GET /v2/schedules/{name}/on-calls?scheduleIdentifierType=name&flat=true&date=...`
//!
//! With `flat=true` Opsgenie answers with the recipients' usernames, which
//! are their email addresses.
//!
//! # Configuration
//!
//! - `OPSGENIE_API_KEY`: Opsgenie API key
//! - `opsgenieUrl` in the config document: API URL (default `api.opsgenie.com`)

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use tracing::{debug, warn};

use super::ScheduleSource;
use crate::error::ScheduleError;

/// Request timeout for every Opsgenie call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Opsgenie Schedule API client.
#[derive(Debug, Clone)]
pub struct OpsgenieClient {
    api_url: String,
    client: reqwest::Client,
}

impl OpsgenieClient {
    /// Create a client for `api_url` authenticating with `api_key`.
    ///
    /// # Errors
    /// Returns error if the key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(api_key: &str, api_url: &str) -> Result<Self, ScheduleError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("GenieKey {api_key}"))
                .map_err(|_| ScheduleError::Other("invalid Opsgenie API key".to_string()))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        debug!(api_url, "Opsgenie client initialized");

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Flattened on-call recipients of the schedule named `schedule` at `at`.
    ///
    /// # Errors
    /// Returns error if the request fails or Opsgenie answers with an error.
    pub async fn on_call_recipients(
        &self,
        schedule: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<String>, ScheduleError> {
        let url = format!(
            "{}/v2/schedules/{}/on-calls",
            self.api_url,
            urlencoding::encode(schedule)
        );
        let date = at.to_rfc3339_opts(SecondsFormat::Secs, true);

        debug!(schedule, date = %date, "Querying Opsgenie on-calls");

        let response = self
            .client
            .get(url)
            .query(&[
                ("scheduleIdentifierType", "name"),
                ("flat", "true"),
                ("date", date.as_str()),
            ])
            .send()
            .await?;

        if response.status().is_success() {
            let body: OnCallResponse = response.json().await?;
            debug!(
                schedule,
                recipients = body.data.on_call_recipients.len(),
                "Opsgenie on-calls received"
            );
            Ok(body.data.on_call_recipients)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            warn!(
                schedule,
                status = %status,
                body = %body,
                "Opsgenie API request failed"
            );

            Err(ScheduleError::Api { status, body })
        }
    }
}

#[async_trait]
impl ScheduleSource for OpsgenieClient {
    fn name(&self) -> &'static str {
        "opsgenie"
    }

    async fn on_call(
        &self,
        schedule: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<String>, ScheduleError> {
        self.on_call_recipients(schedule, at).await
    }
}

// =============================================================================
// API types (internal)
// =============================================================================

#[derive(Debug, Deserialize)]
struct OnCallResponse {
    data: OnCallData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OnCallData {
    #[serde(default)]
    on_call_recipients: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_on_call_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/schedules/ops_schedule/on-calls"))
            .and(query_param("scheduleIdentifierType", "name"))
            .and(query_param("flat", "true"))
            .and(query_param("date", "2024-05-20T09:00:00Z"))
            .and(header("authorization", "GenieKey genie-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "_parent": { "id": "s1", "name": "ops_schedule", "enabled": true },
                    "onCallRecipients": ["a@x.com", "b@x.com"]
                },
                "took": 0.1,
                "requestId": "r1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpsgenieClient::new("genie-key", &server.uri()).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 5, 20, 9, 0, 0).unwrap();
        let recipients = client.on_call("ops_schedule", at).await.unwrap();

        assert_eq!(recipients, vec!["a@x.com".to_string(), "b@x.com".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_recipients_means_nobody() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "_parent": { "id": "s1" } }
            })))
            .mount(&server)
            .await;

        let client = OpsgenieClient::new("genie-key", &server.uri()).unwrap();
        let recipients = client.on_call("ops", Utc::now()).await.unwrap();

        assert!(recipients.is_empty());
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404).set_body_string(r#"{"message":"Schedule not found"}"#),
            )
            .mount(&server)
            .await;

        let client = OpsgenieClient::new("genie-key", &server.uri()).unwrap();
        let err = client.on_call("missing", Utc::now()).await.unwrap_err();

        match err {
            ScheduleError::Api { status, body } => {
                assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
                assert!(body.contains("Schedule not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
