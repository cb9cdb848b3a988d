//! Error types for the notifier.

use thiserror::Error;

/// Errors from the chat side: webhook delivery, user lookups, channel membership.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The server answered with a non-success status
    #[error("{service} returned {status}: {body}")]
    Api {
        service: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    /// No user matches the given email address
    #[error("no chat user with email {0}")]
    UserNotFound(String),

    /// The webhook URL does not look like `<site>/hooks/<id>`
    #[error("not an incoming webhook URL: {0}")]
    InvalidWebhook(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Errors from the scheduling service.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("Opsgenie returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Raised when a schedule's identities could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Every remote lookup for the schedule failed; raw identifiers were used
    #[error("all {attempted} chat user lookups failed for schedule {schedule}")]
    AllLookupsFailed { schedule: String, attempted: usize },
}

/// Fatal errors while wiring the collaborators of a run.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The Opsgenie client could not be created
    #[error("not able to create an Opsgenie client: {0}")]
    Schedule(#[source] ScheduleError),

    /// A Mattermost client could not be created
    #[error("not able to create a Mattermost client: {0}")]
    Channel(#[from] ChannelError),
}
