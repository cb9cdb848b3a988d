//! Scheduling-service collaborators.

pub mod opsgenie;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ScheduleError;

pub use opsgenie::OpsgenieClient;

/// Answers "who is on call for this schedule at this instant".
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Get the name of this source.
    fn name(&self) -> &'static str;

    /// Identifiers (email addresses) on call for `schedule` at `at`.
    async fn on_call(&self, schedule: &str, at: DateTime<Utc>)
        -> Result<Vec<String>, ScheduleError>;
}
