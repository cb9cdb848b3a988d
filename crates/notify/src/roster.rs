//! Per-run on-call results.

use serde::Serialize;

use crate::error::ResolveError;
use crate::resolver::{Identity, Resolution};
use crate::window::ShiftWindow;

/// Who is on call for one configured schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRoster {
    /// Scheduling-service name of the schedule
    pub schedule: String,
    pub display_name: String,
    pub identities: Vec<Identity>,
    /// Shift queries that failed and contributed nothing (0..=2)
    pub failed_shifts: usize,
    pub resolution_error: Option<ResolveError>,
}

impl ScheduleRoster {
    pub(crate) fn new(
        schedule: &str,
        display_name: &str,
        failed_shifts: usize,
        resolution: Resolution,
    ) -> Self {
        Self {
            schedule: schedule.to_string(),
            display_name: display_name.to_string(),
            identities: resolution.identities,
            failed_shifts,
            resolution_error: resolution.error,
        }
    }

    #[must_use]
    pub fn display_names(&self) -> Vec<String> {
        self.identities.iter().map(|i| i.display.clone()).collect()
    }

    /// Chat user ids of the resolved participants.
    pub fn user_ids(&self) -> impl Iterator<Item = &str> {
        self.identities.iter().filter_map(|i| i.user_id.as_deref())
    }

    /// Whether both shift queries failed.
    #[must_use]
    pub const fn query_failed(&self) -> bool {
        self.failed_shifts >= 2
    }
}

/// The on-call result of one run, one entry per configured schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    pub window: ShiftWindow,
    pub entries: Vec<ScheduleRoster>,
}

impl Roster {
    /// Entries whose identities could not be resolved.
    pub fn resolution_errors(&self) -> impl Iterator<Item = &ResolveError> {
        self.entries
            .iter()
            .filter_map(|entry| entry.resolution_error.as_ref())
    }

    /// Compact summary for logs and `--dry-run` output.
    #[must_use]
    pub fn summary(&self) -> RosterSummary<'_> {
        RosterSummary {
            window: &self.window,
            schedules: self
                .entries
                .iter()
                .map(|entry| ScheduleSummary {
                    schedule: &entry.schedule,
                    display_name: &entry.display_name,
                    on_call: entry.display_names(),
                    failed_shifts: entry.failed_shifts,
                    resolution_error: entry.resolution_error.as_ref().map(ToString::to_string),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RosterSummary<'a> {
    pub window: &'a ShiftWindow,
    pub schedules: Vec<ScheduleSummary<'a>>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleSummary<'a> {
    pub schedule: &'a str,
    pub display_name: &'a str,
    pub on_call: Vec<String>,
    pub failed_shifts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_error: Option<String>,
}
