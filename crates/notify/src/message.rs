//! On-call message assembly.

use config::{Delivery, NotifierConfig};
use serde::Serialize;

use crate::roster::Roster;
use crate::window::Week;

/// Title used for the current week when none is configured.
pub const DEFAULT_TITLE_THIS_WEEK: &str =
    ":rotating_light: Who is on Call this week :rotating_light:";

/// Title used for next week when none is configured.
pub const DEFAULT_TITLE_NEXT_WEEK: &str = "Heads up for next week on call rotation:";

/// Shown in place of an empty identity list.
pub const NOBODY_ON_CALL: &str = "_nobody on call_";

/// One schedule in a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageEntry {
    /// Display name of the schedule
    pub schedule: String,
    pub identities: Vec<String>,
}

impl MessageEntry {
    /// Identities joined for display.
    #[must_use]
    pub fn value(&self) -> String {
        if self.identities.is_empty() {
            NOBODY_ON_CALL.to_string()
        } else {
            self.identities.join(", ")
        }
    }
}

/// The notification handed to a [`crate::NotifyChannel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnCallMessage {
    pub title: String,
    pub title_link: Option<String>,
    pub entries: Vec<MessageEntry>,
}

impl OnCallMessage {
    /// Markdown headline, linked when a title link is configured.
    #[must_use]
    pub fn headline(&self) -> String {
        match &self.title_link {
            Some(link) => format!("### [{}]({link})", self.title),
            None => format!("### {}", self.title),
        }
    }

    /// Build the messages for `roster` as configured: one combined message
    /// or one per schedule.
    #[must_use]
    pub fn from_roster(roster: &Roster, config: &NotifierConfig) -> Vec<Self> {
        let week = roster.window.week;
        let title = title_for(config, week);
        let title_link = title_link_for(config, week);

        let entries = roster.entries.iter().map(|entry| MessageEntry {
            schedule: entry.display_name.clone(),
            identities: entry.display_names(),
        });

        match config.delivery {
            Delivery::Combined => vec![Self {
                title,
                title_link,
                entries: entries.collect(),
            }],
            Delivery::PerSchedule => entries
                .map(|entry| Self {
                    title: title.clone(),
                    title_link: title_link.clone(),
                    entries: vec![entry],
                })
                .collect(),
        }
    }
}

/// Configured title for `week`, or the built-in default.
#[must_use]
pub fn title_for(config: &NotifierConfig, week: Week) -> String {
    config
        .titles
        .get(week.index())
        .filter(|title| !title.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| {
            match week {
                Week::Current => DEFAULT_TITLE_THIS_WEEK,
                Week::Next => DEFAULT_TITLE_NEXT_WEEK,
            }
            .to_string()
        })
}

/// Configured title link for `week`, if any.
#[must_use]
pub fn title_link_for(config: &NotifierConfig, week: Week) -> Option<String> {
    config
        .title_links
        .get(week.index())
        .filter(|link| !link.trim().is_empty())
        .cloned()
}
