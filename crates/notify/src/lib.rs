//! On-call notifier.
//!
//! Reads who is on call from Opsgenie and posts it to a Mattermost channel.
//! A run is a single linear pipeline:
//!
//! 1. [`window`] computes the two instants (early and late shift start) for
//!    this week or next week.
//! 2. Each configured schedule is queried at both instants through a
//!    [`ScheduleSource`].
//! 3. [`resolver`] merges both answers and maps every identifier to a display
//!    identity (raw email, Mattermost `@username`, or an alias).
//! 4. [`message`] assembles the notification, which a [`NotifyChannel`]
//!    delivers.
//!
//! Failures below the setup level degrade instead of aborting: a failed
//! query contributes nobody, a failed lookup shows the raw identifier, and a
//! failed delivery is reported in the [`RunReport`].
//!
//! # Usage
//!
//! ```no_run
//! use notify::{Notifier, Week};
//!
//! # async fn example(settings: config::Settings) -> anyhow::Result<()> {
//! let notifier = Notifier::from_settings(&settings)?;
//! let report = notifier.run(Week::Current, chrono::Utc::now()).await;
//! assert!(report.delivered());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod error;
pub mod message;
pub mod resolver;
pub mod roster;
pub mod schedules;
pub mod window;

pub use channels::{
    ChannelMembership, ChatUser, MattermostChannel, MattermostClient, NotifyChannel, UserDirectory,
};
pub use error::{ChannelError, ResolveError, ScheduleError, SetupError};
pub use message::{MessageEntry, OnCallMessage};
pub use resolver::{AliasTable, ParticipantResolver, ParticipantSet};
pub use roster::{Roster, ScheduleRoster};
pub use schedules::{OpsgenieClient, ScheduleSource};
pub use window::{Shift, ShiftWindow, Week};

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use config::{NotifierConfig, ResolutionMode, Settings};
use tracing::{debug, error, info, warn};

/// Where auto-subscription adds on-call users.
struct Membership {
    client: Arc<dyn ChannelMembership>,
    webhook_url: String,
}

/// Outcome of one run.
#[derive(Debug)]
pub struct RunReport {
    pub roster: Roster,
    /// Messages accepted by the channel
    pub sent: usize,
    /// Delivery errors, one per rejected message
    pub failures: Vec<String>,
    /// Users added to the channel
    pub subscribed: usize,
}

impl RunReport {
    /// Whether every message was delivered.
    #[must_use]
    pub fn delivered(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs the on-call pipeline against its collaborators.
pub struct Notifier {
    config: NotifierConfig,
    schedules: Arc<dyn ScheduleSource>,
    resolver: ParticipantResolver,
    channel: Arc<dyn NotifyChannel>,
    membership: Option<Membership>,
}

impl Notifier {
    /// Create a notifier from explicit collaborators.
    #[must_use]
    pub fn new(
        config: NotifierConfig,
        schedules: Arc<dyn ScheduleSource>,
        resolver: ParticipantResolver,
        channel: Arc<dyn NotifyChannel>,
    ) -> Self {
        Self {
            config,
            schedules,
            resolver,
            channel,
            membership: None,
        }
    }

    /// Add resolved on-call users to the channel behind `webhook_url`.
    #[must_use]
    pub fn with_membership(
        mut self,
        client: Arc<dyn ChannelMembership>,
        webhook_url: impl Into<String>,
    ) -> Self {
        self.membership = Some(Membership {
            client,
            webhook_url: webhook_url.into(),
        });
        self
    }

    /// Wire Opsgenie and Mattermost clients from validated settings.
    ///
    /// # Errors
    /// Returns [`SetupError`] if a client cannot be constructed.
    pub fn from_settings(settings: &Settings) -> Result<Self, SetupError> {
        let config = &settings.config;
        let credentials = &settings.credentials;

        let schedules = OpsgenieClient::new(&credentials.opsgenie_api_key, &config.opsgenie_url)
            .map_err(SetupError::Schedule)?;

        let needs_api = config.resolution == ResolutionMode::RemoteLookup || config.auto_subscribe;
        let api = if needs_api {
            let site_url = config.site_url().ok_or_else(|| {
                let missing = ChannelError::Other("siteurl not set in the config".to_string());
                SetupError::Channel(missing)
            })?;
            Some(Arc::new(MattermostClient::new(
                site_url,
                &credentials.mattermost_token,
            )?))
        } else {
            None
        };

        let directory = api.clone().map(|client| client as Arc<dyn UserDirectory>);
        let resolver = ParticipantResolver::for_mode(config.resolution, directory, &config.aliases);
        let links_users = resolver.links_users();

        let channel = channel_from_settings(settings)?;

        let mut notifier = Self::new(
            config.clone(),
            Arc::new(schedules),
            resolver,
            Arc::new(channel),
        );

        if config.auto_subscribe {
            match api {
                Some(client) if links_users => {
                    notifier = notifier.with_membership(client, credentials.webhook_url.clone());
                }
                _ => warn!("Auto-subscribe needs chat user ids from remote lookup, skipping it"),
            }
        }

        info!(
            schedules = config.schedules.len(),
            resolution = ?config.resolution,
            style = ?config.style,
            delivery = ?config.delivery,
            auto_subscribe = config.auto_subscribe,
            "Notifier initialized"
        );

        Ok(notifier)
    }

    /// Query and resolve every configured schedule, in key order.
    ///
    /// Every schedule gets exactly one entry, empty when its queries failed.
    pub async fn collect(&self, week: Week, now: DateTime<Utc>) -> Roster {
        let window = ShiftWindow::compute(now, week);
        debug!(week = ?week, early = %window.early, late = %window.late, "Computed on-call window");

        let mut entries = Vec::with_capacity(self.config.schedules.len());
        for (schedule, display_name) in &self.config.schedules {
            entries.push(self.collect_schedule(schedule, display_name, &window).await);
        }

        Roster { window, entries }
    }

    async fn collect_schedule(
        &self,
        schedule: &str,
        display_name: &str,
        window: &ShiftWindow,
    ) -> ScheduleRoster {
        let mut failed_shifts = 0;
        let early = self
            .query_shift(schedule, Shift::Early, window.early, &mut failed_shifts)
            .await;
        let late = self
            .query_shift(schedule, Shift::Late, window.late, &mut failed_shifts)
            .await;

        let participants = ParticipantSet::merge(early, late);
        let resolution = self.resolver.resolve(schedule, &participants).await;

        if let Some(e) = &resolution.error {
            error!(schedule, display_name, error = %e, "Could not resolve on-call users");
        }
        info!(
            schedule,
            display_name,
            on_call = participants.len(),
            failed_shifts,
            "Schedule collected"
        );

        ScheduleRoster::new(schedule, display_name, failed_shifts, resolution)
    }

    async fn query_shift(
        &self,
        schedule: &str,
        shift: Shift,
        at: DateTime<Utc>,
        failed_shifts: &mut usize,
    ) -> Vec<String> {
        match self.schedules.on_call(schedule, at).await {
            Ok(recipients) => recipients,
            Err(e) => {
                warn!(
                    source = self.schedules.name(),
                    schedule,
                    shift = shift.as_str(),
                    at = %at,
                    error = %e,
                    "Failed to get the on-call shift, treating it as empty"
                );
                *failed_shifts += 1;
                Vec::new()
            }
        }
    }

    /// Messages for `roster` as configured.
    #[must_use]
    pub fn messages(&self, roster: &Roster) -> Vec<OnCallMessage> {
        OnCallMessage::from_roster(roster, &self.config)
    }

    /// Add every resolved on-call user to the webhook's channel.
    ///
    /// Returns the number of users added. Errors are logged and skipped.
    pub async fn subscribe(&self, roster: &Roster) -> usize {
        let Some(membership) = &self.membership else {
            return 0;
        };

        let user_ids: BTreeSet<&str> = roster
            .entries
            .iter()
            .flat_map(ScheduleRoster::user_ids)
            .collect();
        if user_ids.is_empty() {
            return 0;
        }

        let channel_id = match membership
            .client
            .channel_for_webhook(&membership.webhook_url)
            .await
        {
            Ok(channel_id) => channel_id,
            Err(e) => {
                warn!(error = %e, "Could not resolve the webhook channel, skipping subscription");
                return 0;
            }
        };

        let mut added = 0;
        for user_id in user_ids {
            match membership.client.add_member(&channel_id, user_id).await {
                Ok(()) => added += 1,
                Err(e) => warn!(
                    channel_id = %channel_id,
                    user_id,
                    error = %e,
                    "Failed to add channel member"
                ),
            }
        }

        info!(channel_id = %channel_id, added, "Subscribed on-call users to channel");
        added
    }

    /// Collect, subscribe and deliver.
    pub async fn run(&self, week: Week, now: DateTime<Utc>) -> RunReport {
        let roster = self.collect(week, now).await;
        let unresolved = roster.resolution_errors().count();
        if unresolved > 0 {
            warn!(unresolved, "Some schedules are listed with raw identifiers");
        }
        let subscribed = self.subscribe(&roster).await;

        let messages = self.messages(&roster);
        let channel_name = self.channel.name();
        let mut sent = 0;
        let mut failures = Vec::new();

        for message in &messages {
            match self.channel.send(message).await {
                Ok(()) => {
                    debug!(channel = channel_name, title = %message.title, "Notification sent");
                    sent += 1;
                }
                Err(e) => {
                    error!(channel = channel_name, error = %e, "Failed to send notification");
                    failures.push(e.to_string());
                }
            }
        }

        if failures.is_empty() {
            info!(channel = channel_name, sent, "Successfully sent on-call users to the channel");
        }

        RunReport {
            roster,
            sent,
            failures,
            subscribed,
        }
    }
}

/// The webhook channel described by `settings`.
///
/// # Errors
/// Returns error if the HTTP client cannot be built.
pub fn channel_from_settings(settings: &Settings) -> Result<MattermostChannel, ChannelError> {
    let config = &settings.config;
    Ok(
        MattermostChannel::new(settings.credentials.webhook_url.clone(), config.style)?
            .with_username(config.username.clone())
            .with_icon_url(config.icon_url.clone())
            .with_color(config.color.clone()),
    )
}
