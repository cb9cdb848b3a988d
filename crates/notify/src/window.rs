//! On-call window computation.
//!
//! A rotation is sampled at two instants per day: the start of the early
//! shift (09:00 UTC) and the start of the late shift (17:00 UTC). For the
//! current week the samples are taken today; for next week they are taken on
//! the following Monday.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

/// Which week the notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Week {
    Current,
    Next,
}

impl Week {
    /// Map the `--next-week` flag onto a week.
    #[must_use]
    pub const fn from_next_week(next_week: bool) -> Self {
        if next_week {
            Self::Next
        } else {
            Self::Current
        }
    }

    /// Position of this week in the configured title and link lists.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Current => 0,
            Self::Next => 1,
        }
    }
}

/// One of the two daily sample points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Shift {
    Early,
    Late,
}

impl Shift {
    /// Hour (UTC) at which the shift starts.
    #[must_use]
    pub const fn start_hour(self) -> u32 {
        match self {
            Self::Early => 9,
            Self::Late => 17,
        }
    }

    /// Wall-clock start of the shift.
    #[must_use]
    pub fn start_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.start_hour(), 0, 0).unwrap_or(NaiveTime::MIN)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Early => "early",
            Self::Late => "late",
        }
    }
}

/// Date on which the given week's rotation is sampled.
#[must_use]
pub fn sample_date(now: DateTime<Utc>, week: Week) -> NaiveDate {
    let today = now.date_naive();
    match week {
        Week::Current => today,
        // 1 = Monday .. 7 = Sunday, so a Monday jumps a full week ahead.
        Week::Next => today + Duration::days(8 - i64::from(today.weekday().number_from_monday())),
    }
}

/// Start of `shift` in the given week, relative to `now`.
#[must_use]
pub fn shift_start(now: DateTime<Utc>, week: Week, shift: Shift) -> DateTime<Utc> {
    sample_date(now, week).and_time(shift.start_time()).and_utc()
}

/// The two query instants for one week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShiftWindow {
    pub week: Week,
    pub early: DateTime<Utc>,
    pub late: DateTime<Utc>,
}

impl ShiftWindow {
    #[must_use]
    pub fn compute(now: DateTime<Utc>, week: Week) -> Self {
        Self {
            week,
            early: shift_start(now, week, Shift::Early),
            late: shift_start(now, week, Shift::Late),
        }
    }

    /// Both shifts with their start instants, early first.
    #[must_use]
    pub fn shifts(&self) -> [(Shift, DateTime<Utc>); 2] {
        [(Shift::Early, self.early), (Shift::Late, self.late)]
    }
}
