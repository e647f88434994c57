//! Scheduled message domain model.
//!
//! A user keeps up to [`MAX_MESSAGES`] recurring SMS messages. Each message
//! owns its content, a recurrence rule, a 12-hour send time, and a lifecycle
//! state that gates validation, saving, and activation. The cron storage form
//! lives in [`cron`], the lifecycle transitions in [`lifecycle`], and the
//! backend-synchronized collection in [`store`].

pub mod cron;
pub mod lifecycle;
pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use cron::{CronField, CronFields};
pub use lifecycle::{Lifecycle, SaveMode, Verdict};
pub use store::{MessagePatch, ScheduleStore};

use crate::error::PreconditionError;

/// Hard cap on messages per user.
pub const MAX_MESSAGES: usize = 3;

/// Minimum message body length, in characters.
pub const MIN_BODY_CHARS: usize = 100;

/// Maximum message body length, in characters.
pub const MAX_BODY_CHARS: usize = 240;

/// Maximum title length, in characters.
pub const MAX_TITLE_CHARS: usize = 30;

/// How long a loaded message list stays fresh before the next read
/// triggers a reload.
pub const REFRESH_WINDOW_MINUTES: i64 = 15;

/// Half of a 12-hour clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Meridiem {
    Am,
    Pm,
}

impl fmt::Display for Meridiem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Am => write!(f, "AM"),
            Self::Pm => write!(f, "PM"),
        }
    }
}

/// A send time on the 12-hour clock, as the user picks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
    pub meridiem: Meridiem,
}

impl TimeOfDay {
    /// Build a send time, rejecting hours outside 1-12 and minutes
    /// outside 0-59.
    pub fn new(hour: u32, minute: u32, meridiem: Meridiem) -> Result<Self, PreconditionError> {
        let time = Self {
            hour,
            minute,
            meridiem,
        };
        time.check()?;
        Ok(time)
    }

    /// Range check for a value built directly rather than through
    /// [`TimeOfDay::new`].
    pub fn check(&self) -> Result<(), PreconditionError> {
        if self.hour < 1 || self.hour > 12 {
            return Err(PreconditionError::HourOutOfRange { hour: self.hour });
        }
        if self.minute > 59 {
            return Err(PreconditionError::MinuteOutOfRange {
                minute: self.minute,
            });
        }
        Ok(())
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02} {}", self.hour, self.minute, self.meridiem)
    }
}

/// How often a message goes out.
///
/// The variants are mutually exclusive by construction: a weekly rule
/// cannot also carry a day of month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "frequency", rename_all = "lowercase")]
pub enum Recurrence {
    /// Every week on the given weekday (0 = Sunday).
    Weekly { weekday: u32 },
    /// Every other week on the given weekday (0 = Sunday).
    Biweekly { weekday: u32 },
    /// Every month on the given day (1-31).
    Monthly { day_of_month: u32 },
}

impl Recurrence {
    pub fn weekly(weekday: u32) -> Result<Self, PreconditionError> {
        check_weekday(weekday)?;
        Ok(Self::Weekly { weekday })
    }

    pub fn biweekly(weekday: u32) -> Result<Self, PreconditionError> {
        check_weekday(weekday)?;
        Ok(Self::Biweekly { weekday })
    }

    pub fn monthly(day_of_month: u32) -> Result<Self, PreconditionError> {
        check_day_of_month(day_of_month)?;
        Ok(Self::Monthly { day_of_month })
    }

    /// Range check for a value built directly rather than through the
    /// constructors.
    pub fn check(&self) -> Result<(), PreconditionError> {
        match *self {
            Self::Weekly { weekday } | Self::Biweekly { weekday } => check_weekday(weekday),
            Self::Monthly { day_of_month } => check_day_of_month(day_of_month),
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Weekly { weekday } => write!(f, "weekly on {}", weekday_name(*weekday)),
            Self::Biweekly { weekday } => {
                write!(f, "every other week on {}", weekday_name(*weekday))
            }
            Self::Monthly { day_of_month } => write!(f, "monthly on day {day_of_month}"),
        }
    }
}

fn check_weekday(weekday: u32) -> Result<(), PreconditionError> {
    if weekday > 6 {
        return Err(PreconditionError::WeekdayOutOfRange { weekday });
    }
    Ok(())
}

fn check_day_of_month(day: u32) -> Result<(), PreconditionError> {
    if day < 1 || day > 31 {
        return Err(PreconditionError::DayOfMonthOutOfRange { day });
    }
    Ok(())
}

/// English weekday name, 0 = Sunday.
#[must_use]
pub fn weekday_name(weekday: u32) -> &'static str {
    match weekday {
        0 => "Sunday",
        1 => "Monday",
        2 => "Tuesday",
        3 => "Wednesday",
        4 => "Thursday",
        5 => "Friday",
        6 => "Saturday",
        _ => "unknown day",
    }
}

/// One recurring SMS message with its schedule and lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: String,
    pub title: String,
    pub body: String,
    pub recurrence: Recurrence,
    pub time: TimeOfDay,
    pub lifecycle: Lifecycle,
    /// Denial reason from the last validation, when there was one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_reason: Option<String>,
    /// Local edit session flag. Never serialized.
    #[serde(skip)]
    pub editing: bool,
    /// Whether this record exists on the backend. Never serialized.
    #[serde(skip)]
    pub persisted: bool,
}

impl ScheduledMessage {
    /// Create a fresh local draft with a generated id.
    ///
    /// Title and body maximums apply immediately; the body minimum is only
    /// enforced when the message is validated or saved, so a half-typed
    /// draft is representable.
    pub fn draft(
        title: impl Into<String>,
        body: impl Into<String>,
        recurrence: Recurrence,
        time: TimeOfDay,
    ) -> Result<Self, PreconditionError> {
        let title = title.into();
        let body = body.into();
        check_title(&title)?;
        check_body_bounds(&body)?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            title,
            body,
            recurrence,
            time,
            lifecycle: Lifecycle::Draft,
            validation_reason: None,
            editing: false,
            persisted: false,
        })
    }

    /// Body length in characters, the unit all limits are expressed in.
    #[must_use]
    pub fn body_chars(&self) -> usize {
        self.body.chars().count()
    }
}

/// Reject titles over [`MAX_TITLE_CHARS`].
pub fn check_title(title: &str) -> Result<(), PreconditionError> {
    let len = title.chars().count();
    if len > MAX_TITLE_CHARS {
        return Err(PreconditionError::TitleTooLong { len });
    }
    Ok(())
}

/// Reject bodies over [`MAX_BODY_CHARS`]. Applied on every edit.
pub fn check_body_bounds(body: &str) -> Result<(), PreconditionError> {
    let len = body.chars().count();
    if len > MAX_BODY_CHARS {
        return Err(PreconditionError::BodyTooLong { len });
    }
    Ok(())
}

/// Reject bodies outside [`MIN_BODY_CHARS`]..=[`MAX_BODY_CHARS`].
///
/// Applied before every validation call and every save, so no request
/// leaves the engine for content the backend would refuse anyway.
pub fn check_body_for_submission(body: &str) -> Result<(), PreconditionError> {
    let len = body.chars().count();
    if len < MIN_BODY_CHARS {
        return Err(PreconditionError::BodyTooShort { len });
    }
    if len > MAX_BODY_CHARS {
        return Err(PreconditionError::BodyTooLong { len });
    }
    Ok(())
}
