//! Five-field cron storage form for message schedules.
//!
//! The backend stores each schedule as a standard `minute hour day-of-month
//! month day-of-week` expression, but this engine only ever writes a narrow
//! subset: every field is either a single value or `*`. Lists, ranges, and
//! step syntax are rejected on read so a hand-edited record fails loudly
//! instead of silently meaning something else.

use std::fmt;
use std::str::FromStr;

use crate::error::CronParseError;
use crate::scheduler::{Meridiem, Recurrence, TimeOfDay};

/// A single cron field: a wildcard or one concrete value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronField {
    Any,
    Value(u32),
}

impl CronField {
    fn parse(raw: &str, field: &'static str, min: u32, max: u32) -> Result<Self, CronParseError> {
        if raw == "*" {
            return Ok(Self::Any);
        }
        if raw.contains(['/', '-', ',']) {
            return Err(CronParseError::Unsupported {
                field,
                value: raw.to_string(),
            });
        }
        let value: u32 = raw.parse().map_err(|_| CronParseError::NotNumeric {
            field,
            value: raw.to_string(),
        })?;
        if value < min || value > max {
            return Err(CronParseError::OutOfRange {
                field,
                value,
                min,
                max,
            });
        }
        Ok(Self::Value(value))
    }

    /// The concrete value, if this field is not a wildcard.
    #[must_use]
    pub fn value(&self) -> Option<u32> {
        match self {
            Self::Any => None,
            Self::Value(v) => Some(*v),
        }
    }
}

impl fmt::Display for CronField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Value(v) => write!(f, "{v}"),
        }
    }
}

/// A parsed five-field cron expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronFields {
    pub minute: CronField,
    pub hour: CronField,
    pub day_of_month: CronField,
    pub month: CronField,
    pub weekday: CronField,
}

impl CronFields {
    /// Encode a recurrence and 12-hour send time into cron fields.
    ///
    /// Weekly and biweekly schedules write the same weekly form; the
    /// biweekly cadence is not representable in five fields, so it
    /// collapses to weekly on the next decode.
    #[must_use]
    pub fn encode(recurrence: Recurrence, time: TimeOfDay) -> Self {
        let (day_of_month, weekday) = match recurrence {
            Recurrence::Weekly { weekday } | Recurrence::Biweekly { weekday } => {
                (CronField::Any, CronField::Value(weekday))
            }
            Recurrence::Monthly { day_of_month } => {
                (CronField::Value(day_of_month), CronField::Any)
            }
        };
        Self {
            minute: CronField::Value(time.minute),
            hour: CronField::Value(hour_to_24(time.hour, time.meridiem)),
            day_of_month,
            month: CronField::Any,
            weekday,
        }
    }

    /// Decode cron fields back into a recurrence and 12-hour send time.
    ///
    /// A concrete day-of-month takes precedence over a concrete weekday.
    pub fn decode(&self) -> Result<(Recurrence, TimeOfDay), CronParseError> {
        let minute = self.minute.value().ok_or(CronParseError::MissingTime)?;
        let hour24 = self.hour.value().ok_or(CronParseError::MissingTime)?;
        let (hour, meridiem) = hour_from_24(hour24);
        let time = TimeOfDay {
            hour,
            minute,
            meridiem,
        };

        let recurrence = if let Some(day_of_month) = self.day_of_month.value() {
            Recurrence::Monthly { day_of_month }
        } else if let Some(weekday) = self.weekday.value() {
            Recurrence::Weekly { weekday }
        } else {
            return Err(CronParseError::MissingDay);
        };

        Ok((recurrence, time))
    }
}

impl FromStr for CronFields {
    type Err = CronParseError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronParseError::FieldCount {
                count: fields.len(),
                expr: expr.to_string(),
            });
        }
        Ok(Self {
            minute: CronField::parse(fields[0], "minute", 0, 59)?,
            hour: CronField::parse(fields[1], "hour", 0, 23)?,
            day_of_month: CronField::parse(fields[2], "day-of-month", 1, 31)?,
            month: CronField::parse(fields[3], "month", 1, 12)?,
            weekday: CronField::parse(fields[4], "weekday", 0, 6)?,
        })
    }
}

impl fmt::Display for CronFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.minute, self.hour, self.day_of_month, self.month, self.weekday
        )
    }
}

/// 12-hour clock to 24-hour: 12 AM is hour 0, 12 PM is hour 12.
fn hour_to_24(hour: u32, meridiem: Meridiem) -> u32 {
    match (meridiem, hour) {
        (Meridiem::Am, 12) => 0,
        (Meridiem::Am, h) => h,
        (Meridiem::Pm, 12) => 12,
        (Meridiem::Pm, h) => h + 12,
    }
}

/// 24-hour clock back to 12-hour with meridiem.
fn hour_from_24(hour24: u32) -> (u32, Meridiem) {
    match hour24 {
        0 => (12, Meridiem::Am),
        h if h < 12 => (h, Meridiem::Am),
        12 => (12, Meridiem::Pm),
        h => (h - 12, Meridiem::Pm),
    }
}
