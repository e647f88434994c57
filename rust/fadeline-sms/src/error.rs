//! Error types for the schedule engine.
//!
//! Failures fall into two families: local precondition failures, which are
//! rejected before any network call and are always recoverable, and remote
//! failures (transport, HTTP status, response shape), which leave local state
//! untouched so the caller can simply retry the operation.

use thiserror::Error;

use crate::scheduler::Lifecycle;

/// The user-facing operation that failed.
///
/// Remote errors carry this so every alert names the operation that failed
/// rather than a generic "request error".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Loading the message list.
    Load,
    /// Persisting a message.
    Save,
    /// Deleting a message.
    Delete,
    /// Submitting message text for content approval.
    Validate,
    /// Sending a one-off test message.
    TestSend,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Load => write!(f, "load"),
            Self::Save => write!(f, "save"),
            Self::Delete => write!(f, "delete"),
            Self::Validate => write!(f, "validate"),
            Self::TestSend => write!(f, "send test message"),
        }
    }
}

/// Top-level error type for the schedule engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A local invariant or transition precondition was violated.
    ///
    /// No network call was made and no state changed.
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    /// The request never completed (connection failure, timeout).
    #[error("failed to {operation}: {reason}")]
    Network {
        operation: Operation,
        reason: String,
    },

    /// The backend answered with a non-success status.
    #[error("failed to {operation}: backend returned HTTP {status}: {body}")]
    Http {
        operation: Operation,
        status: u16,
        body: String,
    },

    /// The response body did not match the expected shape.
    ///
    /// Never defaulted to a success interpretation.
    #[error("failed to parse {operation} response: {reason}")]
    ResponseShape {
        operation: Operation,
        reason: String,
    },

    /// The backend returned a well-formed failure payload on a 2xx response.
    #[error("backend rejected {operation}: {reason}")]
    Rejected {
        operation: Operation,
        reason: String,
    },

    /// A cron expression could not be interpreted.
    ///
    /// Records that fail to decode during a load become disabled
    /// placeholders instead of surfacing this error; it reaches callers
    /// that drive [`CronFields`](crate::scheduler::CronFields) themselves.
    #[error("failed to parse schedule: {0}")]
    Cron(#[from] CronParseError),
}

impl EngineError {
    /// Classify a transport-level [`reqwest::Error`] for the given operation.
    pub fn network(operation: Operation, err: &reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            err.to_string()
        };
        Self::Network { operation, reason }
    }

    /// Build a response-shape error from a JSON decoding failure.
    pub fn response_shape(operation: Operation, reason: impl std::fmt::Display) -> Self {
        Self::ResponseShape {
            operation,
            reason: reason.to_string(),
        }
    }

    /// True when the error is a local precondition failure.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }
}

/// Local precondition failures, rejected before any remote write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    /// Message body is below the 100-character minimum.
    #[error("message body must be at least 100 characters (currently {len})")]
    BodyTooShort { len: usize },

    /// Message body exceeds the 240-character maximum.
    #[error("message body must be at most 240 characters (currently {len})")]
    BodyTooLong { len: usize },

    /// Title exceeds the 30-character maximum.
    #[error("title must be at most 30 characters (currently {len})")]
    TitleTooLong { len: usize },

    /// The per-user message limit is already reached.
    #[error("you already have 3 scheduled messages; delete one before creating another")]
    MessageLimitReached,

    /// An unsaved draft already exists.
    #[error("finish or save your current draft before creating another message")]
    DraftAlreadyOpen,

    /// Activation requires an accepted validation verdict.
    #[error("message cannot be activated while {lifecycle}; it must pass validation first")]
    NotAccepted { lifecycle: Lifecycle },

    /// Validation can only run against draft-status content.
    #[error("message cannot be validated while {lifecycle}")]
    NotValidatable { lifecycle: Lifecycle },

    /// The record is already persisted in a non-draft state.
    #[error("message is already saved ({lifecycle}); enable editing to change it")]
    AlreadySaved { lifecycle: Lifecycle },

    /// Pausing and resuming only apply to saved messages.
    #[error("only saved messages can be paused or resumed (message is {lifecycle})")]
    ToggleUnavailable { lifecycle: Lifecycle },

    /// The record must be in edit mode first.
    #[error("message {id} is not in edit mode")]
    NotEditing { id: String },

    /// Edit mode only applies to records that exist remotely.
    #[error("message {id} has not been saved yet; unsaved drafts are edited directly")]
    NotPersisted { id: String },

    /// Nothing to roll back to.
    #[error("message {id} has no edit snapshot to restore")]
    NoSnapshot { id: String },

    /// A save for this record is still in flight.
    #[error("a save for message {id} is already in progress")]
    SaveInFlight { id: String },

    /// No record with the given id.
    #[error("no message with id {id}")]
    UnknownMessage { id: String },

    /// Weekday outside 0-6.
    #[error("weekday must be 0-6 (0 = Sunday), got {weekday}")]
    WeekdayOutOfRange { weekday: u32 },

    /// Day of month outside 1-31.
    #[error("day of month must be 1-31, got {day}")]
    DayOfMonthOutOfRange { day: u32 },

    /// Hour outside the 12-hour clock.
    #[error("hour must be 1-12, got {hour}")]
    HourOutOfRange { hour: u32 },

    /// Minute outside 0-59.
    #[error("minute must be 0-59, got {minute}")]
    MinuteOutOfRange { minute: u32 },
}

/// Errors produced when interpreting the 5-field cron storage form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CronParseError {
    /// The expression does not have exactly 5 fields.
    #[error("cron expression must have 5 fields, got {count}: \"{expr}\"")]
    FieldCount { count: usize, expr: String },

    /// A field is neither a wildcard nor a number.
    #[error("invalid {field} field \"{value}\": not a number")]
    NotNumeric { field: &'static str, value: String },

    /// A numeric field is outside its legal range.
    #[error("{field} value {value} is out of range {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// Lists, ranges, and step syntax are never written by this engine.
    #[error("unsupported {field} syntax \"{value}\": only single values and \"*\" are stored")]
    Unsupported { field: &'static str, value: String },

    /// Minute and hour must both be concrete to describe a send time.
    #[error("schedule carries no send time (minute and hour must be concrete)")]
    MissingTime,

    /// Neither day-of-month nor weekday selects a day.
    #[error("schedule selects no day (day-of-month and weekday are both wildcards)")]
    MissingDay,
}
