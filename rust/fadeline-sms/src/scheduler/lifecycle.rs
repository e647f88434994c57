//! Message lifecycle states and transitions.
//!
//! Every message is in exactly one state; the old front end tracked the same
//! facts as four independent booleans and let them drift. The transitions
//! here are the only way state changes, so "activated without an accepted
//! verdict" is unrepresentable rather than merely checked.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PreconditionError;
use crate::scheduler::{check_body_bounds, check_body_for_submission, check_title, ScheduledMessage};

/// Where a message sits between creation and active sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Local content, not yet validated.
    Draft,
    /// Content passed validation; eligible for activation.
    ValidatedAccepted,
    /// Content failed validation; can be edited or saved as a draft,
    /// never activated.
    ValidatedDenied,
    /// Persisted with draft status.
    SavedDraft,
    /// Persisted and sending on schedule.
    SavedActive,
    /// Persisted but suspended by the user.
    SavedPaused,
}

impl Lifecycle {
    /// True for states that exist on the backend.
    #[must_use]
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::SavedDraft | Self::SavedActive | Self::SavedPaused)
    }

    /// True for states whose content is still draft-grade and may be
    /// submitted for validation.
    #[must_use]
    pub fn is_draft_status(&self) -> bool {
        matches!(self, Self::Draft | Self::SavedDraft)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "a draft"),
            Self::ValidatedAccepted => write!(f, "accepted"),
            Self::ValidatedDenied => write!(f, "denied"),
            Self::SavedDraft => write!(f, "a saved draft"),
            Self::SavedActive => write!(f, "active"),
            Self::SavedPaused => write!(f, "paused"),
        }
    }
}

/// Outcome of a content validation call, already normalized from the
/// gateway's wire shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Denied { reason: Option<String> },
}

/// What a save should do with the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Persist as a draft, keeping it inactive.
    Draft,
    /// Persist and start sending on schedule.
    Activate,
}

impl ScheduledMessage {
    /// Replace the title. Titles never affect validation state.
    pub fn edit_title(&mut self, title: impl Into<String>) -> Result<(), PreconditionError> {
        let title = title.into();
        check_title(&title)?;
        self.title = title;
        Ok(())
    }

    /// Replace the body text.
    ///
    /// Any change to the body discards the current verdict and drops the
    /// message back to [`Lifecycle::Draft`]: the verdict applied to text
    /// that no longer exists. Setting the identical text is a no-op.
    pub fn edit_body(&mut self, body: impl Into<String>) -> Result<(), PreconditionError> {
        let body = body.into();
        check_body_bounds(&body)?;
        if body == self.body {
            return Ok(());
        }
        self.body = body;
        self.lifecycle = Lifecycle::Draft;
        self.validation_reason = None;
        Ok(())
    }

    /// Check that this message may be submitted for validation right now.
    ///
    /// Runs before the gateway call so undersized or already-judged content
    /// never produces a request.
    pub fn check_validate(&self) -> Result<(), PreconditionError> {
        if !self.lifecycle.is_draft_status() {
            return Err(PreconditionError::NotValidatable {
                lifecycle: self.lifecycle,
            });
        }
        check_body_for_submission(&self.body)
    }

    /// Record a validation verdict.
    pub fn apply_verdict(&mut self, verdict: Verdict) -> Result<(), PreconditionError> {
        if !self.lifecycle.is_draft_status() {
            return Err(PreconditionError::NotValidatable {
                lifecycle: self.lifecycle,
            });
        }
        match verdict {
            Verdict::Accepted => {
                self.lifecycle = Lifecycle::ValidatedAccepted;
                self.validation_reason = None;
            }
            Verdict::Denied { reason } => {
                self.lifecycle = Lifecycle::ValidatedDenied;
                self.validation_reason = reason;
            }
        }
        Ok(())
    }

    /// Compute the state a save would land in, without changing anything.
    ///
    /// Called before the network write; [`Self::complete_save`] applies the
    /// result only after the backend accepts it.
    pub fn save_target(&self, mode: SaveMode) -> Result<Lifecycle, PreconditionError> {
        check_body_for_submission(&self.body)?;
        match mode {
            SaveMode::Draft => match self.lifecycle {
                Lifecycle::Draft
                | Lifecycle::ValidatedAccepted
                | Lifecycle::ValidatedDenied => Ok(Lifecycle::SavedDraft),
                lifecycle => Err(PreconditionError::AlreadySaved { lifecycle }),
            },
            SaveMode::Activate => match self.lifecycle {
                Lifecycle::ValidatedAccepted => Ok(Lifecycle::SavedActive),
                lifecycle => Err(PreconditionError::NotAccepted { lifecycle }),
            },
        }
    }

    /// Apply a successful save: the record now exists remotely and any edit
    /// session is over.
    pub fn complete_save(&mut self, target: Lifecycle) {
        self.lifecycle = target;
        self.persisted = true;
        self.editing = false;
    }

    /// Open an edit session on a saved record.
    pub fn begin_editing(&mut self) -> Result<(), PreconditionError> {
        if !self.persisted {
            return Err(PreconditionError::NotPersisted {
                id: self.id.clone(),
            });
        }
        self.editing = true;
        Ok(())
    }

    /// Flip an active message to paused or back. Only meaningful inside an
    /// edit session on a saved message.
    pub fn toggle_enabled(&mut self) -> Result<(), PreconditionError> {
        if !self.editing {
            return Err(PreconditionError::NotEditing {
                id: self.id.clone(),
            });
        }
        match self.lifecycle {
            Lifecycle::SavedActive => {
                self.lifecycle = Lifecycle::SavedPaused;
                Ok(())
            }
            Lifecycle::SavedPaused => {
                self.lifecycle = Lifecycle::SavedActive;
                Ok(())
            }
            lifecycle => Err(PreconditionError::ToggleUnavailable { lifecycle }),
        }
    }
}
