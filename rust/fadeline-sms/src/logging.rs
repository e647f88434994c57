//! Structured logging utilities.
//!
//! Every networked operation in the engine runs under an [`OpTimer`] so load,
//! save, validate, and delete latencies show up in the logs with consistent
//! fields instead of ad-hoc messages.

use std::time::Instant;

/// Operation timer for measuring and logging execution duration.
///
/// Logs the operation start at debug level on creation; one of the finish
/// methods logs the outcome with the elapsed time.
///
/// # Examples
///
/// ```rust,ignore
/// use fadeline_sms::logging::OpTimer;
///
/// let timer = OpTimer::new("store", "load");
/// let result = store.load().await;
/// timer.finish_with_result(&result);
/// ```
#[derive(Debug)]
pub struct OpTimer {
    /// Component being timed (e.g. "store", "backend").
    component: String,
    /// Operation being performed (e.g. "load", "save").
    operation: String,
    /// Start time of the operation.
    start: Instant,
}

impl OpTimer {
    /// Creates a new operation timer and logs the start.
    #[must_use]
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        let component = component.into();
        let operation = operation.into();

        tracing::debug!(
            component = %component,
            operation = %operation,
            "Operation started"
        );

        Self {
            component,
            operation,
            start: Instant::now(),
        }
    }

    /// Finishes the timer and logs the duration.
    pub fn finish(self) {
        let duration_ms = self.start.elapsed().as_millis();

        tracing::info!(
            component = %self.component,
            operation = %self.operation,
            duration_ms = duration_ms,
            "Operation completed"
        );
    }

    /// Finishes the timer with result-aware logging.
    ///
    /// Logs at info level on success and error level on failure, including
    /// the error text.
    pub fn finish_with_result<T, E: std::fmt::Display>(self, result: &Result<T, E>) {
        let duration_ms = self.start.elapsed().as_millis();

        match result {
            Ok(_) => {
                tracing::info!(
                    component = %self.component,
                    operation = %self.operation,
                    duration_ms = duration_ms,
                    "Operation completed successfully"
                );
            }
            Err(e) => {
                tracing::error!(
                    component = %self.component,
                    operation = %self.operation,
                    duration_ms = duration_ms,
                    error = %e,
                    "Operation failed"
                );
            }
        }
    }
}
