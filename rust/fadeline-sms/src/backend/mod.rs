//! HTTP access to the scheduling backend.
//!
//! Two small clients, one per concern: [`client`] carries the schedule CRUD
//! and test-send endpoints, [`verify`] the content validation gateway. Both
//! sit behind traits so the store can be driven by scripted fakes in tests.

pub mod client;
pub mod verify;

pub use client::{HttpBackend, ScheduleTransport, StorageStatus, StoredMessage, ACCESS_TOKEN_HEADER};
pub use verify::{ContentValidator, HttpValidator};

use crate::error::{EngineError, Operation};

/// Turn a non-success response into an [`EngineError::Http`] carrying the
/// status and whatever body text the backend sent along.
pub(crate) async fn check_status(
    operation: Operation,
    response: reqwest::Response,
) -> Result<reqwest::Response, EngineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(EngineError::Http {
        operation,
        status: status.as_u16(),
        body,
    })
}
