//! Schedule CRUD and test-send transport.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::check_status;
use crate::error::{EngineError, Operation};

/// Header carrying the backend access token.
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

const SCHEDULE_PATH: &str = "sms-schedule";
const TEST_SEND_PATH: &str = "qstash-sms-send";

/// Wire form of one stored message, exactly as the backend keeps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub title: String,
    /// The SMS body. The backend names this field `message`.
    pub message: String,
    /// Five-field cron expression in storage form.
    pub cron: String,
    pub status: StorageStatus,
}

/// Validation status as the backend stores it.
///
/// Deliberately closed: an unrecognized status string fails the parse of the
/// whole record instead of defaulting to something that looks valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StorageStatus {
    Draft,
    Accepted,
    Denied,
}

#[derive(Serialize)]
struct PersistRequest<'a> {
    messages: [&'a StoredMessage; 1],
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    id: &'a str,
}

#[derive(Serialize)]
struct TestSendRequest<'a> {
    message: &'a str,
    title: &'a str,
}

#[derive(Deserialize)]
struct TestSendResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Remote persistence for scheduled messages.
#[async_trait]
pub trait ScheduleTransport: Send + Sync {
    /// Fetch every stored message for the authenticated user.
    async fn fetch_messages(&self) -> Result<Vec<StoredMessage>, EngineError>;

    /// Create or overwrite one message by id.
    async fn persist_message(&self, message: &StoredMessage) -> Result<(), EngineError>;

    /// Delete one message by id.
    async fn delete_message(&self, id: &str) -> Result<(), EngineError>;

    /// Fire a one-off test delivery of the given content.
    async fn send_test(&self, title: &str, body: &str) -> Result<(), EngineError>;
}

/// [`ScheduleTransport`] over the real backend.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    access_token: String,
}

impl HttpBackend {
    pub fn new(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .field("access_token", &"***")
            .finish()
    }
}

#[async_trait]
impl ScheduleTransport for HttpBackend {
    async fn fetch_messages(&self) -> Result<Vec<StoredMessage>, EngineError> {
        const OP: Operation = Operation::Load;
        let response = self
            .client
            .get(self.url(SCHEDULE_PATH))
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .send()
            .await
            .map_err(|e| EngineError::network(OP, &e))?;
        let response = check_status(OP, response).await?;
        let messages: Vec<StoredMessage> = response
            .json()
            .await
            .map_err(|e| EngineError::response_shape(OP, e))?;
        debug!(count = messages.len(), "fetched stored messages");
        Ok(messages)
    }

    async fn persist_message(&self, message: &StoredMessage) -> Result<(), EngineError> {
        const OP: Operation = Operation::Save;
        let response = self
            .client
            .post(self.url(SCHEDULE_PATH))
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .json(&PersistRequest {
                messages: [message],
            })
            .send()
            .await
            .map_err(|e| EngineError::network(OP, &e))?;
        check_status(OP, response).await?;
        debug!(id = %message.id, status = ?message.status, "persisted message");
        Ok(())
    }

    async fn delete_message(&self, id: &str) -> Result<(), EngineError> {
        const OP: Operation = Operation::Delete;
        let response = self
            .client
            .delete(self.url(SCHEDULE_PATH))
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .json(&DeleteRequest { id })
            .send()
            .await
            .map_err(|e| EngineError::network(OP, &e))?;
        check_status(OP, response).await?;
        debug!(id, "deleted message");
        Ok(())
    }

    async fn send_test(&self, title: &str, body: &str) -> Result<(), EngineError> {
        const OP: Operation = Operation::TestSend;
        let response = self
            .client
            .post(self.url(TEST_SEND_PATH))
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .query(&[("user_id", "test")])
            .json(&TestSendRequest {
                message: body,
                title,
            })
            .send()
            .await
            .map_err(|e| EngineError::network(OP, &e))?;
        let response = check_status(OP, response).await?;
        let reply: TestSendResponse = response
            .json()
            .await
            .map_err(|e| EngineError::response_shape(OP, e))?;
        if !reply.success {
            return Err(EngineError::Rejected {
                operation: OP,
                reason: reply
                    .error
                    .unwrap_or_else(|| "backend reported failure".to_string()),
            });
        }
        Ok(())
    }
}
