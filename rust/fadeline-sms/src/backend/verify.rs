//! Content validation gateway client.
//!
//! The gateway answers in one of two shapes depending on which backend
//! revision serves the request: `{ "status": "ACCEPTED" | "DENIED", "reason"? }`
//! or `{ "approved": bool, "reason"? }`. Both normalize into one [`Verdict`];
//! anything else is a response-shape error, never a silent acceptance.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{check_status, ACCESS_TOKEN_HEADER};
use crate::error::{EngineError, Operation};
use crate::scheduler::Verdict;

const VERIFY_PATH: &str = "verify-message";

#[derive(Serialize)]
struct VerifyRequest<'a> {
    message: &'a str,
}

/// The two response shapes the gateway is known to produce.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VerifyResponse {
    Status {
        status: String,
        #[serde(default)]
        reason: Option<String>,
    },
    Approved {
        approved: bool,
        #[serde(default)]
        reason: Option<String>,
    },
}

fn normalize(response: VerifyResponse) -> Result<Verdict, String> {
    match response {
        VerifyResponse::Status { status, reason } => match status.as_str() {
            "ACCEPTED" => Ok(Verdict::Accepted),
            "DENIED" => Ok(Verdict::Denied { reason }),
            other => Err(format!("unknown verification status \"{other}\"")),
        },
        VerifyResponse::Approved { approved: true, .. } => Ok(Verdict::Accepted),
        VerifyResponse::Approved {
            approved: false,
            reason,
        } => Ok(Verdict::Denied { reason }),
    }
}

/// Judges message content before it may be activated.
#[async_trait]
pub trait ContentValidator: Send + Sync {
    /// Submit body text and return the normalized verdict.
    ///
    /// Callers are expected to have checked the body length first; the
    /// gateway refuses undersized content anyway.
    async fn verify(&self, body: &str) -> Result<Verdict, EngineError>;
}

/// [`ContentValidator`] over the real gateway.
pub struct HttpValidator {
    client: Client,
    base_url: String,
    access_token: String,
}

impl HttpValidator {
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
}

impl std::fmt::Debug for HttpValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpValidator")
            .field("base_url", &self.base_url)
            .field("access_token", &"***")
            .finish()
    }
}

#[async_trait]
impl ContentValidator for HttpValidator {
    async fn verify(&self, body: &str) -> Result<Verdict, EngineError> {
        const OP: Operation = Operation::Validate;
        let response = self
            .client
            .post(format!("{}/{VERIFY_PATH}", self.base_url))
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .json(&VerifyRequest { message: body })
            .send()
            .await
            .map_err(|e| EngineError::network(OP, &e))?;
        let response = check_status(OP, response).await?;
        let parsed: VerifyResponse = response
            .json()
            .await
            .map_err(|e| EngineError::response_shape(OP, e))?;
        let verdict =
            normalize(parsed).map_err(|reason| EngineError::response_shape(OP, reason))?;
        debug!(?verdict, "verification verdict");
        Ok(verdict)
    }
}
