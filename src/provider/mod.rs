//! Outbound call initiation.
//!
//! [`CallInitiator`] is what the call session uses to place a call. Two
//! implementations exist: [`HttpCallInitiator`] posts to a
//! `/calls/initiate` endpoint, and [`telephony::TelephonyService`] (the
//! backend behind that endpoint) can be used in-process.

use crate::call::InitiationOutcome;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

pub mod telephony;

pub use telephony::TelephonyService;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRequest {
    pub target_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateResponse {
    pub success: bool,
    #[serde(default)]
    pub simulation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InitiateResponse {
    pub fn accepted(simulation: bool, call_uuid: Option<String>) -> Self {
        Self {
            success: true,
            simulation,
            call_uuid,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            simulation: false,
            call_uuid: None,
            error: Some(error.into()),
        }
    }
}

impl From<InitiateResponse> for InitiationOutcome {
    fn from(resp: InitiateResponse) -> Self {
        if resp.success {
            InitiationOutcome::Accepted {
                simulated: resp.simulation,
                call_id: resp.call_uuid,
            }
        } else {
            InitiationOutcome::Rejected(resp.error.unwrap_or_default())
        }
    }
}

/// Map the result of [`CallInitiator::initiate`] onto the state machine's
/// outcome: an `Err` is a transport failure, a decoded body is the
/// provider's verdict.
pub fn to_outcome(result: Result<InitiateResponse>) -> InitiationOutcome {
    match result {
        Ok(resp) => resp.into(),
        Err(e) => InitiationOutcome::TransportError(e.to_string()),
    }
}

#[async_trait]
pub trait CallInitiator: Send + Sync {
    async fn initiate(&self, target_number: &str) -> Result<InitiateResponse>;
}

pub struct HttpCallInitiator {
    client: Client,
    url: String,
}

impl HttpCallInitiator {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl CallInitiator for HttpCallInitiator {
    async fn initiate(&self, target_number: &str) -> Result<InitiateResponse> {
        let start_time = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .json(&InitiateRequest {
                target_number: target_number.to_string(),
            })
            .send()
            .await
            .map_err(|e| anyhow!("request to {} failed: {}", self.url, e))?;
        let status = response.status();
        info!(
            url = %self.url,
            target_number,
            elapsed = start_time.elapsed().as_millis() as u64,
            %status,
            "initiate call request"
        );
        // failure responses carry a JSON body too
        let body: InitiateResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("invalid response from {} ({}): {}", self.url, status, e))?;
        Ok(body)
    }
}
