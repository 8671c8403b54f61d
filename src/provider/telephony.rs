use super::{CallInitiator, InitiateResponse};
use crate::callrecord::{CallRecordStatus, CallRecordStore, NewCallRecord};
use crate::config::PlivoConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct PlivoCallResponse {
    request_uuid: Option<String>,
    error: Option<String>,
    message: Option<String>,
}

/// Backend of `POST /calls/initiate`.
///
/// Places the call through Plivo when credentials are configured, otherwise
/// answers in simulation mode. Every accepted call is recorded in the
/// call-record store.
pub struct TelephonyService {
    client: Client,
    plivo: PlivoConfig,
    records: Arc<dyn CallRecordStore>,
}

impl TelephonyService {
    pub fn new(plivo: PlivoConfig, records: Arc<dyn CallRecordStore>) -> Self {
        Self {
            client: Client::new(),
            plivo,
            records,
        }
    }

    pub fn is_simulation(&self) -> bool {
        !self.plivo.is_configured()
    }

    pub fn records(&self) -> &Arc<dyn CallRecordStore> {
        &self.records
    }

    /// Never fails: provider and store errors become `success: false`.
    pub async fn initiate_call(&self, target_number: &str) -> InitiateResponse {
        let target_number = target_number.trim();
        if target_number.is_empty() {
            return InitiateResponse::failed("targetNumber is required");
        }

        if self.is_simulation() {
            let call_uuid = format!("sim-{}", Uuid::new_v4());
            info!(target_number, %call_uuid, "simulated outbound call");
            self.record(&call_uuid, target_number, CallRecordStatus::Simulated, true)
                .await;
            return InitiateResponse::accepted(true, Some(call_uuid));
        }

        match self.place_plivo_call(target_number).await {
            Ok(call_uuid) => {
                self.record(&call_uuid, target_number, CallRecordStatus::Initiated, false)
                    .await;
                InitiateResponse::accepted(false, Some(call_uuid))
            }
            Err(e) => {
                warn!(target_number, "plivo call failed: {}", e);
                InitiateResponse::failed(e.to_string())
            }
        }
    }

    async fn record(
        &self,
        call_uuid: &str,
        target_number: &str,
        status: CallRecordStatus,
        simulated: bool,
    ) {
        let new_record = NewCallRecord {
            call_uuid: call_uuid.to_string(),
            target_number: target_number.to_string(),
            from_number: self.plivo.from_number.clone(),
            status,
            simulated,
        };
        if let Err(e) = self.records.create(new_record).await {
            error!(call_uuid, "failed to store call record: {}", e);
        }
    }

    async fn place_plivo_call(&self, target_number: &str) -> Result<String> {
        let auth_id = self.plivo.auth_id.as_deref().unwrap_or_default();
        let url = format!("{}/v1/Account/{}/Call/", self.plivo.api_base(), auth_id);
        let payload = json!({
            "from": self.plivo.from_number,
            "to": target_number,
            "answer_url": self.plivo.answer_url,
            "answer_method": "GET",
        });

        let start_time = Instant::now();
        let response = self
            .client
            .post(&url)
            .basic_auth(auth_id, self.plivo.auth_token.as_deref())
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("failed to reach Plivo: {}", e))?;
        let status = response.status();
        info!(
            %url,
            target_number,
            elapsed = start_time.elapsed().as_millis() as u64,
            %status,
            "plivo call request"
        );

        let body: PlivoCallResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("invalid Plivo response ({}): {}", status, e))?;
        if !status.is_success() {
            let reason = body
                .error
                .or(body.message)
                .unwrap_or_else(|| status.to_string());
            return Err(anyhow!("Plivo rejected the call: {}", reason));
        }
        body.request_uuid
            .ok_or_else(|| anyhow!("Plivo response missing request_uuid"))
    }
}

#[async_trait]
impl CallInitiator for TelephonyService {
    async fn initiate(&self, target_number: &str) -> Result<InitiateResponse> {
        Ok(self.initiate_call(target_number).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callrecord::MemoryCallRecordStore;
    use axum::{extract::Path, http::StatusCode, routing::post, Json, Router};
    use tokio::net::TcpListener;

    fn plivo_config(api_base: &str) -> PlivoConfig {
        PlivoConfig {
            auth_id: Some("MATEST".to_string()),
            auth_token: Some("token".to_string()),
            from_number: Some("+15550000000".to_string()),
            answer_url: Some("https://example.com/answer".to_string()),
            api_base: Some(api_base.to_string()),
        }
    }

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_simulation_mode_records_call() {
        let records = Arc::new(MemoryCallRecordStore::new());
        let service = TelephonyService::new(PlivoConfig::default(), records.clone());
        assert!(service.is_simulation());

        let resp = service.initiate_call("+15551234567").await;
        assert!(resp.success);
        assert!(resp.simulation);
        let uuid = resp.call_uuid.unwrap();
        assert!(uuid.starts_with("sim-"));

        let record = records.get(&uuid).await.unwrap().unwrap();
        assert_eq!(record.status, CallRecordStatus::Simulated);
        assert!(record.simulated);
    }

    #[tokio::test]
    async fn test_empty_target_rejected() {
        let service = TelephonyService::new(
            PlivoConfig::default(),
            Arc::new(MemoryCallRecordStore::new()),
        );
        let resp = service.initiate_call("   ").await;
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("targetNumber is required"));
    }

    #[tokio::test]
    async fn test_plivo_call_placed() {
        let router = Router::new().route(
            "/v1/Account/{auth_id}/Call/",
            post(
                |Path(auth_id): Path<String>, Json(body): Json<serde_json::Value>| async move {
                    assert_eq!(auth_id, "MATEST");
                    assert_eq!(body["to"], "+15551234567");
                    assert_eq!(body["from"], "+15550000000");
                    (
                        StatusCode::CREATED,
                        Json(json!({
                            "api_id": "api-1",
                            "message": "call fired",
                            "request_uuid": "req-42",
                        })),
                    )
                },
            ),
        );
        let base = serve(router).await;
        let records = Arc::new(MemoryCallRecordStore::new());
        let service = TelephonyService::new(plivo_config(&base), records.clone());
        assert!(!service.is_simulation());

        let resp = service.initiate_call("+15551234567").await;
        assert_eq!(resp, InitiateResponse::accepted(false, Some("req-42".to_string())));
        let record = records.get("req-42").await.unwrap().unwrap();
        assert_eq!(record.status, CallRecordStatus::Initiated);
        assert_eq!(record.from_number.as_deref(), Some("+15550000000"));
    }

    #[tokio::test]
    async fn test_plivo_error_is_reported() {
        let router = Router::new().route(
            "/v1/Account/{auth_id}/Call/",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"api_id": "api-2", "error": "invalid destination number"})),
                )
            }),
        );
        let base = serve(router).await;
        let records = Arc::new(MemoryCallRecordStore::new());
        let service = TelephonyService::new(plivo_config(&base), records.clone());

        let resp = service.initiate_call("+1").await;
        assert!(!resp.success);
        assert!(resp
            .error
            .unwrap()
            .contains("invalid destination number"));
        assert!(records.list().await.unwrap().is_empty());
    }
}
