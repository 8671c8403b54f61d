use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallRecordStatus {
    Initiated,
    Simulated,
    Ringing,
    Answered,
    Completed,
    Failed,
}

/// One outbound call placed through `POST /calls/initiate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub id: u64,
    pub call_uuid: String,
    pub target_number: String,
    pub from_number: Option<String>,
    pub status: CallRecordStatus,
    pub simulated: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCallRecord {
    pub call_uuid: String,
    pub target_number: String,
    pub from_number: Option<String>,
    pub status: CallRecordStatus,
    pub simulated: bool,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecordUpdate {
    pub status: Option<CallRecordStatus>,
    pub error: Option<String>,
}

#[async_trait]
pub trait CallRecordStore: Send + Sync {
    async fn create(&self, record: NewCallRecord) -> Result<CallRecord>;
    async fn get(&self, call_uuid: &str) -> Result<Option<CallRecord>>;
    async fn update(&self, call_uuid: &str, update: CallRecordUpdate)
        -> Result<Option<CallRecord>>;
    /// All records, oldest first.
    async fn list(&self) -> Result<Vec<CallRecord>>;
}

#[derive(Default)]
struct MemoryInner {
    records: HashMap<String, CallRecord>,
    next_id: u64,
}

/// Process-local store; contents are lost on restart.
#[derive(Default)]
pub struct MemoryCallRecordStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryCallRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CallRecordStore for MemoryCallRecordStore {
    async fn create(&self, record: NewCallRecord) -> Result<CallRecord> {
        if record.call_uuid.is_empty() {
            return Err(anyhow!("call record requires a call uuid"));
        }
        let mut inner = self.inner.write().await;
        if inner.records.contains_key(&record.call_uuid) {
            return Err(anyhow!("call record {} already exists", record.call_uuid));
        }
        inner.next_id += 1;
        let now = Utc::now();
        let created = CallRecord {
            id: inner.next_id,
            call_uuid: record.call_uuid,
            target_number: record.target_number,
            from_number: record.from_number,
            status: record.status,
            simulated: record.simulated,
            error: None,
            created_at: now,
            updated_at: now,
        };
        inner
            .records
            .insert(created.call_uuid.clone(), created.clone());
        Ok(created)
    }

    async fn get(&self, call_uuid: &str) -> Result<Option<CallRecord>> {
        Ok(self.inner.read().await.records.get(call_uuid).cloned())
    }

    async fn update(
        &self,
        call_uuid: &str,
        update: CallRecordUpdate,
    ) -> Result<Option<CallRecord>> {
        let mut inner = self.inner.write().await;
        let Some(record) = inner.records.get_mut(call_uuid) else {
            return Ok(None);
        };
        if let Some(status) = update.status {
            record.status = status;
        }
        if update.error.is_some() {
            record.error = update.error;
        }
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn list(&self) -> Result<Vec<CallRecord>> {
        let mut records: Vec<_> = self.inner.read().await.records.values().cloned().collect();
        records.sort_by_key(|r| r.id);
        Ok(records)
    }
}
