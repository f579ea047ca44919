use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use redb::TableDefinition;
use serde::{Deserialize, Serialize};

// Key: (queue name, sequence number) -> Value: TaskSchema (bitcode)
pub const TASK_TABLE: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("task");

// Key: queue name -> Value: last issued sequence number
pub const QUEUE_SEQUENCE_TABLE: TableDefinition<&str, u64> =
    TableDefinition::new("queue_sequence");

#[derive(Debug, Clone, PartialEq, Eq, bitcode::Encode, bitcode::Decode)]
pub struct TaskSchema {
    pub payload: Vec<u8>,
    pub enqueue_timestamp: i64,
    /// Millis until which the task is invisible to other leases. Zero when never leased.
    pub lease_expires: i64,
    pub retry_count: u32,
}

impl TaskSchema {
    pub fn to_leased(&self, queue_name: &str, id: u64) -> LeasedTask {
        LeasedTask {
            kind: "taskqueues#task".to_string(),
            id: id.to_string(),
            queue_name: queue_name.to_string(),
            payload_base64: BASE64.encode(&self.payload),
            enqueue_timestamp: self.enqueue_timestamp,
            lease_timestamp: self.lease_expires,
            retry_count: self.retry_count,
        }
    }
}

/// A task as the pull-queue API hands it out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeasedTask {
    pub kind: String,
    pub id: String,
    pub queue_name: String,
    pub payload_base64: String,
    pub enqueue_timestamp: i64,
    pub lease_timestamp: i64,
    pub retry_count: u32,
}

impl LeasedTask {
    pub fn payload(&self) -> Result<TaskPayload> {
        let bytes = BASE64
            .decode(self.payload_base64.trim())
            .with_context(|| format!("task {} carries invalid base64", self.id))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("task {} carries an invalid payload", self.id))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskList {
    pub kind: String,
    #[serde(default)]
    pub items: Vec<LeasedTask>,
}

/// What the web app asks the worker to process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskPayload {
    pub key: String,
    pub image_link: String,
}
