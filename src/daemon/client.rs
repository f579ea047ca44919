//! The worker's view of the web app: pull queue, object storage and callback.

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::common::RATE_LIMIT_REASONS;
use crate::config::daemon::DaemonConfig;
use crate::database::schema::task::{LeasedTask, TaskList};

#[derive(Debug)]
pub enum LeaseError {
    /// The queue refused the lease with one of the rate-limit reasons.
    RateLimited,
    Failed(anyhow::Error),
}

impl fmt::Display for LeaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseError::RateLimited => write!(f, "lease rate limited"),
            LeaseError::Failed(error) => write!(f, "lease failed: {error:#}"),
        }
    }
}

/// Form sent to `/update` once a task is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUpdate {
    pub id: String,
    pub status: bool,
    /// Empty when processing failed.
    pub image_8bit_name: String,
}

impl TaskUpdate {
    pub fn form(&self) -> [(&'static str, &str); 3] {
        [
            ("id", self.id.as_str()),
            ("status", if self.status { "True" } else { "False" }),
            ("image_8bit_name", self.image_8bit_name.as_str()),
        ]
    }
}

pub trait CloudServices: Send + Sync {
    fn lease_tasks(&self) -> Result<Vec<LeasedTask>, LeaseError>;
    fn delete_task(&self, task: &LeasedTask) -> Result<()>;
    fn fetch_image(&self, url: &str) -> Result<Vec<u8>>;
    /// Store a PNG in the processed bucket under `name`.
    fn upload_processed(&self, name: &str, png: Vec<u8>) -> Result<()>;
    /// Anything but 200 is an error.
    fn send_update(&self, update: &TaskUpdate) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    reason: String,
}

/// Classify a refused lease call.
pub fn classify_lease_failure(status: StatusCode, body: &str) -> LeaseError {
    if status == StatusCode::FORBIDDEN {
        let rate_limited = serde_json::from_str::<ErrorEnvelope>(body)
            .map(|envelope| {
                RATE_LIMIT_REASONS.contains(&envelope.error.reason.as_str())
                    || RATE_LIMIT_REASONS.contains(&envelope.error.message.as_str())
            })
            .unwrap_or(false);
        if rate_limited {
            return LeaseError::RateLimited;
        }
    }
    LeaseError::Failed(anyhow!("HttpError {}: '{}'", status.as_u16(), body.trim()))
}

/// [`CloudServices`] over HTTP against the web app's APIs.
pub struct HttpCloud {
    client: Client,
    base: String,
    queue_name: String,
    service_key: String,
    processed_bucket: String,
    num_tasks: usize,
    lease_secs: u64,
}

impl HttpCloud {
    pub fn new(config: &DaemonConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_sec))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base: config.app_base().to_string(),
            queue_name: config.queue_name.clone(),
            service_key: config.service_key.clone(),
            processed_bucket: config.processed_bucket.clone(),
            num_tasks: config.num_tasks_to_lease,
            lease_secs: config.lease_time_sec,
        })
    }
}

impl CloudServices for HttpCloud {
    fn lease_tasks(&self) -> Result<Vec<LeasedTask>, LeaseError> {
        let url = format!("{}/taskqueue/{}/lease", self.base, self.queue_name);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.service_key)
            .query(&[
                ("numTasks", self.num_tasks.to_string()),
                ("leaseSecs", self.lease_secs.to_string()),
            ])
            .send()
            .with_context(|| format!("failed to reach {url}"))
            .map_err(LeaseError::Failed)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify_lease_failure(status, &body));
        }
        let tasks: TaskList = response
            .json()
            .context("lease response is not a task list")
            .map_err(LeaseError::Failed)?;
        Ok(tasks.items)
    }

    fn delete_task(&self, task: &LeasedTask) -> Result<()> {
        let url = format!(
            "{}/taskqueue/{}/tasks/{}",
            self.base, task.queue_name, task.id
        );
        self.client
            .delete(&url)
            .bearer_auth(&self.service_key)
            .send()
            .with_context(|| format!("failed to reach {url}"))?
            .error_for_status()
            .with_context(|| format!("Error deleting task {} from taskqueue", task.id))?;
        Ok(())
    }

    fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Error loading image link {url}"))?
            .error_for_status()
            .with_context(|| format!("Error loading image link {url}"))?
            .bytes()?;
        Ok(bytes.to_vec())
    }

    fn upload_processed(&self, name: &str, png: Vec<u8>) -> Result<()> {
        let url = format!("{}/storage/{}/{}", self.base, self.processed_bucket, name);
        self.client
            .put(&url)
            .bearer_auth(&self.service_key)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(png)
            .send()
            .with_context(|| format!("failed to reach {url}"))?
            .error_for_status()
            .with_context(|| format!("upload of {}/{} refused", self.processed_bucket, name))?;
        Ok(())
    }

    fn send_update(&self, update: &TaskUpdate) -> Result<()> {
        let url = format!("{}/update", self.base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.service_key)
            .form(&update.form())
            .send()
            .with_context(|| format!("failed to reach {url}"))?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!(
                "Unexpected app response: {}, {}",
                status.as_u16(),
                body.trim()
            ));
        }
        Ok(())
    }
}
