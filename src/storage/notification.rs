use anyhow::{Context, Result, bail};
use std::str::FromStr;

use crate::storage::ObjectResource;

pub const RESOURCE_STATE_HEADER: &str = "X-Goog-Resource-State";

/// State announced by an object change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// Sent once when a notification channel is opened.
    Sync,
    Exists,
    NotExists,
}

impl ResourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Sync => "sync",
            ResourceState::Exists => "exists",
            ResourceState::NotExists => "not_exists",
        }
    }
}

impl FromStr for ResourceState {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "sync" => Ok(ResourceState::Sync),
            "exists" => Ok(ResourceState::Exists),
            "not_exists" => Ok(ResourceState::NotExists),
            other => bail!("unknown resource state {other:?}"),
        }
    }
}

/// POST a change notification to an external receiver.
pub async fn send_webhook(
    client: &reqwest::Client,
    url: &str,
    state: ResourceState,
    resource: Option<&ObjectResource>,
) -> Result<()> {
    let request = client
        .post(url)
        .header(RESOURCE_STATE_HEADER, state.as_str());
    let request = match resource {
        Some(resource) => request.json(resource),
        None => request,
    };
    request
        .send()
        .await
        .with_context(|| format!("failed to deliver {} notification to {url}", state.as_str()))?
        .error_for_status()
        .with_context(|| format!("{url} rejected the {} notification", state.as_str()))?;
    Ok(())
}
