//! Upload bookkeeping shared by the HTTP handlers: storing uploads, reacting to
//! change notifications, and recording the worker's results.

pub mod limiter;

use anyhow::{Context, Result};
use chrono::Local;
use log::{info, warn};
use std::sync::Arc;

use crate::common::ANONYMOUS_OWNER;
use crate::common::errors::handle_error;
use crate::config::server::ServerConfig;
use crate::database::Store;
use crate::database::ops::bitdocs::ProcessedUpdate;
use crate::database::schema::bitdoc::BitdocSchema;
use crate::database::schema::task::TaskPayload;
use crate::storage::notification::{ResourceState, send_webhook};
use crate::storage::{ObjectResource, ObjectStore, serving_url};
use crate::utils::{now_millis, timestamped_name};
use limiter::LeaseLimiter;

/// Everything the web app shares between requests.
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<Store>,
    pub objects: ObjectStore,
    pub lease_limiter: LeaseLimiter,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn open(config: ServerConfig) -> Result<Arc<Self>> {
        let store = Arc::new(
            Store::open(config.database_path())
                .with_context(|| format!("failed to open datastore in {:?}", config.data_dir))?,
        );
        let objects = ObjectStore::new(config.objects_root(), store.clone())?;
        let lease_limiter = LeaseLimiter::new(config.lease_requests_per_sec);
        Ok(Arc::new(Self {
            config,
            store,
            objects,
            lease_limiter,
            http: reqwest::Client::new(),
        }))
    }

    pub fn serving_url(&self, bucket: &str, name: &str) -> String {
        serving_url(self.config.public_base(), bucket, name)
    }
}

/// Strip everything from the first `.` so `cat.photo.png` becomes `cat`.
pub fn upload_stem(file_name: &str) -> &str {
    let stem = match file_name.find('.') {
        Some(index) => &file_name[..index],
        None => file_name,
    };
    if stem.is_empty() { "upload" } else { stem }
}

/// Write an upload into the main bucket as `<stem>_<timestamp>` and announce it.
pub async fn store_upload(
    state: &Arc<AppState>,
    file_name: &str,
    bytes: Vec<u8>,
    content_type: &str,
    owner: &str,
) -> Result<ObjectResource> {
    let object_name = timestamped_name(upload_stem(file_name), Local::now());
    let bucket = state.config.main_bucket.clone();
    let content_type = content_type.to_string();
    let owner = owner.to_string();
    let resource = {
        let state = state.clone();
        tokio::task::spawn_blocking(move || {
            state
                .objects
                .put(&bucket, &object_name, &bytes, &content_type, Some(&owner))
        })
        .await??
    };
    info!("Uploaded {:?} as {}/{}", file_name, resource.bucket, resource.name);
    notify_object_change(state, ResourceState::Exists, Some(resource.clone())).await;
    Ok(resource)
}

/// Deliver a change notification for a main-bucket object, in-process or to
/// the configured receiver. Failures are logged, never returned.
pub async fn notify_object_change(
    state: &Arc<AppState>,
    resource_state: ResourceState,
    resource: Option<ObjectResource>,
) {
    match state.config.notification_url.as_deref() {
        Some(url) => {
            if let Err(error) = send_webhook(&state.http, url, resource_state, resource.as_ref()).await
            {
                handle_error(error);
            }
        }
        None => {
            let (ResourceState::Exists, Some(resource)) = (resource_state, resource) else {
                return;
            };
            let state = state.clone();
            let outcome =
                tokio::task::spawn_blocking(move || register_upload(&state, &resource)).await;
            match outcome {
                Ok(Ok(_)) => {}
                Ok(Err(error)) => {
                    handle_error(error);
                }
                Err(error) => {
                    handle_error(error.into());
                }
            }
        }
    }
}

/// Create the Bitdoc for a freshly stored object and queue it for the worker.
/// Returns `None` when the object is gone by the time the notice is handled.
pub fn register_upload(state: &AppState, resource: &ObjectResource) -> Result<Option<BitdocSchema>> {
    if !state.objects.exists(&resource.bucket, &resource.name)? {
        warn!(
            "Could not find image link for {}/{}",
            resource.bucket, resource.name
        );
        return Ok(None);
    }
    let owner = resource.owner_name().unwrap_or(ANONYMOUS_OWNER);
    let image_link = state.serving_url(&resource.bucket, &resource.name);

    let bitdoc = BitdocSchema::new(owner, image_link.clone(), Some(resource.name.clone()))?;
    info!("Creating entry {} - {}", bitdoc.user, bitdoc.image_link);
    state.store.insert_bitdoc(&bitdoc)?;

    let payload = serde_json::to_vec(&TaskPayload {
        key: bitdoc.key.to_string(),
        image_link,
    })?;
    let id = state
        .store
        .enqueue_task(&state.config.queue_name, &payload, now_millis())
        .context("failed to enqueue processing task")?;
    info!(
        "Queued task {} on {} for Bitdoc {}",
        id, state.config.queue_name, bitdoc.key
    );
    Ok(Some(bitdoc))
}

/// Apply the worker's callback to a Bitdoc.
pub fn record_processed(
    state: &AppState,
    key: &str,
    status: bool,
    image_8bit_name: &str,
) -> Result<ProcessedUpdate> {
    let link = if status && !image_8bit_name.is_empty() {
        if state.objects.exists(&state.config.bit_bucket, image_8bit_name)? {
            state.serving_url(&state.config.bit_bucket, image_8bit_name)
        } else {
            warn!(
                "Could not find image link for {}/{}",
                state.config.bit_bucket, image_8bit_name
            );
            state.config.no_image_link.clone()
        }
    } else {
        state.config.missing_image_link.clone()
    };
    let outcome = state.store.set_processed(key, link, now_millis())?;
    match &outcome {
        ProcessedUpdate::Updated(bitdoc) => info!(
            "Updated Bitdoc {} with link {}",
            key,
            bitdoc.image_8bit_link.as_deref().unwrap_or_default()
        ),
        ProcessedUpdate::NotFound => warn!("No Bitdoc found for id: {}", key),
        ProcessedUpdate::AlreadyProcessed(_) => warn!("Bitdoc {} was already processed", key),
    }
    Ok(outcome)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub fn test_state() -> (TempDir, Arc<AppState>) {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig {
            data_dir: dir.path().to_path_buf(),
            public_url: "http://pix.test/".to_string(),
            auth_key: Some("test-secret".to_string()),
            service_key: "service-secret".to_string(),
            lease_requests_per_sec: 0,
            ..ServerConfig::default()
        };
        let state = AppState::open(config).unwrap();
        (dir, state)
    }

    fn put_upload(state: &AppState, name: &str, owner: Option<&str>) -> ObjectResource {
        state
            .objects
            .put(&state.config.main_bucket, name, b"png", "image/png", owner)
            .unwrap()
    }

    #[test]
    fn stem_drops_everything_after_first_dot() {
        assert_eq!(upload_stem("cat.photo.png"), "cat");
        assert_eq!(upload_stem("noext"), "noext");
        assert_eq!(upload_stem(".hidden"), "upload");
    }

    #[test]
    fn registering_creates_bitdoc_and_task() {
        let (_dir, state) = test_state();
        let resource = put_upload(&state, "cat_1", Some("alice"));

        let bitdoc = register_upload(&state, &resource).unwrap().unwrap();
        assert_eq!(bitdoc.user, "alice");
        assert_eq!(bitdoc.image_link, "http://pix.test/storage/smashpix-uploads/cat_1");
        assert_eq!(bitdoc.file_name.as_deref(), Some("cat_1"));
        assert!(!bitdoc.is_processed());

        let leased = state
            .store
            .lease_tasks(&state.config.queue_name, 10, 60, now_millis())
            .unwrap();
        assert_eq!(leased.len(), 1);
        let payload: TaskPayload = serde_json::from_slice(&leased[0].1.payload).unwrap();
        assert_eq!(payload.key, bitdoc.key.as_str());
        assert_eq!(payload.image_link, bitdoc.image_link);
    }

    #[test]
    fn owner_falls_back_to_anonymous() {
        let (_dir, state) = test_state();
        let mut resource = put_upload(&state, "dog_1", None);
        resource.owner = None;
        let bitdoc = register_upload(&state, &resource).unwrap().unwrap();
        assert_eq!(bitdoc.user, ANONYMOUS_OWNER);
    }

    #[test]
    fn missing_object_is_ignored() {
        let (_dir, state) = test_state();
        let mut resource = put_upload(&state, "gone_1", None);
        resource.name = "never_written".to_string();
        assert!(register_upload(&state, &resource).unwrap().is_none());
        assert_eq!(state.store.queue_depth(&state.config.queue_name).unwrap(), 0);
    }

    #[test]
    fn callback_sets_processed_fields_once() {
        let (_dir, state) = test_state();
        let resource = put_upload(&state, "cat_2", Some("bob"));
        let bitdoc = register_upload(&state, &resource).unwrap().unwrap();
        state
            .objects
            .put(&state.config.bit_bucket, "cat_2_8bit", b"png", "image/png", None)
            .unwrap();

        let outcome = record_processed(&state, &bitdoc.key, true, "cat_2_8bit").unwrap();
        let ProcessedUpdate::Updated(updated) = outcome else {
            panic!("expected an update");
        };
        assert_eq!(
            updated.image_8bit_link.as_deref(),
            Some("http://pix.test/storage/smashpix-bitified/cat_2_8bit")
        );
        assert!(updated.timestamp_8bit.is_some());

        let again = record_processed(&state, &bitdoc.key, false, "").unwrap();
        assert!(matches!(again, ProcessedUpdate::AlreadyProcessed(_)));
        let stored = state.store.get_bitdoc(&bitdoc.key).unwrap().unwrap();
        assert_eq!(stored.image_8bit_link, updated.image_8bit_link);
    }

    #[test]
    fn failed_or_unknown_results_use_placeholder_links() {
        let (_dir, state) = test_state();
        let first = register_upload(&state, &put_upload(&state, "a_1", None))
            .unwrap()
            .unwrap();
        let second = register_upload(&state, &put_upload(&state, "b_1", None))
            .unwrap()
            .unwrap();

        let ProcessedUpdate::Updated(failed) =
            record_processed(&state, &first.key, false, "").unwrap()
        else {
            panic!("expected an update");
        };
        assert_eq!(failed.image_8bit_link, Some(state.config.missing_image_link.clone()));

        let ProcessedUpdate::Updated(absent) =
            record_processed(&state, &second.key, true, "not_uploaded").unwrap()
        else {
            panic!("expected an update");
        };
        assert_eq!(absent.image_8bit_link, Some(state.config.no_image_link.clone()));

        assert_eq!(
            record_processed(&state, "no-such-key", true, "x").unwrap(),
            ProcessedUpdate::NotFound
        );
    }
}
