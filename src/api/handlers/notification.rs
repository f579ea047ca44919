use anyhow::anyhow;
use log::{debug, info};
use rocket::form::{Form, FromForm};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{Route, State, post};
use std::sync::Arc;

use crate::api::fairings::guards::notification::GuardResourceState;
use crate::api::fairings::guards::service::GuardService;
use crate::api::{AppError, AppResult, GuardResult};
use crate::database::ops::bitdocs::ProcessedUpdate;
use crate::storage::ObjectResource;
use crate::storage::notification::ResourceState;
use crate::workflow::{AppState, record_processed, register_upload};

pub fn generate_notification_routes() -> Vec<Route> {
    routes![object_change_notification, update_with_bitified]
}

/// Object change notification receiver.
#[post("/ocn", data = "<resource>")]
pub async fn object_change_notification(
    state: &State<Arc<AppState>>,
    resource_state: GuardResult<GuardResourceState>,
    resource: Option<Json<ObjectResource>>,
) -> AppResult<Status> {
    let GuardResourceState(resource_state) = resource_state?;
    match (resource_state, resource) {
        (ResourceState::Sync, _) => {
            info!("Sync OCN message received.");
        }
        (ResourceState::Exists, Some(resource)) => {
            info!("New file upload OCN message received.");
            let state = Arc::clone(state);
            let resource = resource.into_inner();
            tokio::task::spawn_blocking(move || register_upload(&state, &resource)).await??;
        }
        (ResourceState::Exists, None) => {
            return Err(AppError::new(
                Status::BadRequest,
                anyhow!("Notification carries no object resource"),
            ));
        }
        (ResourceState::NotExists, resource) => {
            debug!(
                "Ignoring removal of {:?}",
                resource.map(|resource| resource.into_inner().name)
            );
        }
    }
    Ok(Status::Ok)
}

#[derive(Debug, FromForm)]
pub struct UpdateData {
    id: String,
    #[field(default = String::new())]
    status: String,
    #[field(default = String::new())]
    image_8bit_name: String,
}

/// Worker callback carrying the processed image name.
#[post("/update", data = "<data>")]
pub async fn update_with_bitified(
    state: &State<Arc<AppState>>,
    auth: GuardResult<GuardService>,
    data: Form<UpdateData>,
) -> AppResult<Status> {
    let _ = auth?;
    let UpdateData {
        id,
        status,
        image_8bit_name,
    } = data.into_inner();
    let succeeded = status == "True";
    let state = Arc::clone(state);
    let outcome = {
        let id = id.clone();
        tokio::task::spawn_blocking(move || {
            record_processed(&state, &id, succeeded, &image_8bit_name)
        })
        .await??
    };
    match outcome {
        ProcessedUpdate::Updated(_) => Ok(Status::Ok),
        ProcessedUpdate::NotFound => Err(AppError::new(
            Status::NotFound,
            anyhow!("No Bitdoc found for id: {id}"),
        )),
        ProcessedUpdate::AlreadyProcessed(_) => Err(AppError::new(
            Status::Conflict,
            anyhow!("Bitdoc {id} already has a processed image"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use crate::api::handlers::test_support::{service_bearer, test_client};
    use crate::storage::notification::RESOURCE_STATE_HEADER;
    use rocket::http::{ContentType, Header, Status};

    #[test]
    fn sync_and_exists_notifications() {
        let (_dir, state, client) = test_client();
        let response = client
            .post("/ocn")
            .header(Header::new(RESOURCE_STATE_HEADER, "sync"))
            .dispatch();
        assert_eq!(response.status(), Status::Ok);

        let resource = state
            .objects
            .put(&state.config.main_bucket, "cat_1", b"bytes", "image/png", Some("carol"))
            .unwrap();
        let response = client
            .post("/ocn")
            .header(Header::new(RESOURCE_STATE_HEADER, "exists"))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&resource).unwrap())
            .dispatch();
        assert_eq!(response.status(), Status::Ok);
        let bitdocs = state.store.list_bitdocs(10, 0).unwrap();
        assert_eq!(bitdocs.len(), 1);
        assert_eq!(bitdocs[0].user, "carol");
        assert_eq!(state.store.queue_depth(&state.config.queue_name).unwrap(), 1);
    }

    #[test]
    fn notification_without_state_header_is_rejected() {
        let (_dir, _state, client) = test_client();
        let response = client.post("/ocn").dispatch();
        assert_eq!(response.status(), Status::BadRequest);
    }

    #[test]
    fn callback_updates_once() {
        let (_dir, state, client) = test_client();
        let resource = state
            .objects
            .put(&state.config.main_bucket, "cat_2", b"bytes", "image/png", None)
            .unwrap();
        let bitdoc = crate::workflow::register_upload(&state, &resource)
            .unwrap()
            .unwrap();
        state
            .objects
            .put(&state.config.bit_bucket, "cat_2_x", b"bytes", "image/png", None)
            .unwrap();

        let send = |body: String| {
            client
                .post("/update")
                .header(ContentType::Form)
                .header(service_bearer(&state))
                .body(body)
                .dispatch()
                .status()
        };
        let body = format!("id={}&status=True&image_8bit_name=cat_2_x", bitdoc.key);
        assert_eq!(send(body.clone()), Status::Ok);
        assert_eq!(send(body), Status::Conflict);
        assert_eq!(send("id=nope&status=False&image_8bit_name=".to_string()), Status::NotFound);

        let stored = state.store.get_bitdoc(&bitdoc.key).unwrap().unwrap();
        assert_eq!(
            stored.image_8bit_link.as_deref(),
            Some("http://pix.test/storage/smashpix-bitified/cat_2_x")
        );
    }

    #[test]
    fn callback_requires_service_key() {
        let (_dir, _state, client) = test_client();
        let response = client
            .post("/update")
            .header(ContentType::Form)
            .body("id=x&status=True&image_8bit_name=y")
            .dispatch();
        assert_eq!(response.status(), Status::Unauthorized);
    }
}
