use anyhow::anyhow;
use chrono::Utc;
use log::info;
use rocket::data::{Data, ToByteUnit};
use rocket::form::{Form, FromForm};
use rocket::fs::TempFile;
use rocket::http::{ContentType, Status};
use rocket::serde::json::Json;
use rocket::{Route, State, get, post, put};
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use crate::api::fairings::guards::service::GuardService;
use crate::api::{AppError, AppResult, GuardResult};
use crate::storage::notification::ResourceState;
use crate::storage::policy::{self, PolicyFields};
use crate::storage::{ObjectResource, validate_name};
use crate::workflow::{AppState, notify_object_change};

pub fn generate_storage_routes() -> Vec<Route> {
    routes![get_object, put_object, post_object]
}

fn check_names(bucket: &str, name: &str) -> AppResult<()> {
    validate_name("bucket", bucket)
        .and_then(|_| validate_name("object", name))
        .map_err(|error| AppError::new(Status::BadRequest, error))
}

/// Serving URL target.
#[get("/<bucket>/<name>")]
pub async fn get_object(
    state: &State<Arc<AppState>>,
    bucket: &str,
    name: &str,
) -> AppResult<(ContentType, Vec<u8>)> {
    check_names(bucket, name)?;
    let owned = (Arc::clone(state), bucket.to_string(), name.to_string());
    let object = tokio::task::spawn_blocking(move || {
        let (state, bucket, name) = owned;
        state.objects.get(&bucket, &name)
    })
    .await??;
    let Some((meta, bytes)) = object else {
        return Err(AppError::new(
            Status::NotFound,
            anyhow!("Object {bucket}/{name} not found"),
        ));
    };
    let content_type = ContentType::parse_flexible(&meta.content_type).unwrap_or(ContentType::Binary);
    Ok((content_type, bytes))
}

async fn store_object(
    state: &Arc<AppState>,
    bucket: &str,
    name: &str,
    bytes: Vec<u8>,
    content_type: String,
    owner: Option<String>,
) -> AppResult<ObjectResource> {
    let owned = (
        Arc::clone(state),
        bucket.to_string(),
        name.to_string(),
        content_type,
        owner,
    );
    let resource = tokio::task::spawn_blocking(move || {
        let (state, bucket, name, content_type, owner) = owned;
        state
            .objects
            .put(&bucket, &name, &bytes, &content_type, owner.as_deref())
    })
    .await??;
    info!("Stored {}/{} ({} bytes)", bucket, name, resource.size.as_deref().unwrap_or("0"));
    if bucket == state.config.main_bucket {
        notify_object_change(state, ResourceState::Exists, Some(resource.clone())).await;
    }
    Ok(resource)
}

/// Raw upload, used by the worker for processed images.
#[put("/<bucket>/<name>", data = "<body>")]
pub async fn put_object(
    state: &State<Arc<AppState>>,
    auth: GuardResult<GuardService>,
    bucket: &str,
    name: &str,
    content_type: Option<&ContentType>,
    body: Data<'_>,
) -> AppResult<Json<ObjectResource>> {
    let _ = auth?;
    check_names(bucket, name)?;
    let bytes = body
        .open(state.config.upload_limit_mb.mebibytes())
        .into_bytes()
        .await?;
    if !bytes.is_complete() {
        return Err(AppError::new(
            Status::PayloadTooLarge,
            anyhow!("Object {bucket}/{name} exceeds the upload limit"),
        ));
    }
    let content_type = content_type
        .map(|content_type| content_type.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let resource =
        store_object(state, bucket, name, bytes.into_inner(), content_type, None).await?;
    Ok(Json(resource))
}

#[derive(FromForm)]
pub struct PolicyUpload<'r> {
    key: String,
    policy: String,
    signature: String,
    #[field(name = "GoogleAccessId")]
    google_access_id: String,
    #[field(name = "x-goog-meta-owner")]
    owner: String,
    file: TempFile<'r>,
}

/// Browser form upload authorised by a signed policy.
#[post("/<bucket>", data = "<form>")]
pub async fn post_object(
    state: &State<Arc<AppState>>,
    bucket: &str,
    form: Form<PolicyUpload<'_>>,
) -> AppResult<Status> {
    let form = form.into_inner();
    check_names(bucket, &form.key)?;
    let fields = PolicyFields {
        bucket,
        key: &form.key,
        owner: &form.owner,
    };
    policy::verify(
        &state.config.policy_signing_key(),
        &form.policy,
        &form.signature,
        &fields,
        Utc::now(),
    )
    .map_err(|error| {
        AppError::new(
            Status::Forbidden,
            error.context(format!("Upload by {} refused", form.google_access_id)),
        )
    })?;

    let mut bytes = Vec::with_capacity(form.file.len() as usize);
    let reader = form.file.open().await?;
    tokio::pin!(reader);
    reader.read_to_end(&mut bytes).await?;
    let content_type = form
        .file
        .content_type()
        .map(|content_type| content_type.to_string())
        .or_else(|| {
            image::guess_format(&bytes)
                .ok()
                .map(|format| format.to_mime_type().to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    store_object(
        state,
        bucket,
        &form.key,
        bytes,
        content_type,
        Some(form.owner.clone()),
    )
    .await?;
    Ok(Status::NoContent)
}
