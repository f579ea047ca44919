use anyhow::anyhow;
use chrono::{Duration, Utc};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{Route, State, get, post};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::fairings::guards::auth::GuardAuth;
use crate::api::{AppError, AppResult, GuardResult};
use crate::common::{DEFAULT_LIST_LIMIT, UPLOAD_POLICY_TTL_SECS};
use crate::database::schema::bitdoc::BitdocResponse;
use crate::storage::policy::{self, PolicyFields};
use crate::workflow::AppState;

pub fn generate_rpc_routes() -> Vec<Route> {
    routes![list_images, generate_storage_signed_url]
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListImagesResponse {
    pub images: Vec<BitdocResponse>,
}

#[get("/ListImages?<limit>&<offset>")]
pub async fn list_images(
    state: &State<Arc<AppState>>,
    auth: GuardResult<GuardAuth>,
    limit: Option<usize>,
    offset: Option<usize>,
) -> AppResult<Json<ListImagesResponse>> {
    let _ = auth?;
    let store = state.store.clone();
    let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let offset = offset.unwrap_or(0);
    let bitdocs =
        tokio::task::spawn_blocking(move || store.list_bitdocs(limit, offset)).await??;
    Ok(Json(ListImagesResponse {
        images: bitdocs.iter().map(|bitdoc| bitdoc.to_response()).collect(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageSignedUrlRequest {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StorageSignedUrlResponse {
    pub form_action: String,
    pub bucket: String,
    pub policy: String,
    pub signature: String,
    pub google_access_id: String,
    pub filename: String,
}

fn required(field: Option<String>, name: &str) -> AppResult<String> {
    field.filter(|value| !value.is_empty()).ok_or_else(|| {
        AppError::new(
            Status::BadRequest,
            anyhow!("Missing request field \"{name}\"."),
        )
    })
}

/// Signed policy for a browser form upload straight into the main bucket.
#[post("/GenerateStorageSignedUrl", format = "json", data = "<request>")]
pub fn generate_storage_signed_url(
    state: &State<Arc<AppState>>,
    auth: GuardResult<GuardAuth>,
    request: Json<StorageSignedUrlRequest>,
) -> AppResult<Json<StorageSignedUrlResponse>> {
    let _ = auth?;
    let request = request.into_inner();
    let filename = required(request.filename, "filename")?;
    let owner = required(request.owner, "owner")?;

    let bucket = state.config.main_bucket.clone();
    let signed = policy::generate(
        &state.config.policy_signing_key(),
        &PolicyFields {
            bucket: &bucket,
            key: &filename,
            owner: &owner,
        },
        Utc::now(),
        Duration::seconds(UPLOAD_POLICY_TTL_SECS),
    )?;
    Ok(Json(StorageSignedUrlResponse {
        form_action: format!("{}/storage/{}", state.config.public_base(), bucket),
        bucket,
        policy: signed.policy,
        signature: signed.signature,
        google_access_id: state.config.service_account_name.clone(),
        filename,
    }))
}
