use anyhow::anyhow;
use rocket::http::Status;
use rocket::response::Redirect;
use rocket::response::content::RawHtml;
use rocket::serde::json::Json;
use rocket::{Responder, Route, State, get};
use std::sync::Arc;

use crate::api::fairings::guards::auth::GuardUser;
use crate::api::templates;
use crate::api::{AppError, AppResult};
use crate::database::schema::bitdoc::{BitdocResponse, BitdocSchema};
use crate::workflow::AppState;

pub fn generate_entry_routes() -> Vec<Route> {
    routes![get_entry, get_image]
}

#[derive(Responder)]
pub enum EntryResponse {
    Json(Json<BitdocResponse>),
    Html(RawHtml<String>),
}

async fn load_bitdoc(state: &AppState, key: &str) -> AppResult<BitdocSchema> {
    let store = state.store.clone();
    let owned_key = key.to_string();
    let bitdoc = tokio::task::spawn_blocking(move || store.get_bitdoc(&owned_key)).await??;
    bitdoc.ok_or_else(|| AppError::new(Status::NotFound, anyhow!("No Bitdoc found for id: {key}")))
}

#[get("/get/<key>?<mode>")]
pub async fn get_entry(
    state: &State<Arc<AppState>>,
    user: GuardUser,
    key: &str,
    mode: Option<&str>,
) -> AppResult<EntryResponse> {
    let bitdoc = load_bitdoc(state, key).await?;
    if mode == Some("json") {
        return Ok(EntryResponse::Json(Json(bitdoc.to_response())));
    }
    let greeting = templates::greeting(user.0.as_deref());
    Ok(EntryResponse::Html(RawHtml(templates::single_entry(
        &greeting, &bitdoc,
    ))))
}

/// Redirect to the processed image, or the original with `mode=original`.
#[get("/get/image/<key>?<mode>")]
pub async fn get_image(
    state: &State<Arc<AppState>>,
    key: &str,
    mode: Option<&str>,
) -> AppResult<Redirect> {
    let bitdoc = load_bitdoc(state, key).await?;
    let link = if mode == Some("original") {
        Some(bitdoc.image_link)
    } else {
        bitdoc.image_8bit_link
    };
    match link.filter(|link| !link.is_empty()) {
        Some(link) => Ok(Redirect::to(link)),
        None => Err(AppError::new(
            Status::NotFound,
            anyhow!("Bitdoc {key} has no processed image yet"),
        )),
    }
}
