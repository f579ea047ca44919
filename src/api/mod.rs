pub mod claims;
pub mod fairings;
pub mod handlers;
pub mod templates;

use rocket::data::{Limits, ToByteUnit};
use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use rocket::{Build, Rocket};
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;

use crate::workflow::AppState;

#[derive(Debug)]
pub struct AppError {
    pub status: Status,
    pub error: anyhow::Error,
}

impl AppError {
    pub fn new(status: Status, error: anyhow::Error) -> Self {
        AppError { status, error }
    }
}

#[rocket::async_trait]
impl<'r, 'o: 'r> Responder<'r, 'o> for AppError {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'o> {
        let outer_msg = self.error.to_string();

        let chain: Vec<String> = self.error.chain().map(|e| e.to_string()).collect();

        let body = json!({
            "error": outer_msg,
            "chain": chain,
        })
        .to_string();

        Response::build()
            .status(self.status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

impl<E> From<E> for AppError
where
    anyhow::Error: From<E>,
{
    fn from(err: E) -> Self {
        AppError {
            status: Status::InternalServerError,
            error: anyhow::Error::from(err),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct GuardError {
    pub status: Status,
    pub error: anyhow::Error,
}

impl From<GuardError> for AppError {
    fn from(err: GuardError) -> Self {
        AppError {
            status: err.status,
            error: err.error,
        }
    }
}

pub type GuardResult<T> = Result<T, GuardError>;

impl<E> From<E> for GuardError
where
    anyhow::Error: From<E>,
{
    fn from(err: E) -> Self {
        // Guards reject as unauthenticated unless they say otherwise.
        GuardError {
            status: Status::Unauthorized,
            error: anyhow::Error::from(err),
        }
    }
}

/// Assemble the web app with its platform stand-in APIs.
pub fn build_rocket(state: Arc<AppState>) -> Rocket<Build> {
    let upload_limit = state.config.upload_limit_mb.mebibytes();
    let limits = Limits::default()
        .limit("file", upload_limit)
        .limit("data-form", upload_limit)
        .limit("bytes", upload_limit);
    let figment = rocket::Config::figment()
        .merge(("address", state.config.address.clone()))
        .merge(("port", state.config.port))
        .merge(("ident", "smashpix"))
        .merge(("limits", limits));

    rocket::custom(figment)
        .manage(state)
        .mount("/", handlers::pages::generate_page_routes())
        .mount("/", handlers::upload::generate_upload_routes())
        .mount("/", handlers::entry::generate_entry_routes())
        .mount("/", handlers::notification::generate_notification_routes())
        .mount("/_ah/api/image/v1.0", handlers::rpc::generate_rpc_routes())
        .mount("/taskqueue", handlers::queue::generate_queue_routes())
        .mount("/storage", handlers::storage::generate_storage_routes())
}
