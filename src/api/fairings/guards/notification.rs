use anyhow::anyhow;
use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};

use crate::api::GuardError;
use crate::storage::notification::{RESOURCE_STATE_HEADER, ResourceState};

/// The `X-Goog-Resource-State` header of a change notification.
pub struct GuardResourceState(pub ResourceState);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for GuardResourceState {
    type Error = GuardError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let parsed = req
            .headers()
            .get_one(RESOURCE_STATE_HEADER)
            .ok_or_else(|| anyhow!("Missing {} header", RESOURCE_STATE_HEADER))
            .and_then(|value| value.parse::<ResourceState>());
        match parsed {
            Ok(state) => Outcome::Success(GuardResourceState(state)),
            Err(err) => Outcome::Error((
                Status::BadRequest,
                GuardError {
                    status: Status::BadRequest,
                    error: err,
                },
            )),
        }
    }
}
