use anyhow::anyhow;
use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};

use crate::api::GuardError;
use crate::api::fairings::utils::{app_state, extract_bearer_token};

/// The worker daemon, identified by the shared service key.
pub struct GuardService;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for GuardService {
    type Error = GuardError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let checked = app_state(req).and_then(|state| {
            let token = extract_bearer_token(req)?;
            if !token.is_empty() && token == state.config.service_key {
                Ok(())
            } else {
                Err(anyhow!("Service key does not match"))
            }
        });
        match checked {
            Ok(()) => Outcome::Success(GuardService),
            Err(err) => Outcome::Error((
                Status::Unauthorized,
                err.context("Service authentication error").into(),
            )),
        }
    }
}
