use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};

use crate::api::GuardError;
use crate::api::fairings::VALIDATION;
use crate::api::fairings::utils::try_jwt_auth;
use crate::common::ANONYMOUS_OWNER;

/// The logged-in user, if any. Never rejects a request.
pub struct GuardUser(pub Option<String>);

impl GuardUser {
    pub fn owner(&self) -> &str {
        self.0.as_deref().unwrap_or(ANONYMOUS_OWNER)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for GuardUser {
    type Error = GuardError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(GuardUser(
            try_jwt_auth(req, &VALIDATION).ok().map(|claims| claims.nickname),
        ))
    }
}

/// A logged-in user is required.
pub struct GuardAuth {
    pub nickname: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for GuardAuth {
    type Error = GuardError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match try_jwt_auth(req, &VALIDATION) {
            Ok(claims) => Outcome::Success(GuardAuth {
                nickname: claims.nickname,
            }),
            Err(err) => Outcome::Error((
                Status::Unauthorized,
                GuardError {
                    status: Status::Unauthorized,
                    error: err.context("Invalid token."),
                },
            )),
        }
    }
}
