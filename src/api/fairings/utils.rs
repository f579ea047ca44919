use anyhow::{Result, anyhow};
use jsonwebtoken::Validation;
use rocket::Request;
use std::sync::Arc;

use crate::api::claims::Claims;
use crate::workflow::AppState;

pub const JWT_COOKIE: &str = "jwt";

/// Extract and validate Authorization header Bearer token
pub fn extract_bearer_token<'a>(req: &'a Request<'_>) -> Result<&'a str> {
    let auth_header = match req.headers().get_one("Authorization") {
        Some(header) => header,
        None => {
            return Err(anyhow!("Request is missing the Authorization header"));
        }
    };

    match auth_header.strip_prefix("Bearer ") {
        Some(token) => Ok(token.trim()),
        None => Err(anyhow!(
            "Authorization header format is invalid, expected 'Bearer <token>'"
        )),
    }
}

pub fn app_state<'a>(req: &'a Request<'_>) -> Result<&'a Arc<AppState>> {
    req.rocket()
        .state::<Arc<AppState>>()
        .ok_or_else(|| anyhow!("Application state is not managed"))
}

/// Try the `jwt` cookie first, then a bearer token. A stale cookie does not
/// shadow a valid bearer token.
pub fn try_jwt_auth(req: &Request<'_>, validation: &Validation) -> Result<Claims> {
    let state = app_state(req)?;
    let key = state.config.get_jwt_secret_key();
    let cookie_error = match req.cookies().get(JWT_COOKIE) {
        Some(jwt_cookie) => match Claims::decode_with_key(jwt_cookie.value(), &key, validation) {
            Ok(claims) => return Ok(claims),
            Err(err) => Some(err),
        },
        None => None,
    };
    match (extract_bearer_token(req), cookie_error) {
        (Ok(token), _) => Claims::decode_with_key(token, &key, validation),
        (Err(_), Some(cookie_error)) => Err(cookie_error),
        (Err(err), None) => Err(err),
    }
}
