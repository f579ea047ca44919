use anyhow::anyhow;
use rocket::form::{Form, FromForm};
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::response::Redirect;
use rocket::response::content::RawHtml;
use rocket::serde::json::Json;
use rocket::{Route, State, get, post};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::claims::Claims;
use crate::api::fairings::guards::auth::GuardUser;
use crate::api::fairings::utils::JWT_COOKIE;
use crate::api::templates;
use crate::api::{AppError, AppResult};
use crate::common::{FRONT_PAGE_LIMIT, LOGIN_TOKEN_TTL_SECS};
use crate::workflow::AppState;

pub fn generate_page_routes() -> Vec<Route> {
    routes![index, upload_form, login_form, login, logout, auth_token]
}

#[get("/")]
pub async fn index(state: &State<Arc<AppState>>, user: GuardUser) -> AppResult<RawHtml<String>> {
    let store = state.store.clone();
    let bitdocs =
        tokio::task::spawn_blocking(move || store.list_bitdocs(FRONT_PAGE_LIMIT, 0)).await??;
    let greeting = templates::greeting(user.0.as_deref());
    Ok(RawHtml(templates::index(&greeting, &bitdocs)))
}

#[get("/upload")]
pub fn upload_form(user: GuardUser) -> RawHtml<String> {
    let greeting = templates::greeting(user.0.as_deref());
    RawHtml(templates::upload_form(&greeting, "/upload"))
}

#[get("/login")]
pub fn login_form(user: GuardUser) -> RawHtml<String> {
    RawHtml(templates::login_form(&templates::greeting(
        user.0.as_deref(),
    )))
}

#[derive(Debug, FromForm, Deserialize)]
pub struct LoginData {
    nickname: String,
    password: String,
}

fn issue_token(state: &AppState, data: &LoginData) -> AppResult<String> {
    let nickname = data.nickname.trim();
    if nickname.is_empty() || data.password != state.config.password {
        return Err(AppError::new(
            Status::Unauthorized,
            anyhow!("Invalid nickname or password").context("Authentication failed"),
        ));
    }
    Ok(Claims::new(nickname, LOGIN_TOKEN_TTL_SECS)
        .encode_with_key(&state.config.get_jwt_secret_key())?)
}

#[post("/login", data = "<data>")]
pub fn login(
    state: &State<Arc<AppState>>,
    jar: &CookieJar<'_>,
    data: Form<LoginData>,
) -> AppResult<Redirect> {
    let token = issue_token(state, &data)?;
    jar.add(
        Cookie::build((JWT_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    );
    Ok(Redirect::to(uri!("/")))
}

#[post("/logout")]
pub fn logout(jar: &CookieJar<'_>) -> Redirect {
    jar.remove(Cookie::build(JWT_COOKIE).path("/"));
    Redirect::to(uri!("/"))
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Bearer tokens for RPC clients.
#[post("/auth/token", format = "json", data = "<data>")]
pub fn auth_token(
    state: &State<Arc<AppState>>,
    data: Json<LoginData>,
) -> AppResult<Json<TokenResponse>> {
    let token = issue_token(state, &data)?;
    Ok(Json(TokenResponse { token }))
}

#[cfg(test)]
mod tests {
    use crate::api::handlers::test_support::test_client;
    use crate::database::schema::bitdoc::BitdocSchema;
    use rocket::http::{ContentType, Status};

    #[test]
    fn index_lists_newest_bitdocs() {
        let (_dir, state, client) = test_client();
        let bitdoc = BitdocSchema::new("alice", "http://img/a", Some("a".into())).unwrap();
        state.store.insert_bitdoc(&bitdoc).unwrap();

        let response = client.get("/").dispatch();
        assert_eq!(response.status(), Status::Ok);
        let body = response.into_string().unwrap();
        assert!(body.contains(bitdoc.key.as_str()));
        assert!(body.contains("Please log in."));
    }

    #[test]
    fn login_sets_cookie_and_greets() {
        let (_dir, _state, client) = test_client();
        let response = client
            .post("/login")
            .header(ContentType::Form)
            .body("nickname=alice&password=admin")
            .dispatch();
        assert_eq!(response.status(), Status::SeeOther);
        assert!(response.cookies().get("jwt").is_some());

        let body = client.get("/").dispatch().into_string().unwrap();
        assert!(body.contains("Logged in as alice."));

        client.post("/logout").dispatch();
        let body = client.get("/").dispatch().into_string().unwrap();
        assert!(body.contains("Please log in."));
    }

    #[test]
    fn wrong_password_is_unauthorized() {
        let (_dir, _state, client) = test_client();
        let response = client
            .post("/login")
            .header(ContentType::Form)
            .body("nickname=alice&password=nope")
            .dispatch();
        assert_eq!(response.status(), Status::Unauthorized);
        assert!(response.cookies().get("jwt").is_none());
    }

    #[test]
    fn token_endpoint_issues_bearer_tokens() {
        let (_dir, _state, client) = test_client();
        let response = client
            .post("/auth/token")
            .header(ContentType::JSON)
            .body(r#"{"nickname":"bob","password":"admin"}"#)
            .dispatch();
        assert_eq!(response.status(), Status::Ok);
        let body: serde_json::Value = response.into_json().unwrap();
        assert!(body["token"].as_str().is_some_and(|token| !token.is_empty()));
    }
}
