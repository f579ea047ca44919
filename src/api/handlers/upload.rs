use anyhow::anyhow;
use log::{error, info};
use rocket::form::{Form, FromForm};
use rocket::fs::TempFile;
use rocket::http::Status;
use rocket::response::Redirect;
use rocket::{Route, State, post};
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use crate::api::fairings::guards::auth::GuardUser;
use crate::api::{AppError, AppResult};
use crate::workflow::{AppState, store_upload};

pub fn generate_upload_routes() -> Vec<Route> {
    routes![upload, delete]
}

#[derive(FromForm)]
pub struct UploadData<'r> {
    file: Option<TempFile<'r>>,
}

#[post("/upload", data = "<data>")]
pub async fn upload(
    state: &State<Arc<AppState>>,
    user: GuardUser,
    data: Form<UploadData<'_>>,
) -> AppResult<Redirect> {
    let Some(file) = data.into_inner().file.filter(|file| file.len() > 0) else {
        error!("No image uploaded.");
        return Err(AppError::new(Status::BadRequest, anyhow!("No image uploaded.")));
    };
    let file_name = file.name().unwrap_or("upload").to_string();

    let mut bytes = Vec::with_capacity(file.len() as usize);
    let reader = file.open().await?;
    tokio::pin!(reader);
    reader.read_to_end(&mut bytes).await?;

    let format = match image::guess_format(&bytes)
        .and_then(|format| image::load_from_memory_with_format(&bytes, format).map(|_| format))
    {
        Ok(format) => format,
        Err(err) => {
            error!("{}", err);
            return Err(AppError::new(
                Status::NotFound,
                anyhow::Error::from(err).context("Uploaded file is not a readable image"),
            ));
        }
    };
    info!("Uploading file {:?} ({:?})", file_name, format);

    store_upload(
        state,
        &file_name,
        bytes,
        format.to_mime_type(),
        user.owner(),
    )
    .await?;
    Ok(Redirect::to(uri!("/")))
}

#[derive(Debug, FromForm)]
pub struct DeleteData {
    id: String,
}

#[post("/delete", data = "<data>")]
pub async fn delete(state: &State<Arc<AppState>>, data: Form<DeleteData>) -> AppResult<Redirect> {
    let store = state.store.clone();
    let key = data.into_inner().id;
    let removed = {
        let key = key.clone();
        tokio::task::spawn_blocking(move || store.delete_bitdoc(&key)).await??
    };
    if removed {
        info!("Removed Bitdoc {}", key);
    }
    Ok(Redirect::to(uri!("/")))
}

#[cfg(test)]
mod tests {
    use crate::api::handlers::test_support::{png_bytes, test_client, user_bearer};
    use crate::database::schema::bitdoc::BitdocSchema;
    use crate::database::schema::task::TaskPayload;
    use crate::utils::now_millis;
    use rocket::http::{ContentType, Status};

    const BOUNDARY: &str = "smashpixboundary";

    fn multipart(file_name: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn multipart_type() -> ContentType {
        ContentType::new("multipart", "form-data").with_params(("boundary", BOUNDARY))
    }

    #[test]
    fn upload_stores_object_and_queues_task() {
        let (_dir, state, client) = test_client();
        let response = client
            .post("/upload")
            .header(multipart_type())
            .header(user_bearer(&state, "alice"))
            .body(multipart("cat.png", &png_bytes(8, 8)))
            .dispatch();
        assert_eq!(response.status(), Status::SeeOther);

        let bitdocs = state.store.list_bitdocs(10, 0).unwrap();
        assert_eq!(bitdocs.len(), 1);
        let bitdoc = &bitdocs[0];
        assert_eq!(bitdoc.user, "alice");
        let file_name = bitdoc.file_name.clone().unwrap();
        assert!(file_name.starts_with("cat_"));
        let (meta, bytes) = state
            .objects
            .get(&state.config.main_bucket, &file_name)
            .unwrap()
            .unwrap();
        assert_eq!(meta.content_type, "image/png");
        assert_eq!(meta.owner.as_deref(), Some("alice"));
        assert_eq!(bytes, png_bytes(8, 8));

        let leased = state
            .store
            .lease_tasks(&state.config.queue_name, 5, 60, now_millis())
            .unwrap();
        let payload: TaskPayload = serde_json::from_slice(&leased[0].1.payload).unwrap();
        assert_eq!(payload.key, bitdoc.key.as_str());
    }

    #[test]
    fn anonymous_upload_is_owned_by_anonymous() {
        let (_dir, state, client) = test_client();
        client
            .post("/upload")
            .header(multipart_type())
            .body(multipart("dog.png", &png_bytes(4, 4)))
            .dispatch();
        let bitdocs = state.store.list_bitdocs(10, 0).unwrap();
        assert_eq!(bitdocs[0].user, "Anonymous");
    }

    #[test]
    fn missing_or_broken_files_are_rejected() {
        let (_dir, state, client) = test_client();
        let response = client
            .post("/upload")
            .header(multipart_type())
            .body(multipart("empty.png", b""))
            .dispatch();
        assert_eq!(response.status(), Status::BadRequest);

        let response = client
            .post("/upload")
            .header(multipart_type())
            .body(multipart("notes.txt", b"definitely not pixels"))
            .dispatch();
        assert_eq!(response.status(), Status::NotFound);
        assert!(state.store.list_bitdocs(10, 0).unwrap().is_empty());
    }

    #[test]
    fn delete_removes_bitdoc() {
        let (_dir, state, client) = test_client();
        let bitdoc = BitdocSchema::new("alice", "http://img/a", None).unwrap();
        state.store.insert_bitdoc(&bitdoc).unwrap();

        let response = client
            .post("/delete")
            .header(ContentType::Form)
            .body(format!("id={}", bitdoc.key))
            .dispatch();
        assert_eq!(response.status(), Status::SeeOther);
        assert!(state.store.get_bitdoc(&bitdoc.key).unwrap().is_none());

        let response = client
            .post("/delete")
            .header(ContentType::Form)
            .body("id=unknown")
            .dispatch();
        assert_eq!(response.status(), Status::SeeOther);
    }
}
