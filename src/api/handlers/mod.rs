pub mod entry;
pub mod notification;
pub mod pages;
pub mod queue;
pub mod rpc;
pub mod storage;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_support {
    use rocket::http::Header;
    use rocket::local::blocking::Client;
    use std::sync::Arc;
    use tempfile::TempDir;

    use crate::api::build_rocket;
    use crate::api::claims::Claims;
    use crate::workflow::AppState;
    use crate::workflow::tests::test_state;

    pub fn test_client() -> (TempDir, Arc<AppState>, Client) {
        let (dir, state) = test_state();
        let client = Client::tracked(build_rocket(state.clone())).unwrap();
        (dir, state, client)
    }

    pub fn user_bearer(state: &AppState, nickname: &str) -> Header<'static> {
        let token = Claims::new(nickname, 60)
            .encode_with_key(&state.config.get_jwt_secret_key())
            .unwrap();
        Header::new("Authorization", format!("Bearer {token}"))
    }

    pub fn service_bearer(state: &AppState) -> Header<'static> {
        Header::new(
            "Authorization",
            format!("Bearer {}", state.config.service_key),
        )
    }

    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 10) as u8, (y * 10) as u8, 128])
        });
        let mut buffer = std::io::Cursor::new(Vec::new());
        image.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        buffer.into_inner()
    }
}
