use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use bytes::BytesMut;
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::services::{ext_from_mime, store_profile_image, MAX_UPLOAD_BYTES};
use crate::{
    auth::services::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload))
        // room for multipart framing so oversized files reach our own check
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 1024 * 1024))
}

#[derive(Debug, Serialize)]
pub struct Uploaded {
    pub url: String,
    pub message: &'static str,
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> ApiError {
    warn!(error = %e, "multipart read failed");
    ApiError::bad_request("Invalid upload")
}

#[instrument(skip(state, mp))]
pub async fn upload(
    State(state): State<AppState>,
    auth: AuthUser,
    mut mp: Multipart,
) -> ApiResult<Json<Uploaded>> {
    while let Some(mut field) = mp.next_field().await.map_err(bad_multipart)? {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_string();
        if ext_from_mime(&content_type).is_none() {
            warn!(%content_type, "rejected upload type");
            return Err(ApiError::bad_request("Only PNG, JPG, JPEG images are allowed"));
        }

        let mut data = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(bad_multipart)? {
            if data.len() + chunk.len() > MAX_UPLOAD_BYTES {
                warn!(user_id = %auth.user_id, "upload over size limit");
                return Err(ApiError::bad_request("File size must be less than 5MB"));
            }
            data.extend_from_slice(&chunk);
        }

        let size = data.len();
        let url = store_profile_image(&state, auth.user_id, data.freeze(), &content_type)
            .await
            .map_err(|e| ApiError::internal(format!("{:#}", e), "UPLOAD_ERROR", "Upload failed"))?;
        info!(user_id = %auth.user_id, size, %url, "profile image uploaded");
        return Ok(Json(Uploaded {
            url,
            message: "File uploaded successfully",
        }));
    }
    Err(ApiError::bad_request("No file provided"))
}

#[cfg(test)]
mod tests {
    use crate::{app::build_app, auth::repo_types::Role, state::AppState};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "invoxa-test-boundary";

    fn multipart(field: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"avatar\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn upload(body: Vec<u8>) -> (StatusCode, Value) {
        let state = AppState::fake();
        let token = state.test_token(Role::Team);
        let res = build_app(state)
            .oneshot(
                Request::post("/api/upload")
                    .header("authorization", format!("Bearer {}", token))
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn png_upload_returns_public_url() {
        let (status, body) = upload(multipart("file", "image/png", b"\x89PNG\r\n")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "File uploaded successfully");
        assert!(body["url"].as_str().unwrap().contains("/profiles/"));
    }

    #[tokio::test]
    async fn non_image_is_rejected() {
        let (status, body) = upload(multipart("file", "application/pdf", b"%PDF")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Only PNG, JPG, JPEG images are allowed");
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let big = vec![0u8; super::MAX_UPLOAD_BYTES + 1];
        let (status, body) = upload(multipart("file", "image/jpeg", &big)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "File size must be less than 5MB");
    }

    #[tokio::test]
    async fn missing_file_field_is_rejected() {
        let (status, body) = upload(multipart("avatar", "image/png", b"x")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No file provided");
    }
}
