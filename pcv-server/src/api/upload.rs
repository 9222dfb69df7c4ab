//! File upload
//!
//! Stores the uploaded bytes, enqueues verification, and sends the browser
//! back to the landing page. The request never waits for verification.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header::LOCATION, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tracing::{debug, info};

use crate::api::ui::NO_FILE_ERROR;
use crate::api::AuthenticatedUser;
use crate::submission::SubmitError;
use crate::{ApiError, ApiResult, AppState};

/// Multipart field carrying the file
pub const UPLOAD_FIELD: &str = "file";

/// Largest accepted request body
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

/// POST /upload
///
/// 302 to `/` once the job is queued, or to `/?error=no-file` when the form
/// carried no file (or an empty one).
pub async fn upload_file(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;
        debug!(file_name = ?file_name, bytes = bytes.len(), "Received upload");
        if !bytes.is_empty() {
            upload = Some(bytes.to_vec());
        }
        break;
    }

    let handle = match upload {
        Some(bytes) => Some(state.content.put(bytes).await?),
        None => None,
    };

    match state.submissions.submit(handle, &user).await {
        Ok(job_id) => {
            info!(%job_id, user = %user.email, "Upload accepted");
            Ok(found("/"))
        }
        Err(SubmitError::NoContent) => {
            info!(user = %user.email, "Upload rejected: no file");
            Ok(found(&format!("/?error={}", NO_FILE_ERROR)))
        }
        Err(SubmitError::Queue(e)) => Err(ApiError::Common(e)),
    }
}

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_file))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}
