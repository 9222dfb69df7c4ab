//! Stored content download

use axum::{
    extract::{Path, State},
    http::header::CONTENT_TYPE,
    response::IntoResponse,
    routing::get,
    Router,
};

use crate::api::AuthenticatedUser;
use crate::content::ContentHandle;
use crate::{ApiResult, AppState};

/// GET /serve/:handle
///
/// Returns the raw bytes of a stored upload. 400 for a malformed handle,
/// 404 for one the store does not hold.
pub async fn serve_content(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(raw_handle): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let handle = ContentHandle::parse(&raw_handle)?;
    let bytes = state.content.fetch(&handle).await?;
    Ok(([(CONTENT_TYPE, "text/plain; charset=utf-8")], bytes))
}

pub fn content_routes() -> Router<AppState> {
    Router::new().route("/serve/:handle", get(serve_content))
}
