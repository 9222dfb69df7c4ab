//! Result history

use axum::{extract::State, routing::get, Json, Router};

use pcv_common::db::ResultRecord;

use crate::api::AuthenticatedUser;
use crate::{ApiResult, AppState};

/// GET /scores
///
/// The caller's results, earliest first. Empty until a job has finished.
pub async fn list_scores(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ApiResult<Json<Vec<ResultRecord>>> {
    let records = state.results.query(&user.email).await?;
    Ok(Json(records))
}

pub fn score_routes() -> Router<AppState> {
    Router::new().route("/scores", get(list_scores))
}
