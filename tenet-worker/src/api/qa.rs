//! Q&A API Handler

use axum::{
    Json,
    extract::{Path, State},
};
use tenet_core::dto::qa::{AskQuestion, QaAnswer};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /job/{id}/question
/// Ask a question answered only from the job's segments
pub async fn ask_question(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AskQuestion>,
) -> ApiResult<Json<QaAnswer>> {
    tracing::info!("Question received for job: {}", id);

    let answer = state.qa.ask(id, &req.question).await?;
    Ok(Json(answer))
}
