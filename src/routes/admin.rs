use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json, Response},
    Extension,
};
use validator::Validate;

use crate::dto::quiz_dto::{ExamResponse, GrantQuotaRequest};
use crate::middleware::auth::Claims;
use crate::models::exam::Actor;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/api/admin/quiz/quota/grant",
    request_body = GrantQuotaRequest,
    responses(
        (status = 200, description = "Paid attempts added", body = crate::models::quota::QuotaStanding),
        (status = 403, description = "Admin role required")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn grant_quota(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GrantQuotaRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    tracing::info!(admin = %claims.sub, user_id = req.user_id, attempts = req.attempts, "granting paid attempts");
    let standing = state
        .exam_service
        .quota()
        .grant(req.user_id, req.attempts)
        .await?;
    Ok(Json(standing).into_response())
}

#[utoipa::path(
    post,
    path = "/api/admin/quiz/exam/{exam_id}/cancel",
    params(("exam_id" = i64, Path, description = "Exam id")),
    responses(
        (status = 200, description = "Exam cancelled", body = ExamResponse),
        (status = 403, description = "Admin role required"),
        (status = 409, description = "Exam no longer in progress (error_code 460)")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn cancel_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> crate::error::Result<Response> {
    tracing::info!(admin = %claims.sub, exam_id, "admin cancelling exam");
    let view = state.exam_service.cancel(Actor::Admin, exam_id).await?;
    Ok(Json(ExamResponse::from_view(&view, state.now())).into_response())
}
