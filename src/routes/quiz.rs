use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use validator::Validate;

use crate::database::store::Page;
use crate::dto::quiz_dto::{
    CareerSuggestionsResponse, CareersQuery, CreateExamRequest, CreateExamResponse,
    ExamListResponse, ExamQuestionsResponse, ExamResponse, ListExamsQuery, QuotaQuery,
    SubmitAnswerRequest, SubmitAnswerResponse, SubmitExamRequest, SubmitExamResponse,
};
use crate::error::Error;
use crate::middleware::auth::Claims;
use crate::middleware::rate_limit::ClientIp;
use crate::models::exam::Tier;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/api/quiz/create-exam",
    request_body = CreateExamRequest,
    responses(
        (status = 201, description = "Exam created", body = CreateExamResponse),
        (status = 402, description = "No paid attempts left (error_code 466)"),
        (status = 409, description = "Another exam is in progress (error_code 460)"),
        (status = 423, description = "Locked out after violations (error_code 464)"),
        (status = 503, description = "Question bank cannot fill the exam")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn create_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    client_ip: Option<Extension<ClientIp>>,
    Json(req): Json<CreateExamRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    let user_id = claims.target_user(req.user_id)?;
    let created = state
        .exam_service
        .create(
            claims.actor()?,
            user_id,
            req.tier,
            client_ip.and_then(|Extension(ClientIp(ip))| ip),
            req.force_new.unwrap_or(false),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(CreateExamResponse::from(created))).into_response())
}

#[utoipa::path(
    post,
    path = "/api/quiz/submit-answer",
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer stored", body = SubmitAnswerResponse),
        (status = 408, description = "Exam timed out (error_code 461)"),
        (status = 409, description = "Exam no longer in progress (error_code 460)"),
        (status = 422, description = "Invalid value or question not in exam")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn submit_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubmitAnswerRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    let recorded = state
        .exam_service
        .answer(
            claims.actor()?,
            req.exam_id,
            req.question_id,
            req.value,
            req.time_spent,
        )
        .await?;
    Ok(Json(SubmitAnswerResponse::from(recorded)).into_response())
}

#[utoipa::path(
    post,
    path = "/api/quiz/submit-exam",
    request_body = SubmitExamRequest,
    responses(
        (status = 200, description = "Exam completed and scored", body = SubmitExamResponse),
        (status = 400, description = "Incomplete (462), fraud (463) or insufficient basis (467)"),
        (status = 408, description = "Exam timed out (error_code 461)"),
        (status = 409, description = "Exam no longer in progress (error_code 460)")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn submit_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubmitExamRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    let view = state
        .exam_service
        .submit(claims.actor()?, req.exam_id, req.force.unwrap_or(false))
        .await?;
    let suggested = state.careers.for_result(view.result.as_ref()).await?;
    Ok(Json(SubmitExamResponse::new(&view, suggested)).into_response())
}

#[utoipa::path(
    get,
    path = "/api/quiz/exam/{exam_id}",
    params(("exam_id" = i64, Path, description = "Exam id")),
    responses(
        (status = 200, description = "Exam state", body = ExamResponse),
        (status = 404, description = "Exam not found")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn get_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> crate::error::Result<Response> {
    let view = state.exam_service.get(claims.actor()?, exam_id).await?;
    let suggested = state.careers.for_result(view.result.as_ref()).await?;
    let response = ExamResponse::from_view(&view, state.now()).with_suggestions(suggested);
    Ok(Json(response).into_response())
}

#[utoipa::path(
    get,
    path = "/api/quiz/exam/{exam_id}/questions",
    params(("exam_id" = i64, Path, description = "Exam id")),
    responses(
        (status = 200, description = "Question snapshot with answers so far", body = ExamQuestionsResponse),
        (status = 404, description = "Exam not found")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn get_exam_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> crate::error::Result<Response> {
    let sheet = state.exam_service.questions(claims.actor()?, exam_id).await?;
    Ok(Json(ExamQuestionsResponse::new(&sheet, state.now())).into_response())
}

#[utoipa::path(
    post,
    path = "/api/quiz/exam/{exam_id}/cancel",
    params(("exam_id" = i64, Path, description = "Exam id")),
    responses(
        (status = 200, description = "Exam cancelled", body = ExamResponse),
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
    let view = state.exam_service.cancel(claims.actor()?, exam_id).await?;
    Ok(Json(ExamResponse::from_view(&view, state.now())).into_response())
}

#[utoipa::path(
    get,
    path = "/api/quiz/result/{exam_code}",
    params(("exam_code" = String, Path, description = "Shareable exam code")),
    responses(
        (status = 200, description = "Exam with result", body = ExamResponse),
        (status = 404, description = "Exam not found")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn get_result_by_code(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exam_code): Path<String>,
) -> crate::error::Result<Response> {
    let view = state
        .exam_service
        .get_by_code(claims.actor()?, exam_code.trim())
        .await?;
    let suggested = state.careers.for_result(view.result.as_ref()).await?;
    let response = ExamResponse::from_view(&view, state.now()).with_suggestions(suggested);
    Ok(Json(response).into_response())
}

#[utoipa::path(
    get,
    path = "/api/quiz/exam/{exam_id}/careers",
    params(
        ("exam_id" = i64, Path, description = "Exam id"),
        ("star" = Option<u8>, Query, description = "Only this tier, 2 to 5 stars"),
        ("limit" = Option<usize>, Query, description = "At most this many jobs, default 50, max 100")
    ),
    responses(
        (status = 200, description = "Ranked career matches", body = CareerSuggestionsResponse),
        (status = 400, description = "Exam has no result yet"),
        (status = 404, description = "Exam not found")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn get_exam_careers(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
    Query(query): Query<CareersQuery>,
) -> crate::error::Result<Response> {
    query.validate()?;
    let view = state.exam_service.get(claims.actor()?, exam_id).await?;
    let result = view
        .result
        .as_ref()
        .ok_or_else(|| Error::BadRequest(format!("exam {} has no result yet", exam_id)))?;
    let suggestions = state.careers.suggest(&result.holland_code).await?;
    Ok(Json(CareerSuggestionsResponse::new(
        exam_id,
        result.holland_code.to_string(),
        suggestions,
        &query,
    ))
    .into_response())
}

#[utoipa::path(
    get,
    path = "/api/quiz/exams",
    params(
        ("status" = Option<String>, Query, description = "in_progress, completed, timeout or cancelled"),
        ("tier" = Option<String>, Query, description = "free or paid"),
        ("search" = Option<String>, Query, description = "Part of the exam code"),
        ("page" = Option<i64>, Query, description = "Page number, from 1"),
        ("limit" = Option<i64>, Query, description = "Items per page, at most 100"),
        ("user_id" = Option<i64>, Query, description = "Another user's exams (admin only)")
    ),
    responses(
        (status = 200, description = "Exams, newest first", body = ExamListResponse)
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn list_exams(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListExamsQuery>,
) -> crate::error::Result<Response> {
    query.validate()?;
    let user_id = claims.target_user(query.user_id)?;
    let page = state
        .exam_service
        .list_for_user(
            claims.actor()?,
            user_id,
            query.filter(),
            Page::new(query.page, query.limit),
        )
        .await?;
    Ok(Json(ExamListResponse::new(&page, state.now())).into_response())
}

#[utoipa::path(
    get,
    path = "/api/quiz/quota",
    params(
        ("tier" = Option<String>, Query, description = "free (default) or paid"),
        ("user_id" = Option<i64>, Query, description = "Another user's quota (admin only)")
    ),
    responses(
        (status = 200, description = "Quota standing", body = crate::models::quota::QuotaStanding)
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn get_quota(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<QuotaQuery>,
) -> crate::error::Result<Response> {
    let user_id = claims.target_user(query.user_id)?;
    let standing = state
        .exam_service
        .quota()
        .standing(user_id, query.tier.unwrap_or(Tier::Free))
        .await?;
    Ok(Json(standing).into_response())
}
