pub mod admin;
pub mod docs;
pub mod health;
pub mod quiz;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};

use crate::middleware::auth::{require_admin, require_bearer_auth};
use crate::middleware::rate_limit::{rps_middleware, RateLimiter};
use crate::AppState;

/// All engine routes with auth and rate limiting applied.
pub fn router(state: AppState, limiter: RateLimiter) -> Router {
    let quiz_api = Router::new()
        .route("/api/quiz/create-exam", post(quiz::create_exam))
        .route("/api/quiz/submit-answer", post(quiz::submit_answer))
        .route("/api/quiz/submit-exam", post(quiz::submit_exam))
        .route("/api/quiz/exam/:exam_id", get(quiz::get_exam))
        .route(
            "/api/quiz/exam/:exam_id/questions",
            get(quiz::get_exam_questions),
        )
        .route("/api/quiz/exam/:exam_id/cancel", post(quiz::cancel_exam))
        .route("/api/quiz/exam/:exam_id/careers", get(quiz::get_exam_careers))
        .route("/api/quiz/result/:exam_code", get(quiz::get_result_by_code))
        .route("/api/quiz/exams", get(quiz::list_exams))
        .route("/api/quiz/quota", get(quiz::get_quota))
        .route_layer(from_fn(require_bearer_auth));

    let admin_api = Router::new()
        .route("/api/admin/quiz/quota/grant", post(admin::grant_quota))
        .route(
            "/api/admin/quiz/exam/:exam_id/cancel",
            post(admin::cancel_exam),
        )
        .route_layer(from_fn(require_admin));

    Router::new()
        .route("/health", get(health::health))
        .route("/api/docs/openapi.json", get(docs::openapi_json))
        .merge(quiz_api)
        .merge(admin_api)
        .layer(from_fn_with_state(limiter, rps_middleware))
        .with_state(state)
}
