use axum::Json;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::dto::quiz_dto::{
    CareerSuggestionsResponse, ChoiceItem, CreateExamRequest, CreateExamResponse,
    ExamListResponse, ExamQuestionsResponse, ExamResponse, GrantQuotaRequest, QuestionItem,
    ResultResponse, StarSummary, SubmitAnswerRequest, SubmitAnswerResponse, SubmitExamRequest,
    SubmitExamResponse,
};
use crate::models::career::{CareerSuggestion, MatchType};
use crate::models::exam::{ExamStatus, Tier};
use crate::models::question::TraitGroup;
use crate::models::quota::{QuotaAdvisory, QuotaStanding};
use crate::models::result::TraitScores;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health,
        crate::routes::quiz::create_exam,
        crate::routes::quiz::submit_answer,
        crate::routes::quiz::submit_exam,
        crate::routes::quiz::get_exam,
        crate::routes::quiz::get_exam_questions,
        crate::routes::quiz::cancel_exam,
        crate::routes::quiz::get_result_by_code,
        crate::routes::quiz::get_exam_careers,
        crate::routes::quiz::list_exams,
        crate::routes::quiz::get_quota,
        crate::routes::admin::grant_quota,
        crate::routes::admin::cancel_exam,
    ),
    components(schemas(
        CreateExamRequest,
        CreateExamResponse,
        SubmitAnswerRequest,
        SubmitAnswerResponse,
        SubmitExamRequest,
        SubmitExamResponse,
        ExamResponse,
        ExamQuestionsResponse,
        ExamListResponse,
        QuestionItem,
        ChoiceItem,
        ResultResponse,
        CareerSuggestionsResponse,
        CareerSuggestion,
        StarSummary,
        MatchType,
        GrantQuotaRequest,
        QuotaStanding,
        QuotaAdvisory,
        TraitScores,
        TraitGroup,
        ExamStatus,
        Tier,
    )),
    modifiers(&BearerAuth),
    tags((name = "quiz", description = "Holland Code assessment"))
)]
pub struct ApiDoc;

#[axum::debug_handler]
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_quiz_paths() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let paths = doc["paths"].as_object().unwrap();
        assert!(paths.contains_key("/api/quiz/create-exam"));
        assert!(paths.contains_key("/api/quiz/exam/{exam_id}/questions"));
        assert!(paths.contains_key("/api/admin/quiz/quota/grant"));
        assert!(paths.contains_key("/api/quiz/exam/{exam_id}/careers"));
        assert!(doc["components"]["securitySchemes"]["bearer"].is_object());
    }
}
