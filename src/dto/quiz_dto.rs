use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::database::store::ExamFilter;
use crate::models::answer::{Answer, AnswerValue};
use crate::models::career::CareerSuggestion;
use crate::models::exam::{Exam, ExamStatus, Tier};
use crate::models::question::{ExamQuestion, TraitGroup};
use crate::models::quota::QuotaStanding;
use crate::models::result::{ExamResult, TraitScores};
use crate::services::exam_service::{CreatedExam, ExamPage, ExamSheet, ExamView, RecordedAnswer};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateExamRequest {
    /// Defaults to the token subject; other ids need the admin role.
    #[validate(range(min = 1))]
    pub user_id: Option<i64>,
    pub tier: Tier,
    pub force_new: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubmitAnswerRequest {
    pub exam_id: i64,
    pub question_id: i64,
    /// 0 disagree, 1 neutral, 2 agree.
    pub value: i32,
    #[validate(range(min = 0, max = 86400))]
    pub time_spent: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubmitExamRequest {
    pub exam_id: i64,
    pub force: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ListExamsQuery {
    pub status: Option<ExamStatus>,
    pub tier: Option<Tier>,
    #[validate(length(max = 64))]
    pub search: Option<String>,
    #[validate(range(min = 1))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,
    pub user_id: Option<i64>,
}

impl ListExamsQuery {
    pub fn filter(&self) -> ExamFilter {
        ExamFilter {
            status: self.status,
            tier: self.tier,
            search: self.search.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotaQuery {
    pub tier: Option<Tier>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct GrantQuotaRequest {
    #[validate(range(min = 1))]
    pub user_id: i64,
    #[validate(range(min = 1, max = 1000))]
    pub attempts: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChoiceItem {
    pub value: i32,
    pub label: String,
}

pub fn choices() -> Vec<ChoiceItem> {
    AnswerValue::CHOICES
        .iter()
        .map(|c| ChoiceItem {
            value: c.score(),
            label: c.label().to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuestionItem {
    pub question_id: i64,
    pub sequence: i32,
    pub question_text: String,
    pub trait_group: TraitGroup,
    /// Present once answered.
    pub value: Option<i32>,
    pub time_spent: Option<i32>,
}

impl QuestionItem {
    fn new(question: &ExamQuestion, answer: Option<&Answer>) -> Self {
        Self {
            question_id: question.question_id,
            sequence: question.sequence,
            question_text: question.question_text.clone(),
            trait_group: question.trait_group,
            value: answer.map(|a| a.value.score()),
            time_spent: answer.map(|a| a.time_spent_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResultResponse {
    pub holland_code: String,
    pub primary_group: TraitGroup,
    pub secondary_group: TraitGroup,
    pub tertiary_group: TraitGroup,
    pub characteristics_code: String,
    pub scores: TraitScores,
    pub total_score: i32,
    pub fraud_flag: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&ExamResult> for ResultResponse {
    fn from(result: &ExamResult) -> Self {
        Self {
            holland_code: result.holland_code.to_string(),
            primary_group: result.holland_code.primary(),
            secondary_group: result.holland_code.secondary(),
            tertiary_group: result.holland_code.tertiary(),
            characteristics_code: result.characteristics_code.clone(),
            scores: result.scores,
            total_score: result.total_score,
            fraud_flag: result.fraud_flag,
            created_at: result.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExamResponse {
    pub exam_id: i64,
    pub exam_code: String,
    pub user_id: i64,
    pub tier: Tier,
    pub status: ExamStatus,
    /// Legacy numeric status: 1 in progress, 0 completed, 2 timeout, 3 cancelled.
    pub status_code: i32,
    pub total_questions: i32,
    pub answered_questions: i32,
    pub time_limit_secs: i32,
    pub time_remaining_secs: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub result: Option<ResultResponse>,
    /// Ranked career matches; filled for completed exams on single-exam reads.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_jobs: Vec<CareerSuggestion>,
}

impl ExamResponse {
    pub fn new(exam: &Exam, result: Option<&ExamResult>, now: DateTime<Utc>) -> Self {
        Self {
            exam_id: exam.id,
            exam_code: exam.exam_code.clone(),
            user_id: exam.user_id,
            tier: exam.tier,
            status: exam.status,
            status_code: exam.status.legacy_code(),
            total_questions: exam.total_questions,
            answered_questions: exam.answered_questions,
            time_limit_secs: exam.time_limit_secs,
            time_remaining_secs: if exam.is_active() {
                exam.time_remaining_secs(now)
            } else {
                None
            },
            created_at: exam.created_at,
            start_time: exam.start_time,
            end_time: exam.end_time,
            result: result.map(ResultResponse::from),
            suggested_jobs: Vec::new(),
        }
    }

    pub fn with_suggestions(mut self, suggested_jobs: Vec<CareerSuggestion>) -> Self {
        self.suggested_jobs = suggested_jobs;
        self
    }

    pub fn from_view(view: &ExamView, now: DateTime<Utc>) -> Self {
        Self::new(&view.exam, view.result.as_ref(), now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateExamResponse {
    pub exam_id: i64,
    pub exam_code: String,
    pub tier: Tier,
    pub status: ExamStatus,
    pub status_code: i32,
    pub total_questions: i32,
    pub time_limit_secs: i32,
    pub questions: Vec<QuestionItem>,
    pub choices: Vec<ChoiceItem>,
    pub quota: QuotaStanding,
}

impl From<CreatedExam> for CreateExamResponse {
    fn from(created: CreatedExam) -> Self {
        let exam = created.exam;
        Self {
            exam_id: exam.id,
            exam_code: exam.exam_code,
            tier: exam.tier,
            status: exam.status,
            status_code: exam.status.legacy_code(),
            total_questions: exam.total_questions,
            time_limit_secs: exam.time_limit_secs,
            questions: created
                .questions
                .iter()
                .map(|q| QuestionItem::new(q, None))
                .collect(),
            choices: choices(),
            quota: created.quota,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitAnswerResponse {
    pub ok: bool,
    pub exam_id: i64,
    pub question_id: i64,
    pub answered_questions: i32,
    pub total_questions: i32,
    pub change_count: i32,
}

impl From<RecordedAnswer> for SubmitAnswerResponse {
    fn from(recorded: RecordedAnswer) -> Self {
        Self {
            ok: true,
            exam_id: recorded.exam.id,
            question_id: recorded.answer.question_id,
            answered_questions: recorded.exam.answered_questions,
            total_questions: recorded.exam.total_questions,
            change_count: recorded.answer.change_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitExamResponse {
    pub exam_id: i64,
    pub exam_code: String,
    pub status: ExamStatus,
    pub status_code: i32,
    pub result: Option<ResultResponse>,
    pub suggested_jobs: Vec<CareerSuggestion>,
}

impl SubmitExamResponse {
    pub fn new(view: &ExamView, suggested_jobs: Vec<CareerSuggestion>) -> Self {
        Self {
            exam_id: view.exam.id,
            exam_code: view.exam.exam_code.clone(),
            status: view.exam.status,
            status_code: view.exam.status.legacy_code(),
            result: view.result.as_ref().map(ResultResponse::from),
            suggested_jobs,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CareersQuery {
    /// Keep only one tier, 2 to 5 stars.
    #[validate(range(min = 2, max = 5))]
    pub star: Option<u8>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StarSummary {
    pub star_rating: u8,
    pub count: usize,
    pub avg_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CareerSuggestionsResponse {
    pub exam_id: i64,
    pub holland_code: String,
    pub jobs: Vec<CareerSuggestion>,
    /// More matches exist beyond `limit`.
    pub has_more: bool,
    /// Per tier over all matches, before the star filter.
    pub summary: Vec<StarSummary>,
}

impl CareerSuggestionsResponse {
    pub const DEFAULT_LIMIT: usize = 50;

    pub fn new(
        exam_id: i64,
        holland_code: String,
        suggestions: Vec<CareerSuggestion>,
        query: &CareersQuery,
    ) -> Self {
        let summary = [5u8, 4, 3, 2]
            .into_iter()
            .filter_map(|star| {
                let scores: Vec<f64> = suggestions
                    .iter()
                    .filter(|s| s.star_rating == star)
                    .map(|s| s.match_score)
                    .collect();
                if scores.is_empty() {
                    return None;
                }
                let avg = scores.iter().sum::<f64>() / scores.len() as f64;
                Some(StarSummary {
                    star_rating: star,
                    count: scores.len(),
                    avg_score: (avg * 100.0).round() / 100.0,
                })
            })
            .collect();
        let limit = query.limit.unwrap_or(Self::DEFAULT_LIMIT);
        let mut jobs: Vec<CareerSuggestion> = suggestions
            .into_iter()
            .filter(|s| query.star.map_or(true, |star| s.star_rating == star))
            .collect();
        let has_more = jobs.len() > limit;
        jobs.truncate(limit);
        Self {
            exam_id,
            holland_code,
            jobs,
            has_more,
            summary,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExamQuestionsResponse {
    pub exam: ExamResponse,
    pub questions: Vec<QuestionItem>,
    pub choices: Vec<ChoiceItem>,
}

impl ExamQuestionsResponse {
    pub fn new(sheet: &ExamSheet, now: DateTime<Utc>) -> Self {
        let questions = sheet
            .questions
            .iter()
            .map(|q| {
                let answer = sheet.answers.iter().find(|a| a.question_id == q.question_id);
                QuestionItem::new(q, answer)
            })
            .collect();
        Self {
            exam: ExamResponse::new(&sheet.exam, None, now),
            questions,
            choices: choices(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExamListResponse {
    pub items: Vec<ExamResponse>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl ExamListResponse {
    pub fn new(page: &ExamPage, now: DateTime<Utc>) -> Self {
        let total_pages = ((page.total as f64) / (page.per_page as f64)).ceil() as i64;
        Self {
            items: page
                .items
                .iter()
                .map(|view| ExamResponse::from_view(view, now))
                .collect(),
            total: page.total,
            page: page.page,
            per_page: page.per_page,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::career::{Job, MatchType};

    #[test]
    fn negative_time_spent_fails_validation() {
        let req: SubmitAnswerRequest = serde_json::from_value(serde_json::json!({
            "exam_id": 1, "question_id": 2, "value": 1, "time_spent": -3
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn create_request_accepts_legacy_tier_spelling() {
        let req: CreateExamRequest =
            serde_json::from_value(serde_json::json!({ "tier": "PAID" })).unwrap();
        assert_eq!(req.tier, Tier::Paid);
        assert!(req.user_id.is_none());
        assert!(req.validate().is_ok());
    }

    fn suggestion(id: i64, match_type: MatchType, score: f64) -> CareerSuggestion {
        CareerSuggestion::new(
            Job {
                id,
                job_name: format!("job {}", id),
                job_name_en: None,
                holland_code: "RIA".into(),
                job_group: None,
                description: None,
                education_level: None,
                work_environment: None,
                is_active: true,
            },
            match_type,
            score,
        )
    }

    #[test]
    fn careers_filter_limits_jobs_but_not_summary() {
        let all = vec![
            suggestion(1, MatchType::Exact, 100.0),
            suggestion(2, MatchType::TwoChar, 75.0),
            suggestion(3, MatchType::TwoChar, 72.5),
            suggestion(4, MatchType::TwoChar, 70.0),
        ];
        let query = CareersQuery {
            star: Some(3),
            limit: Some(2),
        };
        let resp = CareerSuggestionsResponse::new(9, "RIA".into(), all, &query);
        assert_eq!(resp.jobs.iter().map(|j| j.job_id).collect::<Vec<_>>(), vec![2, 3]);
        assert!(resp.has_more);
        assert_eq!(resp.summary.len(), 2);
        assert_eq!(resp.summary[0].star_rating, 5);
        assert_eq!(resp.summary[1].count, 3);
        assert_eq!(resp.summary[1].avg_score, 72.5);
    }

    #[test]
    fn star_filter_outside_tiers_fails_validation() {
        let query = CareersQuery {
            star: Some(1),
            limit: None,
        };
        assert!(query.validate().is_err());
        let query = CareersQuery {
            star: None,
            limit: Some(101),
        };
        assert!(query.validate().is_err());
    }

    #[test]
    fn choices_are_the_three_likert_values() {
        let values: Vec<i32> = choices().iter().map(|c| c.value).collect();
        assert_eq!(values, vec![0, 1, 2]);
    }
}
