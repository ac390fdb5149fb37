use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::answer::Answer;
use crate::models::exam::{Exam, ExamStatus, NewExam, Tier};
use crate::models::question::{ExamQuestion, Question};
use crate::models::quota::QuotaRecord;
use crate::models::result::ExamResult;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExamFilter {
    pub status: Option<ExamStatus>,
    pub tier: Option<Tier>,
    /// Case-insensitive substring of the exam code.
    pub search: Option<String>,
}

impl ExamFilter {
    pub fn matches(&self, exam: &Exam) -> bool {
        if self.status.map_or(false, |s| s != exam.status) {
            return false;
        }
        if self.tier.map_or(false, |t| t != exam.tier) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => exam
                .exam_code
                .to_ascii_lowercase()
                .contains(&needle.to_ascii_lowercase()),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub per_page: i64,
}

impl Page {
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

/// Persistence used by the engine. Every method is a single atomic unit.
#[async_trait]
pub trait ExamStore: Send + Sync {
    /// Inserts an `InProgress` exam together with its question snapshot,
    /// numbered in the order given.
    async fn insert_exam(
        &self,
        exam: NewExam,
        questions: &[Question],
    ) -> Result<(Exam, Vec<ExamQuestion>)>;

    async fn get_exam(&self, exam_id: i64) -> Result<Option<Exam>>;

    async fn get_exam_by_code(&self, exam_code: &str) -> Result<Option<Exam>>;

    async fn in_progress_exams(&self, user_id: i64) -> Result<Vec<Exam>>;

    /// Persists status, answered count and end time.
    async fn update_exam(&self, exam: &Exam) -> Result<()>;

    /// Newest first, with the total number of matches.
    async fn list_exams(
        &self,
        user_id: i64,
        filter: &ExamFilter,
        page: Page,
    ) -> Result<(Vec<Exam>, i64)>;

    async fn exam_questions(&self, exam_id: i64) -> Result<Vec<ExamQuestion>>;

    async fn exam_question(&self, exam_id: i64, question_id: i64) -> Result<Option<ExamQuestion>>;

    async fn get_answer(&self, exam_id: i64, question_id: i64) -> Result<Option<Answer>>;

    /// Upserts the answer and stores the exam's new answered count.
    async fn save_answer(&self, answer: &Answer, answered_questions: i32) -> Result<()>;

    /// Ordered by sequence.
    async fn list_answers(&self, exam_id: i64) -> Result<Vec<Answer>>;

    /// Writes the completed exam, its result and the consumed quota record
    /// as one unit: either all three land or none does.
    async fn complete_exam(
        &self,
        exam: &Exam,
        result: &ExamResult,
        quota: &QuotaRecord,
    ) -> Result<()>;

    async fn get_result(&self, exam_id: i64) -> Result<Option<ExamResult>>;

    async fn get_quota(&self, user_id: i64, tier: Tier) -> Result<Option<QuotaRecord>>;

    async fn save_quota(&self, record: &QuotaRecord) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn exam(code: &str, status: ExamStatus, tier: Tier) -> Exam {
        let now = Utc::now();
        Exam {
            id: 1,
            exam_code: code.into(),
            user_id: 1,
            tier,
            status,
            total_questions: 30,
            answered_questions: 0,
            time_limit_secs: 0,
            ip_address: None,
            created_at: now,
            start_time: now,
            end_time: None,
        }
    }

    #[test]
    fn page_is_clamped() {
        let page = Page::new(Some(0), Some(500));
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, MAX_PAGE_SIZE);
        assert_eq!(Page::new(Some(3), None).offset(), 40);
    }

    #[test]
    fn filter_matches_all_criteria() {
        let e = exam("EX20261016_ABC123", ExamStatus::Completed, Tier::Paid);
        assert!(ExamFilter::default().matches(&e));
        let f = ExamFilter {
            status: Some(ExamStatus::Completed),
            tier: Some(Tier::Paid),
            search: Some("abc".into()),
        };
        assert!(f.matches(&e));
        let wrong_tier = ExamFilter {
            tier: Some(Tier::Free),
            ..ExamFilter::default()
        };
        assert!(!wrong_tier.matches(&e));
    }
}
