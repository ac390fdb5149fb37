use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::database::store::{ExamFilter, ExamStore, Page};
use crate::error::{Error, Result};
use crate::models::answer::Answer;
use crate::models::exam::{Exam, ExamStatus, NewExam, Tier};
use crate::models::question::{ExamQuestion, Question};
use crate::models::quota::QuotaRecord;
use crate::models::result::ExamResult;

#[derive(Default)]
struct MemoryState {
    next_exam_id: i64,
    exams: BTreeMap<i64, Exam>,
    questions: HashMap<i64, Vec<ExamQuestion>>,
    answers: HashMap<(i64, i64), Answer>,
    results: HashMap<i64, ExamResult>,
    quotas: HashMap<(i64, Tier), QuotaRecord>,
}

/// Process-local store for tests and the `memory` backend.
#[derive(Clone, Default)]
pub struct MemoryExamStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryExamStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ExamStore for MemoryExamStore {
    async fn insert_exam(
        &self,
        exam: NewExam,
        questions: &[Question],
    ) -> Result<(Exam, Vec<ExamQuestion>)> {
        let mut state = self.state();
        if state.exams.values().any(|e| e.exam_code == exam.exam_code) {
            return Err(Error::Internal(format!(
                "duplicate exam code {}",
                exam.exam_code
            )));
        }
        state.next_exam_id += 1;
        let id = state.next_exam_id;
        let stored = Exam {
            id,
            exam_code: exam.exam_code,
            user_id: exam.user_id,
            tier: exam.tier,
            status: ExamStatus::InProgress,
            total_questions: exam.total_questions,
            answered_questions: 0,
            time_limit_secs: exam.time_limit_secs,
            ip_address: exam.ip_address,
            created_at: exam.created_at,
            start_time: exam.created_at,
            end_time: None,
        };
        let snapshot: Vec<ExamQuestion> = questions
            .iter()
            .enumerate()
            .map(|(idx, q)| ExamQuestion {
                exam_id: id,
                question_id: q.id,
                sequence: idx as i32 + 1,
                trait_group: q.trait_group,
                question_text: q.text.clone(),
            })
            .collect();
        state.exams.insert(id, stored.clone());
        state.questions.insert(id, snapshot.clone());
        Ok((stored, snapshot))
    }

    async fn get_exam(&self, exam_id: i64) -> Result<Option<Exam>> {
        Ok(self.state().exams.get(&exam_id).cloned())
    }

    async fn get_exam_by_code(&self, exam_code: &str) -> Result<Option<Exam>> {
        Ok(self
            .state()
            .exams
            .values()
            .find(|e| e.exam_code == exam_code)
            .cloned())
    }

    async fn in_progress_exams(&self, user_id: i64) -> Result<Vec<Exam>> {
        Ok(self
            .state()
            .exams
            .values()
            .filter(|e| e.user_id == user_id && e.status == ExamStatus::InProgress)
            .cloned()
            .collect())
    }

    async fn update_exam(&self, exam: &Exam) -> Result<()> {
        let mut state = self.state();
        let slot = state
            .exams
            .get_mut(&exam.id)
            .ok_or_else(|| Error::ExamNotFound(exam.id.to_string()))?;
        slot.status = exam.status;
        slot.answered_questions = exam.answered_questions;
        slot.end_time = exam.end_time;
        Ok(())
    }

    async fn list_exams(
        &self,
        user_id: i64,
        filter: &ExamFilter,
        page: Page,
    ) -> Result<(Vec<Exam>, i64)> {
        let state = self.state();
        let mut matching: Vec<&Exam> = state
            .exams
            .values()
            .filter(|e| e.user_id == user_id && filter.matches(e))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.per_page as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn exam_questions(&self, exam_id: i64) -> Result<Vec<ExamQuestion>> {
        Ok(self
            .state()
            .questions
            .get(&exam_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn exam_question(&self, exam_id: i64, question_id: i64) -> Result<Option<ExamQuestion>> {
        Ok(self.state().questions.get(&exam_id).and_then(|qs| {
            qs.iter().find(|q| q.question_id == question_id).cloned()
        }))
    }

    async fn get_answer(&self, exam_id: i64, question_id: i64) -> Result<Option<Answer>> {
        Ok(self.state().answers.get(&(exam_id, question_id)).cloned())
    }

    async fn save_answer(&self, answer: &Answer, answered_questions: i32) -> Result<()> {
        let mut state = self.state();
        let exam = state
            .exams
            .get_mut(&answer.exam_id)
            .ok_or_else(|| Error::ExamNotFound(answer.exam_id.to_string()))?;
        exam.answered_questions = answered_questions;
        state
            .answers
            .insert((answer.exam_id, answer.question_id), answer.clone());
        Ok(())
    }

    async fn list_answers(&self, exam_id: i64) -> Result<Vec<Answer>> {
        let state = self.state();
        let mut answers: Vec<Answer> = state
            .answers
            .values()
            .filter(|a| a.exam_id == exam_id)
            .cloned()
            .collect();
        answers.sort_by_key(|a| a.sequence);
        Ok(answers)
    }

    async fn complete_exam(
        &self,
        exam: &Exam,
        result: &ExamResult,
        quota: &QuotaRecord,
    ) -> Result<()> {
        let mut state = self.state();
        if state.results.contains_key(&exam.id) {
            return Err(Error::Internal(format!(
                "result for exam {} already stored",
                exam.id
            )));
        }
        let slot = state
            .exams
            .get_mut(&exam.id)
            .ok_or_else(|| Error::ExamNotFound(exam.id.to_string()))?;
        slot.status = exam.status;
        slot.answered_questions = exam.answered_questions;
        slot.end_time = exam.end_time;
        state.results.insert(exam.id, result.clone());
        state
            .quotas
            .insert((quota.user_id, quota.tier), quota.clone());
        Ok(())
    }

    async fn get_result(&self, exam_id: i64) -> Result<Option<ExamResult>> {
        Ok(self.state().results.get(&exam_id).cloned())
    }

    async fn get_quota(&self, user_id: i64, tier: Tier) -> Result<Option<QuotaRecord>> {
        Ok(self.state().quotas.get(&(user_id, tier)).cloned())
    }

    async fn save_quota(&self, record: &QuotaRecord) -> Result<()> {
        self.state()
            .quotas
            .insert((record.user_id, record.tier), record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::TraitGroup;
    use chrono::{Duration, Utc};

    fn new_exam(code: &str, user_id: i64, at: chrono::DateTime<Utc>) -> NewExam {
        NewExam {
            exam_code: code.into(),
            user_id,
            tier: Tier::Free,
            total_questions: 2,
            time_limit_secs: 0,
            ip_address: Some("127.0.0.1".into()),
            created_at: at,
        }
    }

    fn questions() -> Vec<Question> {
        vec![
            Question {
                id: 10,
                text: "Fix engines".into(),
                trait_group: TraitGroup::R,
            },
            Question {
                id: 20,
                text: "Lead a team".into(),
                trait_group: TraitGroup::E,
            },
        ]
    }

    #[tokio::test]
    async fn snapshot_keeps_presentation_order() {
        let store = MemoryExamStore::new();
        let (exam, snapshot) = store
            .insert_exam(new_exam("EX1", 1, Utc::now()), &questions())
            .await
            .unwrap();
        assert_eq!(exam.status, ExamStatus::InProgress);
        assert_eq!(snapshot[1].sequence, 2);
        assert_eq!(snapshot[1].question_id, 20);
        let found = store.exam_question(exam.id, 10).await.unwrap();
        assert_eq!(found.map(|q| q.trait_group), Some(TraitGroup::R));
        assert!(store.exam_question(exam.id, 99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_newest_first_and_paged() {
        let store = MemoryExamStore::new();
        let start = Utc::now();
        for i in 0..3 {
            store
                .insert_exam(
                    new_exam(&format!("EX{}", i), 5, start + Duration::minutes(i)),
                    &questions(),
                )
                .await
                .unwrap();
        }
        store
            .insert_exam(new_exam("OTHER", 6, start), &questions())
            .await
            .unwrap();

        let (items, total) = store
            .list_exams(5, &ExamFilter::default(), Page::new(Some(1), Some(2)))
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].exam_code, "EX2");
    }
}
