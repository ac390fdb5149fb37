use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::database::store::ExamStore;
use crate::error::{Error, Result};
use crate::models::answer::{Answer, AnswerValue};
use crate::models::exam::Exam;

/// Stores answers, at most one per (exam, question).
#[derive(Clone)]
pub struct AnswerLedger {
    store: Arc<dyn ExamStore>,
}

impl AnswerLedger {
    pub fn new(store: Arc<dyn ExamStore>) -> Self {
        Self { store }
    }

    /// Records or overwrites an answer. `exam.answered_questions` is updated
    /// in place on first answers. The caller holds the exam lock.
    pub async fn record(
        &self,
        exam: &mut Exam,
        question_id: i64,
        value: i32,
        time_spent_secs: i32,
        now: DateTime<Utc>,
    ) -> Result<Answer> {
        let value = AnswerValue::try_from(value).map_err(|_| Error::InvalidAnswerValue(value))?;
        if !exam.is_active() {
            return Err(Error::ExamNotActive {
                exam_id: exam.id,
                status: exam.status,
            });
        }
        let question = self
            .store
            .exam_question(exam.id, question_id)
            .await?
            .ok_or(Error::QuestionNotInExam {
                exam_id: exam.id,
                question_id,
            })?;
        if time_spent_secs < 0 {
            return Err(Error::BadRequest(
                "time_spent must not be negative".to_string(),
            ));
        }

        let answer = match self.store.get_answer(exam.id, question_id).await? {
            Some(previous) => Answer {
                value,
                time_spent_secs,
                is_changed: true,
                change_count: previous.change_count + 1,
                answered_at: now,
                ..previous
            },
            None => {
                if exam.answered_questions >= exam.total_questions {
                    return Err(Error::Internal(format!(
                        "exam {} already counts {} answers",
                        exam.id, exam.answered_questions
                    )));
                }
                exam.answered_questions += 1;
                Answer {
                    exam_id: exam.id,
                    question_id,
                    sequence: question.sequence,
                    trait_group: question.trait_group,
                    value,
                    time_spent_secs,
                    is_changed: false,
                    change_count: 0,
                    answered_at: now,
                }
            }
        };

        self.store
            .save_answer(&answer, exam.answered_questions)
            .await?;
        tracing::debug!(
            exam_id = exam.id,
            question_id,
            change_count = answer.change_count,
            "answer recorded"
        );
        Ok(answer)
    }

    pub async fn all_answers(&self, exam_id: i64) -> Result<Vec<Answer>> {
        self.store.list_answers(exam_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryExamStore;
    use crate::models::exam::{ExamStatus, NewExam, Tier};
    use crate::models::question::{Question, TraitGroup};

    async fn setup() -> (AnswerLedger, Arc<MemoryExamStore>, Exam) {
        let store = Arc::new(MemoryExamStore::new());
        let questions: Vec<Question> = TraitGroup::ALL
            .iter()
            .enumerate()
            .map(|(i, g)| Question {
                id: 100 + i as i64,
                text: format!("statement {}", i),
                trait_group: *g,
            })
            .collect();
        let (exam, _) = store
            .insert_exam(
                NewExam {
                    exam_code: "EX20261016_LEDGER".into(),
                    user_id: 1,
                    tier: Tier::Free,
                    total_questions: questions.len() as i32,
                    time_limit_secs: 0,
                    ip_address: None,
                    created_at: Utc::now(),
                },
                &questions,
            )
            .await
            .unwrap();
        (AnswerLedger::new(store.clone()), store, exam)
    }

    #[tokio::test]
    async fn rerecording_updates_without_counting_twice() {
        let (ledger, store, mut exam) = setup().await;
        let now = Utc::now();

        let first = ledger.record(&mut exam, 102, 1, 4, now).await.unwrap();
        assert_eq!(first.change_count, 0);
        assert!(!first.is_changed);
        assert_eq!(first.trait_group, TraitGroup::A);
        assert_eq!(exam.answered_questions, 1);

        let second = ledger.record(&mut exam, 102, 2, 9, now).await.unwrap();
        assert_eq!(exam.answered_questions, 1);
        assert_eq!(second.value, AnswerValue::Agree);
        assert_eq!(second.time_spent_secs, 9);
        assert_eq!(second.change_count, 1);
        assert!(second.is_changed);

        let stored = store.get_exam(exam.id).await.unwrap().unwrap();
        assert_eq!(stored.answered_questions, 1);
        assert_eq!(ledger.all_answers(exam.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let (ledger, _store, mut exam) = setup().await;
        let now = Utc::now();
        assert!(matches!(
            ledger.record(&mut exam, 100, 3, 4, now).await,
            Err(Error::InvalidAnswerValue(3))
        ));
        assert!(matches!(
            ledger.record(&mut exam, 999, 1, 4, now).await,
            Err(Error::QuestionNotInExam { question_id: 999, .. })
        ));
        assert!(matches!(
            ledger.record(&mut exam, 100, 1, -1, now).await,
            Err(Error::BadRequest(_))
        ));
        assert_eq!(exam.answered_questions, 0);
    }

    #[tokio::test]
    async fn terminal_exam_is_immutable() {
        let (ledger, _store, mut exam) = setup().await;
        exam.finish(ExamStatus::Cancelled, Utc::now());
        let err = ledger.record(&mut exam, 100, 1, 4, Utc::now()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ExamNotActive {
                status: ExamStatus::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn answers_come_back_in_sequence_order() {
        let (ledger, _store, mut exam) = setup().await;
        let now = Utc::now();
        for qid in [105, 100, 103] {
            ledger.record(&mut exam, qid, 2, 3, now).await.unwrap();
        }
        let seqs: Vec<i32> = ledger
            .all_answers(exam.id)
            .await
            .unwrap()
            .iter()
            .map(|a| a.sequence)
            .collect();
        assert_eq!(seqs, vec![1, 4, 6]);
    }
}
