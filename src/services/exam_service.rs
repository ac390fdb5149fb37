use std::sync::Arc;

use crate::config::QuizPolicy;
use crate::database::store::{ExamFilter, ExamStore, Page};
use crate::error::{Error, Result};
use crate::models::answer::Answer;
use crate::models::exam::{Actor, Exam, ExamStatus, NewExam, Tier};
use crate::models::fraud::FraudRejection;
use crate::models::question::ExamQuestion;
use crate::models::quota::QuotaStanding;
use crate::models::result::ExamResult;
use crate::services::answer_ledger::AnswerLedger;
use crate::services::fraud_service;
use crate::services::question_bank::{self, QuestionBank};
use crate::services::quota_service::QuotaService;
use crate::services::scoring_service::ScoringService;
use crate::utils::locks::KeyedLocks;
use crate::utils::time::Clock;
use crate::utils::token::generate_exam_code;

#[derive(Debug, Clone)]
pub struct CreatedExam {
    pub exam: Exam,
    pub questions: Vec<ExamQuestion>,
    pub quota: QuotaStanding,
}

#[derive(Debug, Clone)]
pub struct ExamView {
    pub exam: Exam,
    pub result: Option<ExamResult>,
}

/// Snapshot plus answers so far, for resuming an exam.
#[derive(Debug, Clone)]
pub struct ExamSheet {
    pub exam: Exam,
    pub questions: Vec<ExamQuestion>,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone)]
pub struct RecordedAnswer {
    pub exam: Exam,
    pub answer: Answer,
}

#[derive(Debug, Clone)]
pub struct ExamPage {
    pub items: Vec<ExamView>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

/// Exam lifecycle: create, answer, submit, cancel and the read views.
///
/// Locks are always taken user first, then exam.
#[derive(Clone)]
pub struct ExamService {
    store: Arc<dyn ExamStore>,
    bank: Arc<dyn QuestionBank>,
    ledger: AnswerLedger,
    quota: QuotaService,
    policy: Arc<QuizPolicy>,
    clock: Arc<dyn Clock>,
    user_locks: KeyedLocks<i64>,
    exam_locks: KeyedLocks<i64>,
}

impl ExamService {
    pub fn new(
        store: Arc<dyn ExamStore>,
        bank: Arc<dyn QuestionBank>,
        policy: QuizPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let policy = Arc::new(policy);
        let user_locks = KeyedLocks::new();
        let quota = QuotaService::new(
            store.clone(),
            policy.clone(),
            clock.clone(),
            user_locks.clone(),
        );
        Self {
            ledger: AnswerLedger::new(store.clone()),
            store,
            bank,
            quota,
            policy,
            clock,
            user_locks,
            exam_locks: KeyedLocks::new(),
        }
    }

    pub fn quota(&self) -> &QuotaService {
        &self.quota
    }

    pub fn policy(&self) -> &QuizPolicy {
        &self.policy
    }

    fn ensure_access(actor: Actor, exam: &Exam) -> Result<()> {
        if actor.can_access(exam.user_id) {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "exam {} belongs to another user",
                exam.exam_code
            )))
        }
    }

    async fn load(&self, exam_id: i64) -> Result<Exam> {
        self.store
            .get_exam(exam_id)
            .await?
            .ok_or_else(|| Error::ExamNotFound(exam_id.to_string()))
    }

    /// Moves an expired in-progress exam to `Timeout`. Caller holds the exam lock.
    async fn expire_if_due(&self, exam: &mut Exam) -> Result<bool> {
        let now = self.clock.now();
        if !exam.is_active() || !exam.is_expired(now) {
            return Ok(false);
        }
        exam.finish(ExamStatus::Timeout, now);
        self.store.update_exam(exam).await?;
        tracing::warn!(
            exam_id = exam.id,
            exam_code = %exam.exam_code,
            time_limit_secs = exam.time_limit_secs,
            "exam timed out"
        );
        Ok(true)
    }

    pub async fn create(
        &self,
        actor: Actor,
        user_id: i64,
        tier: Tier,
        ip_address: Option<String>,
        force_new: bool,
    ) -> Result<CreatedExam> {
        if !actor.can_access(user_id) {
            return Err(Error::Forbidden(
                "cannot create exams for another user".to_string(),
            ));
        }
        let _user_guard = self.user_locks.lock(user_id).await;
        let quota = self.quota.authorize(user_id, tier).await?;

        for existing in self.store.in_progress_exams(user_id).await? {
            let _exam_guard = self.exam_locks.lock(existing.id).await;
            let mut exam = self.load(existing.id).await?;
            if self.expire_if_due(&mut exam).await? || !exam.is_active() {
                continue;
            }
            if !force_new {
                return Err(Error::ExamAlreadyInProgress {
                    exam_code: exam.exam_code,
                });
            }
            exam.finish(ExamStatus::Cancelled, self.clock.now());
            self.store.update_exam(&exam).await?;
            tracing::info!(
                exam_id = exam.id,
                exam_code = %exam.exam_code,
                "exam cancelled in favour of a new one"
            );
        }

        let drawn = question_bank::draw(self.bank.as_ref(), tier, &self.policy).await?;

        let now = self.clock.now();
        let (exam, questions) = self
            .store
            .insert_exam(
                NewExam {
                    exam_code: generate_exam_code(now),
                    user_id,
                    tier,
                    total_questions: drawn.len() as i32,
                    time_limit_secs: self.policy.time_limit_secs(tier),
                    ip_address,
                    created_at: now,
                },
                &drawn,
            )
            .await?;

        tracing::info!(
            exam_id = exam.id,
            exam_code = %exam.exam_code,
            user_id,
            %tier,
            total_questions = exam.total_questions,
            "exam created"
        );
        Ok(CreatedExam {
            exam,
            questions,
            quota,
        })
    }

    pub async fn answer(
        &self,
        actor: Actor,
        exam_id: i64,
        question_id: i64,
        value: i32,
        time_spent_secs: i32,
    ) -> Result<RecordedAnswer> {
        let _exam_guard = self.exam_locks.lock(exam_id).await;
        let mut exam = self.load(exam_id).await?;
        Self::ensure_access(actor, &exam)?;
        if self.expire_if_due(&mut exam).await? {
            return Err(Error::ExamTimeout { exam_id });
        }

        let answer = self
            .ledger
            .record(&mut exam, question_id, value, time_spent_secs, self.clock.now())
            .await?;
        Ok(RecordedAnswer { exam, answer })
    }

    pub async fn submit(&self, actor: Actor, exam_id: i64, force: bool) -> Result<ExamView> {
        let owner = self.load(exam_id).await?;
        Self::ensure_access(actor, &owner)?;

        let _user_guard = self.user_locks.lock(owner.user_id).await;
        let _exam_guard = self.exam_locks.lock(exam_id).await;
        let mut exam = self.load(exam_id).await?;

        if !exam.is_active() {
            return Err(Error::ExamNotActive {
                exam_id,
                status: exam.status,
            });
        }
        if self.expire_if_due(&mut exam).await? {
            return Err(Error::ExamTimeout { exam_id });
        }
        if !exam.is_complete() && !force {
            return Err(Error::IncompleteAnswers {
                answered: exam.answered_questions,
                total: exam.total_questions,
            });
        }

        let answers = self.ledger.all_answers(exam_id).await?;
        let verdict = fraud_service::screen(&answers, &self.policy);
        if let Some(kind) = verdict.rejected {
            let violation = self.quota.record_violation(exam.user_id, exam.tier).await?;
            tracing::warn!(
                exam_id,
                user_id = exam.user_id,
                kind = ?kind,
                violations = violation.violations,
                locked = violation.locked_until.is_some(),
                "submission rejected by fraud screening"
            );
            return Err(Error::Fraud(FraudRejection {
                kind,
                metrics: verdict.metrics,
                violation,
            }));
        }

        let scoring = ScoringService::score(&answers);
        let now = self.clock.now();
        exam.finish(ExamStatus::Completed, now);
        let result = ExamResult {
            exam_id,
            user_id: exam.user_id,
            scores: scoring.scores,
            total_score: scoring.total,
            holland_code: scoring.code,
            characteristics_code: scoring.characteristics_code(),
            fraud_flag: verdict.advisory,
            created_at: now,
        };
        let quota = self.quota.consumed(exam.user_id, exam.tier).await?;
        self.store.complete_exam(&exam, &result, &quota).await?;

        tracing::info!(
            exam_id,
            exam_code = %exam.exam_code,
            holland_code = %result.holland_code,
            fraud_flag = result.fraud_flag,
            forced = force,
            "exam completed"
        );
        Ok(ExamView {
            exam,
            result: Some(result),
        })
    }

    pub async fn cancel(&self, actor: Actor, exam_id: i64) -> Result<ExamView> {
        let _exam_guard = self.exam_locks.lock(exam_id).await;
        let mut exam = self.load(exam_id).await?;
        Self::ensure_access(actor, &exam)?;
        if !exam.finish(ExamStatus::Cancelled, self.clock.now()) {
            return Err(Error::ExamNotActive {
                exam_id,
                status: exam.status,
            });
        }
        self.store.update_exam(&exam).await?;
        tracing::info!(exam_id, exam_code = %exam.exam_code, actor = ?actor, "exam cancelled");
        Ok(ExamView { exam, result: None })
    }

    async fn view(&self, exam: Exam) -> Result<ExamView> {
        let result = if exam.status == ExamStatus::Completed {
            self.store.get_result(exam.id).await?
        } else {
            None
        };
        Ok(ExamView { exam, result })
    }

    pub async fn get(&self, actor: Actor, exam_id: i64) -> Result<ExamView> {
        let exam = self.load(exam_id).await?;
        Self::ensure_access(actor, &exam)?;
        self.view(exam).await
    }

    pub async fn get_by_code(&self, actor: Actor, exam_code: &str) -> Result<ExamView> {
        let exam = self
            .store
            .get_exam_by_code(exam_code)
            .await?
            .ok_or_else(|| Error::ExamNotFound(exam_code.to_string()))?;
        Self::ensure_access(actor, &exam)?;
        self.view(exam).await
    }

    pub async fn questions(&self, actor: Actor, exam_id: i64) -> Result<ExamSheet> {
        let exam = self.load(exam_id).await?;
        Self::ensure_access(actor, &exam)?;
        let questions = self.store.exam_questions(exam_id).await?;
        let answers = self.ledger.all_answers(exam_id).await?;
        Ok(ExamSheet {
            exam,
            questions,
            answers,
        })
    }

    pub async fn list_for_user(
        &self,
        actor: Actor,
        user_id: i64,
        filter: ExamFilter,
        page: Page,
    ) -> Result<ExamPage> {
        if !actor.can_access(user_id) {
            return Err(Error::Forbidden(
                "cannot list another user's exams".to_string(),
            ));
        }
        let (exams, total) = self.store.list_exams(user_id, &filter, page).await?;
        let mut items = Vec::with_capacity(exams.len());
        for exam in exams {
            items.push(self.view(exam).await?);
        }
        Ok(ExamPage {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryExamStore;
    use crate::models::question::{Question, TraitGroup};
    use crate::services::question_bank::StaticQuestionBank;
    use crate::utils::time::ManualClock;
    use crate::models::quota::QuotaRecord;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Memory store whose `complete_exam` can be made to fail.
    struct FailingCompletion {
        inner: MemoryExamStore,
        fail: AtomicBool,
    }

    #[async_trait]
    impl ExamStore for FailingCompletion {
        async fn insert_exam(
            &self,
            exam: NewExam,
            questions: &[Question],
        ) -> Result<(Exam, Vec<ExamQuestion>)> {
            self.inner.insert_exam(exam, questions).await
        }
        async fn get_exam(&self, exam_id: i64) -> Result<Option<Exam>> {
            self.inner.get_exam(exam_id).await
        }
        async fn get_exam_by_code(&self, exam_code: &str) -> Result<Option<Exam>> {
            self.inner.get_exam_by_code(exam_code).await
        }
        async fn in_progress_exams(&self, user_id: i64) -> Result<Vec<Exam>> {
            self.inner.in_progress_exams(user_id).await
        }
        async fn update_exam(&self, exam: &Exam) -> Result<()> {
            self.inner.update_exam(exam).await
        }
        async fn list_exams(
            &self,
            user_id: i64,
            filter: &ExamFilter,
            page: Page,
        ) -> Result<(Vec<Exam>, i64)> {
            self.inner.list_exams(user_id, filter, page).await
        }
        async fn exam_questions(&self, exam_id: i64) -> Result<Vec<ExamQuestion>> {
            self.inner.exam_questions(exam_id).await
        }
        async fn exam_question(
            &self,
            exam_id: i64,
            question_id: i64,
        ) -> Result<Option<ExamQuestion>> {
            self.inner.exam_question(exam_id, question_id).await
        }
        async fn get_answer(&self, exam_id: i64, question_id: i64) -> Result<Option<Answer>> {
            self.inner.get_answer(exam_id, question_id).await
        }
        async fn save_answer(&self, answer: &Answer, answered_questions: i32) -> Result<()> {
            self.inner.save_answer(answer, answered_questions).await
        }
        async fn list_answers(&self, exam_id: i64) -> Result<Vec<Answer>> {
            self.inner.list_answers(exam_id).await
        }
        async fn complete_exam(
            &self,
            exam: &Exam,
            result: &ExamResult,
            quota: &QuotaRecord,
        ) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Internal("storage unavailable".to_string()));
            }
            self.inner.complete_exam(exam, result, quota).await
        }
        async fn get_result(&self, exam_id: i64) -> Result<Option<ExamResult>> {
            self.inner.get_result(exam_id).await
        }
        async fn get_quota(&self, user_id: i64, tier: Tier) -> Result<Option<QuotaRecord>> {
            self.inner.get_quota(user_id, tier).await
        }
        async fn save_quota(&self, record: &QuotaRecord) -> Result<()> {
            self.inner.save_quota(record).await
        }
    }

    const VARIED: [i32; 30] = [
        2, 0, 1, 1, 2, 0, 0, 2, 1, 2, 1, 0, 0, 1, 2, 2, 0, 1, 1, 0, 2, 0, 2, 1, 1, 0, 0, 2, 1, 2,
    ];

    fn service() -> ExamService {
        service_with(Arc::new(MemoryExamStore::new()))
    }

    fn service_with(store: Arc<dyn ExamStore>) -> ExamService {
        let mut questions = Vec::new();
        for group in TraitGroup::ALL {
            for n in 0..5 {
                questions.push(Question {
                    id: group.index() as i64 * 10 + n,
                    text: format!("{} #{}", group.label(), n),
                    trait_group: group,
                });
            }
        }
        ExamService::new(
            store,
            Arc::new(StaticQuestionBank::new(questions)),
            QuizPolicy::default(),
            Arc::new(ManualClock::new(
                Utc.with_ymd_and_hms(2026, 10, 16, 10, 0, 0).unwrap(),
            )),
        )
    }

    #[tokio::test]
    async fn other_users_cannot_touch_an_exam() {
        let svc = service();
        let created = svc
            .create(Actor::User(1), 1, Tier::Free, None, false)
            .await
            .unwrap();
        let id = created.exam.id;
        let qid = created.questions[0].question_id;

        assert!(matches!(svc.get(Actor::User(2), id).await, Err(Error::Forbidden(_))));
        assert!(matches!(
            svc.answer(Actor::User(2), id, qid, 1, 3).await,
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(svc.cancel(Actor::User(2), id).await, Err(Error::Forbidden(_))));
        assert!(matches!(
            svc.create(Actor::User(2), 1, Tier::Free, None, true).await,
            Err(Error::Forbidden(_))
        ));
        assert!(svc.get(Actor::Admin, id).await.is_ok());
    }

    #[tokio::test]
    async fn second_exam_requires_force_new() {
        let svc = service();
        let first = svc
            .create(Actor::User(1), 1, Tier::Free, None, false)
            .await
            .unwrap();
        let err = svc
            .create(Actor::User(1), 1, Tier::Free, None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExamAlreadyInProgress { ref exam_code } if *exam_code == first.exam.exam_code));

        let second = svc
            .create(Actor::User(1), 1, Tier::Free, None, true)
            .await
            .unwrap();
        assert_ne!(second.exam.id, first.exam.id);
        let old = svc.get(Actor::User(1), first.exam.id).await.unwrap();
        assert_eq!(old.exam.status, ExamStatus::Cancelled);
        assert!(old.exam.end_time.is_some());
    }

    #[tokio::test]
    async fn cancel_is_terminal() {
        let svc = service();
        let created = svc
            .create(Actor::User(5), 5, Tier::Free, None, false)
            .await
            .unwrap();
        svc.cancel(Actor::Admin, created.exam.id).await.unwrap();
        assert!(matches!(
            svc.cancel(Actor::User(5), created.exam.id).await,
            Err(Error::ExamNotActive {
                status: ExamStatus::Cancelled,
                ..
            })
        ));
        assert!(matches!(
            svc.submit(Actor::User(5), created.exam.id, true).await,
            Err(Error::ExamNotActive { .. })
        ));
    }

    #[tokio::test]
    async fn failed_completion_neither_completes_nor_consumes() {
        let store = Arc::new(FailingCompletion {
            inner: MemoryExamStore::new(),
            fail: AtomicBool::new(true),
        });
        let svc = service_with(store.clone());
        let created = svc
            .create(Actor::User(6), 6, Tier::Free, None, false)
            .await
            .unwrap();
        let id = created.exam.id;
        for (n, q) in created.questions.iter().enumerate() {
            svc.answer(Actor::User(6), id, q.question_id, VARIED[n], 4)
                .await
                .unwrap();
        }

        assert!(matches!(
            svc.submit(Actor::User(6), id, false).await,
            Err(Error::Internal(_))
        ));
        let view = svc.get(Actor::User(6), id).await.unwrap();
        assert_eq!(view.exam.status, ExamStatus::InProgress);
        assert!(view.result.is_none());
        assert_eq!(svc.quota().standing(6, Tier::Free).await.unwrap().consumed_count, 0);

        store.fail.store(false, Ordering::SeqCst);
        let done = svc.submit(Actor::User(6), id, false).await.unwrap();
        assert_eq!(done.exam.status, ExamStatus::Completed);
        assert_eq!(svc.quota().standing(6, Tier::Free).await.unwrap().consumed_count, 1);
    }

    #[tokio::test]
    async fn missing_exam_is_not_found() {
        let svc = service();
        assert!(matches!(
            svc.submit(Actor::Admin, 404, false).await,
            Err(Error::ExamNotFound(_))
        ));
        assert!(matches!(
            svc.get_by_code(Actor::Admin, "EX00000000_NOPE00").await,
            Err(Error::ExamNotFound(_))
        ));
    }
}
