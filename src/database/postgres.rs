use async_trait::async_trait;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};

use crate::database::store::{ExamFilter, ExamStore, Page};
use crate::error::{Error, Result};
use crate::models::answer::{Answer, AnswerRow};
use crate::models::exam::{Exam, ExamRow, NewExam, Tier};
use crate::models::question::{ExamQuestion, ExamQuestionRow, Question};
use crate::models::quota::{QuotaRecord, QuotaRow};
use crate::models::result::{ExamResult, ResultRow};

const EXAM_COLUMNS: &str = "id, exam_code, user_id, tier, status, total_questions, answered_questions, \
     time_limit_secs, ip_address, created_at, start_time, end_time";

fn decode<R, T>(row: R) -> Result<T>
where
    T: TryFrom<R, Error = String>,
{
    T::try_from(row).map_err(|e| Error::Internal(format!("corrupt row: {}", e)))
}

fn decode_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = String>,
{
    rows.into_iter().map(decode).collect()
}

#[derive(Clone)]
pub struct PgExamStore {
    pool: PgPool,
}

impl PgExamStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExamStore for PgExamStore {
    async fn insert_exam(
        &self,
        exam: NewExam,
        questions: &[Question],
    ) -> Result<(Exam, Vec<ExamQuestion>)> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ExamRow>(&format!(
            r#"
            INSERT INTO quiz_exams (
                exam_code, user_id, tier, status, total_questions, answered_questions,
                time_limit_secs, ip_address, created_at, start_time
            ) VALUES ($1, $2, $3, 'in_progress', $4, 0, $5, $6, $7, $7)
            RETURNING {}
            "#,
            EXAM_COLUMNS
        ))
        .bind(&exam.exam_code)
        .bind(exam.user_id)
        .bind(exam.tier.as_str())
        .bind(exam.total_questions)
        .bind(exam.time_limit_secs)
        .bind(&exam.ip_address)
        .bind(exam.created_at)
        .fetch_one(&mut *tx)
        .await?;
        let stored: Exam = decode(row)?;

        let mut snapshot = Vec::with_capacity(questions.len());
        for (idx, q) in questions.iter().enumerate() {
            let sequence = idx as i32 + 1;
            sqlx::query(
                r#"
                INSERT INTO quiz_exam_questions (exam_id, question_id, sequence, trait_group, question_text)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(stored.id)
            .bind(q.id)
            .bind(sequence)
            .bind(q.trait_group.to_string())
            .bind(&q.text)
            .execute(&mut *tx)
            .await?;
            snapshot.push(ExamQuestion {
                exam_id: stored.id,
                question_id: q.id,
                sequence,
                trait_group: q.trait_group,
                question_text: q.text.clone(),
            });
        }

        tx.commit().await?;
        Ok((stored, snapshot))
    }

    async fn get_exam(&self, exam_id: i64) -> Result<Option<Exam>> {
        let row = sqlx::query_as::<_, ExamRow>(&format!(
            "SELECT {} FROM quiz_exams WHERE id = $1",
            EXAM_COLUMNS
        ))
        .bind(exam_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(decode).transpose()
    }

    async fn get_exam_by_code(&self, exam_code: &str) -> Result<Option<Exam>> {
        let row = sqlx::query_as::<_, ExamRow>(&format!(
            "SELECT {} FROM quiz_exams WHERE exam_code = $1",
            EXAM_COLUMNS
        ))
        .bind(exam_code)
        .fetch_optional(&self.pool)
        .await?;
        row.map(decode).transpose()
    }

    async fn in_progress_exams(&self, user_id: i64) -> Result<Vec<Exam>> {
        let rows = sqlx::query_as::<_, ExamRow>(&format!(
            "SELECT {} FROM quiz_exams WHERE user_id = $1 AND status = 'in_progress' ORDER BY id",
            EXAM_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    async fn update_exam(&self, exam: &Exam) -> Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE quiz_exams
            SET status = $1, answered_questions = $2, end_time = $3, updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(exam.status.as_str())
        .bind(exam.answered_questions)
        .bind(exam.end_time)
        .bind(exam.id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(Error::ExamNotFound(exam.id.to_string()));
        }
        Ok(())
    }

    async fn list_exams(
        &self,
        user_id: i64,
        filter: &ExamFilter,
        page: Page,
    ) -> Result<(Vec<Exam>, i64)> {
        let mut filters = vec!["user_id = $1".to_string()];
        let mut args: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            filters.push(format!("status = ${}", args.len() + 2));
            args.push(status.as_str().to_string());
        }
        if let Some(tier) = filter.tier {
            filters.push(format!("tier = ${}", args.len() + 2));
            args.push(tier.as_str().to_string());
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            filters.push(format!("exam_code ILIKE ${}", args.len() + 2));
            args.push(format!("%{}%", search));
        }

        let where_clause = format!("WHERE {}", filters.join(" AND "));
        let items_query = format!(
            "SELECT {} FROM quiz_exams {} ORDER BY created_at DESC, id DESC LIMIT ${} OFFSET ${}",
            EXAM_COLUMNS,
            where_clause,
            args.len() + 2,
            args.len() + 3
        );
        let total_query = format!("SELECT COUNT(*) FROM quiz_exams {}", where_clause);

        let mut items_statement = sqlx::query_as::<_, ExamRow>(&items_query).bind(user_id);
        for value in &args {
            items_statement = items_statement.bind(value);
        }
        items_statement = items_statement.bind(page.per_page).bind(page.offset());
        let rows = items_statement.fetch_all(&self.pool).await?;

        let mut total_statement = sqlx::query_scalar::<_, i64>(&total_query).bind(user_id);
        for value in &args {
            total_statement = total_statement.bind(value);
        }
        let total = total_statement.fetch_one(&self.pool).await?;

        Ok((decode_all(rows)?, total))
    }

    async fn exam_questions(&self, exam_id: i64) -> Result<Vec<ExamQuestion>> {
        let rows = sqlx::query_as::<_, ExamQuestionRow>(
            r#"
            SELECT exam_id, question_id, sequence, trait_group, question_text
            FROM quiz_exam_questions WHERE exam_id = $1 ORDER BY sequence
            "#,
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    async fn exam_question(&self, exam_id: i64, question_id: i64) -> Result<Option<ExamQuestion>> {
        let row = sqlx::query_as::<_, ExamQuestionRow>(
            r#"
            SELECT exam_id, question_id, sequence, trait_group, question_text
            FROM quiz_exam_questions WHERE exam_id = $1 AND question_id = $2
            "#,
        )
        .bind(exam_id)
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(decode).transpose()
    }

    async fn get_answer(&self, exam_id: i64, question_id: i64) -> Result<Option<Answer>> {
        let row = sqlx::query_as::<_, AnswerRow>(
            r#"
            SELECT exam_id, question_id, sequence, trait_group, value, time_spent,
                   is_changed, change_count, answered_at
            FROM quiz_answers WHERE exam_id = $1 AND question_id = $2
            "#,
        )
        .bind(exam_id)
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(decode).transpose()
    }

    async fn save_answer(&self, answer: &Answer, answered_questions: i32) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO quiz_answers (
                exam_id, question_id, sequence, trait_group, value, time_spent,
                is_changed, change_count, answered_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (exam_id, question_id) DO UPDATE
            SET value = EXCLUDED.value,
                time_spent = EXCLUDED.time_spent,
                is_changed = EXCLUDED.is_changed,
                change_count = EXCLUDED.change_count,
                answered_at = EXCLUDED.answered_at
            "#,
        )
        .bind(answer.exam_id)
        .bind(answer.question_id)
        .bind(answer.sequence)
        .bind(answer.trait_group.to_string())
        .bind(answer.value.score())
        .bind(answer.time_spent_secs)
        .bind(answer.is_changed)
        .bind(answer.change_count)
        .bind(answer.answered_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE quiz_exams SET answered_questions = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(answered_questions)
        .bind(answer.exam_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_answers(&self, exam_id: i64) -> Result<Vec<Answer>> {
        let rows = sqlx::query_as::<_, AnswerRow>(
            r#"
            SELECT exam_id, question_id, sequence, trait_group, value, time_spent,
                   is_changed, change_count, answered_at
            FROM quiz_answers WHERE exam_id = $1 ORDER BY sequence
            "#,
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    async fn complete_exam(
        &self,
        exam: &Exam,
        result: &ExamResult,
        quota: &QuotaRecord,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let res = sqlx::query(
            r#"
            UPDATE quiz_exams
            SET status = $1, answered_questions = $2, end_time = $3, updated_at = NOW()
            WHERE id = $4 AND status = 'in_progress'
            "#,
        )
        .bind(exam.status.as_str())
        .bind(exam.answered_questions)
        .bind(exam.end_time)
        .bind(exam.id)
        .execute(&mut *tx)
        .await?;
        if res.rows_affected() == 0 {
            return Err(Error::Internal(format!(
                "exam {} was no longer in progress at completion",
                exam.id
            )));
        }

        let code = result.holland_code;
        sqlx::query(
            r#"
            INSERT INTO quiz_results (
                exam_id, user_id, score_r, score_i, score_a, score_s, score_e, score_c,
                total_score, holland_code, primary_group, secondary_group, tertiary_group,
                characteristics_code, has_fraud_flags, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(result.exam_id)
        .bind(result.user_id)
        .bind(result.scores.r)
        .bind(result.scores.i)
        .bind(result.scores.a)
        .bind(result.scores.s)
        .bind(result.scores.e)
        .bind(result.scores.c)
        .bind(result.total_score)
        .bind(code.to_string())
        .bind(code.primary().to_string())
        .bind(code.secondary().to_string())
        .bind(code.tertiary().to_string())
        .bind(&result.characteristics_code)
        .bind(result.fraud_flag)
        .bind(result.created_at)
        .execute(&mut *tx)
        .await?;

        upsert_quota(quota).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_result(&self, exam_id: i64) -> Result<Option<ExamResult>> {
        let row = sqlx::query_as::<_, ResultRow>(
            r#"
            SELECT exam_id, user_id, score_r, score_i, score_a, score_s, score_e, score_c,
                   total_score, holland_code, characteristics_code, has_fraud_flags, created_at
            FROM quiz_results WHERE exam_id = $1
            "#,
        )
        .bind(exam_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(decode).transpose()
    }

    async fn get_quota(&self, user_id: i64, tier: Tier) -> Result<Option<QuotaRecord>> {
        let row = sqlx::query_as::<_, QuotaRow>(
            r#"
            SELECT user_id, tier, consumed_count, remaining_attempts, lockout_until,
                   violation_count, updated_at
            FROM quiz_user_quotas WHERE user_id = $1 AND tier = $2
            "#,
        )
        .bind(user_id)
        .bind(tier.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(decode).transpose()
    }

    async fn save_quota(&self, record: &QuotaRecord) -> Result<()> {
        upsert_quota(record).execute(&self.pool).await?;
        Ok(())
    }
}

fn upsert_quota(record: &QuotaRecord) -> Query<'_, Postgres, PgArguments> {
    sqlx::query(
        r#"
        INSERT INTO quiz_user_quotas (
            user_id, tier, consumed_count, remaining_attempts, lockout_until,
            violation_count, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (user_id, tier) DO UPDATE
        SET consumed_count = EXCLUDED.consumed_count,
            remaining_attempts = EXCLUDED.remaining_attempts,
            lockout_until = EXCLUDED.lockout_until,
            violation_count = EXCLUDED.violation_count,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(record.user_id)
    .bind(record.tier.as_str())
    .bind(record.consumed_count)
    .bind(record.remaining_attempts)
    .bind(record.lockout_until)
    .bind(record.violation_count)
    .bind(record.updated_at)
}
