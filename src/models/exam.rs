use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[serde(alias = "FREE")]
    Free,
    #[serde(alias = "PAID")]
    Paid,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Paid => "paid",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "paid" => Ok(Tier::Paid),
            other => Err(format!("unknown tier '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExamStatus {
    InProgress,
    Completed,
    Timeout,
    Cancelled,
}

impl ExamStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExamStatus::InProgress => "in_progress",
            ExamStatus::Completed => "completed",
            ExamStatus::Timeout => "timeout",
            ExamStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, ExamStatus::InProgress)
    }

    /// Numeric status used by the legacy clients (note completed is 0).
    pub fn legacy_code(self) -> i32 {
        match self {
            ExamStatus::Completed => 0,
            ExamStatus::InProgress => 1,
            ExamStatus::Timeout => 2,
            ExamStatus::Cancelled => 3,
        }
    }
}

impl fmt::Display for ExamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExamStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(ExamStatus::InProgress),
            "completed" => Ok(ExamStatus::Completed),
            "timeout" => Ok(ExamStatus::Timeout),
            "cancelled" => Ok(ExamStatus::Cancelled),
            other => Err(format!("unknown exam status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    pub id: i64,
    pub exam_code: String,
    pub user_id: i64,
    pub tier: Tier,
    pub status: ExamStatus,
    pub total_questions: i32,
    pub answered_questions: i32,
    pub time_limit_secs: i32,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Exam {
    pub fn is_active(&self) -> bool {
        self.status == ExamStatus::InProgress
    }

    pub fn is_complete(&self) -> bool {
        self.answered_questions >= self.total_questions
    }

    /// True once a non-zero time limit has been exceeded.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.time_limit_secs > 0
            && now - self.start_time > Duration::seconds(self.time_limit_secs as i64)
    }

    pub fn time_remaining_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.time_limit_secs <= 0 {
            return None;
        }
        let end = self.start_time + Duration::seconds(self.time_limit_secs as i64);
        Some((end - now).num_seconds().max(0))
    }

    /// Moves the exam into a terminal state and stamps `end_time`.
    /// Returns false (and leaves the exam untouched) if it is already terminal.
    pub fn finish(&mut self, status: ExamStatus, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.end_time = Some(now);
        true
    }
}

/// Who is calling into the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    User(i64),
    Admin,
}

impl Actor {
    pub fn can_access(self, owner_id: i64) -> bool {
        match self {
            Actor::Admin => true,
            Actor::User(id) => id == owner_id,
        }
    }
}

/// Fields needed to insert an exam; the id is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewExam {
    pub exam_code: String,
    pub user_id: i64,
    pub tier: Tier,
    pub total_questions: i32,
    pub time_limit_secs: i32,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ExamRow {
    pub id: i64,
    pub exam_code: String,
    pub user_id: i64,
    pub tier: String,
    pub status: String,
    pub total_questions: i32,
    pub answered_questions: i32,
    pub time_limit_secs: i32,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl TryFrom<ExamRow> for Exam {
    type Error = String;

    fn try_from(row: ExamRow) -> Result<Self, Self::Error> {
        Ok(Exam {
            id: row.id,
            exam_code: row.exam_code,
            user_id: row.user_id,
            tier: row.tier.parse()?,
            status: row.status.parse()?,
            total_questions: row.total_questions,
            answered_questions: row.answered_questions,
            time_limit_secs: row.time_limit_secs,
            ip_address: row.ip_address,
            created_at: row.created_at,
            start_time: row.start_time,
            end_time: row.end_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn exam(time_limit_secs: i32) -> Exam {
        let start = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
        Exam {
            id: 1,
            exam_code: "EX20261016_ABC123".into(),
            user_id: 7,
            tier: Tier::Free,
            status: ExamStatus::InProgress,
            total_questions: 30,
            answered_questions: 0,
            time_limit_secs,
            ip_address: None,
            created_at: start,
            start_time: start,
            end_time: None,
        }
    }

    #[test]
    fn unlimited_exams_never_expire() {
        let e = exam(0);
        assert!(!e.is_expired(e.start_time + Duration::days(30)));
        assert_eq!(e.time_remaining_secs(e.start_time), None);
    }

    #[test]
    fn limited_exam_expires_after_limit() {
        let e = exam(600);
        assert!(!e.is_expired(e.start_time + Duration::seconds(600)));
        assert!(e.is_expired(e.start_time + Duration::seconds(601)));
        assert_eq!(e.time_remaining_secs(e.start_time + Duration::seconds(100)), Some(500));
    }

    #[test]
    fn finish_sets_end_time_once() {
        let mut e = exam(0);
        let now = e.start_time + Duration::minutes(5);
        assert!(e.finish(ExamStatus::Completed, now));
        assert_eq!(e.end_time, Some(now));
        assert!(!e.finish(ExamStatus::Cancelled, now + Duration::minutes(1)));
        assert_eq!(e.status, ExamStatus::Completed);
    }

    #[test]
    fn finish_rejects_non_terminal_target() {
        let mut e = exam(0);
        assert!(!e.finish(ExamStatus::InProgress, e.start_time));
        assert!(e.end_time.is_none());
    }

    #[test]
    fn tier_accepts_legacy_uppercase() {
        let t: Tier = serde_json::from_str("\"PAID\"").unwrap();
        assert_eq!(t, Tier::Paid);
        assert_eq!(ExamStatus::Completed.legacy_code(), 0);
    }
}
