use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::{json, Value as JsonValue};

use crate::models::exam::ExamStatus;
use crate::models::fraud::{FraudKind, FraudRejection};
use crate::models::question::TraitGroup;
use crate::models::quota::QuotaDenial;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Answer value must be 0, 1 or 2 (got {0})")]
    InvalidAnswerValue(i32),

    #[error("Exam {0} not found")]
    ExamNotFound(String),

    #[error("Exam {exam_id} is {status} and no longer accepts changes")]
    ExamNotActive { exam_id: i64, status: ExamStatus },

    #[error("Question {question_id} is not part of exam {exam_id}")]
    QuestionNotInExam { exam_id: i64, question_id: i64 },

    #[error("Exam {exam_id} ran out of time")]
    ExamTimeout { exam_id: i64 },

    #[error("Only {answered} of {total} questions answered")]
    IncompleteAnswers { answered: i32, total: i32 },

    #[error("Exam {exam_code} is already in progress")]
    ExamAlreadyInProgress { exam_code: String },

    #[error("Quota exceeded: {0:?}")]
    QuotaExceeded(QuotaDenial),

    #[error("Submission rejected: {}", .0.kind)]
    Fraud(FraudRejection),

    #[error("Question bank has {available} of {needed} questions for group {group}")]
    InsufficientQuestions {
        group: TraitGroup,
        needed: usize,
        available: usize,
    },

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorFamily {
    Validation,
    StateConflict,
    Quota,
    Fraud,
    Access,
    Internal,
}

impl ErrorFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorFamily::Validation => "validation",
            ErrorFamily::StateConflict => "state_conflict",
            ErrorFamily::Quota => "quota",
            ErrorFamily::Fraud => "fraud",
            ErrorFamily::Access => "access",
            ErrorFamily::Internal => "internal",
        }
    }
}

impl Error {
    pub fn family(&self) -> ErrorFamily {
        match self {
            Error::BadRequest(_)
            | Error::InvalidAnswerValue(_)
            | Error::QuestionNotInExam { .. }
            | Error::IncompleteAnswers { .. }
            | Error::Validation(_)
            | Error::Json(_) => ErrorFamily::Validation,
            Error::ExamNotActive { .. }
            | Error::ExamTimeout { .. }
            | Error::ExamAlreadyInProgress { .. } => ErrorFamily::StateConflict,
            Error::QuotaExceeded(_) => ErrorFamily::Quota,
            Error::Fraud(_) => ErrorFamily::Fraud,
            Error::Unauthorized(_)
            | Error::Forbidden(_)
            | Error::NotFound(_)
            | Error::ExamNotFound(_) => ErrorFamily::Access,
            _ => ErrorFamily::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) | Error::Validation(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::InvalidAnswerValue(_) | Error::QuestionNotInExam { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Error::IncompleteAnswers { .. } => StatusCode::BAD_REQUEST,
            Error::ExamNotActive { .. } | Error::ExamAlreadyInProgress { .. } => {
                StatusCode::CONFLICT
            }
            Error::ExamTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
            Error::QuotaExceeded(QuotaDenial::Locked { .. }) => StatusCode::LOCKED,
            Error::QuotaExceeded(QuotaDenial::AttemptsExhausted { .. }) => {
                StatusCode::PAYMENT_REQUIRED
            }
            Error::Fraud(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) | Error::ExamNotFound(_) => StatusCode::NOT_FOUND,
            Error::InsufficientQuestions { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Numeric code understood by the legacy quiz clients.
    pub fn error_code(&self) -> u16 {
        match self {
            Error::ExamNotActive { .. } | Error::ExamAlreadyInProgress { .. } => 460,
            Error::ExamTimeout { .. } => 461,
            Error::IncompleteAnswers { .. } => 462,
            Error::Fraud(rejection) if rejection.kind == FraudKind::InsufficientBasis => 467,
            Error::Fraud(_) => 463,
            Error::QuotaExceeded(QuotaDenial::Locked { .. }) => 464,
            Error::QuotaExceeded(QuotaDenial::AttemptsExhausted { .. }) => 466,
            other => other.status_code().as_u16(),
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::BadRequest(_) => "bad_request",
            Error::Unauthorized(_) => "unauthorized",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::InvalidAnswerValue(_) => "invalid_answer_value",
            Error::ExamNotFound(_) => "exam_not_found",
            Error::ExamNotActive { .. } => "exam_not_active",
            Error::QuestionNotInExam { .. } => "question_not_in_exam",
            Error::ExamTimeout { .. } => "exam_timeout",
            Error::IncompleteAnswers { .. } => "incomplete_answers",
            Error::ExamAlreadyInProgress { .. } => "exam_already_in_progress",
            Error::QuotaExceeded(QuotaDenial::Locked { .. }) => "quota_locked",
            Error::QuotaExceeded(QuotaDenial::AttemptsExhausted { .. }) => "paid_attempts_exhausted",
            Error::Fraud(rejection) => match rejection.kind {
                FraudKind::SameAnswerPattern => "same_answer_pattern",
                FraudKind::InsufficientBasis => "insufficient_basis",
                FraudKind::TooFast => "too_fast",
                FraudKind::SuspiciousPattern => "suspicious_pattern",
            },
            Error::InsufficientQuestions { .. } => "insufficient_questions",
            Error::Validation(_) => "validation_error",
            Error::Json(_) => "invalid_json",
            _ => "internal_error",
        }
    }

    fn details(&self) -> Option<JsonValue> {
        match self {
            Error::ExamNotActive { exam_id, status } => Some(json!({
                "exam_id": exam_id,
                "status": status,
                "status_code": status.legacy_code(),
            })),
            Error::QuestionNotInExam {
                exam_id,
                question_id,
            } => Some(json!({ "exam_id": exam_id, "question_id": question_id })),
            Error::ExamTimeout { exam_id } => Some(json!({ "exam_id": exam_id })),
            Error::IncompleteAnswers { answered, total } => {
                Some(json!({ "answered": answered, "total": total }))
            }
            Error::ExamAlreadyInProgress { exam_code } => Some(json!({ "exam_code": exam_code })),
            Error::QuotaExceeded(denial) => serde_json::to_value(denial).ok(),
            Error::Fraud(rejection) => Some(json!({
                "kind": rejection.kind,
                "violations": rejection.violation.violations,
                "threshold": rejection.violation.threshold,
                "locked_until": rejection.violation.locked_until,
                "metrics": rejection.metrics,
            })),
            Error::InsufficientQuestions {
                group,
                needed,
                available,
            } => Some(json!({ "group": group, "needed": needed, "available": available })),
            Error::Validation(errors) => serde_json::to_value(errors).ok(),
            _ => None,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let family = self.family();
        let message = if family == ErrorFamily::Internal {
            tracing::error!(error = ?self, "request failed");
            "An unexpected error occurred".to_string()
        } else {
            self.to_string()
        };

        let mut body = json!({
            "error": self.slug(),
            "error_code": self.error_code(),
            "family": family.as_str(),
            "message": message,
        });
        if family != ErrorFamily::Internal {
            if let Some(details) = self.details() {
                body["details"] = details;
            }
        }
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            other => Error::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::exam::Tier;
    use crate::models::fraud::FraudMetrics;
    use crate::models::quota::ViolationOutcome;
    use axum::body::to_bytes;
    use chrono::Utc;

    fn fraud(kind: FraudKind) -> Error {
        Error::Fraud(FraudRejection {
            kind,
            metrics: FraudMetrics::default(),
            violation: ViolationOutcome {
                violations: 1,
                threshold: 2,
                locked_until: None,
            },
        })
    }

    #[test]
    fn legacy_codes_follow_error_kind() {
        assert_eq!(fraud(FraudKind::InsufficientBasis).error_code(), 467);
        assert_eq!(fraud(FraudKind::TooFast).error_code(), 463);
        assert_eq!(
            Error::QuotaExceeded(QuotaDenial::Locked {
                tier: Tier::Free,
                until: Utc::now()
            })
            .error_code(),
            464
        );
        assert_eq!(
            Error::QuotaExceeded(QuotaDenial::AttemptsExhausted { tier: Tier::Paid }).status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(Error::ExamNotFound("9".into()).error_code(), 404);
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_details() {
        let resp = Error::Internal("connection string postgres://secret".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["family"], "internal");
        assert!(!body.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn fraud_response_carries_violation_details() {
        let resp = fraud(FraudKind::SameAnswerPattern).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "same_answer_pattern");
        assert_eq!(body["error_code"], 463);
        assert_eq!(body["details"]["violations"], 1);
    }
}
