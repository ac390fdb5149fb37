use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::question::TraitGroup;

/// Likert-style response. The discriminant is the raw score added to the
/// question's trait group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum AnswerValue {
    Disagree = 0,
    Neutral = 1,
    Agree = 2,
}

impl AnswerValue {
    pub const CHOICES: [AnswerValue; 3] =
        [AnswerValue::Disagree, AnswerValue::Neutral, AnswerValue::Agree];

    pub fn score(self) -> i32 {
        self as i32
    }

    pub fn label(self) -> &'static str {
        match self {
            AnswerValue::Disagree => "Disagree",
            AnswerValue::Neutral => "Neutral",
            AnswerValue::Agree => "Agree",
        }
    }
}

impl TryFrom<i32> for AnswerValue {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AnswerValue::Disagree),
            1 => Ok(AnswerValue::Neutral),
            2 => Ok(AnswerValue::Agree),
            other => Err(format!("answer value must be 0, 1 or 2 (got {})", other)),
        }
    }
}

impl From<AnswerValue> for i32 {
    fn from(value: AnswerValue) -> Self {
        value.score()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub exam_id: i64,
    pub question_id: i64,
    pub sequence: i32,
    pub trait_group: TraitGroup,
    pub value: AnswerValue,
    pub time_spent_secs: i32,
    pub is_changed: bool,
    pub change_count: i32,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AnswerRow {
    pub exam_id: i64,
    pub question_id: i64,
    pub sequence: i32,
    pub trait_group: String,
    pub value: i32,
    pub time_spent: i32,
    pub is_changed: bool,
    pub change_count: i32,
    pub answered_at: DateTime<Utc>,
}

impl TryFrom<AnswerRow> for Answer {
    type Error = String;

    fn try_from(row: AnswerRow) -> Result<Self, Self::Error> {
        Ok(Answer {
            exam_id: row.exam_id,
            question_id: row.question_id,
            sequence: row.sequence,
            trait_group: row.trait_group.parse()?,
            value: AnswerValue::try_from(row.value)?,
            time_spent_secs: row.time_spent,
            is_changed: row.is_changed,
            change_count: row.change_count,
            answered_at: row.answered_at,
        })
    }
}
