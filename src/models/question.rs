use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// The six Holland trait groups. Declaration order is the tie-break precedence
/// used when ranking equal totals, so `Ord` is load-bearing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub enum TraitGroup {
    R,
    I,
    A,
    S,
    E,
    C,
}

impl TraitGroup {
    pub const ALL: [TraitGroup; 6] = [
        TraitGroup::R,
        TraitGroup::I,
        TraitGroup::A,
        TraitGroup::S,
        TraitGroup::E,
        TraitGroup::C,
    ];

    pub fn letter(self) -> char {
        match self {
            TraitGroup::R => 'R',
            TraitGroup::I => 'I',
            TraitGroup::A => 'A',
            TraitGroup::S => 'S',
            TraitGroup::E => 'E',
            TraitGroup::C => 'C',
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TraitGroup::R => "Realistic",
            TraitGroup::I => "Investigative",
            TraitGroup::A => "Artistic",
            TraitGroup::S => "Social",
            TraitGroup::E => "Enterprising",
            TraitGroup::C => "Conventional",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TraitGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for TraitGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "R" => Ok(TraitGroup::R),
            "I" => Ok(TraitGroup::I),
            "A" => Ok(TraitGroup::A),
            "S" => Ok(TraitGroup::S),
            "E" => Ok(TraitGroup::E),
            "C" => Ok(TraitGroup::C),
            other => Err(format!("unknown trait group '{}'", other)),
        }
    }
}

/// A catalog item as supplied by the question bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub trait_group: TraitGroup,
}

/// Row of the per-exam question snapshot. `sequence` is the 1-based
/// presentation order fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamQuestion {
    pub exam_id: i64,
    pub question_id: i64,
    pub sequence: i32,
    pub trait_group: TraitGroup,
    pub question_text: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct QuestionRow {
    pub id: i64,
    pub question_text: String,
    pub trait_group: String,
}

impl TryFrom<QuestionRow> for Question {
    type Error = String;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        Ok(Question {
            id: row.id,
            text: row.question_text,
            trait_group: row.trait_group.parse()?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ExamQuestionRow {
    pub exam_id: i64,
    pub question_id: i64,
    pub sequence: i32,
    pub trait_group: String,
    pub question_text: String,
}

impl TryFrom<ExamQuestionRow> for ExamQuestion {
    type Error = String;

    fn try_from(row: ExamQuestionRow) -> Result<Self, Self::Error> {
        Ok(ExamQuestion {
            exam_id: row.exam_id,
            question_id: row.question_id,
            sequence: row.sequence,
            trait_group: row.trait_group.parse()?,
            question_text: row.question_text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_follows_riasec_order() {
        let mut groups = vec![TraitGroup::C, TraitGroup::A, TraitGroup::R, TraitGroup::E];
        groups.sort();
        assert_eq!(
            groups,
            vec![TraitGroup::R, TraitGroup::A, TraitGroup::E, TraitGroup::C]
        );
    }

    #[test]
    fn parses_lowercase_and_rejects_unknown() {
        assert_eq!("s".parse::<TraitGroup>().unwrap(), TraitGroup::S);
        assert!("X".parse::<TraitGroup>().is_err());
    }
}
