use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::models::question::TraitGroup;

/// Raw per-group totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TraitScores {
    #[serde(rename = "R")]
    pub r: i32,
    #[serde(rename = "I")]
    pub i: i32,
    #[serde(rename = "A")]
    pub a: i32,
    #[serde(rename = "S")]
    pub s: i32,
    #[serde(rename = "E")]
    pub e: i32,
    #[serde(rename = "C")]
    pub c: i32,
}

impl TraitScores {
    pub fn get(&self, group: TraitGroup) -> i32 {
        match group {
            TraitGroup::R => self.r,
            TraitGroup::I => self.i,
            TraitGroup::A => self.a,
            TraitGroup::S => self.s,
            TraitGroup::E => self.e,
            TraitGroup::C => self.c,
        }
    }

    pub fn add(&mut self, group: TraitGroup, points: i32) {
        let slot = match group {
            TraitGroup::R => &mut self.r,
            TraitGroup::I => &mut self.i,
            TraitGroup::A => &mut self.a,
            TraitGroup::S => &mut self.s,
            TraitGroup::E => &mut self.e,
            TraitGroup::C => &mut self.c,
        };
        *slot += points;
    }

    pub fn total(&self) -> i32 {
        TraitGroup::ALL.iter().map(|g| self.get(*g)).sum()
    }
}

/// Three distinct groups, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HollandCode([TraitGroup; 3]);

impl HollandCode {
    pub fn new(groups: [TraitGroup; 3]) -> Result<Self, String> {
        if groups[0] == groups[1] || groups[0] == groups[2] || groups[1] == groups[2] {
            return Err(format!(
                "holland code letters must be distinct (got {}{}{})",
                groups[0], groups[1], groups[2]
            ));
        }
        Ok(Self(groups))
    }

    /// Top three of a full ranking. A ranking is a permutation of all six
    /// groups, so the letters are distinct.
    pub fn from_ranking(ranked: &[TraitGroup; 6]) -> Self {
        Self([ranked[0], ranked[1], ranked[2]])
    }

    pub fn groups(&self) -> [TraitGroup; 3] {
        self.0
    }

    pub fn primary(&self) -> TraitGroup {
        self.0[0]
    }

    pub fn secondary(&self) -> TraitGroup {
        self.0[1]
    }

    pub fn tertiary(&self) -> TraitGroup {
        self.0[2]
    }

    /// The two dominant letters, used to look up characteristic descriptions.
    pub fn characteristics_code(&self) -> String {
        format!("{}{}", self.0[0], self.0[1])
    }
}

impl fmt::Display for HollandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.0[0], self.0[1], self.0[2])
    }
}

impl FromStr for HollandCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let letters: Vec<TraitGroup> = s
            .trim()
            .chars()
            .map(|c| c.to_string().parse())
            .collect::<Result<_, _>>()?;
        match letters.as_slice() {
            [a, b, c] => HollandCode::new([*a, *b, *c]),
            _ => Err(format!("holland code must have three letters (got '{}')", s)),
        }
    }
}

impl TryFrom<String> for HollandCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HollandCode> for String {
    fn from(code: HollandCode) -> Self {
        code.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamResult {
    pub exam_id: i64,
    pub user_id: i64,
    pub scores: TraitScores,
    pub total_score: i32,
    pub holland_code: HollandCode,
    pub characteristics_code: String,
    pub fraud_flag: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ResultRow {
    pub exam_id: i64,
    pub user_id: i64,
    pub score_r: i32,
    pub score_i: i32,
    pub score_a: i32,
    pub score_s: i32,
    pub score_e: i32,
    pub score_c: i32,
    pub total_score: i32,
    pub holland_code: String,
    pub characteristics_code: String,
    pub has_fraud_flags: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ResultRow> for ExamResult {
    type Error = String;

    fn try_from(row: ResultRow) -> Result<Self, Self::Error> {
        Ok(ExamResult {
            exam_id: row.exam_id,
            user_id: row.user_id,
            scores: TraitScores {
                r: row.score_r,
                i: row.score_i,
                a: row.score_a,
                s: row.score_s,
                e: row.score_e,
                c: row.score_c,
            },
            total_score: row.total_score,
            holland_code: row.holland_code.parse()?,
            characteristics_code: row.characteristics_code,
            fraud_flag: row.has_fraud_flags,
            created_at: row.created_at,
        })
    }
}
