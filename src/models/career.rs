use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::models::question::TraitGroup;

/// An occupation in the job catalog. `holland_code` holds one to three
/// letters; shorter codes describe broader job families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub job_name: String,
    #[serde(default)]
    pub job_name_en: Option<String>,
    pub holland_code: String,
    #[serde(default)]
    pub job_group: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub education_level: Option<String>,
    #[serde(default)]
    pub work_environment: Option<String>,
    #[serde(default = "active")]
    pub is_active: bool,
}

fn active() -> bool {
    true
}

impl Job {
    /// Uppercases the code and checks every letter is a trait group.
    pub fn normalized(mut self) -> Result<Self, String> {
        let code = self.holland_code.trim().to_ascii_uppercase();
        if code.is_empty() || code.len() > 3 {
            return Err(format!(
                "job {} has holland code '{}' (expected one to three letters)",
                self.id, self.holland_code
            ));
        }
        for c in code.chars() {
            c.to_string()
                .parse::<TraitGroup>()
                .map_err(|e| format!("job {}: {}", self.id, e))?;
        }
        self.holland_code = code;
        Ok(self)
    }
}

#[derive(Debug, FromRow)]
pub struct JobRow {
    pub id: i64,
    pub job_name: String,
    pub job_name_en: Option<String>,
    pub holland_code: String,
    pub job_group: Option<String>,
    pub description: Option<String>,
    pub education_level: Option<String>,
    pub work_environment: Option<String>,
    pub is_active: bool,
}

impl TryFrom<JobRow> for Job {
    type Error = String;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Job {
            id: row.id,
            job_name: row.job_name,
            job_name_en: row.job_name_en,
            holland_code: row.holland_code,
            job_group: row.job_group,
            description: row.description,
            education_level: row.education_level,
            work_environment: row.work_environment,
            is_active: row.is_active,
        }
        .normalized()
    }
}

/// How closely a job's code matches the examinee's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Same three letters in the same order.
    Exact,
    /// Same three letters, reordered.
    Permutation,
    /// Two of the letters.
    TwoChar,
    /// A single letter.
    SingleChar,
}

impl MatchType {
    pub fn star_rating(self) -> u8 {
        match self {
            MatchType::Exact => 5,
            MatchType::Permutation => 4,
            MatchType::TwoChar => 3,
            MatchType::SingleChar => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CareerSuggestion {
    pub job_id: i64,
    pub job_name: String,
    pub job_name_en: Option<String>,
    pub holland_code: String,
    pub star_rating: u8,
    pub match_type: MatchType,
    pub match_score: f64,
    pub job_group: Option<String>,
    pub description: Option<String>,
    pub education_level: Option<String>,
    pub work_environment: Option<String>,
    /// Four and five star matches.
    pub is_highlighted: bool,
}

impl CareerSuggestion {
    pub fn new(job: Job, match_type: MatchType, match_score: f64) -> Self {
        let star_rating = match_type.star_rating();
        Self {
            job_id: job.id,
            job_name: job.job_name,
            job_name_en: job.job_name_en,
            holland_code: job.holland_code,
            star_rating,
            match_type,
            match_score,
            job_group: job.job_group,
            description: job.description,
            education_level: job.education_level,
            work_environment: job.work_environment,
            is_highlighted: star_rating >= 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(code: &str) -> Job {
        Job {
            id: 1,
            job_name: "Surveyor".into(),
            job_name_en: None,
            holland_code: code.into(),
            job_group: None,
            description: None,
            education_level: None,
            work_environment: None,
            is_active: true,
        }
    }

    #[test]
    fn codes_are_uppercased_and_checked() {
        assert_eq!(job(" ric ").normalized().unwrap().holland_code, "RIC");
        assert!(job("RX").normalized().is_err());
        assert!(job("RIAS").normalized().is_err());
        assert!(job("").normalized().is_err());
    }

    #[test]
    fn only_top_two_tiers_are_highlighted() {
        let s = CareerSuggestion::new(job("RI"), MatchType::TwoChar, 75.0);
        assert_eq!(s.star_rating, 3);
        assert!(!s.is_highlighted);
        let s = CareerSuggestion::new(job("IRA"), MatchType::Permutation, 92.0);
        assert!(s.is_highlighted);
        assert_eq!(serde_json::to_value(&s).unwrap()["match_type"], "permutation");
    }
}
