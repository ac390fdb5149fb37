use async_trait::async_trait;
use sqlx::PgPool;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::career::{CareerSuggestion, Job, JobRow, MatchType};
use crate::models::result::{ExamResult, HollandCode};

/// Jobs fetched per code, by tier.
const EXACT_PER_CODE: usize = 5;
const PERMUTATION_PER_CODE: usize = 5;
const TWO_CHAR_PER_CODE: usize = 5;
const SINGLE_CHAR_PER_CODE: usize = 4;

/// Most suggestions kept per tier.
const EXACT_CAP: usize = 5;
const PERMUTATION_CAP: usize = 15;
const TWO_CHAR_CAP: usize = 20;
const SINGLE_CHAR_CAP: usize = 10;

/// Catalog of active jobs keyed by Holland code.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobCatalog: Send + Sync {
    /// Up to `limit` active jobs whose code is exactly `code`.
    async fn jobs_with_code(&self, code: &str, limit: usize) -> Result<Vec<Job>>;
}

/// Ranks catalog jobs against a result code in four tiers: exact (5 stars),
/// reordered letters (4), two letters (3) and single letters (2).
#[derive(Clone)]
pub struct CareerService {
    catalog: Arc<dyn JobCatalog>,
}

impl CareerService {
    pub fn new(catalog: Arc<dyn JobCatalog>) -> Self {
        Self { catalog }
    }

    /// Suggestions for a scored exam; none until a result exists.
    pub async fn for_result(&self, result: Option<&ExamResult>) -> Result<Vec<CareerSuggestion>> {
        match result {
            Some(result) => self.suggest(&result.holland_code).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn suggest(&self, code: &HollandCode) -> Result<Vec<CareerSuggestion>> {
        let letters: Vec<char> = code.to_string().chars().collect();
        let orderings = permutations(&letters);
        let mut out = Vec::new();

        let exact: String = letters.iter().collect();
        out.extend(
            self.tier(&[(exact, 100.0)], MatchType::Exact, EXACT_PER_CODE, EXACT_CAP)
                .await?,
        );

        // The identity ordering keeps its index so scores step from 95.
        let reordered: Vec<(String, f64)> = orderings
            .iter()
            .enumerate()
            .filter(|(_, p)| **p != letters)
            .map(|(i, p)| (p.iter().collect(), 95.0 - 3.0 * i as f64))
            .collect();
        out.extend(
            self.tier(
                &reordered,
                MatchType::Permutation,
                PERMUTATION_PER_CODE,
                PERMUTATION_CAP,
            )
            .await?,
        );

        let mut pairs: Vec<String> = Vec::new();
        for p in &orderings {
            let pair: String = p[..2].iter().collect();
            if !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }
        let pairs: Vec<(String, f64)> = pairs
            .into_iter()
            .enumerate()
            .map(|(i, pair)| (pair, 75.0 - 2.5 * i as f64))
            .collect();
        out.extend(
            self.tier(&pairs, MatchType::TwoChar, TWO_CHAR_PER_CODE, TWO_CHAR_CAP)
                .await?,
        );

        let singles: Vec<(String, f64)> = letters
            .iter()
            .enumerate()
            .map(|(i, c)| (c.to_string(), 55.0 - 5.0 * i as f64))
            .collect();
        out.extend(
            self.tier(
                &singles,
                MatchType::SingleChar,
                SINGLE_CHAR_PER_CODE,
                SINGLE_CHAR_CAP,
            )
            .await?,
        );

        out.sort_by(|a, b| {
            b.star_rating
                .cmp(&a.star_rating)
                .then(b.match_score.total_cmp(&a.match_score))
        });
        tracing::debug!(holland_code = %code, count = out.len(), "career suggestions ranked");
        Ok(out)
    }

    async fn tier(
        &self,
        codes: &[(String, f64)],
        match_type: MatchType,
        per_code: usize,
        cap: usize,
    ) -> Result<Vec<CareerSuggestion>> {
        let mut found = Vec::new();
        for (code, score) in codes {
            if found.len() >= cap {
                break;
            }
            for job in self.catalog.jobs_with_code(code, per_code).await? {
                found.push(CareerSuggestion::new(job, match_type, *score));
            }
        }
        found.truncate(cap);
        Ok(found)
    }
}

/// All orderings, each position's element taken first in turn.
fn permutations(items: &[char]) -> Vec<Vec<char>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for (i, first) in items.iter().enumerate() {
        let mut rest = items.to_vec();
        rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, *first);
            out.push(tail);
        }
    }
    out
}

#[derive(Clone)]
pub struct PgJobCatalog {
    pool: PgPool,
}

impl PgJobCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobCatalog for PgJobCatalog {
    async fn jobs_with_code(&self, code: &str, limit: usize) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, job_name, job_name_en, holland_code, job_group, description,
                   education_level, work_environment, is_active
            FROM jobs
            WHERE holland_code = $1 AND is_active = TRUE
            ORDER BY id
            LIMIT $2
            "#,
        )
        .bind(code)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Job::try_from(row).map_err(|e| Error::Internal(format!("corrupt job: {}", e))))
            .collect()
    }
}

/// In-memory catalog, kept in file order.
#[derive(Debug, Clone, Default)]
pub struct StaticJobCatalog {
    jobs: Vec<Job>,
}

impl StaticJobCatalog {
    pub fn new(jobs: Vec<Job>) -> Result<Self> {
        let jobs = jobs
            .into_iter()
            .map(Job::normalized)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::Config)?;
        Ok(Self { jobs })
    }

    /// Loads a JSON array of job objects; `holland_code` is one to three
    /// letters.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let jobs: Vec<Job> = serde_json::from_str(&raw)?;
        tracing::info!(
            path = %path.as_ref().display(),
            count = jobs.len(),
            "loaded job catalog"
        );
        Self::new(jobs)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobCatalog for StaticJobCatalog {
    async fn jobs_with_code(&self, code: &str, limit: usize) -> Result<Vec<Job>> {
        Ok(self
            .jobs
            .iter()
            .filter(|j| j.is_active && j.holland_code == code)
            .take(limit)
            .cloned()
            .collect())
    }
}
