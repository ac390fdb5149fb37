use crate::error::{Error, Result};
use crate::models::exam::Tier;
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("expected 'postgres' or 'memory', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub public_rps: u32,
    /// Key rate limits on `X-Forwarded-For` instead of the peer address.
    pub trust_proxy_headers: bool,
    pub storage_backend: StorageBackend,
    pub question_bank_path: Option<String>,
    pub job_catalog_path: Option<String>,
    pub quiz: QuizPolicy,
}

/// Tunables of the assessment engine. Defaults match the production quiz.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizPolicy {
    pub free_questions_per_group: usize,
    pub paid_questions_per_group: usize,
    /// Seconds; 0 disables the limit.
    pub free_time_limit_secs: i32,
    pub paid_time_limit_secs: i32,
    pub same_answer_tolerance: f64,
    pub min_agree_ratio: f64,
    pub min_mean_answer_secs: f64,
    pub pattern_min_answers: usize,
    pub pattern_ratio: f64,
    pub advisory_fast_share: f64,
    pub free_violation_threshold: i32,
    pub paid_violation_threshold: i32,
    pub free_lockout_hours: i64,
    pub paid_lockout_hours: i64,
    pub paid_initial_attempts: i32,
    pub shuffle_questions: bool,
}

impl Default for QuizPolicy {
    fn default() -> Self {
        Self {
            free_questions_per_group: 5,
            paid_questions_per_group: 20,
            free_time_limit_secs: 0,
            paid_time_limit_secs: 0,
            same_answer_tolerance: 0.95,
            min_agree_ratio: 1.0 / 6.0,
            min_mean_answer_secs: 2.0,
            pattern_min_answers: 12,
            pattern_ratio: 0.9,
            advisory_fast_share: 0.25,
            free_violation_threshold: 2,
            paid_violation_threshold: 3,
            free_lockout_hours: 12,
            paid_lockout_hours: 24,
            paid_initial_attempts: 0,
            shuffle_questions: true,
        }
    }
}

impl QuizPolicy {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            free_questions_per_group: get_env_parse_or(
                "QUIZ_FREE_QUESTIONS_PER_GROUP",
                d.free_questions_per_group,
            )?,
            paid_questions_per_group: get_env_parse_or(
                "QUIZ_PAID_QUESTIONS_PER_GROUP",
                d.paid_questions_per_group,
            )?,
            free_time_limit_secs: get_env_parse_or("QUIZ_FREE_TIME_LIMIT_SECS", d.free_time_limit_secs)?,
            paid_time_limit_secs: get_env_parse_or("QUIZ_PAID_TIME_LIMIT_SECS", d.paid_time_limit_secs)?,
            same_answer_tolerance: get_env_parse_or(
                "QUIZ_SAME_ANSWER_TOLERANCE",
                d.same_answer_tolerance,
            )?,
            min_agree_ratio: get_env_parse_or("QUIZ_MIN_AGREE_RATIO", d.min_agree_ratio)?,
            min_mean_answer_secs: get_env_parse_or(
                "QUIZ_MIN_MEAN_ANSWER_SECS",
                d.min_mean_answer_secs,
            )?,
            pattern_min_answers: get_env_parse_or("QUIZ_PATTERN_MIN_ANSWERS", d.pattern_min_answers)?,
            pattern_ratio: get_env_parse_or("QUIZ_PATTERN_RATIO", d.pattern_ratio)?,
            advisory_fast_share: get_env_parse_or("QUIZ_ADVISORY_FAST_SHARE", d.advisory_fast_share)?,
            free_violation_threshold: get_env_parse_or(
                "QUIZ_FREE_VIOLATION_THRESHOLD",
                d.free_violation_threshold,
            )?,
            paid_violation_threshold: get_env_parse_or(
                "QUIZ_PAID_VIOLATION_THRESHOLD",
                d.paid_violation_threshold,
            )?,
            free_lockout_hours: get_env_parse_or("QUIZ_FREE_LOCKOUT_HOURS", d.free_lockout_hours)?,
            paid_lockout_hours: get_env_parse_or("QUIZ_PAID_LOCKOUT_HOURS", d.paid_lockout_hours)?,
            paid_initial_attempts: get_env_parse_or(
                "QUIZ_PAID_INITIAL_ATTEMPTS",
                d.paid_initial_attempts,
            )?,
            shuffle_questions: get_env_parse_or("QUIZ_SHUFFLE_QUESTIONS", d.shuffle_questions)?,
        })
    }

    pub fn questions_per_group(&self, tier: Tier) -> usize {
        match tier {
            Tier::Free => self.free_questions_per_group,
            Tier::Paid => self.paid_questions_per_group,
        }
    }

    pub fn total_questions(&self, tier: Tier) -> usize {
        self.questions_per_group(tier) * 6
    }

    pub fn time_limit_secs(&self, tier: Tier) -> i32 {
        match tier {
            Tier::Free => self.free_time_limit_secs,
            Tier::Paid => self.paid_time_limit_secs,
        }
    }

    pub fn violation_threshold(&self, tier: Tier) -> i32 {
        match tier {
            Tier::Free => self.free_violation_threshold,
            Tier::Paid => self.paid_violation_threshold,
        }
    }

    pub fn lockout(&self, tier: Tier) -> chrono::Duration {
        match tier {
            Tier::Free => chrono::Duration::hours(self.free_lockout_hours),
            Tier::Paid => chrono::Duration::hours(self.paid_lockout_hours),
        }
    }
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let storage_backend = get_env_parse_or("STORAGE_BACKEND", StorageBackend::Postgres)?;
        let database_url = env::var("DATABASE_URL").ok();
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(Error::Config(
                "Missing environment variable: DATABASE_URL".to_string(),
            ));
        }

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url,
            jwt_secret: get_env("JWT_SECRET")?,
            public_rps: get_env_parse_or("PUBLIC_RPS", 50)?,
            trust_proxy_headers: get_env_parse_or("TRUST_PROXY_HEADERS", false)?,
            storage_backend,
            question_bank_path: env::var("QUESTION_BANK_PATH").ok(),
            job_catalog_path: env::var("JOB_CATALOG_PATH").ok(),
            quiz: QuizPolicy::from_env()?,
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_sizes() {
        let policy = QuizPolicy::default();
        assert_eq!(policy.total_questions(Tier::Free), 30);
        assert_eq!(policy.total_questions(Tier::Paid), 120);
        assert_eq!(policy.lockout(Tier::Paid), chrono::Duration::hours(24));
        assert_eq!(policy.time_limit_secs(Tier::Free), 0);
    }

    #[test]
    fn unset_variable_falls_back_to_default() {
        let value: u32 = get_env_parse_or("QUIZ_TEST_SURELY_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn backend_parsing() {
        assert_eq!("Memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert!("redis".parse::<StorageBackend>().is_err());
    }
}
