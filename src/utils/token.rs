use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, thread_rng, Rng};

pub fn generate_access_token(length: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Shareable exam code, e.g. `EX20261016_K3Q9ZA`.
pub fn generate_exam_code(at: DateTime<Utc>) -> String {
    format!(
        "EX{}_{}",
        at.format("%Y%m%d"),
        generate_access_token(6).to_ascii_uppercase()
    )
}
