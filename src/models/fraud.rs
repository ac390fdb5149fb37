use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::quota::ViolationOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudKind {
    SameAnswerPattern,
    InsufficientBasis,
    TooFast,
    SuspiciousPattern,
}

impl fmt::Display for FraudKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FraudKind::SameAnswerPattern => "almost every answer has the same value",
            FraudKind::InsufficientBasis => "too few agreeing answers to derive a profile",
            FraudKind::TooFast => "answers were given faster than they can be read",
            FraudKind::SuspiciousPattern => "answers follow a repeating click pattern",
        };
        f.write_str(text)
    }
}

/// Ratios measured over the submitted answer set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FraudMetrics {
    pub answer_count: usize,
    pub max_value_share: f64,
    pub agree_share: f64,
    pub mean_time_secs: f64,
    pub fast_share: f64,
    pub pattern_ratio: f64,
}

/// A submission refused by fraud screening, with the violation it cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudRejection {
    pub kind: FraudKind,
    pub metrics: FraudMetrics,
    pub violation: ViolationOutcome,
}
