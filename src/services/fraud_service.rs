use crate::config::QuizPolicy;
use crate::models::answer::{Answer, AnswerValue};
use crate::models::fraud::{FraudKind, FraudMetrics};

/// Float slack so that a share landing exactly on a threshold is judged by
/// the threshold, not by rounding.
const EPSILON: f64 = 1e-9;

/// Cycle lengths checked for alternating/staircase clicking.
const PATTERN_CYCLES: [usize; 2] = [2, 3];

#[derive(Debug, Clone, PartialEq)]
pub struct FraudVerdict {
    /// First blocking check that tripped.
    pub rejected: Option<FraudKind>,
    /// Non-blocking signal recorded on the result.
    pub advisory: bool,
    pub metrics: FraudMetrics,
}

impl FraudVerdict {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_none()
    }
}

/// Screens an answer set (in sequence order). Pure: the same answers and
/// policy always yield the same verdict.
pub fn screen(answers: &[Answer], policy: &QuizPolicy) -> FraudVerdict {
    let metrics = measure(answers, policy);

    let rejected = if answers.is_empty() {
        Some(FraudKind::InsufficientBasis)
    } else if metrics.max_value_share + EPSILON >= policy.same_answer_tolerance {
        Some(FraudKind::SameAnswerPattern)
    } else if metrics.agree_share + EPSILON < policy.min_agree_ratio {
        Some(FraudKind::InsufficientBasis)
    } else if metrics.mean_time_secs + EPSILON < policy.min_mean_answer_secs {
        Some(FraudKind::TooFast)
    } else if answers.len() >= policy.pattern_min_answers
        && metrics.pattern_ratio + EPSILON >= policy.pattern_ratio
    {
        Some(FraudKind::SuspiciousPattern)
    } else {
        None
    };

    let advisory = !answers.is_empty() && metrics.fast_share > policy.advisory_fast_share + EPSILON;

    FraudVerdict {
        rejected,
        advisory,
        metrics,
    }
}

fn measure(answers: &[Answer], policy: &QuizPolicy) -> FraudMetrics {
    let n = answers.len();
    if n == 0 {
        return FraudMetrics::default();
    }
    let total = n as f64;

    let mut counts = [0usize; 3];
    let mut time_sum = 0i64;
    let mut fast = 0usize;
    for answer in answers {
        counts[answer.value.score() as usize] += 1;
        time_sum += answer.time_spent_secs as i64;
        if (answer.time_spent_secs as f64) < policy.min_mean_answer_secs {
            fast += 1;
        }
    }

    let pattern_ratio = PATTERN_CYCLES
        .iter()
        .map(|p| repeat_ratio(answers, *p, policy.pattern_min_answers))
        .fold(0.0, f64::max);

    FraudMetrics {
        answer_count: n,
        max_value_share: counts.iter().copied().max().unwrap_or(0) as f64 / total,
        agree_share: counts[AnswerValue::Agree.score() as usize] as f64 / total,
        mean_time_secs: time_sum as f64 / total,
        fast_share: fast as f64 / total,
        pattern_ratio,
    }
}

/// Share of answers that repeat the value `period` places earlier, counting
/// only pairs from different trait groups. Consistent answers inside a group
/// block are not a click rhythm, so unshuffled exams are judged the same as
/// shuffled ones. Fewer than `min_pairs` comparable pairs yields 0.
fn repeat_ratio(answers: &[Answer], period: usize, min_pairs: usize) -> f64 {
    let (compared, repeats) = answers
        .windows(period + 1)
        .filter(|w| w[0].trait_group != w[period].trait_group)
        .fold((0usize, 0usize), |(compared, repeats), w| {
            (compared + 1, repeats + usize::from(w[0].value == w[period].value))
        });
    if compared == 0 || compared < min_pairs {
        return 0.0;
    }
    repeats as f64 / compared as f64
}
