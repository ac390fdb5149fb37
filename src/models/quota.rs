use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::models::exam::Tier;

/// Per (user, tier) attempt accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub user_id: i64,
    pub tier: Tier,
    pub consumed_count: i32,
    /// Only tracked for the paid tier.
    pub remaining_attempts: Option<i32>,
    pub lockout_until: Option<DateTime<Utc>>,
    pub violation_count: i32,
    pub updated_at: DateTime<Utc>,
}

impl QuotaRecord {
    pub fn fresh(user_id: i64, tier: Tier, paid_initial_attempts: i32, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            tier,
            consumed_count: 0,
            remaining_attempts: match tier {
                Tier::Free => None,
                Tier::Paid => Some(paid_initial_attempts.max(0)),
            },
            lockout_until: None,
            violation_count: 0,
            updated_at: now,
        }
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.lockout_until.map_or(false, |until| until > now)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct QuotaRow {
    pub user_id: i64,
    pub tier: String,
    pub consumed_count: i32,
    pub remaining_attempts: Option<i32>,
    pub lockout_until: Option<DateTime<Utc>>,
    pub violation_count: i32,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<QuotaRow> for QuotaRecord {
    type Error = String;

    fn try_from(row: QuotaRow) -> Result<Self, Self::Error> {
        Ok(QuotaRecord {
            user_id: row.user_id,
            tier: row.tier.parse()?,
            consumed_count: row.consumed_count,
            remaining_attempts: row.remaining_attempts,
            lockout_until: row.lockout_until,
            violation_count: row.violation_count,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuotaAdvisory {
    OneAttemptRemaining,
}

impl QuotaAdvisory {
    /// Numeric code understood by the legacy quiz clients.
    pub fn code(self) -> u16 {
        match self {
            QuotaAdvisory::OneAttemptRemaining => 465,
        }
    }
}

/// What a caller may see about their quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QuotaStanding {
    pub user_id: i64,
    pub tier: Tier,
    pub consumed_count: i32,
    pub remaining_attempts: Option<i32>,
    pub lockout_until: Option<DateTime<Utc>>,
    pub violation_count: i32,
    pub advisory: Option<QuotaAdvisory>,
    pub advisory_code: Option<u16>,
}

impl QuotaStanding {
    pub fn from_record(record: &QuotaRecord, now: DateTime<Utc>) -> Self {
        let advisory = match (record.tier, record.remaining_attempts) {
            (Tier::Paid, Some(1)) => Some(QuotaAdvisory::OneAttemptRemaining),
            _ => None,
        };
        Self {
            user_id: record.user_id,
            tier: record.tier,
            consumed_count: record.consumed_count,
            remaining_attempts: record.remaining_attempts,
            lockout_until: record.lockout_until.filter(|until| *until > now),
            violation_count: record.violation_count,
            advisory,
            advisory_code: advisory.map(QuotaAdvisory::code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum QuotaDenial {
    Locked { tier: Tier, until: DateTime<Utc> },
    AttemptsExhausted { tier: Tier },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationOutcome {
    /// Count including this violation, before any reset.
    pub violations: i32,
    pub threshold: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn fresh_records_track_remaining_only_for_paid() {
        let now = Utc::now();
        assert_eq!(QuotaRecord::fresh(1, Tier::Free, 3, now).remaining_attempts, None);
        assert_eq!(QuotaRecord::fresh(1, Tier::Paid, 3, now).remaining_attempts, Some(3));
    }

    #[test]
    fn standing_hides_expired_lockouts() {
        let now = Utc::now();
        let mut record = QuotaRecord::fresh(1, Tier::Paid, 1, now);
        record.lockout_until = Some(now - Duration::hours(1));
        let standing = QuotaStanding::from_record(&record, now);
        assert!(standing.lockout_until.is_none());
        assert_eq!(standing.advisory, Some(QuotaAdvisory::OneAttemptRemaining));
        assert_eq!(standing.advisory_code, Some(465));
    }

    #[test]
    fn advisory_code_is_absent_without_advisory() {
        let now = Utc::now();
        let standing = QuotaStanding::from_record(&QuotaRecord::fresh(1, Tier::Paid, 2, now), now);
        assert_eq!(standing.advisory, None);
        assert_eq!(standing.advisory_code, None);
    }
}
