use std::sync::Arc;

use crate::config::QuizPolicy;
use crate::database::store::ExamStore;
use crate::error::{Error, Result};
use crate::models::exam::Tier;
use crate::models::quota::{QuotaDenial, QuotaRecord, QuotaStanding, ViolationOutcome};
use crate::utils::locks::KeyedLocks;
use crate::utils::time::Clock;

/// Free/paid attempt accounting with violation lockouts.
///
/// `consumed` and `record_violation` expect the caller to hold the user's
/// lock from `user_locks`; `grant` takes it itself.
#[derive(Clone)]
pub struct QuotaService {
    store: Arc<dyn ExamStore>,
    policy: Arc<QuizPolicy>,
    clock: Arc<dyn Clock>,
    user_locks: KeyedLocks<i64>,
}

impl QuotaService {
    pub fn new(
        store: Arc<dyn ExamStore>,
        policy: Arc<QuizPolicy>,
        clock: Arc<dyn Clock>,
        user_locks: KeyedLocks<i64>,
    ) -> Self {
        Self {
            store,
            policy,
            clock,
            user_locks,
        }
    }

    async fn load(&self, user_id: i64, tier: Tier) -> Result<QuotaRecord> {
        Ok(match self.store.get_quota(user_id, tier).await? {
            Some(record) => record,
            None => QuotaRecord::fresh(
                user_id,
                tier,
                self.policy.paid_initial_attempts,
                self.clock.now(),
            ),
        })
    }

    pub async fn standing(&self, user_id: i64, tier: Tier) -> Result<QuotaStanding> {
        let record = self.load(user_id, tier).await?;
        Ok(QuotaStanding::from_record(&record, self.clock.now()))
    }

    /// Read-only check run before an exam is created.
    pub async fn authorize(&self, user_id: i64, tier: Tier) -> Result<QuotaStanding> {
        let now = self.clock.now();
        let record = self.load(user_id, tier).await?;

        if let Some(until) = record.lockout_until.filter(|until| *until > now) {
            tracing::info!(user_id, %tier, %until, "exam creation denied: locked out");
            return Err(Error::QuotaExceeded(QuotaDenial::Locked { tier, until }));
        }
        if tier == Tier::Paid && record.remaining_attempts.unwrap_or(0) <= 0 {
            tracing::info!(user_id, "exam creation denied: no paid attempts left");
            return Err(Error::QuotaExceeded(QuotaDenial::AttemptsExhausted { tier }));
        }
        Ok(QuotaStanding::from_record(&record, now))
    }

    /// The quota record as it stands once a completed exam is counted
    /// against it. Not saved here: the store writes it together with the
    /// completed exam.
    pub async fn consumed(&self, user_id: i64, tier: Tier) -> Result<QuotaRecord> {
        let mut record = self.load(user_id, tier).await?;
        record.consumed_count += 1;
        if tier == Tier::Paid {
            record.remaining_attempts = Some((record.remaining_attempts.unwrap_or(0) - 1).max(0));
        }
        record.updated_at = self.clock.now();
        Ok(record)
    }

    /// Counts a fraud rejection; reaching the tier threshold locks the user
    /// out and starts the count over.
    pub async fn record_violation(&self, user_id: i64, tier: Tier) -> Result<ViolationOutcome> {
        let now = self.clock.now();
        let threshold = self.policy.violation_threshold(tier);
        let mut record = self.load(user_id, tier).await?;

        record.violation_count += 1;
        let violations = record.violation_count;
        let mut locked_until = None;
        if violations >= threshold {
            let until = now + self.policy.lockout(tier);
            record.lockout_until = Some(until);
            record.violation_count = 0;
            locked_until = Some(until);
            tracing::warn!(user_id, %tier, violations, %until, "user locked out after repeated violations");
        }
        record.updated_at = now;
        self.store.save_quota(&record).await?;

        Ok(ViolationOutcome {
            violations,
            threshold,
            locked_until,
        })
    }

    /// Adds paid attempts (purchase or administrative grant).
    pub async fn grant(&self, user_id: i64, attempts: i32) -> Result<QuotaStanding> {
        if attempts <= 0 {
            return Err(Error::BadRequest("attempts must be positive".to_string()));
        }
        let _user_guard = self.user_locks.lock(user_id).await;
        let now = self.clock.now();
        let mut record = self.load(user_id, Tier::Paid).await?;
        let remaining = record.remaining_attempts.unwrap_or(0).saturating_add(attempts);
        record.remaining_attempts = Some(remaining);
        record.updated_at = now;
        self.store.save_quota(&record).await?;
        tracing::info!(user_id, attempts, remaining, "paid attempts granted");
        Ok(QuotaStanding::from_record(&record, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryExamStore;
    use crate::models::quota::QuotaAdvisory;
    use crate::utils::time::ManualClock;
    use chrono::{Duration, TimeZone, Utc};

    fn service(policy: QuizPolicy) -> (QuotaService, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap());
        let svc = QuotaService::new(
            Arc::new(MemoryExamStore::new()),
            Arc::new(policy),
            Arc::new(clock.clone()),
            KeyedLocks::new(),
        );
        (svc, clock)
    }

    #[tokio::test]
    async fn free_tier_is_open_by_default() {
        let (svc, _) = service(QuizPolicy::default());
        let standing = svc.authorize(1, Tier::Free).await.unwrap();
        assert_eq!(standing.remaining_attempts, None);
        let consumed = svc.consumed(1, Tier::Free).await.unwrap();
        assert_eq!(consumed.consumed_count, 1);
        // nothing is written until the store saves the record
        assert_eq!(svc.standing(1, Tier::Free).await.unwrap().consumed_count, 0);
        svc.store.save_quota(&consumed).await.unwrap();
        let standing = svc.authorize(1, Tier::Free).await.unwrap();
        assert_eq!(standing.consumed_count, 1);
    }

    #[tokio::test]
    async fn last_paid_attempt_is_advised_then_exhausted() {
        let (svc, _) = service(QuizPolicy::default());
        assert!(matches!(
            svc.authorize(2, Tier::Paid).await,
            Err(Error::QuotaExceeded(QuotaDenial::AttemptsExhausted { .. }))
        ));

        svc.grant(2, 1).await.unwrap();
        let standing = svc.authorize(2, Tier::Paid).await.unwrap();
        assert_eq!(standing.advisory, Some(QuotaAdvisory::OneAttemptRemaining));

        let after = svc.consumed(2, Tier::Paid).await.unwrap();
        assert_eq!(after.remaining_attempts, Some(0));
        svc.store.save_quota(&after).await.unwrap();
        assert!(matches!(
            svc.authorize(2, Tier::Paid).await,
            Err(Error::QuotaExceeded(QuotaDenial::AttemptsExhausted { .. }))
        ));
        let again = svc.consumed(2, Tier::Paid).await.unwrap();
        assert_eq!(again.remaining_attempts, Some(0));
    }

    #[tokio::test]
    async fn free_lockout_lasts_until_expiry() {
        let (svc, clock) = service(QuizPolicy::default());
        let first = svc.record_violation(3, Tier::Free).await.unwrap();
        assert_eq!(first.violations, 1);
        assert!(first.locked_until.is_none());

        let second = svc.record_violation(3, Tier::Free).await.unwrap();
        let until = second.locked_until.expect("locked on second violation");
        assert_eq!(until, clock.now() + Duration::hours(12));
        assert_eq!(svc.standing(3, Tier::Free).await.unwrap().violation_count, 0);

        clock.advance(Duration::hours(11));
        assert!(matches!(
            svc.authorize(3, Tier::Free).await,
            Err(Error::QuotaExceeded(QuotaDenial::Locked { .. }))
        ));
        clock.set(until);
        assert!(svc.authorize(3, Tier::Free).await.is_ok());
    }

    #[tokio::test]
    async fn paid_lockout_needs_three_violations_and_lasts_a_day() {
        let (svc, clock) = service(QuizPolicy {
            paid_initial_attempts: 5,
            ..QuizPolicy::default()
        });
        for _ in 0..2 {
            assert!(svc.record_violation(4, Tier::Paid).await.unwrap().locked_until.is_none());
        }
        let third = svc.record_violation(4, Tier::Paid).await.unwrap();
        assert_eq!(third.locked_until, Some(clock.now() + Duration::hours(24)));
        assert!(svc.authorize(4, Tier::Free).await.is_ok());
        assert!(svc.authorize(4, Tier::Paid).await.is_err());
    }

    #[test]
    fn grant_rejects_non_positive_amounts() {
        let (svc, _) = service(QuizPolicy::default());
        let res = tokio_test::block_on(svc.grant(9, 0));
        tokio_test::assert_err!(res);
    }
}
