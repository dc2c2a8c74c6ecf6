//! Failed-login tracking with tiered lockouts.
//!
//! Each account key (the normalised email) carries a failure counter and an
//! optional block deadline. An attempt is counted when it starts, under the
//! same lock that checks for a block, so parallel requests cannot slip past
//! a threshold. Reaching a tier threshold blocks the key for that tier's
//! duration; once the deadline passes the block lifts and, unless the policy
//! says otherwise, the counter starts over. Idle keys are forgotten.

use std::{sync::Arc, time::Duration as StdDuration};

use chrono::{DateTime, Duration, Utc};
use moka::future::Cache;
use serde::Serialize;
use tokio::sync::Mutex;

const MAX_TRACKED_KEYS: u64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutTier {
    pub threshold: u32,
    pub duration: Duration,
}

impl LockoutTier {
    pub fn minutes(threshold: u32, minutes: i64) -> Self {
        Self {
            threshold,
            duration: Duration::minutes(minutes),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    /// Sorted by ascending threshold.
    tiers: Vec<LockoutTier>,
    pub reset_on_expiry: bool,
    /// Keys untouched for this long are dropped; never shorter than the longest block.
    pub idle_ttl: StdDuration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::new(
            vec![
                LockoutTier::minutes(5, 1),
                LockoutTier::minutes(10, 5),
                LockoutTier::minutes(15, 15),
            ],
            true,
        )
    }
}

impl LockoutPolicy {
    pub fn new(mut tiers: Vec<LockoutTier>, reset_on_expiry: bool) -> Self {
        tiers.sort_by_key(|tier| tier.threshold);
        Self {
            tiers,
            reset_on_expiry,
            idle_ttl: StdDuration::from_secs(60 * 60),
        }
    }

    /// The tier whose threshold `attempts` has just reached. Past the last
    /// threshold every further failure re-applies the last tier.
    pub fn tier_for(&self, attempts: u32) -> Option<LockoutTier> {
        let last = self.tiers.last()?;
        if attempts >= last.threshold {
            return Some(*last);
        }
        self.tiers
            .iter()
            .find(|tier| tier.threshold == attempts)
            .copied()
    }

    fn remaining_before_block(&self, attempts: u32) -> u32 {
        self.tiers
            .iter()
            .find(|tier| tier.threshold > attempts)
            .map(|tier| tier.threshold - attempts)
            .unwrap_or(0)
    }

    fn longest_block(&self) -> StdDuration {
        self.tiers
            .iter()
            .filter_map(|tier| tier.duration.to_std().ok())
            .max()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptRecord {
    pub attempts: u32,
    pub block_end: Option<DateTime<Utc>>,
}

/// A login attempt that has already been counted against its key.
#[derive(Debug)]
#[must_use]
pub struct AttemptTicket {
    key: String,
    attempts: u32,
    block: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still allowed to try; `remaining` failures until the next block.
    Warned { remaining: u32 },
    Blocked { duration: Duration },
}

impl FailureOutcome {
    pub fn message(&self) -> String {
        match self {
            FailureOutcome::Warned { remaining } => format!(
                "Invalid email or password. {} attempt(s) remaining before a temporary block.",
                remaining
            ),
            FailureOutcome::Blocked { duration } => format!(
                "Too many failed login attempts. Account blocked for {}.",
                describe_minutes(*duration)
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blocked {
    pub remaining: Duration,
}

impl Blocked {
    pub fn remaining_secs(&self) -> i64 {
        // Round up so a client never sees 0 while still locked out.
        (self.remaining.num_milliseconds() + 999) / 1000
    }

    pub fn message(&self) -> String {
        let secs = self.remaining_secs();
        format!(
            "Account temporarily blocked. Try again in {}:{:02}.",
            secs / 60,
            secs % 60
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockoutStatus {
    pub attempts: u32,
    pub blocked: bool,
    pub remaining_secs: i64,
}

type SharedRecord = Arc<Mutex<AttemptRecord>>;

pub struct LoginGuard {
    policy: LockoutPolicy,
    records: Cache<String, SharedRecord>,
}

impl LoginGuard {
    pub fn new(policy: LockoutPolicy) -> Self {
        let idle_ttl = policy.idle_ttl.max(policy.longest_block());
        let records = Cache::builder()
            .max_capacity(MAX_TRACKED_KEYS)
            .time_to_idle(idle_ttl)
            .build();
        Self { policy, records }
    }

    pub fn key(email: &str) -> String {
        email.trim().to_lowercase()
    }

    async fn record(&self, key: &str) -> SharedRecord {
        self.records
            .get_with(key.to_string(), async {
                Arc::new(Mutex::new(AttemptRecord::default()))
            })
            .await
    }

    /// Refuses a blocked key, otherwise counts the attempt before the password
    /// is checked. Reaching a threshold starts the block right away, so
    /// attempts already in flight cannot push past it.
    pub async fn begin_attempt(&self, key: &str, now: DateTime<Utc>) -> Result<AttemptTicket, Blocked> {
        let record = self.record(key).await;
        let mut record = record.lock().await;
        self.refresh(&mut record, now)?;

        record.attempts = record.attempts.saturating_add(1);
        let block = self.policy.tier_for(record.attempts).map(|tier| tier.duration);
        if let Some(duration) = block {
            record.block_end = Some(now + duration);
        }

        Ok(AttemptTicket {
            key: key.to_string(),
            attempts: record.attempts,
            block,
        })
    }

    /// The attempt failed; it was counted when it began.
    pub fn record_failure(&self, ticket: AttemptTicket) -> FailureOutcome {
        match ticket.block {
            Some(duration) => {
                log::warn!(
                    "Login for {} blocked for {}s after {} failed attempts",
                    ticket.key,
                    duration.num_seconds(),
                    ticket.attempts
                );
                FailureOutcome::Blocked { duration }
            }
            None => FailureOutcome::Warned {
                remaining: self.policy.remaining_before_block(ticket.attempts),
            },
        }
    }

    /// The password was right: forget the key, including any block this attempt set.
    pub async fn record_success(&self, ticket: AttemptTicket) {
        self.records.invalidate(&ticket.key).await;
    }

    pub async fn status(&self, key: &str, now: DateTime<Utc>) -> LockoutStatus {
        let Some(record) = self.records.get(key).await else {
            return LockoutStatus {
                attempts: 0,
                blocked: false,
                remaining_secs: 0,
            };
        };
        let mut record = record.lock().await;

        match self.refresh(&mut record, now) {
            Ok(()) => LockoutStatus {
                attempts: record.attempts,
                blocked: false,
                remaining_secs: 0,
            },
            Err(blocked) => LockoutStatus {
                attempts: record.attempts,
                blocked: true,
                remaining_secs: blocked.remaining_secs(),
            },
        }
    }

    #[cfg(test)]
    pub async fn seed(&self, key: &str, record: AttemptRecord) {
        self.records
            .insert(key.to_string(), Arc::new(Mutex::new(record)))
            .await;
    }

    #[cfg(test)]
    pub async fn tracked_keys(&self) -> u64 {
        self.records.run_pending_tasks().await;
        self.records.entry_count()
    }

    /// Lifts an expired block in place; reports an active one.
    fn refresh(&self, record: &mut AttemptRecord, now: DateTime<Utc>) -> Result<(), Blocked> {
        match record.block_end {
            Some(end) if end > now => Err(Blocked {
                remaining: end - now,
            }),
            Some(_) => {
                record.block_end = None;
                if self.policy.reset_on_expiry {
                    record.attempts = 0;
                }
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn describe_minutes(duration: Duration) -> String {
    match duration.num_minutes() {
        1 => "1 minute".to_string(),
        n if n > 0 => format!("{} minutes", n),
        _ => format!("{} seconds", duration.num_seconds()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use futures::future::join_all;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    async fn fail_times(guard: &LoginGuard, key: &str, n: u32, now: DateTime<Utc>) -> FailureOutcome {
        let mut last = FailureOutcome::Warned { remaining: 0 };
        for _ in 0..n {
            let ticket = guard.begin_attempt(key, now).await.unwrap();
            last = guard.record_failure(ticket);
        }
        last
    }

    #[test]
    fn tiers_apply_when_their_threshold_is_reached() {
        let policy = LockoutPolicy::default();
        assert_eq!(policy.tier_for(4), None);
        assert_eq!(policy.tier_for(5), Some(LockoutTier::minutes(5, 1)));
        assert_eq!(policy.tier_for(6), None);
        assert_eq!(policy.tier_for(10), Some(LockoutTier::minutes(10, 5)));
        assert_eq!(policy.tier_for(15), Some(LockoutTier::minutes(15, 15)));
        assert_eq!(policy.tier_for(40), Some(LockoutTier::minutes(15, 15)));
        assert_eq!(policy.remaining_before_block(7), 3);
    }

    #[tokio::test]
    async fn warns_with_remaining_attempts_below_first_tier() {
        let guard = LoginGuard::new(LockoutPolicy::default());
        let outcome = fail_times(&guard, "a@example.com", 3, t0()).await;
        assert_eq!(outcome, FailureOutcome::Warned { remaining: 2 });
        assert!(!guard.status("a@example.com", t0()).await.blocked);
    }

    #[tokio::test]
    async fn fifth_failure_blocks_for_one_minute() {
        let guard = LoginGuard::new(LockoutPolicy::default());
        let outcome = fail_times(&guard, "a@example.com", 5, t0()).await;
        assert_eq!(
            outcome,
            FailureOutcome::Blocked {
                duration: Duration::minutes(1)
            }
        );
        assert_eq!(
            outcome.message(),
            "Too many failed login attempts. Account blocked for 1 minute."
        );

        let blocked = guard
            .begin_attempt("a@example.com", t0() + Duration::seconds(18))
            .await
            .unwrap_err();
        assert_eq!(blocked.remaining_secs(), 42);
        assert_eq!(blocked.message(), "Account temporarily blocked. Try again in 0:42.");
        assert_eq!(guard.status("a@example.com", t0()).await.attempts, 5);
    }

    #[tokio::test]
    async fn tenth_and_fifteenth_failures_escalate() {
        let guard = LoginGuard::new(LockoutPolicy::default());
        guard
            .seed(
                "b@example.com",
                AttemptRecord {
                    attempts: 9,
                    block_end: None,
                },
            )
            .await;
        let outcome = fail_times(&guard, "b@example.com", 1, t0()).await;
        assert_eq!(
            outcome.message(),
            "Too many failed login attempts. Account blocked for 5 minutes."
        );

        guard
            .seed(
                "c@example.com",
                AttemptRecord {
                    attempts: 14,
                    block_end: None,
                },
            )
            .await;
        let outcome = fail_times(&guard, "c@example.com", 1, t0()).await;
        assert_eq!(
            outcome,
            FailureOutcome::Blocked {
                duration: Duration::minutes(15)
            }
        );
    }

    #[tokio::test]
    async fn parallel_attempts_stop_at_the_threshold() {
        let guard = LoginGuard::new(LockoutPolicy::default());
        let attempts = join_all((0..12).map(|_| guard.begin_attempt("a@example.com", t0()))).await;
        let (admitted, refused): (Vec<_>, Vec<_>) = attempts.into_iter().partition(Result::is_ok);
        assert_eq!(admitted.len(), 5);
        assert_eq!(refused.len(), 7);

        // Every admitted attempt then fails its password check.
        let blocks = admitted
            .into_iter()
            .map(|ticket| guard.record_failure(ticket.unwrap()))
            .filter(|outcome| matches!(outcome, FailureOutcome::Blocked { .. }))
            .count();
        assert_eq!(blocks, 1);
        assert_eq!(guard.status("a@example.com", t0()).await.attempts, 5);
    }

    #[tokio::test]
    async fn checks_and_failures_interleave_without_extra_attempts() {
        let guard = LoginGuard::new(LockoutPolicy::default());
        let mut tickets = Vec::new();
        for _ in 0..3 {
            tickets.push(guard.begin_attempt("a@example.com", t0()).await.unwrap());
        }
        let outcome = guard.record_failure(tickets.remove(0));
        assert_eq!(outcome, FailureOutcome::Warned { remaining: 4 });

        tickets.push(guard.begin_attempt("a@example.com", t0()).await.unwrap());
        tickets.push(guard.begin_attempt("a@example.com", t0()).await.unwrap());
        assert!(guard.begin_attempt("a@example.com", t0()).await.is_err());

        let outcomes: Vec<_> = tickets
            .into_iter()
            .map(|ticket| guard.record_failure(ticket))
            .collect();
        assert_eq!(
            outcomes.last(),
            Some(&FailureOutcome::Blocked {
                duration: Duration::minutes(1)
            })
        );
    }

    #[tokio::test]
    async fn correct_password_clears_the_block_it_started() {
        let guard = LoginGuard::new(LockoutPolicy::default());
        fail_times(&guard, "a@example.com", 4, t0()).await;

        let fifth = guard.begin_attempt("a@example.com", t0()).await.unwrap();
        assert!(guard.begin_attempt("a@example.com", t0()).await.is_err());

        guard.record_success(fifth).await;
        assert_eq!(guard.status("a@example.com", t0()).await.attempts, 0);
        assert!(guard.begin_attempt("a@example.com", t0()).await.is_ok());
    }

    #[tokio::test]
    async fn expiry_resets_counter_and_permits_login() {
        let guard = LoginGuard::new(LockoutPolicy::default());
        fail_times(&guard, "a@example.com", 5, t0()).await;

        let just_before = t0() + Duration::seconds(59);
        let status = guard.status("a@example.com", just_before).await;
        assert!(status.blocked);
        assert_eq!(status.remaining_secs, 1);

        let after = t0() + Duration::minutes(1);
        let status = guard.status("a@example.com", after).await;
        assert_eq!(
            status,
            LockoutStatus {
                attempts: 0,
                blocked: false,
                remaining_secs: 0
            }
        );
        assert!(guard.begin_attempt("a@example.com", after).await.is_ok());
    }

    #[tokio::test]
    async fn counter_survives_expiry_when_reset_is_disabled() {
        let policy = LockoutPolicy::new(LockoutPolicy::default().tiers, false);
        let guard = LoginGuard::new(policy);
        fail_times(&guard, "a@example.com", 5, t0()).await;

        let later = t0() + Duration::minutes(2);
        let outcome = fail_times(&guard, "a@example.com", 4, later).await;
        assert_eq!(outcome, FailureOutcome::Warned { remaining: 1 });
        let outcome = fail_times(&guard, "a@example.com", 1, later).await;
        assert_eq!(
            outcome,
            FailureOutcome::Blocked {
                duration: Duration::minutes(5)
            }
        );
    }

    #[tokio::test]
    async fn idle_keys_are_forgotten() {
        let mut policy = LockoutPolicy::new(
            vec![LockoutTier {
                threshold: 5,
                duration: Duration::milliseconds(50),
            }],
            true,
        );
        policy.idle_ttl = StdDuration::from_millis(50);
        let guard = LoginGuard::new(policy);

        for i in 0..200 {
            fail_times(&guard, &format!("guess{}@example.com", i), 1, t0()).await;
        }
        assert_eq!(guard.tracked_keys().await, 200);

        tokio::time::sleep(StdDuration::from_millis(200)).await;
        assert_eq!(guard.tracked_keys().await, 0);
        assert_eq!(guard.status("guess7@example.com", t0()).await.attempts, 0);
    }

    #[test]
    fn keys_are_case_insensitive() {
        assert_eq!(LoginGuard::key("  Owner@Example.COM "), "owner@example.com");
    }
}
