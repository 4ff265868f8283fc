//! The persisted credits record and its invariants

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::plans::PlanTier;

/// Remaining and used allowance for the current billing period.
///
/// After every successful mutation `available + used == max_credits` holds.
/// The serialized layout is the one stored under the `userCredits` key:
///
/// ```json
/// {"available":5,"used":0,"planType":"free","maxCredits":5,"resetDate":"2026-11-01T00:00:00Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditsAccount {
    /// Remaining allowance
    pub available: u32,
    /// Consumed allowance in the current period
    pub used: u32,
    /// Plan that determines `max_credits`
    #[serde(rename = "planType", alias = "planTier")]
    pub plan_tier: PlanTier,
    /// Ceiling for the current period
    pub max_credits: u32,
    /// When `used` goes back to zero
    pub reset_date: DateTime<Utc>,
}

impl CreditsAccount {
    /// Fresh account for `tier` with a full allowance, resetting next month
    #[must_use]
    pub fn new(tier: PlanTier, now: DateTime<Utc>) -> Self {
        let max_credits = tier.max_credits();
        Self {
            available: max_credits,
            used: 0,
            plan_tier: tier,
            max_credits,
            reset_date: first_of_next_month(now),
        }
    }

    /// The first-run account: 5 free credits
    #[must_use]
    pub fn free(now: DateTime<Utc>) -> Self {
        Self::new(PlanTier::Free, now)
    }

    /// Spend `amount` credits. All or nothing: returns `false` and leaves the
    /// account untouched when `amount` is zero or exceeds `available`.
    pub fn try_debit(&mut self, amount: u32) -> bool {
        if amount == 0 || self.available < amount {
            return false;
        }
        self.available -= amount;
        self.used += amount;
        true
    }

    /// Whether the account satisfies its invariants
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.max_credits > 0
            && self.max_credits == self.plan_tier.max_credits()
            && u64::from(self.available) + u64::from(self.used) == u64::from(self.max_credits)
    }

    /// Repair a record that does not satisfy the invariants.
    ///
    /// `max_credits` is taken from the tier, `used` is clamped to it and
    /// `available` recomputed. Returns `true` if anything changed.
    pub fn normalize(&mut self) -> bool {
        if self.is_consistent() {
            return false;
        }
        self.max_credits = self.plan_tier.max_credits();
        self.used = self.used.min(self.max_credits);
        self.available = self.max_credits - self.used;
        true
    }

    /// Whether the reset date has been reached
    #[must_use]
    pub fn is_period_over(&self, now: DateTime<Utc>) -> bool {
        self.reset_date <= now
    }

    /// Start a new period: full allowance, reset date moved past `now`
    pub fn roll_over(&mut self, now: DateTime<Utc>) {
        self.max_credits = self.plan_tier.max_credits();
        self.used = 0;
        self.available = self.max_credits;
        self.reset_date = first_of_next_month(now);
    }

    /// Share of the allowance spent, rounded to a whole percent
    #[must_use]
    pub fn percent_used(&self) -> u8 {
        if self.max_credits == 0 {
            return 100;
        }
        let percent = (f64::from(self.used) / f64::from(self.max_credits) * 100.0).round();
        percent.clamp(0.0, 100.0) as u8
    }

    /// Low-credit warning: at most 20% of the allowance left (rounded up)
    #[must_use]
    pub fn is_low(&self) -> bool {
        let threshold = (f64::from(self.max_credits) * 0.2).ceil() as u32;
        self.available <= threshold
    }
}

/// Midnight UTC on the first day of the month after `now`
#[must_use]
pub fn first_of_next_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map_or_else(|| now + Duration::days(31), |naive| naive.and_utc())
}
