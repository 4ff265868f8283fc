//! Credits ledger service
//!
//! [`CreditsLedger`] owns the credits account. It is the only mutation path:
//! callers share it through an `Arc` and use [`load`](CreditsLedger::load),
//! [`debit`](CreditsLedger::debit) and [`refresh`](CreditsLedger::refresh).
//! Every state it reads or writes is published on a `watch` channel so views
//! can follow the balance without polling.
//!
//! The whole read-check-write sequence of a debit runs under one async mutex,
//! so two concurrent debits can never both observe the same balance.

use crate::{
    account::CreditsAccount,
    clock::{Clock, SystemClock},
    error::Result,
    plans::PlanTier,
    store::{CreditStore, CREDITS_KEY},
    tracing_config::spans,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn, Instrument};

/// Account state read from storage, plus whether a period rollover happened
struct ReadOutcome {
    account: CreditsAccount,
    rolled_over: bool,
    /// Storage failed or held garbage; `account` is the default, not the real record
    degraded: bool,
}

/// Counts one in-flight read for `is_loading` until dropped
struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Serialized, persistent credits ledger
pub struct CreditsLedger {
    store: Arc<dyn CreditStore>,
    clock: Arc<dyn Clock>,
    default_tier: PlanTier,
    write_lock: Mutex<()>,
    state: watch::Sender<CreditsAccount>,
    loading: AtomicUsize,
    loaded: AtomicBool,
}

impl std::fmt::Debug for CreditsLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreditsLedger")
            .field("store", &self.store.describe())
            .field("default_tier", &self.default_tier)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl CreditsLedger {
    /// Create a ledger over `store` using the wall clock and free-tier defaults.
    ///
    /// Nothing is read until [`load`](Self::load) is called; until then the
    /// published state is the default account.
    pub fn new(store: Arc<dyn CreditStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Create a ledger with an explicit time source
    pub fn with_clock(store: Arc<dyn CreditStore>, clock: Arc<dyn Clock>) -> Self {
        let initial = CreditsAccount::free(clock.now());
        let (state, _) = watch::channel(initial);
        Self {
            store,
            clock,
            default_tier: PlanTier::Free,
            write_lock: Mutex::new(()),
            state,
            loading: AtomicUsize::new(0),
            loaded: AtomicBool::new(false),
        }
    }

    /// Tier used to synthesize the account when storage has none
    #[must_use]
    pub fn with_default_tier(mut self, tier: PlanTier) -> Self {
        self.default_tier = tier;
        self.state
            .send_replace(CreditsAccount::new(tier, self.clock.now()));
        self
    }

    /// Read the persisted account, or synthesize the default one.
    ///
    /// Never fails: unreadable or malformed storage is logged and treated as
    /// "no record". A synthesized account is not written until the first debit.
    pub async fn load(&self) -> CreditsAccount {
        self.reload("load").await
    }

    /// Re-read the account and republish it to observers
    pub async fn refresh(&self) -> CreditsAccount {
        self.reload("refresh").await
    }

    /// Spend `amount` credits.
    ///
    /// Returns `true` and persists the new balance if `amount` credits were
    /// available; returns `false` without any mutation otherwise. Zero is not
    /// a valid amount. A failed write also returns `false`, and so does a
    /// failed or malformed read: the stored record is then left untouched.
    pub async fn debit(&self, amount: u32) -> bool {
        self.debit_inner(amount)
            .instrument(spans::debit(amount))
            .await
    }

    async fn debit_inner(&self, amount: u32) -> bool {
        if amount == 0 {
            warn!("Rejected debit of zero credits");
            return false;
        }

        let _guard = self.write_lock.lock().await;
        let ReadOutcome {
            mut account,
            degraded,
            ..
        } = self.read_current().await;

        // Debiting a stand-in account would overwrite the real record
        if degraded {
            error!(requested = amount, "Credits record unavailable, refusing debit");
            return false;
        }

        if !account.try_debit(amount) {
            info!(
                requested = amount,
                available = account.available,
                "Insufficient credits"
            );
            self.publish(account);
            return false;
        }

        // A rollover found by the read above is persisted together with the debit
        if let Err(e) = self.persist(&account).await {
            error!(error = %e, "Failed to persist debit, balance unchanged");
            return false;
        }

        info!(
            amount,
            available = account.available,
            used = account.used,
            "Credits debited"
        );
        self.publish(account);
        true
    }

    /// Last published state, without touching storage
    #[must_use]
    pub fn snapshot(&self) -> CreditsAccount {
        self.state.borrow().clone()
    }

    /// Observe every state the ledger publishes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CreditsAccount> {
        self.state.subscribe()
    }

    /// Whether a load or refresh is in flight
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst) > 0
    }

    /// Whether a load or refresh has completed at least once
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    async fn reload(&self, operation: &'static str) -> CreditsAccount {
        let span = spans::ledger_read(operation, &self.store.describe());
        async {
            let _loading = LoadingGuard::enter(&self.loading);
            let account = {
                let _guard = self.write_lock.lock().await;
                let ReadOutcome {
                    account,
                    rolled_over,
                    ..
                } = self.read_current().await;
                if rolled_over {
                    if let Err(e) = self.persist(&account).await {
                        warn!(error = %e, "Failed to persist period rollover");
                    }
                }
                account
            };
            self.publish(account.clone());
            self.loaded.store(true, Ordering::SeqCst);
            account
        }
        .instrument(span)
        .await
    }

    /// Read storage and apply normalization and reset-on-read. Caller holds the write lock.
    async fn read_current(&self) -> ReadOutcome {
        let now = self.clock.now();
        let (stored, degraded) = match self.store.get(CREDITS_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<CreditsAccount>(&raw) {
                Ok(account) => (Some(account), false),
                Err(e) => {
                    warn!(error = %e, "Stored credits record is malformed, using defaults");
                    (None, true)
                },
            },
            Ok(None) => (None, false),
            Err(e) => {
                warn!(error = %e, "Failed to read credits, using defaults");
                (None, true)
            },
        };

        let Some(mut account) = stored else {
            if !degraded {
                debug!(tier = %self.default_tier, "No stored credits, synthesizing default account");
            }
            return ReadOutcome {
                account: CreditsAccount::new(self.default_tier, now),
                rolled_over: false,
                degraded,
            };
        };

        if account.normalize() {
            warn!(
                available = account.available,
                used = account.used,
                max_credits = account.max_credits,
                "Stored credits record was inconsistent, repaired"
            );
        }

        let rolled_over = account.is_period_over(now);
        if rolled_over {
            info!(reset_date = %account.reset_date, "Credit period ended, resetting allowance");
            account.roll_over(now);
        }

        ReadOutcome {
            account,
            rolled_over,
            degraded: false,
        }
    }

    async fn persist(&self, account: &CreditsAccount) -> Result<()> {
        let json = serde_json::to_string(account)?;
        self.store.set(CREDITS_KEY, &json).await
    }

    fn publish(&self, account: CreditsAccount) {
        self.state.send_replace(account);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::MemoryCreditStore;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use tokio::sync::Semaphore;

    fn fixture() -> (Arc<MemoryCreditStore>, Arc<FixedClock>, CreditsLedger) {
        let store = Arc::new(MemoryCreditStore::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap(),
        ));
        let ledger = CreditsLedger::with_clock(store.clone(), clock.clone());
        (store, clock, ledger)
    }

    #[tokio::test]
    async fn test_load_empty_storage_yields_defaults_without_writing() {
        let (store, _clock, ledger) = fixture();
        let account = ledger.load().await;

        assert_eq!(account.available, 5);
        assert_eq!(account.used, 0);
        assert_eq!(account.plan_tier, PlanTier::Free);
        assert_eq!(account.max_credits, 5);
        assert_eq!(
            account.reset_date,
            Utc.with_ymd_and_hms(2026, 11, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(store.write_count(), 0);
        assert!(!ledger.is_loading());
    }

    #[tokio::test]
    async fn test_debit_persists_full_record() {
        let (store, _clock, ledger) = fixture();
        assert!(ledger.debit(2).await);

        let raw = store.raw(CREDITS_KEY).unwrap();
        let stored: CreditsAccount = serde_json::from_str(&raw).unwrap();
        assert_eq!((stored.available, stored.used), (3, 2));
        assert_eq!(ledger.snapshot(), stored);
    }

    #[tokio::test]
    async fn test_zero_debit_is_rejected_without_io() {
        let (store, _clock, ledger) = fixture();
        assert!(!ledger.debit(0).await);
        assert_eq!(store.read_count(), 0);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_read_failure_degrades_to_defaults() {
        let (store, _clock, ledger) = fixture();
        store.insert_raw(
            CREDITS_KEY,
            r#"{"available":1,"used":4,"planType":"free","maxCredits":5,"resetDate":"2026-11-01T00:00:00Z"}"#,
        );
        store.set_fail_reads(true);
        assert_eq!(ledger.load().await.available, 5);

        store.set_fail_reads(false);
        assert_eq!(ledger.refresh().await.available, 1);
    }

    #[tokio::test]
    async fn test_malformed_record_degrades_to_defaults() {
        let (store, _clock, ledger) = fixture();
        store.insert_raw(CREDITS_KEY, "not json");
        let account = ledger.load().await;
        assert_eq!((account.available, account.used), (5, 0));
    }

    const DRAINED: &str = r#"{"available":0,"used":5,"planType":"free","maxCredits":5,"resetDate":"2026-11-01T00:00:00Z"}"#;

    #[tokio::test]
    async fn test_debit_refused_when_read_fails() {
        let (store, _clock, ledger) = fixture();
        store.insert_raw(CREDITS_KEY, DRAINED);
        assert_eq!(ledger.load().await.available, 0);
        let writes = store.write_count();

        store.set_fail_reads(true);
        assert!(!ledger.debit(1).await);
        assert_eq!(store.raw(CREDITS_KEY).as_deref(), Some(DRAINED));
        assert_eq!(store.write_count(), writes);
        assert_eq!(ledger.snapshot().available, 0);
    }

    #[tokio::test]
    async fn test_debit_refused_when_record_is_malformed() {
        let (store, _clock, ledger) = fixture();
        store.insert_raw(CREDITS_KEY, "{corrupt");

        assert!(!ledger.debit(1).await);
        assert_eq!(store.raw(CREDITS_KEY).as_deref(), Some("{corrupt"));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_record_still_allows_first_debit() {
        let (store, _clock, ledger) = fixture();
        assert!(ledger.debit(1).await);
        assert_eq!(store.write_count(), 1);
    }

    /// Memory store whose reads wait for a permit
    struct GatedStore {
        inner: MemoryCreditStore,
        gate: Semaphore,
    }

    #[async_trait]
    impl CreditStore for GatedStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.gate.acquire().await.unwrap().forget();
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            self.inner.set(key, value).await
        }

        fn describe(&self) -> String {
            "gated".to_string()
        }
    }

    #[tokio::test]
    async fn test_is_loading_covers_overlapping_reads() {
        let store = Arc::new(GatedStore {
            inner: MemoryCreditStore::new(),
            gate: Semaphore::new(0),
        });
        let ledger = Arc::new(CreditsLedger::new(store.clone()));
        assert!(!ledger.is_loaded());

        let first = tokio::spawn({
            let ledger = Arc::clone(&ledger);
            async move { ledger.load().await }
        });
        let second = tokio::spawn({
            let ledger = Arc::clone(&ledger);
            async move { ledger.refresh().await }
        });
        while ledger.loading.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }

        store.gate.add_permits(1);
        first.await.unwrap();
        assert!(ledger.is_loading(), "second read is still in flight");
        assert!(ledger.is_loaded());

        store.gate.add_permits(1);
        second.await.unwrap();
        assert!(!ledger.is_loading());
    }

    #[tokio::test]
    async fn test_write_failure_returns_false_and_keeps_snapshot() {
        let (store, _clock, ledger) = fixture();
        let before = ledger.load().await;
        store.set_fail_writes(true);

        assert!(!ledger.debit(1).await);
        assert_eq!(ledger.snapshot(), before);
        assert_eq!(store.raw(CREDITS_KEY), None);
    }

    #[tokio::test]
    async fn test_subscribers_see_debits() {
        let (_store, _clock, ledger) = fixture();
        let mut rx = ledger.subscribe();
        ledger.load().await;

        assert!(ledger.debit(1).await);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().available, 4);
    }

    #[tokio::test]
    async fn test_reset_on_read_rolls_period_over() {
        let (store, clock, ledger) = fixture();
        for _ in 0..5 {
            assert!(ledger.debit(1).await);
        }
        assert!(!ledger.debit(1).await);

        clock.set(Utc.with_ymd_and_hms(2026, 11, 1, 0, 0, 0).unwrap());
        let account = ledger.refresh().await;
        assert_eq!((account.available, account.used), (5, 0));
        assert_eq!(
            account.reset_date,
            Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap()
        );

        let stored: CreditsAccount =
            serde_json::from_str(&store.raw(CREDITS_KEY).unwrap()).unwrap();
        assert_eq!(stored, account);
    }

    #[tokio::test]
    async fn test_default_tier_applies_to_first_run() {
        let store = Arc::new(MemoryCreditStore::new());
        let ledger = CreditsLedger::new(store).with_default_tier(PlanTier::Pro);
        assert_eq!(ledger.snapshot().max_credits, 50);
        let account = ledger.load().await;
        assert_eq!((account.available, account.plan_tier), (50, PlanTier::Pro));
    }
}
