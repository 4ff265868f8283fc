//! Ledger invariants checked end to end against real stores
//!
//! Covers the balance arithmetic, persistence round-trips, period rollover and
//! the guarantee that concurrent debits never overspend.

use bgremove_credits::{
    account::first_of_next_month, CreditStore, CreditsAccount, CreditsLedger, FileCreditStore,
    FixedClock, MemoryCreditStore, PlanTier,
};
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;

fn memory_ledger() -> (Arc<CreditsLedger>, Arc<MemoryCreditStore>) {
    let store = Arc::new(MemoryCreditStore::new());
    let ledger = Arc::new(CreditsLedger::new(store.clone()));
    (ledger, store)
}

#[tokio::test]
async fn test_empty_storage_loads_free_defaults() {
    let (ledger, store) = memory_ledger();
    let account = ledger.load().await;

    assert_eq!(account.available, 5);
    assert_eq!(account.used, 0);
    assert_eq!(account.plan_tier, PlanTier::Free);
    assert_eq!(account.max_credits, 5);
    assert!(account.reset_date > Utc::now());
    assert_eq!(store.write_count(), 0, "load must not write a synthesized account");
}

#[tokio::test]
async fn test_over_debit_changes_nothing() {
    let (ledger, _store) = memory_ledger();
    ledger.load().await;

    for amount in [6, 7, 100, u32::MAX] {
        assert!(!ledger.debit(amount).await, "debit({}) should be refused", amount);
        let account = ledger.snapshot();
        assert_eq!((account.available, account.used), (5, 0));
    }
}

#[tokio::test]
async fn test_valid_debits_keep_the_sum_invariant() {
    for amount in 1..=5 {
        let (ledger, _store) = memory_ledger();
        ledger.load().await;

        assert!(ledger.debit(amount).await);
        let account = ledger.snapshot();
        assert_eq!(account.available, 5 - amount);
        assert_eq!(account.used, amount);
        assert_eq!(account.available + account.used, account.max_credits);
    }
}

#[tokio::test]
async fn test_five_debits_then_refusal() {
    let (ledger, store) = memory_ledger();
    ledger.load().await;

    for _ in 0..5 {
        assert!(ledger.debit(1).await);
    }
    let drained = ledger.snapshot();
    assert_eq!((drained.available, drained.used), (0, 5));

    let writes = store.write_count();
    assert!(!ledger.debit(1).await);
    assert_eq!(ledger.snapshot(), drained);
    assert_eq!(store.write_count(), writes, "a refused debit must not write");
}

#[tokio::test]
async fn test_concurrent_debits_never_overspend() {
    let (ledger, _store) = memory_ledger();
    ledger.load().await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move { ledger.debit(1).await }));
    }

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            granted += 1;
        }
    }

    assert_eq!(granted, 5);
    let account = ledger.snapshot();
    assert_eq!((account.available, account.used), (0, 5));
}

#[tokio::test]
async fn test_last_credit_goes_to_exactly_one_caller() {
    let (ledger, _store) = memory_ledger();
    ledger.load().await;
    assert!(ledger.debit(4).await);

    let (a, b) = tokio::join!(ledger.debit(1), ledger.debit(1));
    assert!(a ^ b, "exactly one of two racing debits may succeed");
    assert_eq!(ledger.snapshot().available, 0);
}

#[tokio::test]
async fn test_file_store_round_trip() {
    let temp_dir = TempDir::new().unwrap();

    let first = CreditsLedger::new(Arc::new(FileCreditStore::new(temp_dir.path())))
        .with_default_tier(PlanTier::Pro);
    first.load().await;
    assert!(first.debit(3).await);
    let persisted = first.snapshot();

    let record = temp_dir.path().join("userCredits.json");
    assert!(record.exists());
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&record).unwrap()).unwrap();
    assert_eq!(json["planType"], "pro");
    assert_eq!(json["available"], 47);
    assert_eq!(json["maxCredits"], 50);

    let second = CreditsLedger::new(Arc::new(FileCreditStore::new(temp_dir.path())));
    assert_eq!(second.load().await, persisted);
}

#[tokio::test]
async fn test_past_reset_date_rolls_over_on_read() {
    let now = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
    let store = Arc::new(MemoryCreditStore::new());

    let mut stale = CreditsAccount::new(PlanTier::Pro, Utc.with_ymd_and_hms(2026, 8, 3, 0, 0, 0).unwrap());
    assert!(stale.try_debit(42));
    store
        .set("userCredits", &serde_json::to_string(&stale).unwrap())
        .await
        .unwrap();

    let ledger = CreditsLedger::with_clock(store.clone(), Arc::new(FixedClock::new(now)));
    let account = ledger.load().await;

    assert_eq!(account.available, 50);
    assert_eq!(account.used, 0);
    assert_eq!(account.reset_date, first_of_next_month(now));
    assert_eq!(
        account.reset_date,
        Utc.with_ymd_and_hms(2026, 11, 1, 0, 0, 0).unwrap()
    );

    let stored: CreditsAccount =
        serde_json::from_str(&store.raw("userCredits").unwrap()).unwrap();
    assert_eq!(stored, account);
}

#[tokio::test]
async fn test_legacy_plan_tier_key_is_accepted() {
    let store = Arc::new(MemoryCreditStore::new());
    store.insert_raw(
        "userCredits",
        r#"{"available":30,"used":20,"planTier":"pro","maxCredits":50,"resetDate":"2099-01-01T00:00:00Z"}"#,
    );

    let ledger = CreditsLedger::new(store);
    let account = ledger.load().await;
    assert_eq!(account.plan_tier, PlanTier::Pro);
    assert_eq!(account.available, 30);
}
