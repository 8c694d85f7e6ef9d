//! Bank ingestion: fresh loads, accounts vanishing upstream and the overlap window.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use hoarder_core::context::Ctx;
use hoarder_service::job::Job;

use super::helpers::*;

const WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

/// ## Summary
/// An empty store gets the account and both operations, ordered by time, and nothing is
/// tombstoned. Receipts are enabled but no operation has one.
#[test_log::test(tokio::test)]
async fn test_fresh_ingest_stores_account_and_operations() {
    let bank = Bank::new(fixture("fresh_ingest.json"));
    let job = bank.job(settings(WEEK), false, None);

    job.run(&Ctx::background(), now(), USER)
        .await
        .expect("Job failed");

    let accounts = bank.store.accounts_of(PHONE);
    assert_eq!(accounts.len(), 1, "the external account is skipped");
    assert_eq!(accounts[0].id, "5001");
    assert!(!accounts[0].deleted);
    assert_eq!(bank.store.rows("cards"), 1);

    let ids: Vec<_> = bank
        .store
        .operations_of("5001")
        .into_iter()
        .map(|op| op.id)
        .collect();
    assert_eq!(ids, ["3001", "3002"]);
    assert_eq!(bank.store.rows("operation_locations"), 1);
    assert!(bank.store.receipts().is_empty());
}

/// ## Summary
/// An account the bank stops returning is tombstoned, not removed, and its operations stay.
#[test_log::test(tokio::test)]
async fn test_vanished_account_is_tombstoned() {
    let mut bank_data = fixture("transfer.json");
    let bank = Bank::new(bank_data.clone());
    let job = bank.job(settings(WEEK), false, None);
    job.run(&Ctx::background(), now(), USER)
        .await
        .expect("First run failed");

    bank_data.accounts.retain(|account| account.id == "A");
    bank_data.operations.remove("B");
    bank.client.replace(bank_data);
    job.run(&Ctx::background(), now(), USER)
        .await
        .expect("Second run failed");

    let a = bank.store.account("A").expect("A is stored");
    let b = bank.store.account("B").expect("B is kept");
    assert!(!a.deleted);
    assert!(b.deleted);
    assert_eq!(bank.store.operations_of("B").len(), 1);
    assert!(bank.store.operation("2002").is_some());
}

/// ## Summary
/// A re-fetch inside the overlap window updates the stored operation in place.
#[test_log::test(tokio::test)]
async fn test_overlap_reingest_updates_description() {
    let mut bank_data = fixture("fresh_ingest.json");
    let bank = Bank::new(bank_data.clone());
    let job = bank.job(settings(WEEK), false, None);
    job.run(&Ctx::background(), now(), USER)
        .await
        .expect("First run failed");

    let newest = bank
        .store
        .operations_of("5001")
        .last()
        .map(|op| op.operation_time)
        .expect("operations are stored");
    for op in bank_data.operations.values_mut().flatten() {
        if op.id == "3002" {
            op.description = "Groceries and household".to_owned();
        }
    }
    bank.client.replace(bank_data);
    job.run(&Ctx::background(), now(), USER)
        .await
        .expect("Second run failed");

    let windows = bank.client.windows();
    assert_eq!(windows.len(), 2);
    assert_eq!(windows[0].start, DateTime::<Utc>::UNIX_EPOCH);
    assert_eq!(windows[1].start, newest - TimeDelta::days(7));
    assert_eq!(windows[1].end, now());

    let op = bank.store.operation("3002").expect("operation is stored");
    assert_eq!(op.description, "Groceries and household");
    assert_eq!(bank.store.rows("operations"), 2);
    assert_eq!(bank.store.rows("operation_locations"), 1);
}
