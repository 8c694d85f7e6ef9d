//! Firefly III mirror pass after a bank run.

use std::time::Duration;

use hoarder_api::firefly::TransactionType;
use hoarder_core::context::Ctx;
use hoarder_service::job::Job;

use super::helpers::*;

const DAY: Duration = Duration::from_secs(24 * 3600);

// ============================================================================
// Transfer pairing
// ============================================================================

/// ## Summary
/// A transfer between two own accounts becomes one downstream transfer linked to both
/// operations, and a second run writes nothing.
#[test_log::test(tokio::test)]
async fn test_transfer_pair_is_mirrored_once() {
    let bank = Bank::new(fixture("transfer.json"));
    let job = bank.job(settings(DAY), true, None);

    job.run(&Ctx::background(), now(), USER)
        .await
        .expect("First run failed");

    let accounts = bank.firefly.accounts();
    assert_eq!(accounts.len(), 2);
    let fa = bank.store.account("A").and_then(|a| a.firefly_id).expect("A is mirrored");
    let fb = bank.store.account("B").and_then(|a| a.firefly_id).expect("B is mirrored");

    let transactions = bank.firefly.transactions();
    assert_eq!(transactions.len(), 1);
    let (id, transfer) = transactions.iter().next().expect("one transaction");
    assert_eq!(transfer.transaction_type, TransactionType::Transfer);
    assert_eq!(transfer.source_id.as_deref(), Some(fa.as_str()));
    assert_eq!(transfer.destination_id.as_deref(), Some(fb.as_str()));
    assert_eq!(transfer.amount, "100.00");
    assert_eq!(transfer.currency_code, "RUB");
    assert_eq!(transfer.date, transfer_time());

    for op in ["2001", "2002"] {
        let linked = bank.store.operation(op).and_then(|op| op.firefly_id);
        assert_eq!(linked.as_deref(), Some(id.as_str()), "operation {op}");
    }

    let writes = bank.store.link_writes();
    job.run(&Ctx::background(), now(), USER)
        .await
        .expect("Second run failed");

    assert_eq!(bank.store.link_writes(), writes);
    assert_eq!(bank.firefly.transactions(), transactions);
    assert!(bank.firefly.deleted().is_empty());
}

// ============================================================================
// Partial state correction
// ============================================================================

/// ## Summary
/// The outgoing half mirrored alone becomes a withdrawal. Once the incoming half arrives, the
/// withdrawal is deleted and a transfer linked to both halves replaces it.
#[test_log::test(tokio::test)]
async fn test_half_linked_pair_is_replaced_by_transfer() {
    let full = fixture("transfer.json");
    let mut outgoing_only = full.clone();
    outgoing_only.operations.remove("B");

    let bank = Bank::new(outgoing_only);
    let job = bank.job(settings(DAY), true, None);
    job.run(&Ctx::background(), now(), USER)
        .await
        .expect("First run failed");

    let stale = bank
        .store
        .operation("2001")
        .and_then(|op| op.firefly_id)
        .expect("outgoing half is linked");
    let withdrawal = bank.firefly.transactions();
    assert_eq!(
        withdrawal.get(&stale).map(|t| t.transaction_type),
        Some(TransactionType::Withdrawal)
    );

    bank.client.replace(full);
    job.run(&Ctx::background(), now(), USER)
        .await
        .expect("Second run failed");

    assert_eq!(bank.firefly.deleted(), [stale.clone()]);
    let transactions = bank.firefly.transactions();
    assert_eq!(transactions.len(), 1);
    let (id, transfer) = transactions.iter().next().expect("one transaction");
    assert_ne!(id, &stale);
    assert_eq!(transfer.transaction_type, TransactionType::Transfer);
    for op in ["2001", "2002"] {
        let linked = bank.store.operation(op).and_then(|op| op.firefly_id);
        assert_eq!(linked.as_deref(), Some(id.as_str()), "operation {op}");
    }
}
