//! The Postgres store under the bank job and the mirror pass.
//!
//! Every test works on its own phone and account ids, so runs never see each other's rows.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use hoarder_api::firefly::TransactionType;
use hoarder_core::context::Ctx;
use hoarder_db::db::connection::create_pool;
use hoarder_db::db::migrations::{Family, run_migrations};
use hoarder_db::db::query::PgStore;
use hoarder_db::store::{BankStore, MirrorStore};
use hoarder_service::firefly::Mirror;
use hoarder_service::job::Job;
use hoarder_service::tinkoff::{TinkoffJob, TinkoffPhone};
use hoarder_test::{FakeFirefly, Fixture, FixtureTinkoffClient};
use uuid::Uuid;

use super::helpers::*;

/// ## Summary
/// Migrated store at `DATABASE_URL`; `None` when the variable is not set.
async fn connect() -> anyhow::Result<Option<Arc<PgStore>>> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        tracing::warn!("DATABASE_URL is not set; skipping");
        return Ok(None);
    };
    run_migrations(&url, Family::Tinkoff).await?;
    let pool = create_pool(&url, 2).await?;
    Ok(Some(Arc::new(PgStore::new(pool))))
}

/// Fixture whose account and operation ids carry `suffix`.
fn isolated(fixture: Fixture, suffix: &str) -> Fixture {
    let rename = |id: &str| format!("{id}-{suffix}");
    let mut operations = BTreeMap::new();
    for (account, mut ops) in fixture.operations {
        for op in &mut ops {
            op.id = rename(&op.id);
            op.account = rename(&op.account);
            op.sender_agreement = op.sender_agreement.as_deref().map(rename);
        }
        operations.insert(rename(&account), ops);
    }
    let mut accounts = fixture.accounts;
    for account in &mut accounts {
        account.id = rename(&account.id);
    }
    Fixture {
        accounts,
        operations,
        receipts: BTreeMap::new(),
    }
}

struct PgBank {
    phone: String,
    suffix: String,
    client: Arc<FixtureTinkoffClient>,
    firefly: Arc<FakeFirefly>,
    job: TinkoffJob,
}

impl PgBank {
    fn new(store: &Arc<PgStore>, fixture: Fixture, mirrored: bool) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        let phone = format!("+7{}", &suffix[..10]);
        let client = Arc::new(FixtureTinkoffClient::new(isolated(fixture, &suffix)));
        let firefly = Arc::new(FakeFirefly::new());

        let mirror = mirrored.then(|| {
            let mirror_store: Arc<dyn MirrorStore> = store.clone();
            Arc::new(Mirror::new(firefly.clone(), mirror_store))
        });
        let bank_store: Arc<dyn BankStore> = store.clone();
        let job = TinkoffJob::new(
            BTreeMap::from([(USER.to_owned(), vec![TinkoffPhone {
                phone: phone.clone(),
                client: client.clone(),
                credentials: None,
            }])]),
            bank_store,
            mirror,
            settings(Duration::from_secs(24 * 3600)),
        );
        Self {
            phone,
            suffix,
            client,
            firefly,
            job,
        }
    }

    fn id(&self, id: &str) -> String {
        format!("{id}-{}", self.suffix)
    }
}

/// ## Summary
/// Accounts missing from the bank's answer are tombstoned by the SQL sync.
#[test_log::test(tokio::test)]
async fn test_postgres_tombstones_vanished_account() {
    let Some(store) = connect().await.expect("Failed to connect") else {
        return;
    };
    let bank = PgBank::new(&store, fixture("transfer.json"), false);
    bank.job
        .run(&Ctx::background(), now(), USER)
        .await
        .expect("First run failed");

    let mut remaining = isolated(fixture("transfer.json"), &bank.suffix);
    let a = bank.id("A");
    remaining.accounts.retain(|account| account.id == a);
    remaining.operations.retain(|account, _| *account == a);
    bank.client.replace(remaining);
    bank.job
        .run(&Ctx::background(), now(), USER)
        .await
        .expect("Second run failed");

    let accounts = MirrorStore::accounts(store.as_ref(), &bank.phone)
        .await
        .expect("Failed to load accounts");
    let deleted: BTreeMap<_, _> = accounts
        .into_iter()
        .map(|account| (account.id, account.deleted))
        .collect();
    assert_eq!(deleted, BTreeMap::from([(bank.id("A"), false), (bank.id("B"), true)]));
}

/// ## Summary
/// The self-join pairs the two halves of a transfer and stops listing them once linked.
#[test_log::test(tokio::test)]
async fn test_postgres_transfer_pair_is_mirrored_once() {
    let Some(store) = connect().await.expect("Failed to connect") else {
        return;
    };
    let bank = PgBank::new(&store, fixture("transfer.json"), true);
    bank.job
        .run(&Ctx::background(), now(), USER)
        .await
        .expect("Job failed");

    let transactions = bank.firefly.transactions();
    assert_eq!(transactions.len(), 1);
    let transfer = transactions.values().next().expect("one transaction");
    assert_eq!(transfer.transaction_type, TransactionType::Transfer);
    assert_eq!(transfer.amount, "100.00");
    assert!(
        store
            .transfer_candidates(&bank.phone)
            .await
            .expect("Failed to load candidates")
            .is_empty()
    );

    bank.job
        .run(&Ctx::background(), now(), USER)
        .await
        .expect("Second run failed");
    assert_eq!(bank.firefly.transactions(), transactions);
}
