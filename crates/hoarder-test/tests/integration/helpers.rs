//! Shared wiring for the integration tests.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use hoarder_api::auth::CredentialManager;
use hoarder_api::tinkoff::Session;
use hoarder_db::store::{BankStore, MirrorStore};
use hoarder_service::firefly::Mirror;
use hoarder_service::tinkoff::{TinkoffJob, TinkoffPhone, TinkoffSettings};
use hoarder_test::{FakeFirefly, Fixture, FixtureTinkoffClient, MemoryStore};

pub const USER: &str = "alice";
pub const PHONE: &str = "+79990000000";

/// 2024-03-01T10:00:00Z, the time of the fixture transfer.
pub fn transfer_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
}

/// A day after every fixture operation.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap()
}

/// ## Summary
/// Loads `fixtures/<name>` of this crate.
pub fn fixture(name: &str) -> Fixture {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name);
    let json = std::fs::read_to_string(&path).expect("Failed to read fixture");
    Fixture::from_json(&json).expect("Failed to decode fixture")
}

pub fn settings(overlap: Duration) -> TinkoffSettings {
    TinkoffSettings {
        batch_size: 50,
        overlap,
        with_receipts: true,
    }
}

/// One user with one phone, backed by the in-memory doubles.
pub struct Bank {
    pub store: Arc<MemoryStore>,
    pub client: Arc<FixtureTinkoffClient>,
    pub firefly: Arc<FakeFirefly>,
}

impl Bank {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            client: Arc::new(FixtureTinkoffClient::new(fixture)),
            firefly: Arc::new(FakeFirefly::new()),
        }
    }

    /// ## Summary
    /// Job over this bank. `mirrored` adds the Firefly pass; `credentials` guards the phone.
    pub fn job(
        &self,
        settings: TinkoffSettings,
        mirrored: bool,
        credentials: Option<Arc<CredentialManager<Session>>>,
    ) -> TinkoffJob {
        let phone = TinkoffPhone {
            phone: PHONE.to_owned(),
            client: self.client.clone(),
            credentials,
        };
        let mirror = mirrored.then(|| {
            let store: Arc<dyn MirrorStore> = self.store.clone();
            Arc::new(Mirror::new(self.firefly.clone(), store))
        });
        let store: Arc<dyn BankStore> = self.store.clone();
        TinkoffJob::new(
            BTreeMap::from([(USER.to_owned(), vec![phone])]),
            store,
            mirror,
            settings,
        )
    }
}
