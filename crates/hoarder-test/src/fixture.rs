//! Bank client answering from a JSON document instead of the network.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hoarder_api::error::{ApiError, ApiResult};
use hoarder_api::tinkoff::TinkoffApi;
use hoarder_api::tinkoff::model as api;
use hoarder_core::context::Ctx;
use serde::Deserialize;

/// What the fixture bank knows. Missing keys are empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Fixture {
    pub accounts: Vec<api::Account>,
    /// Operations by account id.
    pub operations: BTreeMap<String, Vec<api::Operation>>,
    /// Shopping receipts by operation id.
    pub receipts: BTreeMap<String, api::ShoppingReceipt>,
}

impl Fixture {
    /// ## Errors
    /// Returns the decoding error when `json` is not a fixture document.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// One `operations` call as the loader issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub account_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Default)]
pub struct FixtureTinkoffClient {
    fixture: Mutex<Fixture>,
    windows: Mutex<Vec<Window>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FixtureTinkoffClient {
    #[must_use]
    pub fn new(fixture: Fixture) -> Self {
        Self {
            fixture: Mutex::new(fixture),
            windows: Mutex::new(Vec::new()),
        }
    }

    /// Swaps the bank's data between runs.
    pub fn replace(&self, fixture: Fixture) {
        *lock(&self.fixture) = fixture;
    }

    #[must_use]
    pub fn windows(&self) -> Vec<Window> {
        lock(&self.windows).clone()
    }
}

#[async_trait]
impl TinkoffApi for FixtureTinkoffClient {
    async fn accounts(&self, _ctx: &Ctx) -> ApiResult<Vec<api::Account>> {
        Ok(lock(&self.fixture).accounts.clone())
    }

    async fn account_requisites(&self, _ctx: &Ctx, _account_id: &str) -> ApiResult<api::Requisites> {
        Ok(api::Requisites {
            recipient: None,
            beneficiary_bank_name: None,
            recipient_external_account: None,
            correspondent_account: None,
            bank_bik: None,
            inn: None,
            kpp: None,
        })
    }

    async fn statements(&self, _ctx: &Ctx, _account_id: &str) -> ApiResult<Vec<api::Statement>> {
        Ok(Vec::new())
    }

    async fn operations(
        &self,
        _ctx: &Ctx,
        account_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ApiResult<Vec<api::Operation>> {
        lock(&self.windows).push(Window {
            account_id: account_id.to_owned(),
            start,
            end,
        });
        let (start, end) = (start.timestamp_millis(), end.timestamp_millis());
        Ok(lock(&self.fixture)
            .operations
            .get(account_id)
            .map(|operations| {
                operations
                    .iter()
                    .filter(|op| (start..=end).contains(&op.operation_time.milliseconds))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn shopping_receipt(
        &self,
        _ctx: &Ctx,
        operation_id: &str,
    ) -> ApiResult<api::ShoppingReceipt> {
        lock(&self.fixture)
            .receipts
            .get(operation_id)
            .cloned()
            .ok_or(ApiError::NoDataFound)
    }

    async fn invest_accounts(&self, _ctx: &Ctx) -> ApiResult<api::InvestAccounts> {
        Ok(api::InvestAccounts {
            accounts: Vec::new(),
        })
    }

    async fn invest_operations(
        &self,
        _ctx: &Ctx,
        _broker_account_id: &str,
        _cursor: Option<String>,
        _limit: i64,
    ) -> ApiResult<api::InvestOperations> {
        Ok(api::InvestOperations {
            items: Vec::new(),
            next_cursor: None,
            has_next: false,
        })
    }

    async fn invest_operation_types(&self, _ctx: &Ctx) -> ApiResult<api::InvestOperationTypes> {
        Ok(api::InvestOperationTypes {
            operations_types: Vec::new(),
        })
    }

    async fn client_offers(&self, _ctx: &Ctx) -> ApiResult<Vec<api::ClientOffer>> {
        Ok(Vec::new())
    }
}
